//! Stable property-name to column-index registry.

use std::collections::BTreeMap;

use crate::conf::N_COL_IDENTITY;

/// Bidirectional `name <-> column index` mapping.
///
/// Indices start at 1 (column 0 holds the identity label), are handed out
/// in first-seen order and are never reused.
#[derive(Debug, Default, Clone)]
pub struct ColumnRegistry {
    dict_idx_by_name: BTreeMap<String, usize>,
    l_names_by_idx: Vec<String>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the column of `name`, assigning the next free index on first sight.
    pub fn resolve(&mut self, name: &str) -> usize {
        if let Some(n_idx) = self.dict_idx_by_name.get(name) {
            return *n_idx;
        }
        let n_idx = self.next_index();
        self.dict_idx_by_name.insert(name.to_string(), n_idx);
        self.l_names_by_idx.push(name.to_string());
        n_idx
    }

    /// Column of `name` without registering it.
    pub fn lookup_by_name(&self, name: &str) -> Option<usize> {
        self.dict_idx_by_name.get(name).copied()
    }

    /// Property name owning column `index`.
    pub fn lookup_by_index(&self, index: usize) -> Option<&str> {
        if index == N_COL_IDENTITY {
            return None;
        }
        self.l_names_by_idx.get(index - 1).map(String::as_str)
    }

    /// Index the next unseen name would receive.
    pub fn next_index(&self) -> usize {
        self.l_names_by_idx.len() + 1
    }

    /// Number of registered columns (the highest assigned index).
    pub fn len(&self) -> usize {
        self.l_names_by_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l_names_by_idx.is_empty()
    }

    /// `(index, name)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.l_names_by_idx
            .iter()
            .enumerate()
            .map(|(n_pos, c_name)| (n_pos + 1, c_name.as_str()))
    }
}
