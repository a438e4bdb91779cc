//! Per-identity bounded buffer of property pairs.

use std::hash::Hash;

use indexmap::IndexMap;

use crate::spec::{MetricsTableError, Result, SpecPropertyPair};

/// Entry handed out when a buffer is flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecBufferedEntry<ID> {
    /// Identity owning the pairs.
    pub id: ID,
    /// Pairs in insertion order.
    pub pairs: Vec<SpecPropertyPair>,
}

/// Ordered map of identity to buffered pairs, evicting at `n_properties_max`.
///
/// Iteration and drain order is the order in which identities entered the
/// buffer; an evicted identity that is recorded again re-enters at the end.
#[derive(Debug, Clone)]
pub struct EntryBuffer<ID> {
    n_properties_max: usize,
    dict_entries: IndexMap<ID, Vec<SpecPropertyPair>>,
}

impl<ID: Eq + Hash> EntryBuffer<ID> {
    /// Create an empty buffer; `n_properties_max` must be >= 1.
    pub fn new(n_properties_max: usize) -> Result<Self> {
        if n_properties_max < 1 {
            return Err(MetricsTableError::InvalidArgument(
                "Maximum number of properties must be greater than 0.".to_string(),
            ));
        }
        Ok(Self {
            n_properties_max,
            dict_entries: IndexMap::new(),
        })
    }

    pub fn n_properties_max(&self) -> usize {
        self.n_properties_max
    }

    /// Append `pair` for `id`; when the sequence reaches the maximum it is
    /// removed and returned for flushing.
    pub fn append(&mut self, id: ID, pair: SpecPropertyPair) -> Option<SpecBufferedEntry<ID>> {
        let entry = self.dict_entries.entry(id);
        let n_idx_entry = entry.index();
        let l_pairs = entry.or_default();
        l_pairs.push(pair);
        if l_pairs.len() < self.n_properties_max {
            return None;
        }

        let (id, pairs) = self.dict_entries.shift_remove_index(n_idx_entry)?;
        Some(SpecBufferedEntry { id, pairs })
    }

    /// Would appending one more pair for `id` reach the maximum?
    pub fn is_at_threshold_after_append(&self, id: &ID) -> bool {
        self.n_buffered(id) + 1 >= self.n_properties_max
    }

    /// Number of pairs currently buffered for `id`.
    pub fn n_buffered(&self, id: &ID) -> usize {
        self.dict_entries.get(id).map_or(0, Vec::len)
    }

    /// Number of identities currently buffered.
    pub fn len(&self) -> usize {
        self.dict_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict_entries.is_empty()
    }

    /// Remove every buffered entry in order of first appearance.
    pub fn drain_all(&mut self) -> Vec<SpecBufferedEntry<ID>> {
        self.dict_entries
            .drain(..)
            .map(|(id, pairs)| SpecBufferedEntry { id, pairs })
            .collect()
    }
}
