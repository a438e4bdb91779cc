//! In-memory worksheet grid.
//!
//! Cells are kept here until finalization renders them into a
//! `rust_xlsxwriter` worksheet, so the header row can still be completed
//! after the first data rows exist.

use std::collections::BTreeMap;

use crate::spec::EnumCellValue;

/// Sparse row-major grid of typed cells (zero-based indices).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    dict_rows: BTreeMap<usize, BTreeMap<usize, EnumCellValue>>,
}

impl SheetGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one cell, replacing any previous value.
    pub fn set_cell(&mut self, row_idx: usize, col_idx: usize, value: EnumCellValue) {
        self.dict_rows
            .entry(row_idx)
            .or_default()
            .insert(col_idx, value);
    }

    /// Create the row if absent so it counts as written even with no cells.
    pub fn touch_row(&mut self, row_idx: usize) {
        self.dict_rows.entry(row_idx).or_default();
    }

    pub fn cell(&self, row_idx: usize, col_idx: usize) -> Option<&EnumCellValue> {
        self.dict_rows.get(&row_idx)?.get(&col_idx)
    }

    pub fn row(&self, row_idx: usize) -> Option<&BTreeMap<usize, EnumCellValue>> {
        self.dict_rows.get(&row_idx)
    }

    /// One past the last written row, `0` for an empty grid.
    pub fn n_rows(&self) -> usize {
        self.dict_rows
            .last_key_value()
            .map_or(0, |(n_row_last, _)| n_row_last + 1)
    }

    /// One past the right-most written column, `0` for an empty grid.
    pub fn n_cols(&self) -> usize {
        self.dict_rows
            .values()
            .filter_map(|row| row.last_key_value().map(|(n_col, _)| n_col + 1))
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.dict_rows.is_empty()
    }

    /// Cells as `(row, col, value)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &EnumCellValue)> {
        self.dict_rows.iter().flat_map(|(n_row, row)| {
            row.iter()
                .map(move |(n_col, value)| (*n_row, *n_col, value))
        })
    }

    /// Row values as a dense vector of `n_width` cells, missing cells as `None`.
    pub fn row_values(&self, row_idx: usize, n_width: usize) -> Vec<EnumCellValue> {
        let mut l_values = vec![EnumCellValue::None; n_width];
        if let Some(row) = self.dict_rows.get(&row_idx) {
            for (n_col, value) in row.range(..n_width) {
                l_values[*n_col] = value.clone();
            }
        }
        l_values
    }
}

/// Named worksheet, either loaded from an existing workbook or built in this run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecSheetSnapshot {
    /// Sheet name as shown on the workbook tab.
    pub name: String,
    /// Sheet cells.
    pub grid: SheetGrid,
}
