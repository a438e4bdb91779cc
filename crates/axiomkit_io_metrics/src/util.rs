//! Stateless helper utilities shared by the writer, loader and table.

use std::collections::BTreeSet;

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::spec::{MetricsTableError, Result, SpecXlsxValuePolicy};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Convert `NaN`/`Inf` to policy string; `None` for finite values.
pub fn convert_nan_inf_to_str(x: f64, value_policy: &SpecXlsxValuePolicy) -> Option<String> {
    if x.is_nan() {
        return Some(value_policy.nan_str.clone());
    }
    if x.is_infinite() {
        return Some(if x.is_sign_positive() {
            value_policy.posinf_str.clone()
        } else {
            value_policy.neginf_str.clone()
        });
    }
    None
}

/// Approximate displayed width, counting non-ASCII chars as wider glyphs.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellReferences

/// Zero-based column index to Excel letters (`0 -> A`, `26 -> AA`).
pub fn derive_column_letters(col_idx: usize) -> String {
    let mut v_letters = Vec::new();
    let mut n_rest = col_idx + 1;
    while n_rest > 0 {
        let n_rem = (n_rest - 1) % 26;
        v_letters.push(b'A' + n_rem as u8);
        n_rest = (n_rest - 1) / 26;
    }
    v_letters.reverse();
    String::from_utf8_lossy(&v_letters).into_owned()
}

/// Zero-based `(row, col)` to an A1 reference.
pub fn derive_cell_ref(row_idx: usize, col_idx: usize) -> String {
    format!("{}{}", derive_column_letters(col_idx), row_idx + 1)
}

/// Inclusive single-column range, e.g. `B2:B9`.
pub fn derive_column_range(row_idx_first: usize, row_idx_last: usize, col_idx: usize) -> String {
    format!(
        "{}:{}",
        derive_cell_ref(row_idx_first, col_idx),
        derive_cell_ref(row_idx_last, col_idx)
    )
}

/// Parse an A1 reference (`$` markers allowed) to zero-based `(row, col)`.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(usize, usize)> {
    let c_ref = cell_ref.replace('$', "");
    let n_split = c_ref.find(|chr: char| chr.is_ascii_digit())?;
    let (c_letters, c_digits) = c_ref.split_at(n_split);
    if c_letters.is_empty() || !c_letters.chars().all(|chr| chr.is_ascii_alphabetic()) {
        return None;
    }

    let mut n_col = 0usize;
    for chr in c_letters.chars() {
        let n_digit = (chr.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        n_col = n_col.checked_mul(26)?.checked_add(n_digit)?;
    }
    let n_row = c_digits.parse::<usize>().ok()?;
    if n_row == 0 {
        return None;
    }
    Some((n_row - 1, n_col - 1))
}

/// Checked cast to `rust_xlsxwriter` row number.
pub fn cast_row_num(value: usize) -> Result<u32> {
    if value >= N_NROWS_EXCEL_MAX {
        return Err(MetricsTableError::ExcelLimit(format!(
            "row index overflow: {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| MetricsTableError::ExcelLimit(format!("row index overflow: {value}")))
}

/// Checked cast to `rust_xlsxwriter` column number.
pub fn cast_col_num(value: usize) -> Result<u16> {
    if value >= N_NCOLS_EXCEL_MAX {
        return Err(MetricsTableError::ExcelLimit(format!(
            "column index overflow: {value}"
        )));
    }
    u16::try_from(value)
        .map_err(|_| MetricsTableError::ExcelLimit(format!("column index overflow: {value}")))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Return `name` or a `name__N` variant not yet in `set_names_existing`, and claim it.
///
/// Comparison is case-insensitive, as Excel treats sheet names.
pub fn derive_unique_sheet_name(name: &str, set_names_existing: &mut BTreeSet<String>) -> String {
    if !set_names_existing.contains(&name.to_lowercase()) {
        set_names_existing.insert(name.to_lowercase());
        return name.to_string();
    }

    let base_name: String = name
        .chars()
        .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 4))
        .collect();

    let mut n_idx = 2usize;
    loop {
        let candidate: String = format!("{base_name}__{n_idx}")
            .chars()
            .take(N_LEN_EXCEL_SHEET_NAME_MAX)
            .collect();
        if !set_names_existing.contains(&candidate.to_lowercase()) {
            set_names_existing.insert(candidate.to_lowercase());
            return candidate;
        }
        n_idx += 1;
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
