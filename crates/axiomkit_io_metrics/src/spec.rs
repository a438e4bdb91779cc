//! Shared metrics-table specification models and the top-level error type.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::conf::{C_LABEL_AVERAGE, C_LABEL_SUM, derive_default_metrics_formats};

////////////////////////////////////////////////////////////////////////////////
// #region CellValue

/// Normalized cell value held by the in-memory sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value (preserved sheets only).
    Boolean(bool),
    /// Formula text without the leading `=`.
    Formula(String),
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        EnumCellValue::String(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        EnumCellValue::String(value)
    }
}

impl From<&String> for EnumCellValue {
    fn from(value: &String) -> Self {
        EnumCellValue::String(value.clone())
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for EnumCellValue {
                fn from(value: $t) -> Self {
                    EnumCellValue::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl<T: Into<EnumCellValue>> From<Option<T>> for EnumCellValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(val) => val.into(),
            None => EnumCellValue::None,
        }
    }
}

/// One buffered `(property name, value)` measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecPropertyPair {
    /// Property (column) name.
    pub name: String,
    /// Recorded value.
    pub value: EnumCellValue,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification rendered into a `rust_xlsxwriter::Format`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,
    /// Horizontal alignment.
    pub align: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            border: other.border.or(self.border),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TableOptions

/// Replacement text for numbers the spreadsheet format cannot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxValuePolicy {
    /// Replacement text for NaN.
    pub nan_str: String,
    /// Replacement text for positive infinity.
    pub posinf_str: String,
    /// Replacement text for negative infinity.
    pub neginf_str: String,
}

impl Default for SpecXlsxValuePolicy {
    fn default() -> Self {
        Self {
            nan_str: "NaN".to_string(),
            posinf_str: "Inf".to_string(),
            neginf_str: "-Inf".to_string(),
        }
    }
}

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only.
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells (default).
    #[default]
    All,
}

/// Autofit policy applied at finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::All,
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Options for [`crate::table::MetricsTable::open_with_options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMetricsTableOptions {
    /// Buffered pairs per identity that force a flush (must be >= 1).
    pub n_properties_max: usize,
    /// Load the destination workbook and append a new sheet to it.
    pub if_preserve_existing: bool,
    /// Name of the sheet receiving this run's table.
    pub sheet_name: Option<String>,
    /// Header text above the identity column.
    pub label_identity_header: String,
    /// Label of the column-sum row.
    pub label_sum: String,
    /// Label of the column-average row.
    pub label_average: String,
    /// Non-finite number replacement policy.
    pub value_policy: SpecXlsxValuePolicy,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Identity label and data cell format.
    pub fmt_data: SpecCellFormat,
    /// Header row format.
    pub fmt_header: SpecCellFormat,
    /// Summary row format.
    pub fmt_summary: SpecCellFormat,
}

impl Default for SpecMetricsTableOptions {
    fn default() -> Self {
        let mut dict_fmt = derive_default_metrics_formats();
        Self {
            n_properties_max: usize::MAX,
            if_preserve_existing: true,
            sheet_name: None,
            label_identity_header: String::new(),
            label_sum: C_LABEL_SUM.to_string(),
            label_average: C_LABEL_AVERAGE.to_string(),
            value_policy: SpecXlsxValuePolicy::default(),
            policy_autofit: SpecAutofitCellsPolicy::default(),
            fmt_data: dict_fmt.remove("text").unwrap_or_default(),
            fmt_header: dict_fmt.remove("header").unwrap_or_default(),
            fmt_summary: dict_fmt.remove("summary").unwrap_or_default(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Summary of one finalized table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecMetricsReport {
    /// Name of the sheet holding this run's table.
    pub sheet_name: String,
    /// Data rows written (excluding header and summaries).
    pub cnt_rows_data: u64,
    /// Property cells written into data rows.
    pub cnt_cells_data: u64,
    /// Distinct property columns.
    pub cnt_columns: u64,
    /// Flushes triggered by the per-identity maximum.
    pub cnt_flushes_threshold: u64,
    /// Flushes performed by the finalization drain.
    pub cnt_flushes_drain: u64,
    /// Sheets carried over from the existing destination.
    pub cnt_sheets_preserved: u64,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecMetricsReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} sheet={:?} rows={} cells={} columns={} flushes_threshold={} flushes_drain={} preserved={} warnings={}",
            self.sheet_name,
            self.cnt_rows_data,
            self.cnt_cells_data,
            self.cnt_columns,
            self.cnt_flushes_threshold,
            self.cnt_flushes_drain,
            self.cnt_sheets_preserved,
            self.warnings.len()
        )
    }
}

impl fmt::Display for SpecMetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[METRICS]"))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Errors surfaced by [`crate::table::MetricsTable`].
#[derive(Debug, Error)]
pub enum MetricsTableError {
    /// Caller passed an argument the table cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Row or column would fall outside the Excel worksheet grid.
    #[error("excel limit exceeded: {0}")]
    ExcelLimit(String),

    /// Destination could not be created, read or written.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Destination or temp path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Workbook assembly failed.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MetricsTableError>;

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_conversions_map_absent_to_none() {
        assert_eq!(EnumCellValue::from("v1"), EnumCellValue::String("v1".into()));
        assert_eq!(EnumCellValue::from(2.0f64), EnumCellValue::Number(2.0));
        assert_eq!(EnumCellValue::from(1.5f32), EnumCellValue::Number(1.5));
        assert_eq!(EnumCellValue::from(7i32), EnumCellValue::Number(7.0));
        assert_eq!(EnumCellValue::from(None::<&str>), EnumCellValue::None);
        assert_eq!(EnumCellValue::from(Some(3u64)), EnumCellValue::Number(3.0));
    }

    #[test]
    fn test_report_format_is_single_line() {
        let report = SpecMetricsReport {
            sheet_name: "Sheet1".to_string(),
            cnt_rows_data: 2,
            cnt_cells_data: 5,
            cnt_columns: 3,
            cnt_flushes_threshold: 1,
            cnt_flushes_drain: 1,
            cnt_sheets_preserved: 0,
            warnings: vec!["w".to_string()],
        };

        assert_eq!(
            report.to_string(),
            "[METRICS] sheet=\"Sheet1\" rows=2 cells=5 columns=3 flushes_threshold=1 \
             flushes_drain=1 preserved=0 warnings=1"
        );
    }

    #[test]
    fn test_default_options_use_summary_labels() {
        let options = SpecMetricsTableOptions::default();
        assert_eq!(options.label_sum, "SUM");
        assert_eq!(options.label_average, "AVERAGE");
        assert_eq!(options.fmt_header.bold, Some(true));
        assert!(options.if_preserve_existing);
    }
}
