//! Metrics-table constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{SpecCellFormat, SpecMetricsTableOptions};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Excel cell text maximum length in characters.
pub const N_LEN_EXCEL_STRING_MAX: usize = 32_767;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Number of summary rows appended by finalization.
pub const N_ROWS_SUMMARY: usize = 2;
/// Column holding the identity label.
pub const N_COL_IDENTITY: usize = 0;
/// Row holding the column headers.
pub const N_ROW_HEADER: usize = 0;
/// First data row (directly below the header).
pub const N_ROW_DATA_FIRST: usize = 1;

/// Default label of the column-sum summary row.
pub const C_LABEL_SUM: &str = "SUM";
/// Default label of the column-average summary row.
pub const C_LABEL_AVERAGE: &str = "AVERAGE";

/// Build default named format presets used by [`crate::writer::render_sheet`].
pub fn derive_default_metrics_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Calibri".to_string()),
        font_size: Some(11),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert("text".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        "header".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "summary".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            num_format: Some("0.0000".to_string()),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Build default table options.
pub fn derive_default_metrics_table_options() -> SpecMetricsTableOptions {
    SpecMetricsTableOptions::default()
}
