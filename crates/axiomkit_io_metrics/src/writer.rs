//! Table writer: turns flushed identities into rows of the in-memory sheet,
//! appends summary rows, and renders sheets into an xlsx workbook.

use std::fs;
use std::io::Write;
use std::path::Path;

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use tracing::debug;

use crate::conf::{
    N_COL_IDENTITY, N_NROWS_EXCEL_MAX, N_ROW_DATA_FIRST, N_ROW_HEADER, N_ROWS_SUMMARY,
};
use crate::registry::ColumnRegistry;
use crate::sheet::SheetGrid;
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, MetricsTableError, Result, SpecAutofitCellsPolicy,
    SpecCellFormat, SpecPropertyPair, SpecXlsxValuePolicy,
};
use crate::util::{
    cast_col_num, cast_row_num, convert_nan_inf_to_str, derive_column_range,
    estimate_unicode_string_width,
};

////////////////////////////////////////////////////////////////////////////////
// #region TableWriter

/// Row allocator over one [`SheetGrid`].
///
/// Row 0 is the header, written lazily before the first data row. Rows are
/// only ever appended.
#[derive(Debug, Clone)]
pub struct TableWriter {
    grid: SheetGrid,
    label_identity_header: String,
    n_row_next: usize,
    if_header_written: bool,
    cnt_rows_data: usize,
    cnt_cells_data: u64,
}

impl TableWriter {
    pub fn new(label_identity_header: impl Into<String>) -> Self {
        Self {
            grid: SheetGrid::new(),
            label_identity_header: label_identity_header.into(),
            n_row_next: N_ROW_HEADER,
            if_header_written: false,
            cnt_rows_data: 0,
            cnt_cells_data: 0,
        }
    }

    pub fn grid(&self) -> &SheetGrid {
        &self.grid
    }

    pub fn into_grid(self) -> SheetGrid {
        self.grid
    }

    pub fn if_header_written(&self) -> bool {
        self.if_header_written
    }

    /// Data rows written so far.
    pub fn n_rows_data(&self) -> usize {
        self.cnt_rows_data
    }

    /// Property cells written into data rows so far.
    pub fn cnt_cells_data(&self) -> u64 {
        self.cnt_cells_data
    }

    /// Fail if one more data row would leave no room for the summary rows.
    pub fn check_row_capacity(&self) -> Result<()> {
        let n_row_data = if self.if_header_written {
            self.n_row_next
        } else {
            N_ROW_DATA_FIRST
        };
        if n_row_data + N_ROWS_SUMMARY >= N_NROWS_EXCEL_MAX {
            return Err(MetricsTableError::ExcelLimit(format!(
                "data row {n_row_data} leaves no room for {N_ROWS_SUMMARY} summary rows \
                 (max {N_NROWS_EXCEL_MAX} rows)."
            )));
        }
        Ok(())
    }

    /// Append one row for `label` with each pair placed in its registry column.
    ///
    /// Returns the zero-based row index.
    pub fn write_row(
        &mut self,
        registry: &mut ColumnRegistry,
        label: String,
        pairs: &[SpecPropertyPair],
    ) -> Result<usize> {
        self.check_row_capacity()?;
        if !self.if_header_written {
            self.write_header(registry);
        }

        let n_row = self.n_row_next;
        self.n_row_next += 1;
        self.cnt_rows_data += 1;
        self.grid.touch_row(n_row);
        self.grid
            .set_cell(n_row, N_COL_IDENTITY, EnumCellValue::String(label));

        for pair in pairs {
            let n_col = registry.resolve(&pair.name);
            let value = match &pair.value {
                EnumCellValue::None => EnumCellValue::String(String::new()),
                value => value.clone(),
            };
            self.grid.set_cell(n_row, n_col, value);
            self.cnt_cells_data += 1;
        }

        Ok(n_row)
    }

    fn write_header(&mut self, registry: &ColumnRegistry) {
        self.grid.set_cell(
            N_ROW_HEADER,
            N_COL_IDENTITY,
            EnumCellValue::String(self.label_identity_header.clone()),
        );
        for (n_col, c_name) in registry.iter() {
            self.grid
                .set_cell(N_ROW_HEADER, n_col, EnumCellValue::String(c_name.to_string()));
        }
        self.n_row_next = N_ROW_DATA_FIRST;
        self.if_header_written = true;
        debug!(cnt_columns = registry.len(), "header row written");
    }

    /// Add header cells for columns registered after the header was first written.
    ///
    /// Returns the number of cells added.
    pub fn complete_header(&mut self, registry: &ColumnRegistry) -> usize {
        if !self.if_header_written {
            return 0;
        }
        let mut n_added = 0;
        for (n_col, c_name) in registry.iter() {
            if self.grid.cell(N_ROW_HEADER, n_col).is_none() {
                self.grid
                    .set_cell(N_ROW_HEADER, n_col, EnumCellValue::String(c_name.to_string()));
                n_added += 1;
            }
        }
        n_added
    }

    /// Append SUM and AVERAGE formula rows over the data range of columns `1..=n_cols`.
    ///
    /// Does nothing when no data row exists. Returns the summary row indices.
    pub fn write_summaries(
        &mut self,
        n_cols: usize,
        label_sum: &str,
        label_average: &str,
    ) -> Option<(usize, usize)> {
        if self.cnt_rows_data == 0 {
            return None;
        }
        let n_row_first = N_ROW_DATA_FIRST;
        let n_row_last = N_ROW_DATA_FIRST + self.cnt_rows_data - 1;

        for n_col in 1..=n_cols {
            for n_row_edge in [n_row_first, n_row_last] {
                if self.grid.cell(n_row_edge, n_col).is_none() {
                    self.grid.set_cell(n_row_edge, n_col, EnumCellValue::None);
                }
            }
        }

        let n_row_sum = self.n_row_next;
        let n_row_average = n_row_sum + 1;
        self.n_row_next += N_ROWS_SUMMARY;

        self.grid.set_cell(
            n_row_sum,
            N_COL_IDENTITY,
            EnumCellValue::String(label_sum.to_string()),
        );
        self.grid.set_cell(
            n_row_average,
            N_COL_IDENTITY,
            EnumCellValue::String(label_average.to_string()),
        );
        for n_col in 1..=n_cols {
            let c_range = derive_column_range(n_row_first, n_row_last, n_col);
            self.grid
                .set_cell(n_row_sum, n_col, EnumCellValue::Formula(format!("SUM({c_range})")));
            self.grid.set_cell(
                n_row_average,
                n_col,
                EnumCellValue::Formula(format!("AVERAGE({c_range})")),
            );
        }

        Some((n_row_sum, n_row_average))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetRendering

/// How one grid is rendered into a worksheet.
#[derive(Debug, Clone, Default)]
pub struct SpecSheetRenderPlan {
    /// Row rendered with the header format.
    pub row_header: Option<usize>,
    /// Rows rendered with the summary format.
    pub rows_summary: Vec<usize>,
    /// Format for all other cells.
    pub fmt_data: SpecCellFormat,
    /// Header format.
    pub fmt_header: SpecCellFormat,
    /// Summary format.
    pub fmt_summary: SpecCellFormat,
    /// Non-finite number replacement.
    pub value_policy: SpecXlsxValuePolicy,
    /// Autofit policy; `None` leaves widths untouched.
    pub policy_autofit: Option<SpecAutofitCellsPolicy>,
}

/// Render `grid` into `worksheet` cell by cell, then apply autofit widths.
pub fn render_sheet(
    worksheet: &mut Worksheet,
    grid: &SheetGrid,
    plan: &SpecSheetRenderPlan,
) -> Result<()> {
    let fmt_data = derive_rust_xlsx_format(&plan.fmt_data);
    let fmt_header = derive_rust_xlsx_format(&plan.fmt_header);
    let fmt_summary = derive_rust_xlsx_format(&plan.fmt_summary);

    let n_cols = grid.n_cols();
    let mut l_width_by_col_header = vec![0usize; n_cols];
    let mut l_width_by_col_body = vec![0usize; n_cols];

    for (n_row, n_col, value) in grid.cells() {
        let if_is_header = plan.row_header == Some(n_row);
        let format = if if_is_header {
            &fmt_header
        } else if plan.rows_summary.contains(&n_row) {
            &fmt_summary
        } else {
            &fmt_data
        };

        let n_width = estimate_width_len(value, &plan.value_policy);
        if if_is_header {
            l_width_by_col_header[n_col] = usize::max(l_width_by_col_header[n_col], n_width);
        } else {
            l_width_by_col_body[n_col] = usize::max(l_width_by_col_body[n_col], n_width);
        }

        write_cell_with_format(worksheet, n_row, n_col, value, format, &plan.value_policy)?;
    }

    if let Some(policy_autofit) = &plan.policy_autofit {
        apply_autofit_widths(
            worksheet,
            policy_autofit,
            &l_width_by_col_header,
            &l_width_by_col_body,
        )?;
    }
    Ok(())
}

fn apply_autofit_widths(
    worksheet: &mut Worksheet,
    policy_autofit: &SpecAutofitCellsPolicy,
    l_width_by_col_header: &[usize],
    l_width_by_col_body: &[usize],
) -> Result<()> {
    if matches!(policy_autofit.rule_columns, EnumAutofitColumnsRule::None) {
        return Ok(());
    }

    let n_min = usize::max(1, policy_autofit.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy_autofit.width_cell_max));
    let n_pad = policy_autofit.width_cell_padding;

    for n_idx_col in 0..l_width_by_col_header.len() {
        let n_width_recorded = match policy_autofit.rule_columns {
            EnumAutofitColumnsRule::Header => l_width_by_col_header[n_idx_col],
            EnumAutofitColumnsRule::Body => l_width_by_col_body[n_idx_col],
            EnumAutofitColumnsRule::All | EnumAutofitColumnsRule::None => usize::max(
                l_width_by_col_header[n_idx_col],
                l_width_by_col_body[n_idx_col],
            ),
        };
        let n_width_final = usize::min(n_max, usize::max(n_min, n_width_recorded + n_pad));
        worksheet.set_column_width(cast_col_num(n_idx_col)?, n_width_final as f64)?;
    }
    Ok(())
}

/// Validate autofit bounds before any row is written.
pub fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<()> {
    if policy_autofit.width_cell_min == 0 {
        return Err(MetricsTableError::InvalidArgument(
            "policy_autofit.width_cell_min must be >= 1.".to_string(),
        ));
    }
    if policy_autofit.width_cell_max < policy_autofit.width_cell_min {
        return Err(MetricsTableError::InvalidArgument(
            "policy_autofit.width_cell_max must be >= policy_autofit.width_cell_min.".to_string(),
        ));
    }
    Ok(())
}

/// Estimate displayed width units for one cell value.
///
/// Formulas count as zero; their results are not known until Excel recalculates.
pub fn estimate_width_len(value: &EnumCellValue, value_policy: &SpecXlsxValuePolicy) -> usize {
    match value {
        EnumCellValue::None | EnumCellValue::Formula(_) => 0,
        EnumCellValue::String(s) => estimate_unicode_string_width(s),
        EnumCellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.len(),
        EnumCellValue::Number(n) => match convert_nan_inf_to_str(*n, value_policy) {
            Some(s) => s.len(),
            None => n.to_string().len(),
        },
    }
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
    value_policy: &SpecXlsxValuePolicy,
) -> Result<()> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) if val.is_empty() => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Number(val) => match convert_nan_inf_to_str(*val, value_policy) {
            Some(c_text) => {
                worksheet.write_string_with_format(n_row, n_col, c_text, format)?;
            }
            None => {
                worksheet.write_number_with_format(n_row, n_col, *val, format)?;
            }
        },
        EnumCellValue::Boolean(val) => {
            worksheet.write_boolean_with_format(n_row, n_col, *val, format)?;
        }
        EnumCellValue::Formula(val) => {
            worksheet.write_formula_with_format(n_row, n_col, val.as_str(), format)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }
    if let Some(align) = spec.align.as_deref().and_then(derive_format_align) {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    match align.trim().to_ascii_lowercase().as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Persistence

/// Serialize `workbook` and replace `path` with it.
///
/// Bytes go to a sibling `.tmp` file first, which is renamed over `path`;
/// the temp file is removed when any step after its creation fails.
pub fn save_workbook(workbook: &mut Workbook, path: &Path) -> Result<()> {
    let v_bytes = workbook.save_to_buffer()?;

    let mut c_name_tmp = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    c_name_tmp.push(".tmp");
    let path_tmp = path.with_file_name(c_name_tmp);

    let res_write = write_file_synced(&path_tmp, &v_bytes).and_then(|()| {
        fs::rename(&path_tmp, path).map_err(|source| MetricsTableError::Io {
            path: path.to_path_buf(),
            source,
        })
    });
    if res_write.is_err() {
        let _ = fs::remove_file(&path_tmp);
    }
    res_write
}

fn write_file_synced(path: &Path, v_bytes: &[u8]) -> Result<()> {
    let map_io = |source| MetricsTableError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(map_io)?;
    file.write_all(v_bytes).map_err(map_io)?;
    file.sync_all().map_err(map_io)?;
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
