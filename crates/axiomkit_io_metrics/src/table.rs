//! Metrics table: records `(identity, property, value)` triples, flushes
//! bounded per-identity buffers into rows, and persists the workbook at finish.
//!
//! Calling flow:
//! 1. [`MetricsTable::open`] validates arguments, creates the destination and
//!    optionally loads its existing sheets.
//! 2. [`MetricsTable::record`] buffers one pair; an identity reaching
//!    `n_properties_max` pairs is written as a row immediately.
//! 3. [`MetricsTable::finish`] drains the buffer, completes the header, appends
//!    SUM/AVERAGE rows and writes the whole workbook in one replace.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs::OpenOptions;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use tracing::{debug, info, warn};

use crate::buffer::{EntryBuffer, SpecBufferedEntry};
use crate::conf::{N_LEN_EXCEL_STRING_MAX, N_NCOLS_EXCEL_MAX, N_ROW_HEADER};
use crate::loader::read_workbook_bytes;
use crate::registry::ColumnRegistry;
use crate::sheet::{SheetGrid, SpecSheetSnapshot};
use crate::spec::{
    EnumCellValue, MetricsTableError, Result, SpecMetricsReport, SpecMetricsTableOptions,
    SpecPropertyPair,
};
use crate::util::{derive_unique_sheet_name, sanitize_sheet_name};
use crate::writer::{
    SpecSheetRenderPlan, TableWriter, render_sheet, save_workbook, validate_policy_autofit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumFlushTrigger {
    Threshold,
    Drain,
}

impl EnumFlushTrigger {
    fn as_str(self) -> &'static str {
        match self {
            EnumFlushTrigger::Threshold => "threshold",
            EnumFlushTrigger::Drain => "drain",
        }
    }
}

/// Single-writer metrics table bound to one destination workbook.
#[derive(Debug)]
pub struct MetricsTable<ID> {
    path_destination: PathBuf,
    options: SpecMetricsTableOptions,
    registry: ColumnRegistry,
    buffer: EntryBuffer<ID>,
    writer: TableWriter,
    l_sheets_preserved: Vec<SpecSheetSnapshot>,
    sheet_name: String,
    cnt_flushes_threshold: u64,
    cnt_flushes_drain: u64,
    l_warnings: Vec<String>,
}

impl<ID: Eq + Hash + Display> MetricsTable<ID> {
    /// Open a table with default options apart from the flush threshold and
    /// preserve flag.
    pub fn open(
        destination: impl AsRef<Path>,
        n_properties_max: usize,
        if_preserve_existing: bool,
    ) -> Result<Self> {
        let options = SpecMetricsTableOptions {
            n_properties_max,
            if_preserve_existing,
            ..Default::default()
        };
        Self::open_with_options(destination, options)
    }

    pub fn open_with_options(
        destination: impl AsRef<Path>,
        options: SpecMetricsTableOptions,
    ) -> Result<Self> {
        let path_destination = destination.as_ref().to_path_buf();
        if path_destination.as_os_str().is_empty() {
            return Err(MetricsTableError::InvalidArgument(
                "Destination path must not be empty.".to_string(),
            ));
        }
        let buffer = EntryBuffer::new(options.n_properties_max)?;
        validate_policy_autofit(&options.policy_autofit)?;

        let map_io = |source| MetricsTableError::Io {
            path: path_destination.clone(),
            source,
        };
        let if_existed = path_destination.try_exists().map_err(map_io)?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path_destination)
            .map_err(map_io)?;

        let mut l_warnings = Vec::new();
        let mut l_sheets_preserved = Vec::new();
        if options.if_preserve_existing && if_existed {
            let v_bytes = std::fs::read(&path_destination).map_err(map_io)?;
            match read_workbook_bytes(&v_bytes) {
                Ok(l_sheets) => l_sheets_preserved = l_sheets,
                Err(err) => {
                    warn!(
                        path = %path_destination.display(),
                        error = %err,
                        "existing workbook unreadable, starting a fresh document"
                    );
                    l_warnings.push(format!(
                        "Existing workbook {} was not loaded: {err}",
                        path_destination.display()
                    ));
                }
            }
        }

        let mut set_sheet_names = BTreeSet::new();
        for snapshot in l_sheets_preserved.iter_mut() {
            snapshot.name = derive_unique_sheet_name(&snapshot.name, &mut set_sheet_names);
        }
        let c_sheet_name = match &options.sheet_name {
            Some(c_name) => sanitize_sheet_name(c_name, "_"),
            None => format!("Sheet{}", l_sheets_preserved.len() + 1),
        };
        let sheet_name = derive_unique_sheet_name(&c_sheet_name, &mut set_sheet_names);

        info!(
            path = %path_destination.display(),
            sheet = %sheet_name,
            cnt_sheets_preserved = l_sheets_preserved.len(),
            n_properties_max = options.n_properties_max,
            "metrics table opened"
        );

        Ok(Self {
            writer: TableWriter::new(options.label_identity_header.clone()),
            path_destination,
            options,
            registry: ColumnRegistry::new(),
            buffer,
            l_sheets_preserved,
            sheet_name,
            cnt_flushes_threshold: 0,
            cnt_flushes_drain: 0,
            l_warnings,
        })
    }

    /// Buffer one property pair for `id`.
    ///
    /// The property's column is assigned on first sight. When the identity's
    /// buffer reaches `n_properties_max` pairs it is written as one row and
    /// evicted. A failed call leaves the table unchanged.
    pub fn record(
        &mut self,
        id: impl Into<Option<ID>>,
        name: &str,
        value: impl Into<EnumCellValue>,
    ) -> Result<()> {
        let Some(id) = id.into() else {
            return Err(MetricsTableError::InvalidArgument(
                "Identity must not be null.".to_string(),
            ));
        };
        if self.registry.lookup_by_name(name).is_none()
            && self.registry.next_index() >= N_NCOLS_EXCEL_MAX
        {
            return Err(MetricsTableError::ExcelLimit(format!(
                "property {name:?} would need column {} (max {N_NCOLS_EXCEL_MAX} columns).",
                self.registry.next_index() + 1
            )));
        }
        let value = value.into();
        check_text_length("property name", name)?;
        check_text_length("identity label", &id.to_string())?;
        if let EnumCellValue::String(c_text) = &value {
            check_text_length("value", c_text)?;
        }
        if self.buffer.is_at_threshold_after_append(&id) {
            self.writer.check_row_capacity()?;
        }

        self.registry.resolve(name);
        let pair = SpecPropertyPair {
            name: name.to_string(),
            value,
        };
        if let Some(entry) = self.buffer.append(id, pair) {
            self.flush_entry(entry, EnumFlushTrigger::Threshold)?;
        }
        Ok(())
    }

    fn flush_entry(&mut self, entry: SpecBufferedEntry<ID>, trigger: EnumFlushTrigger) -> Result<()> {
        let c_label = entry.id.to_string();
        let n_row = self
            .writer
            .write_row(&mut self.registry, c_label.clone(), &entry.pairs)?;
        match trigger {
            EnumFlushTrigger::Threshold => self.cnt_flushes_threshold += 1,
            EnumFlushTrigger::Drain => self.cnt_flushes_drain += 1,
        }
        debug!(
            id = %c_label,
            cnt_pairs = entry.pairs.len(),
            row = n_row,
            trigger = trigger.as_str(),
            "identity flushed"
        );
        Ok(())
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    /// Data rows written so far.
    pub fn n_rows_data(&self) -> usize {
        self.writer.n_rows_data()
    }

    /// Pairs currently buffered for `id`.
    pub fn n_buffered(&self, id: &ID) -> usize {
        self.buffer.n_buffered(id)
    }

    /// The sheet under construction (rows flushed so far).
    pub fn sheet(&self) -> &SheetGrid {
        self.writer.grid()
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn destination(&self) -> &Path {
        &self.path_destination
    }

    /// Drain every buffered identity, add summary rows and persist the workbook.
    pub fn finish(mut self) -> Result<SpecMetricsReport> {
        for entry in self.buffer.drain_all() {
            self.flush_entry(entry, EnumFlushTrigger::Drain)?;
        }

        let n_header_added = self.writer.complete_header(&self.registry);
        if n_header_added > 0 {
            debug!(cnt_cells = n_header_added, "header completed with late columns");
        }
        let rows_summary = self.writer.write_summaries(
            self.registry.len(),
            &self.options.label_sum,
            &self.options.label_average,
        );

        let mut report = SpecMetricsReport {
            sheet_name: self.sheet_name.clone(),
            cnt_rows_data: self.writer.n_rows_data() as u64,
            cnt_cells_data: self.writer.cnt_cells_data(),
            cnt_columns: self.registry.len() as u64,
            cnt_flushes_threshold: self.cnt_flushes_threshold,
            cnt_flushes_drain: self.cnt_flushes_drain,
            cnt_sheets_preserved: self.l_sheets_preserved.len() as u64,
            warnings: vec![],
        };
        for c_warning in &self.l_warnings {
            report.warn(c_warning);
        }

        let plan_preserved = SpecSheetRenderPlan {
            value_policy: self.options.value_policy.clone(),
            ..Default::default()
        };
        let plan_table = SpecSheetRenderPlan {
            row_header: self.writer.if_header_written().then_some(N_ROW_HEADER),
            rows_summary: rows_summary
                .map(|(n_row_sum, n_row_average)| vec![n_row_sum, n_row_average])
                .unwrap_or_default(),
            fmt_data: self.options.fmt_data.clone(),
            fmt_header: self.options.fmt_header.clone(),
            fmt_summary: self.options.fmt_summary.clone(),
            value_policy: self.options.value_policy.clone(),
            policy_autofit: Some(self.options.policy_autofit.clone()),
        };

        let mut workbook = Workbook::new();
        for snapshot in &self.l_sheets_preserved {
            let worksheet = workbook.add_worksheet().set_name(&snapshot.name)?;
            render_sheet(worksheet, &snapshot.grid, &plan_preserved)?;
        }
        let grid = self.writer.into_grid();
        let worksheet = workbook.add_worksheet().set_name(&self.sheet_name)?;
        render_sheet(worksheet, &grid, &plan_table)?;

        save_workbook(&mut workbook, &self.path_destination)?;

        info!(
            path = %self.path_destination.display(),
            sheet = %report.sheet_name,
            cnt_rows_data = report.cnt_rows_data,
            cnt_columns = report.cnt_columns,
            "metrics table persisted"
        );
        Ok(report)
    }
}

fn check_text_length(c_kind: &str, c_text: &str) -> Result<()> {
    let n_len = c_text.chars().count();
    if n_len > N_LEN_EXCEL_STRING_MAX {
        return Err(MetricsTableError::ExcelLimit(format!(
            "{c_kind} has {n_len} characters (max {N_LEN_EXCEL_STRING_MAX} per cell)."
        )));
    }
    Ok(())
}
