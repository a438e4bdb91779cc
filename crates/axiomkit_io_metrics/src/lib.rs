//! `axiomkit_io_metrics` v1:
//! Buffered per-identity metrics table persisted as an XLSX workbook.
//!
//! Modules:
//! - `conf`     : constants and default presets
//! - `spec`     : value model, options, report and error type
//! - `registry` : property name to column index registry
//! - `buffer`   : bounded per-identity pair buffer
//! - `sheet`    : in-memory sheet grid
//! - `writer`   : row writer, summary rows and workbook rendering
//! - `loader`   : reader for existing workbooks
//! - `table`    : `MetricsTable` entry point (`open` / `record` / `finish`)
//! - `util`     : pure helper functions
pub mod buffer;
pub mod conf;
pub mod loader;
pub mod registry;
pub mod sheet;
pub mod spec;
pub mod table;
pub mod util;
pub mod writer;

pub use buffer::{EntryBuffer, SpecBufferedEntry};
pub use conf::{
    C_LABEL_AVERAGE, C_LABEL_SUM, N_LEN_EXCEL_SHEET_NAME_MAX, N_LEN_EXCEL_STRING_MAX,
    N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL, derive_default_metrics_formats,
    derive_default_metrics_table_options,
};
pub use loader::{LoadError, read_workbook_bytes, read_workbook_file};
pub use registry::ColumnRegistry;
pub use sheet::{SheetGrid, SpecSheetSnapshot};
pub use spec::{
    EnumAutofitColumnsRule, EnumCellValue, MetricsTableError, Result, SpecAutofitCellsPolicy,
    SpecCellFormat, SpecMetricsReport, SpecMetricsTableOptions, SpecPropertyPair,
    SpecXlsxValuePolicy,
};
pub use table::MetricsTable;
pub use util::{derive_cell_ref, derive_column_letters, parse_cell_ref, sanitize_sheet_name};
