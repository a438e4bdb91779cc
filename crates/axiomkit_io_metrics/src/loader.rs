//! Reader for existing `.xlsx` workbooks.
//!
//! Only cell content is recovered (numbers, text, booleans, formulas); styles,
//! widths and other sheet parts are not carried over.
//!
//! Shared formulas are only kept on their anchor cell. Follower cells
//! (`<f t="shared" si=".."/>` without text) keep their cached value as a
//! constant, so a preserved sheet written by Excel loses those formulas.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use quick_xml::Reader as XmlReader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::conf::{N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
use crate::sheet::{SheetGrid, SpecSheetSnapshot};
use crate::spec::EnumCellValue;
use crate::util::parse_cell_ref;

const C_PATH_WORKBOOK: &str = "xl/workbook.xml";
const C_PATH_WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const C_PATH_SHARED_STRINGS: &str = "xl/sharedStrings.xml";

/// Why an existing workbook could not be read.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be read at all.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not a zip container, or a damaged one.
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),

    /// Malformed workbook XML.
    #[error("xml error in {part}: {message}")]
    Xml {
        /// Package part being parsed.
        part: String,
        /// Parser message.
        message: String,
    },

    /// A required package part is missing.
    #[error("missing workbook part: {0}")]
    MissingPart(String),
}

/// Read every worksheet of the workbook at `path`, in tab order.
pub fn read_workbook_file(path: &Path) -> Result<Vec<SpecSheetSnapshot>, LoadError> {
    let v_bytes = std::fs::read(path)?;
    read_workbook_bytes(&v_bytes)
}

/// Read every worksheet of an in-memory workbook, in tab order.
pub fn read_workbook_bytes(v_bytes: &[u8]) -> Result<Vec<SpecSheetSnapshot>, LoadError> {
    let mut zip = ZipArchive::new(Cursor::new(v_bytes))?;

    let c_xml_workbook = read_part(&mut zip, C_PATH_WORKBOOK)?
        .ok_or_else(|| LoadError::MissingPart(C_PATH_WORKBOOK.to_string()))?;
    let c_xml_rels = read_part(&mut zip, C_PATH_WORKBOOK_RELS)?
        .ok_or_else(|| LoadError::MissingPart(C_PATH_WORKBOOK_RELS.to_string()))?;
    let l_shared_strings = match read_part(&mut zip, C_PATH_SHARED_STRINGS)? {
        Some(c_xml) => parse_shared_strings(&c_xml)?,
        None => vec![],
    };

    let l_sheet_refs = parse_workbook_sheets(&c_xml_workbook)?;
    let dict_targets = parse_relationship_targets(&c_xml_rels)?;

    let mut l_sheets = Vec::with_capacity(l_sheet_refs.len());
    for (c_name, c_rid) in l_sheet_refs {
        let c_target = dict_targets
            .get(&c_rid)
            .ok_or_else(|| LoadError::MissingPart(format!("relationship {c_rid}")))?;
        let c_path_sheet = derive_part_path(c_target);
        let c_xml_sheet = read_part(&mut zip, &c_path_sheet)?
            .ok_or_else(|| LoadError::MissingPart(c_path_sheet.clone()))?;
        let grid = parse_sheet_cells(&c_xml_sheet, &l_shared_strings, &c_path_sheet)?;
        l_sheets.push(SpecSheetSnapshot {
            name: c_name,
            grid,
        });
    }

    Ok(l_sheets)
}

fn read_part<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, LoadError> {
    let mut file = match zip.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut c_xml = String::new();
    file.read_to_string(&mut c_xml)?;
    Ok(Some(c_xml))
}

/// Relationship targets are relative to `xl/` unless absolute.
fn derive_part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(c_abs) => c_abs.to_string(),
        None => format!("xl/{target}"),
    }
}

fn xml_error(part: &str, err: impl std::fmt::Display) -> LoadError {
    LoadError::Xml {
        part: part.to_string(),
        message: err.to_string(),
    }
}

fn attr_value(e: &BytesStart<'_>, key: &[u8], part: &str) -> Result<Option<String>, LoadError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(part, err))?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|err| xml_error(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// `(sheet name, relationship id)` in tab order.
fn parse_workbook_sheets(xml: &str) -> Result<Vec<(String, String)>, LoadError> {
    let mut reader = XmlReader::from_str(xml);
    let mut l_sheets = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let c_name = attr_value(&e, b"name", C_PATH_WORKBOOK)?;
                let c_rid = attr_value(&e, b"r:id", C_PATH_WORKBOOK)?;
                if let (Some(c_name), Some(c_rid)) = (c_name, c_rid) {
                    l_sheets.push((c_name, c_rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(C_PATH_WORKBOOK, err)),
            _ => {}
        }
    }
    Ok(l_sheets)
}

fn parse_relationship_targets(xml: &str) -> Result<BTreeMap<String, String>, LoadError> {
    let mut reader = XmlReader::from_str(xml);
    let mut dict_targets = BTreeMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let c_id = attr_value(&e, b"Id", C_PATH_WORKBOOK_RELS)?;
                let c_target = attr_value(&e, b"Target", C_PATH_WORKBOOK_RELS)?;
                if let (Some(c_id), Some(c_target)) = (c_id, c_target) {
                    dict_targets.insert(c_id, c_target);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(C_PATH_WORKBOOK_RELS, err)),
            _ => {}
        }
    }
    Ok(dict_targets)
}

/// Shared string table; rich-text runs are concatenated, phonetic runs skipped.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>, LoadError> {
    let mut reader = XmlReader::from_str(xml);
    let mut l_strings = Vec::new();
    let mut c_current = String::new();
    let mut if_in_text = false;
    let mut if_in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => c_current.clear(),
                b"rPh" => if_in_phonetic = true,
                b"t" => if_in_text = !if_in_phonetic,
                _ => {}
            },
            Ok(Event::Text(t)) if if_in_text => {
                let c_text = t.unescape().map_err(|err| xml_error(C_PATH_SHARED_STRINGS, err))?;
                c_current.push_str(&c_text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => l_strings.push(std::mem::take(&mut c_current)),
                b"rPh" => if_in_phonetic = false,
                b"t" => if_in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(C_PATH_SHARED_STRINGS, err)),
            _ => {}
        }
    }
    Ok(l_strings)
}

#[derive(Debug, Default)]
struct SpecCellDraft {
    row_idx: usize,
    col_idx: usize,
    c_type: String,
    c_value: String,
    c_formula: String,
    c_inline: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumTextTarget {
    None,
    Value,
    Formula,
    Inline,
}

fn parse_sheet_cells(
    xml: &str,
    shared_strings: &[String],
    part: &str,
) -> Result<SheetGrid, LoadError> {
    let mut reader = XmlReader::from_str(xml);
    let mut grid = SheetGrid::new();
    let mut draft: Option<SpecCellDraft> = None;
    let mut text_target = EnumTextTarget::None;
    let mut n_row_current = 0usize;
    let mut n_col_next = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    (n_row_current, n_col_next) = derive_row_position(&e, n_row_current, part)?;
                }
                b"c" => {
                    let cell = begin_cell(&e, n_row_current, n_col_next, part)?;
                    n_col_next = cell.col_idx + 1;
                    draft = Some(cell);
                }
                b"v" => text_target = EnumTextTarget::Value,
                b"f" => text_target = EnumTextTarget::Formula,
                b"t" if draft.is_some() => text_target = EnumTextTarget::Inline,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => {
                    (n_row_current, n_col_next) = derive_row_position(&e, n_row_current, part)?;
                    n_row_current += 1;
                }
                b"c" => {
                    let cell = begin_cell(&e, n_row_current, n_col_next, part)?;
                    n_col_next = cell.col_idx + 1;
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(cell) = draft.as_mut() {
                    let c_text = t.unescape().map_err(|err| xml_error(part, err))?;
                    match text_target {
                        EnumTextTarget::Value => cell.c_value.push_str(&c_text),
                        EnumTextTarget::Formula => cell.c_formula.push_str(&c_text),
                        EnumTextTarget::Inline => cell.c_inline.push_str(&c_text),
                        EnumTextTarget::None => {}
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"f" | b"t" => text_target = EnumTextTarget::None,
                b"c" => {
                    if let Some(cell) = draft.take() {
                        if let Some(value) = finish_cell(&cell, shared_strings) {
                            grid.set_cell(cell.row_idx, cell.col_idx, value);
                        }
                    }
                }
                b"row" => n_row_current += 1,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(part, err)),
            _ => {}
        }
    }
    Ok(grid)
}

/// `(row index, next column)` for a `<row>` element; rows without `r` follow the previous one.
fn derive_row_position(
    e: &BytesStart<'_>,
    n_row_current: usize,
    part: &str,
) -> Result<(usize, usize), LoadError> {
    let n_row = match attr_value(e, b"r", part)? {
        Some(c_r) => c_r
            .parse::<usize>()
            .ok()
            .and_then(|n_r| n_r.checked_sub(1))
            .filter(|n_r| *n_r < N_NROWS_EXCEL_MAX)
            .ok_or_else(|| xml_error(part, format!("invalid row number {c_r:?}")))?,
        None => n_row_current,
    };
    Ok((n_row, 0))
}

fn begin_cell(
    e: &BytesStart<'_>,
    n_row_current: usize,
    n_col_next: usize,
    part: &str,
) -> Result<SpecCellDraft, LoadError> {
    let (row_idx, col_idx) = match attr_value(e, b"r", part)? {
        Some(c_ref) => parse_cell_ref(&c_ref)
            .ok_or_else(|| xml_error(part, format!("invalid cell reference {c_ref:?}")))?,
        None => (n_row_current, n_col_next),
    };
    if row_idx >= N_NROWS_EXCEL_MAX || col_idx >= N_NCOLS_EXCEL_MAX {
        return Err(xml_error(
            part,
            format!("cell ({row_idx}, {col_idx}) lies outside the worksheet grid"),
        ));
    }
    Ok(SpecCellDraft {
        row_idx,
        col_idx,
        c_type: attr_value(e, b"t", part)?.unwrap_or_default(),
        ..Default::default()
    })
}

fn finish_cell(cell: &SpecCellDraft, shared_strings: &[String]) -> Option<EnumCellValue> {
    if !cell.c_formula.is_empty() {
        return Some(EnumCellValue::Formula(cell.c_formula.clone()));
    }
    match cell.c_type.as_str() {
        "s" => {
            let n_idx = cell.c_value.trim().parse::<usize>().ok()?;
            shared_strings
                .get(n_idx)
                .map(|s| EnumCellValue::String(s.clone()))
        }
        "inlineStr" => Some(EnumCellValue::String(cell.c_inline.clone())),
        "str" | "e" => Some(EnumCellValue::String(cell.c_value.clone())),
        "b" => Some(EnumCellValue::Boolean(cell.c_value.trim() == "1")),
        _ if cell.c_value.is_empty() => None,
        _ => match cell.c_value.trim().parse::<f64>() {
            Ok(n) => Some(EnumCellValue::Number(n)),
            Err(_) => Some(EnumCellValue::String(cell.c_value.clone())),
        },
    }
}
