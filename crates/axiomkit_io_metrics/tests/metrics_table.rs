use std::io::{Cursor, Write};
use std::path::Path;

use axiomkit_io_metrics::{
    EnumCellValue as V, MetricsTable, MetricsTableError, SpecMetricsTableOptions,
    SpecSheetSnapshot, read_workbook_file,
};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn read_sheets(path: &Path) -> Vec<SpecSheetSnapshot> {
    read_workbook_file(path).expect("read back workbook")
}

fn text(s: &str) -> V {
    V::String(s.to_string())
}

/// Minimal one-sheet workbook whose sheet part is `c_xml_sheet_data`.
fn write_raw_workbook(path: &Path, c_xml_sheet_data: &str) {
    let l_parts = [
        (
            "xl/workbook.xml",
            r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Old" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!("<worksheet><sheetData>{c_xml_sheet_data}</sheetData></worksheet>"),
        ),
    ];
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (c_name, c_xml) in l_parts {
        zip.start_file(c_name, SimpleFileOptions::default())
            .expect("start part");
        zip.write_all(c_xml.as_bytes()).expect("write part");
    }
    let cursor = zip.finish().expect("finish zip");
    std::fs::write(path, cursor.into_inner()).expect("write workbook");
}

#[test]
fn test_flush_at_maximum_then_finish_writes_four_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open");
    table.record("obj1", "p1", "v1").expect("record");
    table.record("obj1", "p2", 2.0f64).expect("record");
    assert_eq!(table.n_rows_data(), 1);
    let report = table.finish().expect("finish");
    assert_eq!(report.cnt_rows_data, 1);

    let l_sheets = read_sheets(&path);
    assert_eq!(l_sheets.len(), 1);
    let grid = &l_sheets[0].grid;
    assert_eq!(grid.n_rows(), 4);
    assert_eq!(grid.row_values(0, 3), vec![V::None, text("p1"), text("p2")]);
    assert_eq!(
        grid.row_values(1, 3),
        vec![text("obj1"), text("v1"), V::Number(2.0)]
    );
    assert_eq!(
        grid.row_values(2, 3),
        vec![
            text("SUM"),
            V::Formula("SUM(B2:B2)".into()),
            V::Formula("SUM(C2:C2)".into())
        ]
    );
    assert_eq!(
        grid.row_values(3, 3),
        vec![
            text("AVERAGE"),
            V::Formula("AVERAGE(B2:B2)".into()),
            V::Formula("AVERAGE(C2:C2)".into())
        ]
    );
}

#[test]
fn test_absent_value_is_flushed_by_finish_as_blank_cell() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 5, true).expect("open");
    table.record("obj1", "p1", None::<f64>).expect("record");
    assert_eq!(table.n_rows_data(), 0);
    let report = table.finish().expect("finish");
    assert_eq!(report.cnt_flushes_drain, 1);

    let grid = &read_sheets(&path)[0].grid;
    assert_eq!(grid.n_rows(), 4);
    assert_eq!(grid.cell(0, 1), Some(&text("p1")));
    assert_eq!(grid.cell(1, 0), Some(&text("obj1")));
    assert_eq!(grid.cell(1, 1), None);
    assert_eq!(grid.cell(2, 1), Some(&V::Formula("SUM(B2:B2)".into())));
    assert_eq!(grid.cell(3, 1), Some(&V::Formula("AVERAGE(B2:B2)".into())));
}

#[test]
fn test_interleaved_identities_stay_buffered_until_finish() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 5, true).expect("open");
    table.record("b", "p1", 1i32).expect("record");
    table.record("a", "p1", 3i32).expect("record");
    assert_eq!(table.n_rows_data(), 0);
    assert!(table.sheet().is_empty());
    table.finish().expect("finish");

    let grid = &read_sheets(&path)[0].grid;
    assert_eq!(grid.cell(1, 0), Some(&text("b")));
    assert_eq!(grid.cell(2, 0), Some(&text("a")));
    assert_eq!(grid.cell(3, 1), Some(&V::Formula("SUM(B2:B3)".into())));
}

#[test]
fn test_header_lists_every_column_seen_after_first_flush() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 1, true).expect("open");
    table.record("x", "p1", 1i32).expect("record");
    table.record("y", "p2", 2i32).expect("record");
    table.record("x", "p3", 3i32).expect("record");
    let report = table.finish().expect("finish");
    assert_eq!(report.cnt_columns, 3);
    assert_eq!(report.cnt_rows_data, 3);

    let grid = &read_sheets(&path)[0].grid;
    assert_eq!(
        grid.row_values(0, 4),
        vec![V::None, text("p1"), text("p2"), text("p3")]
    );
    assert_eq!(grid.cell(1, 0), Some(&text("x")));
    assert_eq!(grid.cell(3, 0), Some(&text("x")));
    assert_eq!(grid.cell(3, 3), Some(&V::Number(3.0)));
    assert_eq!(grid.cell(4, 3), Some(&V::Formula("SUM(D2:D4)".into())));
}

#[test]
fn test_every_recorded_pair_lands_in_one_cell() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<u32>::open(&path, 3, true).expect("open");
    let mut n_records = 0u64;
    for n_id in 0..10u32 {
        for n_prop in 0..=(n_id % 4) {
            table
                .record(n_id, &format!("p{n_prop}"), f64::from(n_id * 10 + n_prop))
                .expect("record");
            n_records += 1;
        }
    }
    let report = table.finish().expect("finish");
    assert_eq!(report.cnt_cells_data, n_records);

    let grid = &read_sheets(&path)[0].grid;
    let n_rows_data = report.cnt_rows_data as usize;
    let n_cells_numeric = (1..=n_rows_data)
        .flat_map(|n_row| grid.row_values(n_row, 5).into_iter().skip(1))
        .filter(|value| matches!(value, V::Number(_)))
        .count();
    assert_eq!(n_cells_numeric as u64, n_records);
}

#[test]
fn test_preserve_existing_appends_new_last_sheet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open run 1");
    table.record("obj1", "p1", 1.5f64).expect("record");
    table.finish().expect("finish run 1");
    let l_sheets_run1 = read_sheets(&path);

    let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open run 2");
    table.record("obj2", "q1", "x").expect("record");
    let report = table.finish().expect("finish run 2");
    assert_eq!(report.cnt_sheets_preserved, 1);
    assert_eq!(report.sheet_name, "Sheet2");

    let l_sheets = read_sheets(&path);
    assert_eq!(l_sheets.len(), 2);
    assert_eq!(l_sheets[0], l_sheets_run1[0]);
    assert_eq!(l_sheets[1].name, "Sheet2");
    assert_eq!(l_sheets[1].grid.cell(0, 1), Some(&text("q1")));
    assert_eq!(l_sheets[1].grid.cell(1, 0), Some(&text("obj2")));
}

#[test]
fn test_without_preserve_existing_document_is_replaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    for c_id in ["first", "second"] {
        let mut table = MetricsTable::<&str>::open(&path, 2, false).expect("open");
        table.record(c_id, "p1", 1i32).expect("record");
        table.finish().expect("finish");
    }

    let l_sheets = read_sheets(&path);
    assert_eq!(l_sheets.len(), 1);
    assert_eq!(l_sheets[0].grid.cell(1, 0), Some(&text("second")));
}

#[test]
fn test_malformed_existing_file_falls_back_to_fresh_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");
    std::fs::write(&path, b"this is not a workbook").expect("write garbage");

    let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open");
    table.record("obj1", "p1", 1i32).expect("record");
    let report = table.finish().expect("finish");
    assert_eq!(report.cnt_sheets_preserved, 0);
    assert_eq!(report.warnings.len(), 1);

    let l_sheets = read_sheets(&path);
    assert_eq!(l_sheets.len(), 1);
    assert_eq!(l_sheets[0].name, "Sheet1");
}

#[test]
fn test_custom_sheet_name_is_made_unique_against_preserved_sheets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");
    let options = SpecMetricsTableOptions {
        n_properties_max: 4,
        sheet_name: Some("Run:1".to_string()),
        label_identity_header: "object".to_string(),
        ..Default::default()
    };

    for _ in 0..2 {
        let mut table =
            MetricsTable::<&str>::open_with_options(&path, options.clone()).expect("open");
        table.record("obj1", "p1", 1i32).expect("record");
        table.finish().expect("finish");
    }

    let l_sheets = read_sheets(&path);
    let l_names: Vec<&str> = l_sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(l_names, vec!["Run_1", "Run_1__2"]);
    assert_eq!(l_sheets[1].grid.cell(0, 0), Some(&text("object")));
}

#[test]
fn test_finish_without_records_writes_empty_sheet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let table = MetricsTable::<String>::open(&path, 2, true).expect("open");
    let report = table.finish().expect("finish");
    assert_eq!(report.cnt_rows_data, 0);

    let l_sheets = read_sheets(&path);
    assert_eq!(l_sheets.len(), 1);
    assert!(l_sheets[0].grid.is_empty());
}

#[test]
fn test_non_finite_numbers_are_written_as_policy_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 3, true).expect("open");
    table.record("obj1", "nan", f64::NAN).expect("record");
    table.record("obj1", "inf", f64::INFINITY).expect("record");
    table.record("obj1", "ok", 0.25f64).expect("record");
    table.finish().expect("finish");

    let grid = &read_sheets(&path)[0].grid;
    assert_eq!(
        grid.row_values(1, 4),
        vec![text("obj1"), text("NaN"), text("Inf"), V::Number(0.25)]
    );
}

#[test]
fn test_raw_workbook_is_preserved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");
    write_raw_workbook(&path, r#"<row r="1"><c r="B1"><v>7</v></c></row>"#);

    let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open");
    table.record("obj1", "p1", 1i32).expect("record");
    let report = table.finish().expect("finish");
    assert_eq!(report.cnt_sheets_preserved, 1);
    assert!(report.warnings.is_empty());

    let l_sheets = read_sheets(&path);
    assert_eq!(l_sheets[0].name, "Old");
    assert_eq!(l_sheets[0].grid.cell(0, 1), Some(&V::Number(7.0)));
    assert_eq!(l_sheets[1].name, "Sheet2");
}

#[test]
fn test_unusable_cell_references_fall_back_to_fresh_document() {
    for c_xml_row in [
        r#"<row r="1"><c r="AAAAAAAAAAAAAAAAAAAA1"><v>1</v></c></row>"#,
        r#"<row r="1"><c r="ZZZ1"><v>1</v></c></row>"#,
        r#"<row r="2000000"><c><v>1</v></c></row>"#,
    ] {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("metrics.xlsx");
        write_raw_workbook(&path, c_xml_row);

        let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open");
        table.record("obj1", "p1", 1i32).expect("record");
        let report = table.finish().expect("finish");
        assert_eq!(report.cnt_sheets_preserved, 0, "{c_xml_row}");
        assert_eq!(report.warnings.len(), 1, "{c_xml_row}");

        let l_sheets = read_sheets(&path);
        assert_eq!(l_sheets.len(), 1);
        assert_eq!(l_sheets[0].name, "Sheet1");
        assert_eq!(l_sheets[0].grid.cell(1, 0), Some(&text("obj1")));
    }
}

#[test]
fn test_finish_reports_io_error_when_destination_directory_is_gone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path_dir_out = dir.path().join("out");
    std::fs::create_dir(&path_dir_out).expect("create dir");
    let path = path_dir_out.join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open");
    table.record("obj1", "p1", 1i32).expect("record");
    std::fs::remove_dir_all(&path_dir_out).expect("remove dir");

    let err = table.finish().expect_err("io failure");
    assert!(matches!(err, MetricsTableError::Io { .. }));
    assert!(!path_dir_out.join("metrics.xlsx.tmp").exists());
}

#[test]
fn test_finish_removes_temp_file_when_replace_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metrics.xlsx");

    let mut table = MetricsTable::<&str>::open(&path, 2, true).expect("open");
    table.record("obj1", "p1", 1i32).expect("record");
    std::fs::remove_file(&path).expect("remove destination");
    std::fs::create_dir(&path).expect("directory at destination");
    std::fs::write(path.join("keep.txt"), b"keep").expect("write marker");

    let err = table.finish().expect_err("rename failure");
    match err {
        MetricsTableError::Io { path: path_err, .. } => assert_eq!(path_err, path),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("metrics.xlsx.tmp").exists());
    assert!(path.join("keep.txt").exists());
}
