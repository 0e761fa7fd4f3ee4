mod common;

use calamine::{Data, Reader, open_workbook_auto};
use common::{cell, read_part};
use sheetmove_core::convert::SHEET_NAME;
use sheetmove_core::{Role, ValidationError, convert_csv};
use std::fs;

#[test]
fn test_convert_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("parts.csv");
    let dest = dir.path().join("parts.xlsx");
    fs::write(
        &source,
        "part,qty,price,active\nbolt,3,0.25,true\nnut,12,0.1,False\n\"washer, flat\",,1,TRUE\n",
    )?;

    let rows = convert_csv(&source, &dest)?;
    assert_eq!(rows, 3);

    let mut workbook = open_workbook_auto(&dest)?;
    assert_eq!(workbook.sheet_names(), vec![SHEET_NAME.to_string()]);
    let range = workbook.worksheet_range(SHEET_NAME)?;
    assert_eq!(range.get_size(), (4, 4));

    assert_eq!(cell(&dest, SHEET_NAME, "A1")?, Data::String("part".into()));
    assert_eq!(cell(&dest, SHEET_NAME, "D1")?, Data::String("active".into()));
    assert_eq!(cell(&dest, SHEET_NAME, "A2")?, Data::String("bolt".into()));
    assert_eq!(cell(&dest, SHEET_NAME, "B2")?, Data::Float(3.0));
    assert_eq!(cell(&dest, SHEET_NAME, "C3")?, Data::Float(0.1));
    assert_eq!(cell(&dest, SHEET_NAME, "D3")?, Data::Bool(false));
    assert_eq!(
        cell(&dest, SHEET_NAME, "A4")?,
        Data::String("washer, flat".into())
    );
    assert_eq!(cell(&dest, SHEET_NAME, "B4")?, Data::Empty);
    Ok(())
}

#[test]
fn test_header_row_is_formatted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("in.csv");
    let dest = dir.path().join("out.xlsx");
    fs::write(&source, "a,b\n1,2\n")?;

    convert_csv(&source, &dest)?;

    let styles = read_part(&dest, "xl/styles.xml")?;
    assert!(styles.contains("<b/>"), "{styles}");
    assert!(styles.contains(r#"horizontal="center""#), "{styles}");
    Ok(())
}

#[test]
fn test_existing_destination_is_replaced() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("in.csv");
    let dest = dir.path().join("out.xlsx");
    fs::write(&dest, "not a workbook")?;
    fs::write(&source, "x\n1\n")?;

    convert_csv(&source, &dest)?;

    assert_eq!(cell(&dest, SHEET_NAME, "A2")?, Data::Float(1.0));
    Ok(())
}

#[test]
fn test_missing_source_creates_no_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("missing.csv");
    let dest = dir.path().join("out.xlsx");

    let err = convert_csv(&source, &dest).unwrap_err();
    let err = err.downcast::<ValidationError>().map_err(|e| anyhow::anyhow!("{e:#}"))?;
    assert!(matches!(err, ValidationError::FileNotFound { role: Role::Source, .. }));
    assert!(!dest.exists());
    Ok(())
}

#[test]
fn test_malformed_csv_leaves_no_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("bad.csv");
    let dest = dir.path().join("out.xlsx");
    fs::write(&source, "a,b\n1,2,3\n")?;

    let err = convert_csv(&source, &dest).unwrap_err();
    assert!(format!("{err:#}").contains("Expected 2 fields in line 2, saw 3"));
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}
