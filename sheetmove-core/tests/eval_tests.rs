use rust_xlsxwriter::{Formula, Workbook};
use sheetmove_core::{EvalRequest, Role, ValidationError, evaluate_range};
use std::fs;
use std::path::{Path, PathBuf};

/// `Report` computes from `Inputs`. Every formula is saved with a stale
/// cached result of 0, so only a real evaluation gets the numbers right.
///
/// |   | A     | B                     |
/// |---|-------|-----------------------|
/// | 1 | item  | value                 |
/// | 2 | base  | =Inputs!B1*2          |
/// | 3 | ratio | =Inputs!B1/Inputs!B2  |
/// | 4 | flag  | =B2>B3                |
/// | 5 |       | =1/0                  |
/// | 6 | after | =SUM(B2:B3)           |
fn create_source(path: &Path) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();

    let report = workbook.add_worksheet();
    report.set_name("Report")?;
    report.write_string(0, 0, "item")?;
    report.write_string(0, 1, "value")?;
    report.write_string(1, 0, "base")?;
    report.write_formula(1, 1, Formula::new("=Inputs!B1*2"))?;
    report.write_string(2, 0, "ratio")?;
    report.write_formula(2, 1, Formula::new("=Inputs!B1/Inputs!B2"))?;
    report.write_string(3, 0, "flag")?;
    report.write_formula(3, 1, Formula::new("=B2>B3"))?;
    report.write_formula(4, 1, Formula::new("=1/0"))?;
    report.write_string(5, 0, "after")?;
    report.write_formula(5, 1, Formula::new("=SUM(B2:B3)"))?;

    let inputs = workbook.add_worksheet();
    inputs.set_name("Inputs")?;
    inputs.write_number(0, 1, 10)?;
    inputs.write_number(1, 1, 4)?;

    workbook.save(path)?;
    Ok(())
}

struct Fixture {
    dir: tempfile::TempDir,
    source: PathBuf,
    dest: PathBuf,
}

fn fixture() -> anyhow::Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("model.xlsx");
    let dest = dir.path().join("out.csv");
    create_source(&source)?;
    Ok(Fixture { dir, source, dest })
}

fn request(f: &Fixture, sheet: &str, range: &str, flag: &str) -> EvalRequest {
    EvalRequest {
        source_path: f.source.clone(),
        sheet: sheet.to_string(),
        range: range.to_string(),
        dest_path: f.dest.clone(),
        truncate_flag: flag.to_string(),
    }
}

fn read_csv(path: &Path) -> anyhow::Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn validation_error(err: anyhow::Error) -> ValidationError {
    match err.downcast::<ValidationError>() {
        Ok(v) => v,
        Err(other) => panic!("expected a validation error, got: {other:#}"),
    }
}

#[test]
fn test_evaluate_without_truncation() -> anyhow::Result<()> {
    let f = fixture()?;

    let written = evaluate_range(&request(&f, "Report", "A1:B6", "false"))?;
    assert_eq!(written, 6);

    let rows = read_csv(&f.dest)?;
    assert_eq!(
        rows,
        vec![
            vec!["item", "value"],
            vec!["base", "20"],
            vec!["ratio", "2.5"],
            vec!["flag", "TRUE"],
            vec!["", "#DIV/0!"],
            vec!["after", "22.5"],
        ]
    );

    let raw = fs::read_to_string(&f.dest)?;
    assert!(raw.starts_with("item,value\r\nbase,20\r\n"), "{raw:?}");
    Ok(())
}

#[test]
fn test_truncation_stops_at_first_empty_first_column() -> anyhow::Result<()> {
    let f = fixture()?;

    let written = evaluate_range(&request(&f, "Report", "A1:B6", "TRUE"))?;
    assert_eq!(written, 4);

    let rows = read_csv(&f.dest)?;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3], vec!["flag", "TRUE"]);
    Ok(())
}

#[test]
fn test_range_past_the_data_keeps_blank_rows() -> anyhow::Result<()> {
    let f = fixture()?;

    let written = evaluate_range(&request(&f, "Inputs", "B1:B4", "False"))?;
    assert_eq!(written, 4);
    assert_eq!(fs::read_to_string(&f.dest)?, "10\r\n4\r\n\"\"\r\n\"\"\r\n");
    Ok(())
}

#[test]
fn test_invalid_flag() -> anyhow::Result<()> {
    let f = fixture()?;

    let err = validation_error(evaluate_range(&request(&f, "Report", "A1:B2", "yes")).unwrap_err());
    assert!(matches!(err, ValidationError::InvalidFlag(ref flag) if flag == "yes"));
    assert!(!f.dest.exists());
    Ok(())
}

#[test]
fn test_missing_source_is_reported_before_flag() -> anyhow::Result<()> {
    let f = fixture()?;
    let mut req = request(&f, "Report", "A1:B2", "maybe");
    req.source_path = f.dir.path().join("absent.xlsx");

    let err = validation_error(evaluate_range(&req).unwrap_err());
    assert!(matches!(err, ValidationError::FileNotFound { role: Role::Source, .. }));
    assert!(!f.dest.exists());
    Ok(())
}

#[test]
fn test_missing_sheet_writes_nothing() -> anyhow::Result<()> {
    let f = fixture()?;

    let req = request(&f, "Summary", "A1:B2", "true");
    let err = validation_error(evaluate_range(&req).unwrap_err());
    assert!(matches!(err, ValidationError::SheetNotFound { ref sheet, .. } if sheet == "Summary"));
    assert!(!f.dest.exists());
    Ok(())
}

#[test]
fn test_existing_output_is_replaced() -> anyhow::Result<()> {
    let f = fixture()?;
    fs::write(&f.dest, "old,contents\r\nmore\r\n")?;

    evaluate_range(&request(&f, "Report", "A2:B2", "false"))?;

    assert_eq!(fs::read_to_string(&f.dest)?, "base,20\r\n");
    Ok(())
}

#[test]
fn test_defined_names_are_evaluated() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("named.xlsx");
    let dest = dir.path().join("named.csv");

    let mut workbook = Workbook::new();
    let calc = workbook.add_worksheet();
    calc.set_name("Calc")?;
    calc.write_number(0, 0, 10)?;
    calc.write_formula(0, 1, Formula::new("=Rate*2"))?;
    workbook.define_name("Rate", "=Calc!$A$1")?;
    workbook.save(&source)?;

    let req = EvalRequest {
        source_path: source,
        sheet: "Calc".to_string(),
        range: "A1:B1".to_string(),
        dest_path: dest.clone(),
        truncate_flag: "false".to_string(),
    };
    evaluate_range(&req)?;

    assert_eq!(fs::read_to_string(&dest)?, "10,20\r\n");
    Ok(())
}
