//! Formula evaluation of a sheet range into CSV

mod formualizer_engine;

pub use formualizer_engine::FormualizerEngine;

use crate::address::{CellAddress, CellRange};
use crate::error::{Role, ValidationError, parse_flag};
use crate::reader::{CellValue, ReadMode, WorkbookReader};
use crate::writer::write_atomically;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Computes cell values from the workbook's formulas rather than its cached results
pub trait FormulaEngine {
    fn evaluate(&mut self, sheet: &str, cell: CellAddress) -> Result<CellValue>;
}

/// Everything `eval2csv` needs, straight from the command line
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub source_path: PathBuf,
    pub sheet: String,
    pub range: String,
    pub dest_path: PathBuf,
    /// Raw `true`/`false` text, validated after the source path
    pub truncate_flag: String,
}

/// Evaluate every cell of `range` and write one CSV record per row.
///
/// Returns the number of records written.
pub fn evaluate_range(request: &EvalRequest) -> Result<usize> {
    if !request.source_path.exists() {
        return Err(ValidationError::file_not_found(Role::Source, &request.source_path).into());
    }
    let truncate = parse_flag(&request.truncate_flag)?;

    let reader = WorkbookReader::open(&request.source_path)?;
    if !reader.has_sheet(&request.sheet) {
        return Err(ValidationError::sheet_not_found(
            Role::Source,
            &request.sheet,
            &request.source_path,
        )
        .into());
    }
    let range = CellRange::parse(&request.range).map_err(|_| ValidationError::InvalidRange {
        role: Role::Source,
        range: request.range.clone(),
    })?;

    let workbook = reader.read_all(ReadMode::ValuesAndFormulas)?;
    let mut engine = FormualizerEngine::load(&workbook)?;
    log::info!(
        "evaluating {}!{} ({} rows, truncate={}) -> {}",
        request.sheet,
        range,
        range.height(),
        truncate,
        request.dest_path.display()
    );

    let mut written = 0;
    write_atomically(&request.dest_path, |tmp| {
        let file = File::create(tmp)
            .with_context(|| format!("Failed to create file: {}", tmp.display()))?;
        written = write_rows(&mut engine, &request.sheet, &range, truncate, file)?;
        Ok(())
    })
    .with_context(|| format!("Failed to write CSV: {}", request.dest_path.display()))?;

    Ok(written)
}

/// Evaluate `range` row by row into CSV records on `out`.
///
/// With `truncate` set, the first row whose first cell evaluates empty ends
/// the output and nothing after it is evaluated.
pub fn write_rows<E, W>(
    engine: &mut E,
    sheet: &str,
    range: &CellRange,
    truncate: bool,
    out: W,
) -> Result<usize>
where
    E: FormulaEngine + ?Sized,
    W: Write,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(out);

    let mut written = 0;
    for row in range.rows() {
        let mut record = Vec::with_capacity(range.width() as usize);
        for cell in row {
            let value = engine
                .evaluate(sheet, cell)
                .with_context(|| format!("Failed to evaluate {}", cell.qualified(sheet)))?;
            if truncate && record.is_empty() && value.is_empty() {
                log::debug!("first column empty at {}, stopping", cell.qualified(sheet));
                writer.flush()?;
                return Ok(written);
            }
            record.push(value.to_string());
        }
        writer.write_record(&record)?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}
