//! Copy a rectangular range of values between two workbooks

use crate::address::CellRange;
use crate::error::{Role, ValidationError};
use crate::reader::{ReadMode, WorkbookReader};
use crate::writer;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything `copyrange` needs, straight from the command line
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub source_path: PathBuf,
    pub source_sheet: String,
    pub source_range: String,
    pub dest_path: PathBuf,
    pub dest_sheet: String,
    pub dest_range: String,
}

/// Copy the literal values of `source_range` into `dest_range`, cell by cell
/// in row-major order, and save the destination workbook in place.
///
/// Formula cells in the source contribute their cached value. Nothing is
/// written unless every check passes. Returns the number of cells copied.
pub fn copy_range(request: &CopyRequest) -> Result<usize> {
    if !request.source_path.exists() {
        return Err(ValidationError::file_not_found(Role::Source, &request.source_path).into());
    }
    if !request.dest_path.exists() {
        return Err(ValidationError::file_not_found(Role::Dest, &request.dest_path).into());
    }
    if !writer::is_ooxml(&request.dest_path) {
        return Err(ValidationError::UnsupportedFormat {
            role: Role::Dest,
            path: request.dest_path.clone(),
        }
        .into());
    }

    let mut source = WorkbookReader::open(&request.source_path)?;
    if !source.has_sheet(&request.source_sheet) {
        return Err(ValidationError::sheet_not_found(
            Role::Source,
            &request.source_sheet,
            &request.source_path,
        )
        .into());
    }

    // Only the sheet index of the destination is needed here
    let dest_has_sheet = WorkbookReader::open(&request.dest_path)?.has_sheet(&request.dest_sheet);
    if !dest_has_sheet {
        return Err(ValidationError::sheet_not_found(
            Role::Dest,
            &request.dest_sheet,
            &request.dest_path,
        )
        .into());
    }

    let source_range = parse_range(Role::Source, &request.source_range)?;
    let dest_range = parse_range(Role::Dest, &request.dest_range)?;
    if source_range.len() != dest_range.len() {
        return Err(ValidationError::RangeSizeMismatch {
            source_cells: source_range.len(),
            dest_cells: dest_range.len(),
        }
        .into());
    }

    let sheet = source.read_sheet(&request.source_sheet, ReadMode::Values)?;
    let updates: BTreeMap<_, _> = dest_range
        .cells()
        .zip(sheet.values_in(&source_range))
        .collect();

    log::info!(
        "copying {}!{} -> {}!{} ({} cells)",
        request.source_sheet,
        source_range,
        request.dest_sheet,
        dest_range,
        updates.len()
    );

    writer::write_cells(&request.dest_path, &request.dest_sheet, &updates)?;
    Ok(updates.len())
}

fn parse_range(role: Role, text: &str) -> Result<CellRange, ValidationError> {
    CellRange::parse(text).map_err(|_| ValidationError::InvalidRange {
        role,
        range: text.to_string(),
    })
}
