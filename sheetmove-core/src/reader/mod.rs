//! Excel/ODS file reader using calamine

use crate::address::CellAddress;
use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub mod workbook;

pub use workbook::{Cell, CellValue, Sheet, Workbook};

/// What to pull out of each worksheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Cached values only (formula cells read as their last computed value)
    Values,
    /// Cached values plus formula text
    ValuesAndFormulas,
}

/// An opened workbook whose sheets are read on demand.
///
/// Opening only parses the workbook index, so sheet names can be
/// validated before any cell data is touched.
pub struct WorkbookReader {
    path: PathBuf,
    excel: Sheets<BufReader<File>>,
}

impl WorkbookReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let excel: Sheets<_> = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
        log::debug!("opened {} ({} sheets)", path.display(), excel.sheet_names().len());
        Ok(Self {
            path: path.to_path_buf(),
            excel,
        })
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<String> {
        self.excel.sheet_names()
    }

    /// Case-sensitive sheet lookup
    pub fn has_sheet(&self, name: &str) -> bool {
        self.excel.sheet_names().iter().any(|s| s == name)
    }

    /// Read a single sheet
    pub fn read_sheet(&mut self, name: &str, mode: ReadMode) -> Result<Sheet> {
        let range = self
            .excel
            .worksheet_range(name)
            .with_context(|| {
                format!("Failed to read sheet '{}' from {}", name, self.path.display())
            })?;

        let formulas = match mode {
            ReadMode::Values => None,
            ReadMode::ValuesAndFormulas => match self.excel.worksheet_formula(name) {
                Ok(formulas) => Some(formulas),
                Err(e) => {
                    log::warn!("formulas of sheet '{name}' could not be read: {e}");
                    None
                }
            },
        };

        Ok(parse_sheet(name, &range, formulas.as_ref()))
    }

    /// Formula text of every formula cell in a sheet. Cells that share a
    /// formula get their own expanded copy.
    pub fn read_formulas(&mut self, name: &str) -> Result<HashMap<CellAddress, String>> {
        let range = self
            .excel
            .worksheet_formula(name)
            .with_context(|| {
                format!("Failed to read formulas of sheet '{}' from {}", name, self.path.display())
            })?;

        let mut formulas = HashMap::new();
        if let Some((row0, col0)) = range.start() {
            for (rel_row, rel_col, formula) in range.used_cells() {
                let cell = CellAddress::new(row0 + rel_row as u32, col0 + rel_col as u32);
                formulas.insert(cell, formula.clone());
            }
        }
        Ok(formulas)
    }

    /// Read every sheet into memory, along with the workbook's defined names
    pub fn read_all(mut self, mode: ReadMode) -> Result<Workbook> {
        let mut sheets = Vec::new();
        for name in self.sheet_names() {
            sheets.push(self.read_sheet(&name, mode)?);
        }
        let defined_names = self.excel.defined_names().to_vec();
        Ok(Workbook {
            path: self.path,
            sheets,
            defined_names,
        })
    }
}

fn parse_sheet(name: &str, range: &Range<Data>, formula_range: Option<&Range<String>>) -> Sheet {
    let mut cells = HashMap::new();

    // Ranges report positions relative to their own upper-left corner
    if let Some((row0, col0)) = range.start() {
        for (rel_row, rel_col, data) in range.used_cells() {
            let (row, col) = (row0 + rel_row as u32, col0 + rel_col as u32);
            cells.insert(
                (row, col),
                Cell {
                    row,
                    col,
                    value: parse_cell_value(data),
                    formula: None,
                },
            );
        }
    }

    if let Some(f) = formula_range {
        if let Some((row0, col0)) = f.start() {
            for (rel_row, rel_col, formula) in f.used_cells() {
                let (row, col) = (row0 + rel_row as u32, col0 + rel_col as u32);
                cells
                    .entry((row, col))
                    .or_insert_with(|| Cell {
                        row,
                        col,
                        value: CellValue::Empty,
                        formula: None,
                    })
                    .formula = Some(formula.clone());
            }
        }
    }

    log::debug!("sheet '{}': {} cells", name, cells.len());
    Sheet {
        name: name.to_string(),
        cells,
    }
}

fn parse_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::Empty => CellValue::Empty,
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
