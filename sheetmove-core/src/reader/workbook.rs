//! Workbook data structures

use crate::address::{CellAddress, CellRange};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Represents a complete workbook
#[derive(Debug, Clone)]
pub struct Workbook {
    pub path: PathBuf,
    pub sheets: Vec<Sheet>,
    /// `(name, refers to)` pairs, e.g. `("Rate", "Inputs!$B$1")`
    pub defined_names: Vec<(String, String)>,
}

/// Represents a worksheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub cells: HashMap<(u32, u32), Cell>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: HashMap::new(),
        }
    }

    /// Get a cell at the given position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Value at an address; missing cells read as empty
    pub fn value_at(&self, cell: CellAddress) -> CellValue {
        self.get_cell(cell.row, cell.col)
            .map(|c| c.value.clone())
            .unwrap_or(CellValue::Empty)
    }

    /// Values of a range in row-major order
    pub fn values_in(&self, range: &CellRange) -> Vec<CellValue> {
        range.cells().map(|cell| self.value_at(cell)).collect()
    }

    /// Get all cells holding a value or a formula
    pub fn all_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }
}

/// Represents a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    /// Last computed value as stored in the file
    pub value: CellValue,
    /// Formula text without the leading `=`, if any
    pub formula: Option<String>,
}

impl Cell {
    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }
}

/// Cell value types
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Error code such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// Default textual rendering used for CSV output: integral numbers drop the
/// fractional part, booleans use spreadsheet tokens, empty renders blank.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Boolean(true) => write!(f, "TRUE"),
            CellValue::Boolean(false) => write!(f, "FALSE"),
            CellValue::Error(e) => write!(f, "{e}"),
        }
    }
}

/// Render a number the way it would be stored in a cell
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
