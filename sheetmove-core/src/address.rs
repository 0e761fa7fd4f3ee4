//! A1-style cell addresses and rectangular ranges

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest column index (0-based) a worksheet can hold, `XFD`
pub const MAX_COL: u32 = 16_383;
/// Largest row index (0-based) a worksheet can hold
pub const MAX_ROW: u32 = 1_048_575;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("'{0}' is not a valid cell address")]
    InvalidAddress(String),
    #[error("'{0}' is outside the worksheet grid")]
    OutOfBounds(String),
    #[error("'{0}' is not a valid cell range")]
    InvalidRange(String),
}

thread_local! {
    static A1_RE: regex::Regex =
        regex::Regex::new(r"^\$?(?P<col>[A-Za-z]{1,3})\$?(?P<row>[0-9]{1,7})$").unwrap();
}

/// A single cell position, 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an address such as `B7` or `$B$7`
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let trimmed = text.trim();
        let (col_str, row_str) = A1_RE
            .with(|re| {
                re.captures(trimmed).map(|caps| {
                    (
                        caps["col"].to_ascii_uppercase(),
                        caps["row"].to_string(),
                    )
                })
            })
            .ok_or_else(|| AddressError::InvalidAddress(text.to_string()))?;

        let row: u32 = row_str
            .parse()
            .map_err(|_| AddressError::InvalidAddress(text.to_string()))?;
        if row == 0 {
            return Err(AddressError::InvalidAddress(text.to_string()));
        }
        if row - 1 > MAX_ROW {
            return Err(AddressError::OutOfBounds(text.to_string()));
        }

        let col = letters_to_col(&col_str);
        if col > MAX_COL {
            return Err(AddressError::OutOfBounds(text.to_string()));
        }

        Ok(Self { row: row - 1, col })
    }

    /// Column letters for this address (0 -> A, 26 -> AA)
    pub fn column_name(&self) -> String {
        col_to_letters(self.col)
    }

    /// Coordinate qualified with a sheet name, quoting it when needed
    pub fn qualified(&self, sheet: &str) -> String {
        let needs_quotes = sheet
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'));
        if needs_quotes {
            format!("'{}'!{}", sheet.replace('\'', "''"), self)
        } else {
            format!("{}!{}", sheet, self)
        }
    }
}

impl PartialOrd for CellAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row.cmp(&other.row).then_with(|| self.col.cmp(&other.col))
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A rectangular block of cells spanned by two corners.
///
/// Corners are normalized on construction, so `start` is always the
/// upper-left cell and `end` the lower-right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start: CellAddress::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddress::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// Parse `A1:C10`; a lone address is a one-cell range
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::InvalidRange(text.to_string());
        let parts: Vec<&str> = text.trim().split(':').collect();
        match parts.as_slice() {
            [single] => {
                let cell = CellAddress::parse(single).map_err(|_| invalid())?;
                Ok(Self::new(cell, cell))
            }
            [first, last] => {
                let first = CellAddress::parse(first).map_err(|_| invalid())?;
                let last = CellAddress::parse(last).map_err(|_| invalid())?;
                Ok(Self::new(first, last))
            }
            _ => Err(invalid()),
        }
    }

    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    /// Number of cells in the range, never zero
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        u64::from(self.height()) * u64::from(self.width())
    }

    pub fn contains(&self, cell: CellAddress) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    /// Smallest range covering both `self` and `other`
    pub fn union(&self, other: &CellRange) -> CellRange {
        CellRange::new(
            CellAddress::new(
                self.start.row.min(other.start.row),
                self.start.col.min(other.start.col),
            ),
            CellAddress::new(
                self.end.row.max(other.end.row),
                self.end.col.max(other.end.col),
            ),
        )
    }

    /// Addresses in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        self.rows().flatten()
    }

    /// One iterator of addresses per row, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = impl Iterator<Item = CellAddress>> + '_ {
        let (first_col, last_col) = (self.start.col, self.end.col);
        (self.start.row..=self.end.row)
            .map(move |row| (first_col..=last_col).map(move |col| CellAddress::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

impl FromStr for CellRange {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn letters_to_col(letters: &str) -> u32 {
    letters
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + u32::from(b - b'A' + 1))
        - 1
}

fn col_to_letters(mut col: u32) -> String {
    let mut result = String::new();
    loop {
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    result
}
