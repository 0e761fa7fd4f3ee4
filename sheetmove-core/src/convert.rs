//! CSV to XLSX conversion

use crate::error::{Role, ValidationError};
use crate::reader::CellValue;
use crate::writer::write_atomically;
use anyhow::{Context, Result, bail};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Fields read as missing values, written as blank cells
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Name of the single sheet in converted workbooks
pub const SHEET_NAME: &str = "Sheet1";

/// A CSV file split into its header and data records.
///
/// Every data row has exactly as many fields as the header.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Type shared by every non-missing field of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl CsvTable {
    /// Read a table from CSV text; the first record is the header
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let raw_headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        if raw_headers.is_empty() || (raw_headers.len() == 1 && raw_headers[0].is_empty()) {
            bail!("No columns to parse from file");
        }
        let headers = dedupe_headers(raw_headers);

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;

            // Blank line
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            if record.len() > headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                bail!(
                    "Error tokenizing data. Expected {} fields in line {}, saw {}",
                    headers.len(),
                    line,
                    record.len()
                );
            }

            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Failed to read CSV: {}", path.display()))
    }

    /// Infer one type per column from all of its non-missing fields
    pub fn column_kinds(&self) -> Vec<ColumnKind> {
        (0..self.headers.len())
            .map(|col| {
                let fields: Vec<&str> = self
                    .rows
                    .iter()
                    .map(|row| row[col].as_str())
                    .filter(|f| !is_missing(f))
                    .collect();
                infer_kind(&fields)
            })
            .collect()
    }

    /// Data rows as typed cell values
    pub fn typed_rows(&self) -> Vec<Vec<CellValue>> {
        let kinds = self.column_kinds();
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&kinds)
                    .map(|(field, kind)| typed_value(field, *kind))
                    .collect()
            })
            .collect()
    }
}

/// Convert `source` CSV into a new single-sheet workbook at `dest`.
///
/// An existing `dest` is replaced. Returns the number of data rows written.
pub fn convert_csv<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q) -> Result<usize> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    if !source.exists() {
        return Err(ValidationError::file_not_found(Role::Source, source).into());
    }

    let table = CsvTable::from_path(source)?;
    log::info!(
        "converting {} ({} columns, {} rows) -> {}",
        source.display(),
        table.headers.len(),
        table.rows.len(),
        dest.display()
    );

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;
    write_table(worksheet, &table)?;

    write_atomically(dest, |tmp| Ok(workbook.save(tmp)?))
        .with_context(|| format!("Failed to save workbook: {}", dest.display()))?;
    Ok(table.rows.len())
}

/// Header in row 1 (bold, centered, bordered), data from row 2
pub fn write_table(worksheet: &mut Worksheet, table: &CsvTable) -> Result<()> {
    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);

    for (col, name) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, column(col)?, name, &header_format)?;
    }

    for (index, row) in table.typed_rows().into_iter().enumerate() {
        let row_num = u32::try_from(index + 1).context("Too many rows for a worksheet")?;
        for (col, value) in row.into_iter().enumerate() {
            let col = column(col)?;
            match value {
                CellValue::Empty => {}
                CellValue::Number(n) => {
                    worksheet.write_number(row_num, col, n)?;
                }
                CellValue::Boolean(b) => {
                    worksheet.write_boolean(row_num, col, b)?;
                }
                CellValue::Text(s) | CellValue::Error(s) => {
                    worksheet.write_string(row_num, col, &s)?;
                }
            }
        }
    }

    Ok(())
}

fn column(index: usize) -> Result<u16> {
    u16::try_from(index).context("Too many columns for a worksheet")
}

fn is_missing(field: &str) -> bool {
    MISSING_MARKERS.iter().any(|m| *m == field)
}

fn parse_bool(field: &str) -> Option<bool> {
    match field {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

fn infer_kind(fields: &[&str]) -> ColumnKind {
    if fields.is_empty() {
        ColumnKind::Text
    } else if fields.iter().all(|f| f.trim().parse::<i64>().is_ok()) {
        ColumnKind::Integer
    } else if fields.iter().all(|f| f.trim().parse::<f64>().is_ok()) {
        ColumnKind::Float
    } else if fields.iter().all(|f| parse_bool(f).is_some()) {
        ColumnKind::Boolean
    } else {
        ColumnKind::Text
    }
}

fn typed_value(field: &str, kind: ColumnKind) -> CellValue {
    if is_missing(field) {
        return CellValue::Empty;
    }
    let parsed = match kind {
        ColumnKind::Integer | ColumnKind::Float => field
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(CellValue::Number),
        ColumnKind::Boolean => parse_bool(field).map(CellValue::Boolean),
        ColumnKind::Text => None,
    };
    parsed.unwrap_or_else(|| CellValue::Text(field.to_string()))
}

/// Blank headers become `Unnamed: <index>`, repeats get a `.1`, `.2` suffix
fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(index, name)| {
            let base = if name.is_empty() {
                format!("Unnamed: {index}")
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base}.{n}");
                n += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> CsvTable {
        CsvTable::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_header_and_rows() {
        let t = table("name,qty\nbolt,3\nnut,12\n");
        assert_eq!(t.headers, vec!["name", "qty"]);
        assert_eq!(t.rows, vec![vec!["bolt", "3"], vec!["nut", "12"]]);
    }

    #[test]
    fn test_quoted_fields() {
        let t = table("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n");
        assert_eq!(t.rows, vec![vec!["x, y", "say \"hi\""]]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let t = table("a,b,c\n1\n1,2,3\n");
        assert_eq!(t.rows[0], vec!["1", "", ""]);
        assert_eq!(t.typed_rows()[0][1], CellValue::Empty);
    }

    #[test]
    fn test_long_rows_are_rejected() {
        let err = CsvTable::from_reader("a,b\n1,2,3\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Expected 2 fields"), "{err}");
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(CsvTable::from_reader("".as_bytes()).is_err());
    }

    #[test]
    fn test_column_kinds() {
        let t = table(
            "int,float,bool,text,mixed,blank\n\
             1,1.5,true,a,1,\n\
             -2,2,FALSE,b,x,NA\n\
             ,NaN,,c,2.5,\n",
        );
        assert_eq!(
            t.column_kinds(),
            vec![
                ColumnKind::Integer,
                ColumnKind::Float,
                ColumnKind::Boolean,
                ColumnKind::Text,
                ColumnKind::Text,
                ColumnKind::Text,
            ]
        );

        let rows = t.typed_rows();
        assert_eq!(rows[0][0], CellValue::Number(1.0));
        assert_eq!(rows[1][0], CellValue::Number(-2.0));
        assert_eq!(rows[2][0], CellValue::Empty);
        assert_eq!(rows[0][1], CellValue::Number(1.5));
        assert_eq!(rows[2][1], CellValue::Empty);
        assert_eq!(rows[1][2], CellValue::Boolean(false));
        // Numbers in a text column stay text
        assert_eq!(rows[0][4], CellValue::Text("1".into()));
        assert_eq!(rows[1][5], CellValue::Empty);
    }

    #[test]
    fn test_dedupe_headers() {
        let headers = dedupe_headers(vec![
            "a".into(),
            "".into(),
            "a".into(),
            "a".into(),
            "b".into(),
        ]);
        assert_eq!(headers, vec!["a", "Unnamed: 1", "a.1", "a.2", "b"]);
    }
}
