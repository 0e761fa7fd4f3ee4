//! Validation failures reported to the user before any data moves

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which side of a transfer a file or sheet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Dest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Dest => write!(f, "dest"),
        }
    }
}

/// Terminal errors that are printed together with the tool's usage string
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Insufficient arguments, expect exactly {expected}")]
    ArgumentCount { expected: usize },

    #[error("{role} file {} does not exist", path.display())]
    FileNotFound { role: Role, path: PathBuf },

    #[error("sheet '{sheet}' not found in {role} file {}", path.display())]
    SheetNotFound {
        role: Role,
        sheet: String,
        path: PathBuf,
    },

    #[error("source & dest ranges differ in size ({source_cells} vs {dest_cells} cells)")]
    RangeSizeMismatch { source_cells: u64, dest_cells: u64 },

    #[error("truncate-on-empty-first-value flag '{0}' is not boolean")]
    InvalidFlag(String),

    #[error("{role} range '{range}' is not a valid cell range")]
    InvalidRange { role: Role, range: String },

    #[error("{role} file {} is not an Office Open XML workbook", path.display())]
    UnsupportedFormat { role: Role, path: PathBuf },
}

impl ValidationError {
    pub fn file_not_found(role: Role, path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound {
            role,
            path: path.into(),
        }
    }

    pub fn sheet_not_found(role: Role, sheet: &str, path: impl Into<PathBuf>) -> Self {
        Self::SheetNotFound {
            role,
            sheet: sheet.to_string(),
            path: path.into(),
        }
    }
}

/// Parse the truncate flag, accepting `true`/`false` in any letter case
pub fn parse_flag(text: &str) -> Result<bool, ValidationError> {
    match text.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ValidationError::InvalidFlag(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag("TRUE").unwrap());
        assert!(parse_flag("True").unwrap());
        assert!(!parse_flag("false").unwrap());
        assert!(!parse_flag("FaLsE").unwrap());
        for bad in ["", "yes", "1", "t", "true "] {
            assert!(matches!(parse_flag(bad), Err(ValidationError::InvalidFlag(_))));
        }
    }

    #[test]
    fn test_messages() {
        let err = ValidationError::file_not_found(Role::Source, "in.xlsx");
        assert_eq!(err.to_string(), "source file in.xlsx does not exist");

        let err = ValidationError::sheet_not_found(Role::Dest, "Data", "out.xlsx");
        assert_eq!(err.to_string(), "sheet 'Data' not found in dest file out.xlsx");

        let err = ValidationError::RangeSizeMismatch {
            source_cells: 4,
            dest_cells: 2,
        };
        assert!(err.to_string().starts_with("source & dest ranges differ in size"));
    }
}
