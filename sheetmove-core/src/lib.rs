//! sheetmove-core: moving cell data between XLSX workbooks and CSV files
//!
//! Three operations back the command line tools of this workspace:
//! copying a range of values between workbooks without disturbing the
//! destination's formatting, converting a CSV file into a new workbook,
//! and evaluating a range of formulas into CSV.

pub mod address;
pub mod cli;
pub mod convert;
pub mod copy;
pub mod error;
pub mod eval;
pub mod reader;
pub mod writer;

pub use address::{CellAddress, CellRange};
pub use convert::convert_csv;
pub use copy::{CopyRequest, copy_range};
pub use error::{Role, ValidationError};
pub use eval::{EvalRequest, FormulaEngine, FormualizerEngine, evaluate_range};
