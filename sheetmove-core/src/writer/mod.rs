//! Writer module for updating spreadsheet files in place

mod sheet_data;
mod xlsx_writer;

pub use sheet_data::patch_sheet_data;
pub use xlsx_writer::{
    Relationship, join_part_path, parse_relationships, parse_sheet_ids, write_cells_xlsx,
};

use crate::address::CellAddress;
use crate::reader::{CellValue, WorkbookReader};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Whether a path names an Office Open XML workbook we can patch
pub fn is_ooxml<P: AsRef<Path>>(path: P) -> bool {
    matches!(
        path.as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .as_deref(),
        Some("xlsx") | Some("xlsm")
    )
}

/// Set cell values on one sheet of a workbook and save it back in place
pub fn write_cells<P: AsRef<Path>>(
    path: P,
    sheet_name: &str,
    updates: &BTreeMap<CellAddress, CellValue>,
) -> Result<()> {
    let path = path.as_ref();

    if !is_ooxml(path) {
        anyhow::bail!("Unsupported file format: {}", path.display());
    }

    let formulas = WorkbookReader::open(path)?.read_formulas(sheet_name)?;
    write_atomically(path, |tmp| {
        write_cells_xlsx(path, tmp, sheet_name, updates, &formulas)
    })
        .with_context(|| format!("Failed to save workbook: {}", path.display()))
}

/// Run `write` against a temporary sibling of `dest`, then move it over `dest`.
///
/// `dest` is left untouched when `write` fails.
pub fn write_atomically<F>(dest: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = temp_sibling(dest, "tmp");

    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    replace_with(&tmp, dest, |from, to| fs::rename(from, to))
}

/// Move `tmp` over `dest` with `rename`.
///
/// Some platforms refuse to rename over an existing file. Then `dest` is moved
/// to a backup first, and put back if `tmp` still cannot take its place.
fn replace_with<R>(tmp: &Path, dest: &Path, mut rename: R) -> Result<()>
where
    R: FnMut(&Path, &Path) -> io::Result<()>,
{
    let refused = match rename(tmp, dest) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    let backup = temp_sibling(dest, "bak");
    if let Err(e) = rename(dest, &backup) {
        let _ = fs::remove_file(tmp);
        return Err(e).with_context(|| {
            format!("Failed to replace {}: {}", dest.display(), refused)
        });
    }

    match rename(tmp, dest) {
        Ok(()) => {
            let _ = fs::remove_file(&backup);
            Ok(())
        }
        Err(e) => {
            let restored = rename(&backup, dest);
            let _ = fs::remove_file(tmp);
            if let Err(r) = restored {
                log::error!(
                    "could not restore {} from {}: {}",
                    dest.display(),
                    backup.display(),
                    r
                );
            }
            Err(e).with_context(|| format!("Failed to replace {}", dest.display()))
        }
    }
}

fn temp_sibling(dest: &Path, suffix: &str) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.{}.{}", name, std::process::id(), suffix))
}
