//! `FormulaEngine` backed by formualizer

use super::FormulaEngine;
use crate::address::{CellAddress, CellRange};
use crate::reader::{Cell, CellValue, Workbook};
use anyhow::{Result, anyhow};
use formualizer_common::LiteralValue;
use formualizer_eval::engine::EvalConfig;
use formualizer_eval::engine::named_range::{NameScope, NamedDefinition};
use formualizer_eval::reference::{CellRef, Coord, RangeRef};

/// Every sheet of a workbook loaded into a formualizer dependency graph.
///
/// Formula cells are recomputed on demand. A formula the parser rejects
/// keeps the cached value the file was saved with. Defined names that point
/// at a cell or a block of cells are registered before any formula, so
/// formulas can refer to them.
pub struct FormualizerEngine {
    workbook: formualizer_workbook::Workbook,
}

impl FormualizerEngine {
    pub fn load(source: &Workbook) -> Result<Self> {
        // Parse eagerly so bad formulas surface here instead of at evaluation
        let mut config = EvalConfig::default();
        config.defer_graph_building = false;
        let mut workbook = formualizer_workbook::Workbook::new_with_config(config);

        for sheet in &source.sheets {
            let _ = workbook.add_sheet(&sheet.name);
        }
        let names = define_names(&mut workbook, &source.defined_names);

        let mut formulas = 0;
        for sheet in &source.sheets {
            let mut cells: Vec<&Cell> = sheet.all_cells().collect();
            cells.sort_by_key(|c| (c.row, c.col));

            for cell in cells {
                if load_cell(&mut workbook, &sheet.name, cell)? {
                    formulas += 1;
                }
            }
        }

        log::debug!(
            "loaded {} sheets ({} formulas, {} names) from {}",
            source.sheets.len(),
            formulas,
            names,
            source.path.display()
        );
        Ok(Self { workbook })
    }
}

impl FormulaEngine for FormualizerEngine {
    fn evaluate(&mut self, sheet: &str, cell: CellAddress) -> Result<CellValue> {
        let value = self
            .workbook
            .evaluate_cell(sheet, cell.row + 1, cell.col + 1)
            .map_err(|e| anyhow!("{e}"))?;
        Ok(from_literal(value))
    }
}

/// Register `(name, refers to)` pairs as workbook names; returns how many took
fn define_names(
    workbook: &mut formualizer_workbook::Workbook,
    names: &[(String, String)],
) -> usize {
    let graph = &mut workbook.engine_mut().graph;
    let mut defined = 0;

    for (name, refers_to) in names {
        // Filter ranges, print areas and the like
        if name.starts_with("_xlnm.") {
            log::debug!("skipping built-in name {name}");
            continue;
        }
        let Some((sheet, range)) = split_reference(refers_to) else {
            log::warn!("name {name} refers to '{refers_to}', not a cell range; skipped");
            continue;
        };
        let Some(sheet_id) = graph.sheet_id(&sheet) else {
            log::warn!("name {name} refers to missing sheet '{sheet}'; skipped");
            continue;
        };

        let at = |cell: CellAddress| {
            CellRef::new(sheet_id, Coord::from_excel(cell.row + 1, cell.col + 1, true, true))
        };
        let definition = if range.len() == 1 {
            NamedDefinition::Cell(at(range.start))
        } else {
            NamedDefinition::Range(RangeRef::new(at(range.start), at(range.end)))
        };

        match graph.define_name(name, definition, NameScope::Workbook) {
            Ok(()) => defined += 1,
            Err(e) => log::warn!("name {name} skipped: {e}"),
        }
    }
    defined
}

/// Split `Sheet!$A$1:$B$2` into sheet name and range. Quoted sheet names
/// (`'My Sheet'!A1`) are unquoted.
fn split_reference(text: &str) -> Option<(String, CellRange)> {
    let text = text.trim();
    let text = text.strip_prefix('=').unwrap_or(text);
    let (sheet, range) = text.rsplit_once('!')?;
    let sheet = match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => sheet.to_string(),
    };
    let range = CellRange::parse(range).ok()?;
    Some((sheet, range))
}

/// Returns whether the cell went in as a live formula
fn load_cell(
    workbook: &mut formualizer_workbook::Workbook,
    sheet: &str,
    cell: &Cell,
) -> Result<bool> {
    let (row, col) = (cell.row + 1, cell.col + 1);

    if let Some(formula) = &cell.formula {
        match workbook.set_formula(sheet, row, col, formula) {
            Ok(()) => return Ok(true),
            Err(e) => log::warn!(
                "{}: cannot evaluate '={}' ({}), using cached value",
                cell.address().qualified(sheet),
                formula,
                e
            ),
        }
    }

    match &cell.value {
        CellValue::Empty => {}
        // Error literals parse as formulas yielding that error
        CellValue::Error(code) => {
            if let Err(e) = workbook.set_formula(sheet, row, col, code) {
                log::warn!(
                    "{}: dropping error value {} ({})",
                    cell.address().qualified(sheet),
                    code,
                    e
                );
            }
        }
        value => {
            workbook
                .set_value(sheet, row, col, to_literal(value))
                .map_err(|e| anyhow!("{}: {}", cell.address().qualified(sheet), e))?;
        }
    }
    Ok(false)
}

fn to_literal(value: &CellValue) -> LiteralValue {
    match value {
        CellValue::Empty => LiteralValue::Empty,
        CellValue::Number(n) => LiteralValue::Number(*n),
        CellValue::Text(s) | CellValue::Error(s) => LiteralValue::Text(s.clone()),
        CellValue::Boolean(b) => LiteralValue::Boolean(*b),
    }
}

fn from_literal(value: LiteralValue) -> CellValue {
    match value {
        LiteralValue::Empty | LiteralValue::Pending => CellValue::Empty,
        LiteralValue::Int(i) => CellValue::Number(i as f64),
        LiteralValue::Number(n) => CellValue::Number(n),
        LiteralValue::Text(s) => CellValue::Text(s),
        LiteralValue::Boolean(b) => CellValue::Boolean(b),
        LiteralValue::Error(e) => CellValue::Error(e.kind.to_string()),
        LiteralValue::Date(d) => CellValue::Text(d.to_string()),
        LiteralValue::DateTime(dt) => CellValue::Text(dt.to_string()),
        LiteralValue::Time(t) => CellValue::Text(t.to_string()),
        // Durations are day fractions, like any other time serial
        LiteralValue::Duration(d) => CellValue::Number(d.num_seconds() as f64 / 86_400.0),
        // Spilled results: the anchor cell holds the top-left element
        LiteralValue::Array(rows) => rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(from_literal)
            .unwrap_or(CellValue::Empty),
    }
}
