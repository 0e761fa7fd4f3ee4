//! Streaming rewrite of a worksheet part that sets cell values

use crate::address::{CellAddress, CellRange};
use crate::reader::workbook::{CellValue, format_number};
use anyhow::{Context, Result, bail};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap, HashSet};

type RowUpdates<'u> = BTreeMap<u32, &'u CellValue>;

/// Rewrite `<sheetData>` so every address in `updates` holds the given value.
///
/// Existing cells keep their style index but lose any formula or previous
/// value; cells and rows that do not exist yet are inserted in order.
/// Everything else in the part is passed through untouched, except formulas
/// that depend on an overwritten anchor:
///
/// - cells sharing the formula of an overwritten master get their own copy,
///   taken from `formulas` (the expanded text of every formula cell)
/// - an array formula whose range loses a cell is narrowed to its anchor
pub fn patch_sheet_data(
    xml: &str,
    updates: &BTreeMap<CellAddress, CellValue>,
    formulas: &HashMap<CellAddress, String>,
) -> Result<String> {
    let groups = scan_formula_groups(xml, updates)?;
    let mut pending: BTreeMap<u32, RowUpdates> = BTreeMap::new();
    for (cell, value) in updates {
        pending.entry(cell.row).or_default().insert(cell.col, value);
    }
    let written = bounding_range(updates);

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    let mut in_sheet_data = false;
    let mut row_cells: Option<RowUpdates> = None;
    let mut current_row = 0u32;
    let mut last_row: Option<u32> = None;
    let mut last_col: Option<u32> = None;
    let mut open_cell: Option<CellAddress> = None;
    let mut skip_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .with_context(|| {
                format!("Error parsing worksheet XML at {}", reader.error_position())
            })?;

        // Inside a replaced <c>: drop its children
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => bail!("Unexpected end of worksheet XML inside a cell"),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Empty(e) if e.local_name().as_ref() == b"dimension" => match &written {
                Some(written) => {
                    let widened = attribute(&e, b"ref")?
                        .and_then(|r| CellRange::parse(&r).ok())
                        .map(|current| current.union(written))
                        .unwrap_or(*written);
                    let text = widened.to_string();
                    writer.write_event(Event::Empty(with_attribute(&e, "ref", &text)?))?;
                }
                None => writer.write_event(Event::Empty(e))?,
            },
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                in_sheet_data = true;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                if has_content(&pending) {
                    writer.write_event(Event::Start(e.borrow()))?;
                    write_rows_before(&mut writer, &mut pending, None)?;
                    writer.write_event(Event::End(e.to_end()))?;
                } else {
                    pending.clear();
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                write_rows_before(&mut writer, &mut pending, None)?;
                in_sheet_data = false;
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = row_index(&e, last_row)?;
                current_row = row;
                last_row = Some(row);
                last_col = None;
                write_rows_before(&mut writer, &mut pending, Some(row))?;
                match pending.remove(&row) {
                    Some(cells) => {
                        writer.write_event(Event::Start(without_attribute(&e, b"spans")?))?;
                        row_cells = Some(cells);
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = row_index(&e, last_row)?;
                last_row = Some(row);
                write_rows_before(&mut writer, &mut pending, Some(row))?;
                match pending.remove(&row) {
                    Some(cells) => {
                        let start = without_attribute(&e, b"spans")?;
                        writer.write_event(Event::Start(start.borrow()))?;
                        for (col, value) in cells {
                            write_cell(&mut writer, CellAddress::new(row, col), value, None)?;
                        }
                        writer.write_event(Event::End(start.to_end()))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                if let Some(cells) = row_cells.take() {
                    for (col, value) in cells {
                        write_cell(&mut writer, CellAddress::new(current_row, col), value, None)?;
                    }
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = cell_address(&e, current_row, last_col)?;
                last_col = Some(cell.col);
                if let Some(cells) = row_cells.as_mut() {
                    write_cells_before(&mut writer, cells, cell)?;
                    if let Some(value) = cells.remove(&cell.col) {
                        let style = attribute(&e, b"s")?;
                        write_cell(&mut writer, cell, value, style.as_deref())?;
                        skip_depth = 1;
                        continue;
                    }
                }
                open_cell = Some(cell);
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = cell_address(&e, current_row, last_col)?;
                last_col = Some(cell.col);
                if let Some(cells) = row_cells.as_mut() {
                    write_cells_before(&mut writer, cells, cell)?;
                    if let Some(value) = cells.remove(&cell.col) {
                        let style = attribute(&e, b"s")?;
                        write_cell(&mut writer, cell, value, style.as_deref())?;
                        continue;
                    }
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                open_cell = None;
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"f" => {
                let repair = match open_cell {
                    Some(cell) => repair_formula(&e, cell, &groups, formulas)?,
                    None => FormulaRepair::Keep,
                };
                match repair {
                    FormulaRepair::Keep => writer.write_event(Event::Start(e))?,
                    FormulaRepair::Narrow(f) => writer.write_event(Event::Start(f))?,
                    FormulaRepair::Expand(text) => {
                        write_text_element(&mut writer, BytesStart::new("f"), text)?;
                        skip_depth = 1;
                    }
                    FormulaRepair::Drop => skip_depth = 1,
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                let repair = match open_cell {
                    Some(cell) => repair_formula(&e, cell, &groups, formulas)?,
                    None => FormulaRepair::Keep,
                };
                match repair {
                    FormulaRepair::Keep => writer.write_event(Event::Empty(e))?,
                    FormulaRepair::Narrow(f) => writer.write_event(Event::Empty(f))?,
                    FormulaRepair::Expand(text) => {
                        write_text_element(&mut writer, BytesStart::new("f"), text)?
                    }
                    FormulaRepair::Drop => {}
                }
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    if !pending.is_empty() {
        bail!("Worksheet XML has no <sheetData> element");
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Shared and array formulas anchored on a cell that `updates` touches
#[derive(Debug, Default)]
struct FormulaGroups {
    /// `si` of shared formulas whose master cell is overwritten
    orphaned: HashSet<String>,
    /// Array anchors that stay but lose part of their range
    narrowed: HashSet<CellAddress>,
}

/// What to do with the `<f>` of a cell that is not overwritten
enum FormulaRepair<'f> {
    Keep,
    Narrow(BytesStart<'static>),
    Expand(&'f str),
    /// Keep the cached value only
    Drop,
}

fn scan_formula_groups(
    xml: &str,
    updates: &BTreeMap<CellAddress, CellValue>,
) -> Result<FormulaGroups> {
    let mut reader = Reader::from_str(xml);
    let mut groups = FormulaGroups::default();
    let mut current_row = 0u32;
    let mut last_row: Option<u32> = None;
    let mut last_col: Option<u32> = None;
    let mut cell: Option<CellAddress> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| {
                format!("Error parsing worksheet XML at {}", reader.error_position())
            })?;

        match event {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                current_row = row_index(&e, last_row)?;
                last_row = Some(current_row);
                last_col = None;
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let address = cell_address(&e, current_row, last_col)?;
                last_col = Some(address.col);
                cell = Some(address);
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                let Some(cell) = cell else { continue };
                let range = attribute(&e, b"ref")?.and_then(|r| CellRange::parse(&r).ok());
                match attribute(&e, b"t")?.as_deref() {
                    Some("shared") if range.is_some() && updates.contains_key(&cell) => {
                        if let Some(si) = attribute(&e, b"si")? {
                            groups.orphaned.insert(si);
                        }
                    }
                    Some("array") if !updates.contains_key(&cell) => {
                        if range.is_some_and(|r| updates.keys().any(|u| r.contains(*u))) {
                            groups.narrowed.insert(cell);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(groups)
}

fn repair_formula<'f>(
    e: &BytesStart,
    cell: CellAddress,
    groups: &FormulaGroups,
    formulas: &'f HashMap<CellAddress, String>,
) -> Result<FormulaRepair<'f>> {
    match attribute(e, b"t")?.as_deref() {
        Some("shared") => {
            let orphaned = attribute(e, b"si")?.is_some_and(|si| groups.orphaned.contains(&si));
            if !orphaned {
                return Ok(FormulaRepair::Keep);
            }
            match formulas.get(&cell) {
                Some(text) => Ok(FormulaRepair::Expand(text)),
                None => {
                    log::warn!("shared formula at {cell} lost its master, keeping cached value");
                    Ok(FormulaRepair::Drop)
                }
            }
        }
        Some("array") if groups.narrowed.contains(&cell) => {
            log::warn!("array formula at {cell} now covers only its anchor cell");
            Ok(FormulaRepair::Narrow(with_attribute(e, "ref", &cell.to_string())?))
        }
        _ => Ok(FormulaRepair::Keep),
    }
}

fn bounding_range(updates: &BTreeMap<CellAddress, CellValue>) -> Option<CellRange> {
    updates
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(cell, _)| CellRange::new(*cell, *cell))
        .reduce(|acc, r| acc.union(&r))
}

fn has_content(pending: &BTreeMap<u32, RowUpdates>) -> bool {
    pending.values().any(|cells| cells.values().any(|v| !v.is_empty()))
}

/// Emit new `<row>` elements for pending rows above `limit` (all when `None`)
fn write_rows_before(
    writer: &mut Writer<Vec<u8>>,
    pending: &mut BTreeMap<u32, RowUpdates>,
    limit: Option<u32>,
) -> Result<()> {
    let later = match limit {
        Some(limit) => pending.split_off(&limit),
        None => BTreeMap::new(),
    };
    let earlier = std::mem::replace(pending, later);

    for (row, cells) in earlier {
        // Clearing a cell that never existed needs no row
        if cells.values().all(|v| v.is_empty()) {
            continue;
        }
        let number = (row + 1).to_string();
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", number.as_str()));
        writer.write_event(Event::Start(start.borrow()))?;
        for (col, value) in cells {
            write_cell(writer, CellAddress::new(row, col), value, None)?;
        }
        writer.write_event(Event::End(start.to_end()))?;
    }
    Ok(())
}

/// Emit new `<c>` elements that sort before an existing cell
fn write_cells_before(
    writer: &mut Writer<Vec<u8>>,
    cells: &mut RowUpdates,
    existing: CellAddress,
) -> Result<()> {
    let later = cells.split_off(&existing.col);
    let earlier = std::mem::replace(cells, later);
    for (col, value) in earlier {
        write_cell(writer, CellAddress::new(existing.row, col), value, None)?;
    }
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    cell: CellAddress,
    value: &CellValue,
    style: Option<&str>,
) -> Result<()> {
    let reference = cell.to_string();
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }

    match value {
        CellValue::Empty => {
            // Keep a styled placeholder so formatting survives a cleared value
            if style.is_some() {
                writer.write_event(Event::Empty(start))?;
            }
            return Ok(());
        }
        CellValue::Number(n) => {
            writer.write_event(Event::Start(start.borrow()))?;
            write_text_element(writer, BytesStart::new("v"), &format_number(*n))?;
        }
        CellValue::Text(s) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start.borrow()))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut t = BytesStart::new("t");
            t.push_attribute(("xml:space", "preserve"));
            write_text_element(writer, t, s)?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
        CellValue::Boolean(b) => {
            start.push_attribute(("t", "b"));
            writer.write_event(Event::Start(start.borrow()))?;
            write_text_element(writer, BytesStart::new("v"), if *b { "1" } else { "0" })?;
        }
        CellValue::Error(code) => {
            start.push_attribute(("t", "e"));
            writer.write_event(Event::Start(start.borrow()))?;
            write_text_element(writer, BytesStart::new("v"), code)?;
        }
    }

    writer.write_event(Event::End(start.to_end()))?;
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, start: BytesStart, text: &str) -> Result<()> {
    writer.write_event(Event::Start(start.borrow()))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(start.to_end()))?;
    Ok(())
}

fn row_index(e: &BytesStart, last_row: Option<u32>) -> Result<u32> {
    match attribute(e, b"r")? {
        Some(r) => {
            let number: u32 = r
                .parse()
                .with_context(|| format!("Invalid row number '{r}' in worksheet XML"))?;
            number
                .checked_sub(1)
                .with_context(|| format!("Invalid row number '{r}' in worksheet XML"))
        }
        None => Ok(last_row.map_or(0, |r| r + 1)),
    }
}

fn cell_address(e: &BytesStart, row: u32, last_col: Option<u32>) -> Result<CellAddress> {
    match attribute(e, b"r")? {
        Some(r) => CellAddress::parse(&r)
            .with_context(|| format!("Invalid cell reference '{r}' in worksheet XML")),
        None => Ok(CellAddress::new(row, last_col.map_or(0, |c| c + 1))),
    }
}

/// Raw value of an attribute
pub(crate) fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(String::from_utf8(attr.value.to_vec())?));
        }
    }
    Ok(None)
}

/// Copy of `e` with `key` set to `value`, replacing any previous value
pub(crate) fn with_attribute(
    e: &BytesStart,
    key: &str,
    value: &str,
) -> Result<BytesStart<'static>> {
    let mut elem = without_attribute(e, key.as_bytes())?;
    elem.push_attribute((key, value));
    Ok(elem)
}

/// Copy of `e` without `key`
pub(crate) fn without_attribute(e: &BytesStart, key: &[u8]) -> Result<BytesStart<'static>> {
    let name = String::from_utf8(e.name().as_ref().to_vec())?;
    let mut elem = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != key {
            elem.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    Ok(elem)
}
