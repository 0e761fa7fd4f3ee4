//! XLSX package rewriting: set cell values on one sheet, copy everything else

use super::sheet_data::{patch_sheet_data, with_attribute};
use crate::address::CellAddress;
use crate::reader::CellValue;
use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Elements that must follow `<calcPr>` inside `<workbook>`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// A relationship entry from a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub kind: String,
    pub target: String,
}

/// Write `updates` into `sheet_name` of the XLSX at `input_path`, saving the
/// result to `output_path`.
///
/// The calculation chain is dropped and the workbook is flagged for a full
/// recalculation on load, so dependent formulas pick up the new values.
/// `formulas` holds the expanded formula text of the sheet's cells, used for
/// cells that shared their formula with an overwritten cell.
pub fn write_cells_xlsx(
    input_path: &Path,
    output_path: &Path,
    sheet_name: &str,
    updates: &BTreeMap<CellAddress, CellValue>,
    formulas: &HashMap<CellAddress, String>,
) -> Result<()> {
    let file = File::open(input_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("{} is not a valid XLSX archive", input_path.display()))?;

    let workbook_xml = read_file_from_zip(&mut archive, "xl/workbook.xml")?;
    let rels_xml = read_file_from_zip(&mut archive, "xl/_rels/workbook.xml.rels")?;
    let relationships = parse_relationships(&rels_xml)?;

    let sheet_path = parse_sheet_ids(&workbook_xml)?
        .into_iter()
        .find(|(name, _)| name == sheet_name)
        .and_then(|(_, rid)| relationships.get(&rid))
        .map(|rel| join_part_path("xl/", &rel.target))
        .with_context(|| format!("Sheet '{}' has no worksheet part", sheet_name))?;

    let calc_chain: Vec<(String, String)> = relationships
        .iter()
        .filter(|(_, rel)| rel.kind.ends_with("/calcChain"))
        .map(|(id, rel)| (id.clone(), join_part_path("xl/", &rel.target)))
        .collect();

    // Build the patched parts first, then stream the archive once
    let mut patches: HashMap<String, Vec<u8>> = HashMap::new();
    let mut skip: HashSet<String> = HashSet::new();

    let sheet_xml = read_file_from_zip(&mut archive, &sheet_path)?;
    patches.insert(
        sheet_path.clone(),
        patch_sheet_data(&sheet_xml, updates, formulas)
            .with_context(|| format!("Failed to update {}", sheet_path))?
            .into_bytes(),
    );
    patches.insert(
        "xl/workbook.xml".to_string(),
        set_full_calc_on_load(&workbook_xml)?.into_bytes(),
    );

    if !calc_chain.is_empty() {
        let ids: HashSet<&str> = calc_chain.iter().map(|(id, _)| id.as_str()).collect();
        patches.insert(
            "xl/_rels/workbook.xml.rels".to_string(),
            remove_relationships(&rels_xml, &ids)?.into_bytes(),
        );

        let content_types = read_file_from_zip(&mut archive, "[Content_Types].xml")?;
        let parts: HashSet<String> = calc_chain.iter().map(|(_, p)| format!("/{p}")).collect();
        patches.insert(
            "[Content_Types].xml".to_string(),
            remove_content_overrides(&content_types, &parts)?.into_bytes(),
        );
        skip.extend(calc_chain.into_iter().map(|(_, path)| path));
    }

    log::debug!(
        "writing {} cells into {} of {}",
        updates.len(),
        sheet_path,
        output_path.display()
    );

    let output_file = File::create(output_path)?;
    let mut zip_writer = ZipWriter::new(output_file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();

        if skip.contains(&name) {
            log::debug!("dropping {}", name);
            continue;
        }

        match patches.get(&name) {
            Some(content) => {
                zip_writer.start_file(name.as_str(), options)?;
                zip_writer.write_all(content)?;
            }
            // Copy as is, without recompressing
            None => zip_writer.raw_copy_file(archive.by_index_raw(i)?)?,
        }
    }

    zip_writer.finish()?;
    Ok(())
}

// Helper functions

pub(crate) fn read_file_from_zip<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    filename: &str,
) -> Result<String> {
    let mut file = archive
        .by_name(filename)
        .with_context(|| format!("Missing part {} in archive", filename))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Sheet names paired with their relationship ids, in workbook order
pub fn parse_sheet_ids(workbook_xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(workbook_xml);
    let mut sheets = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rid = String::new();

                for attr in e.attributes() {
                    let attr = attr?;
                    match (attr.key.prefix().is_some(), attr.key.local_name().as_ref()) {
                        (false, b"name") => name = attr.unescape_value()?.into_owned(),
                        (true, b"id") => rid = attr.unescape_value()?.into_owned(),
                        _ => {}
                    }
                }

                sheets.push((name, rid));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
            _ => {}
        }
    }

    Ok(sheets)
}

/// Relationship id to target mapping of a `.rels` part
pub fn parse_relationships(rels_xml: &str) -> Result<HashMap<String, Relationship>> {
    let mut reader = Reader::from_str(rels_xml);
    let mut rels = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut rel = Relationship {
                    kind: String::new(),
                    target: String::new(),
                };
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value()?.into_owned(),
                        b"Type" => rel.kind = attr.unescape_value()?.into_owned(),
                        b"Target" => rel.target = attr.unescape_value()?.into_owned(),
                        _ => {}
                    }
                }
                rels.insert(id, rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
            _ => {}
        }
    }

    Ok(rels)
}

/// Resolve a relationship target against the folder of its source part
pub fn join_part_path(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn follows_calc_pr(name: &[u8]) -> bool {
    AFTER_CALC_PR.iter().any(|n| *n == name)
}

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, adding the element if missing
fn set_full_calc_on_load(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut done = false;

    let calc_pr = || {
        let mut e = BytesStart::new("calcPr");
        e.push_attribute(("fullCalcOnLoad", "1"));
        e
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"calcPr" => {
                done = true;
                depth += 1;
                writer.write_event(Event::Start(with_attribute(&e, "fullCalcOnLoad", "1")?))?;
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"calcPr" => {
                done = true;
                writer.write_event(Event::Empty(with_attribute(&e, "fullCalcOnLoad", "1")?))?;
            }
            Ok(Event::Start(e)) => {
                if !done && depth == 1 && follows_calc_pr(e.local_name().as_ref()) {
                    writer.write_event(Event::Empty(calc_pr()))?;
                    done = true;
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Ok(Event::Empty(e)) => {
                if !done && depth == 1 && follows_calc_pr(e.local_name().as_ref()) {
                    writer.write_event(Event::Empty(calc_pr()))?;
                    done = true;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Ok(Event::End(e)) => {
                if !done && depth == 1 {
                    writer.write_event(Event::Empty(calc_pr()))?;
                    done = true;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn remove_content_overrides(xml: &str, part_names: &HashSet<String>) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Override" => {
                let mut part_name = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"PartName" {
                        part_name = attr.unescape_value()?.into_owned();
                        break;
                    }
                }

                if !part_names.contains(&part_name) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn remove_relationships(xml: &str, ids: &HashSet<&str>) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"Id" {
                        id = attr.unescape_value()?.into_owned();
                        break;
                    }
                }

                if !ids.contains(id.as_str()) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow::anyhow!("Error parsing XML: {}", e)),
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}
