//! Answer patches applied to a stored xlsx package
//!
//! Each answer becomes an inline-string cell written straight into the
//! worksheet XML. Rows and cells that receive no answer are streamed through
//! untouched, and so is every other part of the package.

use super::package::{local_name, parse_relationships, rels_part_name, resolve_target, XlsxPackage};
use crate::address::CellAddress;
use crate::error::{BridgeError, BridgeResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::debug;

const CALC_CHAIN_REL: &str = "/calcChain";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Answer text keyed by tab name, then by (row, column)
#[derive(Debug, Clone, Default)]
pub struct CellPatches {
    sheets: BTreeMap<String, BTreeMap<(u32, u16), String>>,
}

impl CellPatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the text for one cell
    pub fn set(&mut self, sheet: &str, address: CellAddress, text: impl Into<String>) {
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .insert((address.row, address.column.index()), text.into());
    }

    pub fn len(&self) -> usize {
        self.sheets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct PatchOutcome {
    pub bytes: Vec<u8>,
    pub written: usize,
    /// Cells whose tab is not in the package
    pub skipped: usize,
}

/// Write `patches` into a copy of the xlsx `template`.
pub fn apply_patches(template: &[u8], patches: &CellPatches) -> BridgeResult<PatchOutcome> {
    if patches.is_empty() {
        return Ok(PatchOutcome {
            bytes: template.to_vec(),
            written: 0,
            skipped: 0,
        });
    }

    let mut package = XlsxPackage::from_bytes(template)?;
    let worksheets = package.worksheet_parts()?;

    let mut written = 0;
    let mut skipped = 0;
    let mut formula_replaced = false;

    for (sheet_name, cells) in &patches.sheets {
        let Some(worksheet) = worksheets.iter().find(|ws| &ws.name == sheet_name) else {
            debug!(sheet = %sheet_name, cells = cells.len(), "tab missing from template, answers skipped");
            skipped += cells.len();
            continue;
        };

        let original = package.part(&worksheet.part).ok_or_else(|| {
            BridgeError::Codec(format!("worksheet part '{}' missing", worksheet.part))
        })?;
        let (updated, replaced) = patch_worksheet_xml(original, cells)?;
        package.set_part(&worksheet.part, updated);

        written += cells.len();
        formula_replaced |= replaced;
    }

    if formula_replaced {
        drop_calc_chain(&mut package)?;
    }

    Ok(PatchOutcome {
        bytes: package.to_bytes()?,
        written,
        skipped,
    })
}

type RowPatches<'a> = BTreeMap<u32, Vec<(u16, &'a str)>>;

fn by_row(cells: &BTreeMap<(u32, u16), String>) -> RowPatches<'_> {
    let mut rows: RowPatches<'_> = BTreeMap::new();
    for (&(row, column), text) in cells {
        rows.entry(row).or_default().push((column, text.as_str()));
    }
    rows
}

/// Returns the patched XML and whether a formula cell was overwritten.
fn patch_worksheet_xml(
    original: &[u8],
    cells: &BTreeMap<(u32, u16), String>,
) -> BridgeResult<(Vec<u8>, bool)> {
    let rows = by_row(cells);
    let mut pending: Vec<u32> = rows.keys().copied().collect();
    pending.reverse();

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + cells.len() * 64));

    let mut buf = Vec::new();
    let mut saw_sheet_data = false;
    let mut formula_replaced = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                formula_replaced |= patch_sheet_data(&mut reader, &mut writer, &rows, &mut pending)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                write_remaining_rows(&mut writer, &rows, &mut pending, None)?;
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                if !saw_sheet_data {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    write_remaining_rows(&mut writer, &rows, &mut pending, None)?;
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), formula_replaced))
}

/// Rows still waiting to be written, smallest last in `pending`. With
/// `before`, only rows numbered below it are flushed.
fn write_remaining_rows(
    writer: &mut Writer<Vec<u8>>,
    rows: &RowPatches<'_>,
    pending: &mut Vec<u32>,
    before: Option<u32>,
) -> BridgeResult<()> {
    while let Some(&row) = pending.last() {
        if before.is_some_and(|limit| row >= limit) {
            break;
        }
        pending.pop();
        let cells = rows.get(&row).map(Vec::as_slice).unwrap_or_default();
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", row.to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        for &(column, text) in cells {
            write_answer_cell(writer, row, column, text, None)?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

fn patch_sheet_data<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    rows: &RowPatches<'_>,
    pending: &mut Vec<u32>,
) -> BridgeResult<bool> {
    let mut buf = Vec::new();
    let mut formula_replaced = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_start = e.into_owned();
                let Some(row_num) = row_number(&row_start)? else {
                    writer.write_event(Event::Start(row_start))?;
                    continue;
                };
                write_remaining_rows(writer, rows, pending, Some(row_num))?;

                writer.write_event(Event::Start(row_start))?;
                if let Some(cells) = rows.get(&row_num) {
                    if pending.last() == Some(&row_num) {
                        pending.pop();
                    }
                    formula_replaced |= patch_row(reader, writer, row_num, cells)?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_empty = e.into_owned();
                let Some(row_num) = row_number(&row_empty)? else {
                    writer.write_event(Event::Empty(row_empty))?;
                    continue;
                };
                write_remaining_rows(writer, rows, pending, Some(row_num))?;

                match rows.get(&row_num) {
                    Some(cells) => {
                        if pending.last() == Some(&row_num) {
                            pending.pop();
                        }
                        writer.write_event(Event::Start(row_empty))?;
                        for &(column, text) in cells {
                            write_answer_cell(writer, row_num, column, text, None)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new("row")))?;
                    }
                    None => writer.write_event(Event::Empty(row_empty))?,
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_remaining_rows(writer, rows, pending, None)?;
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(BridgeError::Codec(
                    "unexpected end of worksheet inside sheetData".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(formula_replaced)
}

/// Copy one `<row>` through, replacing or inserting the answer cells in
/// column order. Writes the closing `</row>`.
fn patch_row<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u16, &str)],
) -> BridgeResult<bool> {
    let mut buf = Vec::new();
    let mut next = 0usize;
    let mut formula_replaced = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let cell_start = e.into_owned();
                let Some((address, style)) = cell_reference(&cell_start)? else {
                    writer.write_event(Event::Start(cell_start))?;
                    continue;
                };
                if address.row != row_num {
                    writer.write_event(Event::Start(cell_start))?;
                    continue;
                }

                let column = address.column.index();
                while next < cells.len() && cells[next].0 < column {
                    write_answer_cell(writer, row_num, cells[next].0, cells[next].1, None)?;
                    next += 1;
                }

                if next < cells.len() && cells[next].0 == column {
                    formula_replaced |= skip_cell(reader)?;
                    write_answer_cell(writer, row_num, column, cells[next].1, style.as_deref())?;
                    next += 1;
                } else {
                    writer.write_event(Event::Start(cell_start))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let cell_empty = e.into_owned();
                let Some((address, style)) = cell_reference(&cell_empty)? else {
                    writer.write_event(Event::Empty(cell_empty))?;
                    continue;
                };
                if address.row != row_num {
                    writer.write_event(Event::Empty(cell_empty))?;
                    continue;
                }

                let column = address.column.index();
                while next < cells.len() && cells[next].0 < column {
                    write_answer_cell(writer, row_num, cells[next].0, cells[next].1, None)?;
                    next += 1;
                }

                if next < cells.len() && cells[next].0 == column {
                    write_answer_cell(writer, row_num, column, cells[next].1, style.as_deref())?;
                    next += 1;
                } else {
                    writer.write_event(Event::Empty(cell_empty))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                for &(column, text) in &cells[next..] {
                    write_answer_cell(writer, row_num, column, text, None)?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(BridgeError::Codec(
                    "unexpected end of worksheet inside a row".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(formula_replaced)
}

/// Consume a replaced cell's children up to `</c>`. `true` when it held a formula.
fn skip_cell<R: std::io::BufRead>(reader: &mut Reader<R>) -> BridgeResult<bool> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    let mut had_formula = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
                depth += 1;
            }
            Event::Empty(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(had_formula);
                }
            }
            Event::Eof => {
                return Err(BridgeError::Codec(
                    "unexpected end of worksheet inside a cell".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
}

/// `<c r="C5" s="3" t="inlineStr"><is><t>answer</t></is></c>`, keeping the
/// cell's existing style index.
fn write_answer_cell(
    writer: &mut Writer<Vec<u8>>,
    row: u32,
    column: u16,
    text: &str,
    style: Option<&str>,
) -> BridgeResult<()> {
    let reference = crate::address::format(column, row);
    let mut cell = BytesStart::new("c");
    cell.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        cell.push_attribute(("s", style));
    }
    cell.push_attribute(("t", "inlineStr"));
    writer.write_event(Event::Start(cell))?;
    writer.write_event(Event::Start(BytesStart::new("is")))?;

    let text = xml_safe(text);
    let mut t = BytesStart::new("t");
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        t.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(t))?;
    writer.write_event(Event::Text(BytesText::new(text.as_ref())))?;
    writer.write_event(Event::End(BytesEnd::new("t")))?;

    writer.write_event(Event::End(BytesEnd::new("is")))?;
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

/// Drop characters XML 1.0 cannot carry
fn xml_safe(text: &str) -> Cow<'_, str> {
    let allowed = |c: char| {
        !matches!(
            c,
            '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}'
        )
    };
    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

fn row_number(row: &BytesStart<'_>) -> BridgeResult<Option<u32>> {
    for attr in row.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            return Ok(attr.unescape_value()?.parse::<u32>().ok());
        }
    }
    Ok(None)
}

/// Address and style index of a `<c>` element
fn cell_reference(cell: &BytesStart<'_>) -> BridgeResult<Option<(CellAddress, Option<String>)>> {
    let mut reference = None;
    let mut style = None;
    for attr in cell.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => reference = Some(attr.unescape_value()?.into_owned()),
            b"s" => style = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok(reference
        .and_then(|r| CellAddress::parse(&r).ok())
        .map(|address| (address, style)))
}

/// The calculation chain lists formula cells; once one is overwritten it is
/// stale and Excel rebuilds it when the part is absent.
fn drop_calc_chain(package: &mut XlsxPackage) -> BridgeResult<()> {
    let workbook = package.workbook_part()?;
    let rels_name = rels_part_name(&workbook);
    let Some(rels_xml) = package.part(&rels_name) else {
        return Ok(());
    };
    let Some(rel) = parse_relationships(rels_xml)?
        .into_iter()
        .find(|rel| rel.rel_type.ends_with(CALC_CHAIN_REL))
    else {
        return Ok(());
    };
    let calc_chain = resolve_target(&workbook, &rel.target);

    let rels = remove_empty_elements(rels_xml, b"Relationship", b"Id", &rel.id)?;
    package.set_part(&rels_name, rels);

    if let Some(content_types) = package.part(CONTENT_TYPES_PART) {
        let updated = remove_empty_elements(
            content_types,
            b"Override",
            b"PartName",
            &format!("/{}", calc_chain),
        )?;
        package.set_part(CONTENT_TYPES_PART, updated);
    }

    package.remove_part(&calc_chain);
    debug!(part = %calc_chain, "calculation chain dropped");
    Ok(())
}

/// Copy `xml`, leaving out `<element .../>` entries whose `key` equals `value`
fn remove_empty_elements(xml: &[u8], element: &[u8], key: &[u8], value: &str) -> BridgeResult<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if local_name(e.name().as_ref()) == element => {
                let mut matched = false;
                for attr in e.attributes() {
                    let attr = attr?;
                    if local_name(attr.key.as_ref()) == key && attr.unescape_value()? == value {
                        matched = true;
                    }
                }
                if !matched {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}
