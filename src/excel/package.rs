//! Raw xlsx package access
//!
//! An xlsx file is a zip of XML parts. Templates are kept as the uploaded
//! package so everything calamine does not model (merged ranges, column
//! widths, data validations, styles, drawings) survives an export. Only the
//! worksheet parts that receive answers are rewritten.

use crate::error::{BridgeError, BridgeResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const ROOT_RELS_PART: &str = "_rels/.rels";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const OFFICE_DOCUMENT_REL: &str = "/officeDocument";

/// Main part content type of a plain (macro-free, non-template) workbook
pub const XLSX_WORKBOOK_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// A worksheet tab and the package part holding its XML
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetPart {
    pub name: String,
    pub part: String,
}

/// Every part of an xlsx package, in archive order
#[derive(Debug, Clone)]
pub struct XlsxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> BridgeResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = file.name().to_string();
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)?;
            parts.push((name, buf));
        }
        Ok(Self { parts })
    }

    /// Whether `bytes` is an xlsx package that can be kept as-is and
    /// exported under an `.xlsx` name. Macro-enabled workbooks, templates,
    /// and non-zip formats (xls, ods) answer `false`.
    pub fn is_plain_xlsx(bytes: &[u8]) -> bool {
        let Ok(package) = Self::from_bytes(bytes) else {
            return false;
        };
        let Ok(workbook) = package.workbook_part() else {
            return false;
        };
        matches!(
            package.content_type(&workbook),
            Ok(Some(ct)) if ct == XLSX_WORKBOOK_CONTENT_TYPE
        )
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(part, _)| part == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        match self.parts.iter_mut().find(|(part, _)| part == name) {
            Some(entry) => entry.1 = bytes,
            None => self.parts.push((name.to_string(), bytes)),
        }
    }

    pub fn remove_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|(part, _)| part != name);
        self.parts.len() != before
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    fn required_part(&self, name: &str) -> BridgeResult<&[u8]> {
        self.part(name)
            .ok_or_else(|| BridgeError::Codec(format!("xlsx package has no part '{}'", name)))
    }

    /// The workbook part named by the root officeDocument relationship
    pub fn workbook_part(&self) -> BridgeResult<String> {
        let rels = match self.part(ROOT_RELS_PART) {
            Some(bytes) => parse_relationships(bytes)?,
            None => return Ok(DEFAULT_WORKBOOK_PART.to_string()),
        };
        let target = rels
            .into_iter()
            .find(|rel| rel.rel_type.ends_with(OFFICE_DOCUMENT_REL))
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());
        Ok(target)
    }

    /// Content type of `part` from `[Content_Types].xml`: an `Override`
    /// wins over the extension `Default`.
    pub fn content_type(&self, part: &str) -> BridgeResult<Option<String>> {
        let xml = self.required_part(CONTENT_TYPES_PART)?;
        let wanted = format!("/{}", part);
        let extension = part.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

        let mut by_default = None;
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    let name = local_name(e.name().as_ref()).to_vec();
                    let attr = |key: &[u8]| -> BridgeResult<Option<String>> {
                        for a in e.attributes() {
                            let a = a?;
                            if local_name(a.key.as_ref()) == key {
                                return Ok(Some(a.unescape_value()?.into_owned()));
                            }
                        }
                        Ok(None)
                    };
                    if name == b"Override" {
                        let part_name = attr(b"PartName")?;
                        if part_name.is_some_and(|p| p.eq_ignore_ascii_case(&wanted)) {
                            return attr(b"ContentType");
                        }
                    } else if name == b"Default" {
                        let ext = attr(b"Extension")?.map(|x| x.to_ascii_lowercase());
                        if ext.is_some() && ext == extension {
                            by_default = attr(b"ContentType")?;
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(by_default)
    }

    /// Tabs in workbook order with their resolved worksheet parts
    pub fn worksheet_parts(&self) -> BridgeResult<Vec<WorksheetPart>> {
        let workbook = self.workbook_part()?;
        let rels = match self.part(&rels_part_name(&workbook)) {
            Some(bytes) => parse_relationships(bytes)?,
            None => Vec::new(),
        };

        let mut sheets = Vec::new();
        let mut reader = Reader::from_reader(self.required_part(&workbook)?);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"sheet" => {
                    let mut name = None;
                    let mut rel_id = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = attr.key.as_ref();
                        // r:id is namespaced; plain `id` is not the relationship
                        if key == b"name" {
                            name = Some(attr.unescape_value()?.into_owned());
                        } else if key != b"id" && local_name(key) == b"id" {
                            rel_id = Some(attr.unescape_value()?.into_owned());
                        }
                    }
                    let (Some(name), Some(rel_id)) = (name, rel_id) else {
                        continue;
                    };
                    if let Some(rel) = rels.iter().find(|rel| rel.id == rel_id) {
                        sheets.push(WorksheetPart {
                            name,
                            part: resolve_target(&workbook, &rel.target),
                        });
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(sheets)
    }

    pub fn to_bytes(&self) -> BridgeResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}

/// `xl/workbook.xml` → `xl/_rels/workbook.xml.rels`
pub(crate) fn rels_part_name(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the folder of its source part.
/// Absolute targets (`/xl/...`) are rooted at the package.
pub(crate) fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split_once('#').map_or(target, |(path, _)| path);
    let (target, base_dir) = match target.strip_prefix('/') {
        Some(absolute) => (absolute, ""),
        None => (
            target,
            base_part.rsplit_once('/').map_or("", |(dir, _)| dir),
        ),
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

pub(crate) fn parse_relationships(xml: &[u8]) -> BridgeResult<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut id = None;
                let mut rel_type = None;
                let mut target = None;
                let mut external = false;
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?.into_owned();
                    match local_name(attr.key.as_ref()) {
                        b"Id" => id = Some(value),
                        b"Type" => rel_type = Some(value),
                        b"Target" => target = Some(value),
                        b"TargetMode" => external = value.eq_ignore_ascii_case("External"),
                        _ => {}
                    }
                }
                if external {
                    continue;
                }
                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    relationships.push(Relationship {
                        id,
                        rel_type,
                        target,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}
