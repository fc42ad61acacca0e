//! Spreadsheet codec boundary
//!
//! Workbooks are read with calamine into a small in-memory model. Answers go
//! back into the stored xlsx package as patches, so the template's layout is
//! never regenerated:
//! - Read: .xlsx/.xlsm/.xls/.ods (path or byte buffer) → [`Workbook`]
//! - Patch: xlsx bytes + [`CellPatches`] → xlsx bytes
//! - Write: [`Workbook`] → .xlsx bytes, for sources that are not plain xlsx

mod package;
mod patch;
mod reader;
mod writer;

pub use package::{WorksheetPart, XlsxPackage, XLSX_WORKBOOK_CONTENT_TYPE};
pub use patch::{apply_patches, CellPatches, PatchOutcome};
pub use reader::{read_workbook, read_workbook_bytes};
pub use writer::write_workbook;

use crate::address::CellAddress;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;

/// Cell value as seen at the codec boundary
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date (days since 1899-12-30, fraction = time of day)
    DateValue(f64),
}

impl CellValue {
    /// Text stored for this value, or `None` when the cell counts as blank.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                if s.trim().is_empty() {
                    None
                } else {
                    Some(s.clone())
                }
            }
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            CellValue::DateValue(serial) => Some(format_serial_date(*serial)),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.to_text().is_none()
    }
}

/// Integral values print without a fraction (42.0 → "42")
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// `None` when the serial is not finite or falls outside chrono's range
pub(crate) fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    // `as` saturates, and try_milliseconds rejects what chrono cannot hold
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::try_milliseconds(millis)?)
}

fn format_serial_date(serial: f64) -> String {
    match serial_to_datetime(serial) {
        Some(dt) if dt.num_seconds_from_midnight() == 0 => dt.format("%Y-%m-%d").to_string(),
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format_number(serial),
    }
}

/// A stored cell: its value plus the formula that produced it, if any
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCell {
    pub value: CellValue,
    pub formula: Option<String>,
}

impl TemplateCell {
    pub fn value(value: CellValue) -> Self {
        Self {
            value,
            formula: None,
        }
    }
}

/// One tab of a workbook
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    pub name: String,
    cells: BTreeMap<CellAddress, TemplateCell>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn get(&self, address: CellAddress) -> Option<&TemplateCell> {
        self.cells.get(&address)
    }

    /// Value at `address`, `Empty` when the cell was never written
    pub fn value(&self, address: CellAddress) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells
            .get(&address)
            .map(|cell| &cell.value)
            .unwrap_or(&EMPTY)
    }

    pub fn set_cell(&mut self, address: CellAddress, cell: TemplateCell) {
        if cell.value == CellValue::Empty && cell.formula.is_none() {
            self.cells.remove(&address);
        } else {
            self.cells.insert(address, cell);
        }
    }

    /// Overwrite the cell with a plain value, dropping any formula
    pub fn set_value(&mut self, address: CellAddress, value: CellValue) {
        self.set_cell(address, TemplateCell::value(value));
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellAddress, &TemplateCell)> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Tabs in their original order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: Worksheet) {
        self.sheets.push(sheet);
    }

    /// Look up a tab by exact, case-sensitive name
    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse(s).unwrap()
    }

    #[test]
    fn test_to_text_conversions() {
        assert_eq!(CellValue::Empty.to_text(), None);
        assert_eq!(CellValue::Text("   ".to_string()).to_text(), None);
        assert_eq!(
            CellValue::Text("Acme portal".to_string()).to_text(),
            Some("Acme portal".to_string())
        );
        assert_eq!(CellValue::Number(42.0).to_text(), Some("42".to_string()));
        assert_eq!(CellValue::Number(0.0).to_text(), Some("0".to_string()));
        assert_eq!(CellValue::Number(3.25).to_text(), Some("3.25".to_string()));
        assert_eq!(CellValue::Bool(true).to_text(), Some("TRUE".to_string()));
    }

    #[test]
    fn test_date_value_to_text() {
        // 45658 = 2025-01-01
        assert_eq!(
            CellValue::DateValue(45658.0).to_text(),
            Some("2025-01-01".to_string())
        );
        assert_eq!(
            CellValue::DateValue(45658.5).to_text(),
            Some("2025-01-01 12:00:00".to_string())
        );
    }

    #[test]
    fn test_out_of_range_date_falls_back_to_number() {
        assert_eq!(serial_to_datetime(-1.0e20), None);
        assert_eq!(serial_to_datetime(1.0e20), None);
        assert_eq!(serial_to_datetime(f64::NAN), None);
        assert_eq!(
            CellValue::DateValue(-1.0e20).to_text(),
            Some("-100000000000000000000".to_string())
        );
        assert_eq!(
            CellValue::DateValue(f64::INFINITY).to_text(),
            Some("inf".to_string())
        );
    }

    #[test]
    fn test_worksheet_set_value_drops_formula() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_cell(
            addr("B2"),
            TemplateCell {
                value: CellValue::Number(3.0),
                formula: Some("1+2".to_string()),
            },
        );
        ws.set_value(addr("B2"), CellValue::Text("override".to_string()));

        let cell = ws.get(addr("B2")).unwrap();
        assert_eq!(cell.value, CellValue::Text("override".to_string()));
        assert!(cell.formula.is_none());
    }

    #[test]
    fn test_worksheet_empty_value_removes_cell() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_value(addr("A1"), CellValue::Text("x".to_string()));
        assert_eq!(ws.len(), 1);
        ws.set_value(addr("A1"), CellValue::Empty);
        assert!(ws.is_empty());
        assert_eq!(ws.value(addr("A1")), &CellValue::Empty);
    }

    #[test]
    fn test_workbook_lookup_is_exact() {
        let mut wb = Workbook::new();
        wb.add_sheet(Worksheet::new("4 - 3rd Party Assessment "));
        assert!(wb.sheet("4 - 3rd Party Assessment ").is_some());
        assert!(wb.sheet("4 - 3rd Party Assessment").is_none());
        assert!(wb.sheet("4 - 3RD PARTY ASSESSMENT ").is_none());
    }
}
