//! Spreadsheet reader - calamine → [`Workbook`]

use super::{CellValue, TemplateCell, Workbook, Worksheet};
use crate::address::{CellAddress, Column};
use crate::error::{BridgeError, BridgeResult};
use calamine::{
    open_workbook_auto, open_workbook_auto_from_rs, Data, ExcelDateTime, ExcelDateTimeType, Range,
    Reader, Sheets,
};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;

/// Read every tab of the spreadsheet at `path`.
pub fn read_workbook(path: &Path) -> BridgeResult<Workbook> {
    let sheets = open_workbook_auto(path).map_err(|e| {
        BridgeError::UnreadableDocument(format!("{}: {}", path.display(), e))
    })?;
    load(sheets)
}

/// Read a spreadsheet held in memory (stored templates).
pub fn read_workbook_bytes(bytes: &[u8]) -> BridgeResult<Workbook> {
    let sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| BridgeError::UnreadableDocument(e.to_string()))?;
    load(sheets)
}

fn load<RS: Read + Seek>(mut sheets: Sheets<RS>) -> BridgeResult<Workbook> {
    let mut workbook = Workbook::new();

    for name in sheets.sheet_names().to_vec() {
        let range = sheets.worksheet_range(&name).map_err(|e| {
            BridgeError::UnreadableDocument(format!("worksheet '{}': {}", name, e))
        })?;
        // Not every format exposes formulas; values alone are enough then.
        let formulas = sheets.worksheet_formula(&name).ok();

        let worksheet = build_worksheet(&name, &range, formulas.as_ref())?;
        debug!(sheet = %name, cells = worksheet.len(), "loaded worksheet");
        workbook.add_sheet(worksheet);
    }

    if workbook.sheets.is_empty() {
        return Err(BridgeError::UnreadableDocument(
            "no worksheets found in file".to_string(),
        ));
    }

    Ok(workbook)
}

fn build_worksheet(
    name: &str,
    range: &Range<Data>,
    formulas: Option<&Range<String>>,
) -> BridgeResult<Worksheet> {
    let mut worksheet = Worksheet::new(name);

    // used_cells() is relative to the range start, not to A1
    let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
    for (row, col, data) in range.used_cells() {
        let value = convert_data(data);
        if value == CellValue::Empty {
            continue;
        }
        let address = absolute_address(row_offset as usize + row, col_offset as usize + col)?;
        worksheet.set_value(address, value);
    }

    if let Some(formulas) = formulas {
        let (row_offset, col_offset) = formulas.start().unwrap_or((0, 0));
        for (row, col, formula) in formulas.used_cells() {
            if formula.is_empty() {
                continue;
            }
            let address = absolute_address(row_offset as usize + row, col_offset as usize + col)?;
            let value = worksheet.value(address).clone();
            worksheet.set_cell(
                address,
                TemplateCell {
                    value,
                    formula: Some(formula.clone()),
                },
            );
        }
    }

    Ok(worksheet)
}

fn absolute_address(row: usize, col: usize) -> BridgeResult<CellAddress> {
    let column = u16::try_from(col + 1)
        .map_err(|_| BridgeError::UnreadableDocument(format!("column {} out of range", col)))?;
    let row = u32::try_from(row + 1)
        .map_err(|_| BridgeError::UnreadableDocument(format!("row {} out of range", row)))?;
    CellAddress::new(Column::new(column)?, row)
}

/// Map calamine data onto the codec value variant
pub(crate) fn convert_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateValue(date_serial(dt)),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

/// Days between the 1900 and 1904 date-system epochs
const EPOCH_1904_OFFSET: f64 = 1462.0;

/// Serial in the 1900 date system, whichever system the workbook uses.
/// Durations carry no epoch and pass through unchanged.
fn date_serial(dt: &ExcelDateTime) -> f64 {
    let serial = dt.as_f64();
    if dt.is_duration() {
        return serial;
    }
    let as_1900 = ExcelDateTime::new(serial, ExcelDateTimeType::DateTime, false);
    if *dt == as_1900 {
        serial
    } else {
        serial + EPOCH_1904_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_data_variants() {
        assert_eq!(convert_data(&Data::Empty), CellValue::Empty);
        assert_eq!(
            convert_data(&Data::String("Hosting".to_string())),
            CellValue::Text("Hosting".to_string())
        );
        assert_eq!(convert_data(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(convert_data(&Data::Float(1.5)), CellValue::Number(1.5));
        assert_eq!(convert_data(&Data::Bool(false)), CellValue::Bool(false));
        assert_eq!(
            convert_data(&Data::DateTimeIso("2025-01-01T00:00:00".to_string())),
            CellValue::Text("2025-01-01T00:00:00".to_string())
        );
        assert_eq!(
            convert_data(&Data::Error(calamine::CellErrorType::Div0)),
            CellValue::Empty
        );
    }

    #[test]
    fn test_dates_normalize_to_1900_system() {
        let in_1900 = ExcelDateTime::new(45658.0, ExcelDateTimeType::DateTime, false);
        assert_eq!(
            convert_data(&Data::DateTime(in_1900)),
            CellValue::DateValue(45658.0)
        );

        // 44196 in the 1904 system is 2025-01-01
        let in_1904 = ExcelDateTime::new(44196.0, ExcelDateTimeType::DateTime, true);
        let value = convert_data(&Data::DateTime(in_1904));
        assert_eq!(value, CellValue::DateValue(45658.0));
        assert_eq!(value.to_text(), Some("2025-01-01".to_string()));

        let duration = ExcelDateTime::new(0.5, ExcelDateTimeType::TimeDelta, true);
        assert_eq!(
            convert_data(&Data::DateTime(duration)),
            CellValue::DateValue(0.5)
        );
    }

    #[test]
    fn test_absolute_address_is_one_based() {
        let addr = absolute_address(2, 2).unwrap();
        assert_eq!(addr.to_string(), "C3");
    }

    #[test]
    fn test_read_missing_file_is_unreadable() {
        let result = read_workbook(Path::new("/nonexistent/questionnaire.xlsx"));
        assert!(matches!(result, Err(BridgeError::UnreadableDocument(_))));
    }

    #[test]
    fn test_read_garbage_bytes_is_unreadable() {
        let result = read_workbook_bytes(b"definitely not a zip archive");
        assert!(matches!(result, Err(BridgeError::UnreadableDocument(_))));
    }
}
