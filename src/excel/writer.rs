//! Spreadsheet writer - [`Workbook`] → .xlsx bytes

use super::{CellValue, TemplateCell, Workbook};
use crate::error::BridgeResult;
use rust_xlsxwriter::{Format, Formula, Workbook as XlsxWorkbook, Worksheet as XlsxWorksheet};

/// Serialize the workbook, keeping tab order, values and formulas.
pub fn write_workbook(workbook: &Workbook) -> BridgeResult<Vec<u8>> {
    let mut xlsx = XlsxWorkbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    for sheet in &workbook.sheets {
        let worksheet = xlsx.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        for (address, cell) in sheet.cells() {
            let (row, col) = address.zero_based();
            write_cell(worksheet, row, col, cell, &date_format, &datetime_format)?;
        }
    }

    Ok(xlsx.save_to_buffer()?)
}

fn write_cell(
    worksheet: &mut XlsxWorksheet,
    row: u32,
    col: u16,
    cell: &TemplateCell,
    date_format: &Format,
    datetime_format: &Format,
) -> BridgeResult<()> {
    if let Some(formula) = &cell.formula {
        let mut formula = Formula::new(formula);
        if let Some(cached) = cell.value.to_text() {
            formula = formula.set_result(cached);
        }
        worksheet.write_formula(row, col, formula)?;
        return Ok(());
    }

    match &cell.value {
        CellValue::Empty => {}
        CellValue::Text(s) => {
            worksheet.write_string(row, col, s)?;
        }
        CellValue::Number(n) => {
            worksheet.write_number(row, col, *n)?;
        }
        CellValue::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        CellValue::DateValue(serial) => {
            let format = if serial.fract() == 0.0 {
                date_format
            } else {
                datetime_format
            };
            worksheet.write_number_with_format(row, col, *serial, format)?;
        }
    }

    Ok(())
}
