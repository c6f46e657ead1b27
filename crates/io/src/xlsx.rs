// Excel file import (xlsx, xls, xlsb, ods) and export (xlsx only)
//
// Import: the header row plus data rows of one worksheet, as raw cells.
// Export: a plain table with a bold, frozen header row.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use log::debug;
use rust_xlsxwriter::{Format, Workbook};
use winegap_recon::model::{RawTable, Value};

use crate::{fit_row, header_names};

/// Excel's row limit.
const MAX_ROWS: usize = 1_048_576;

fn cell(data: &Data) -> Value {
    match data {
        Data::Empty | Data::Error(_) => Value::Empty,
        Data::String(s) if s.trim().is_empty() => Value::Empty,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(n) => Value::Number(*n),
        Data::Int(n) => Value::Number(*n as f64),
        Data::Bool(b) => Value::from(if *b { "TRUE" } else { "FALSE" }),
        // Serial date number, 1900 date system assumed
        Data::DateTime(dt) => Value::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

/// Import one worksheet: `sheet` by name, or the first one.
pub fn import(path: &Path, sheet: Option<&str>) -> Result<RawTable, String> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| format!("{}: failed to open Excel file: {e}", path.display()))?;

    let sheet_name = match sheet {
        Some(name) => {
            if !workbook.sheet_names().iter().any(|s| s == name) {
                return Err(format!(
                    "{}: no sheet named '{name}' (available: {})",
                    path.display(),
                    workbook.sheet_names().join(", ")
                ));
            }
            name.to_string()
        }
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| format!("{}: Excel file contains no sheets", path.display()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| format!("{}: failed to read sheet '{sheet_name}': {e}", path.display()))?;
    debug!(
        "{}: sheet '{sheet_name}' {}x{}",
        path.display(),
        range.height(),
        range.width()
    );

    let mut rows = range.rows();
    let headers = loop {
        match rows.next() {
            None => return Ok(RawTable::default()),
            Some(row) if row.iter().all(|d| cell(d).is_empty()) => continue,
            Some(row) => break header_names(row.iter().map(|d| cell(d).to_string())),
        }
    };

    let width = headers.len();
    let data = rows
        .take(MAX_ROWS)
        .filter_map(|row| fit_row(row.iter().map(cell).collect(), width))
        .collect();

    Ok(RawTable::new(headers, data))
}

/// Export a table to a single-sheet xlsx workbook.
pub fn export(table: &RawTable, path: &Path) -> Result<(), String> {
    if table.len() + 1 > MAX_ROWS {
        return Err(format!(
            "{} rows exceed the xlsx row limit of {MAX_ROWS}",
            table.len()
        ));
    }
    if table.headers.len() > u16::MAX as usize {
        return Err(format!("{} columns exceed the xlsx column limit", table.headers.len()));
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &bold)
            .map_err(|e| format!("Failed to write header '{header}': {e}"))?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        let row32 = (row_idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let col16 = col as u16;
            match value {
                Value::Empty => {}
                Value::Number(n) if n.is_finite() => {
                    worksheet
                        .write_number(row32, col16, *n)
                        .map_err(|e| format!("Failed to write cell: {e}"))?;
                }
                other => {
                    worksheet
                        .write_string(row32, col16, other.to_string())
                        .map_err(|e| format!("Failed to write cell: {e}"))?;
                }
            }
        }
    }

    if !table.headers.is_empty() {
        worksheet
            .set_freeze_panes(1, 0)
            .map_err(|e| format!("Failed to freeze header row: {e}"))?;
    }

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {e}"))?;
    Ok(())
}
