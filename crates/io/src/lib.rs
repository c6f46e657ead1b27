// File I/O operations

use std::path::Path;

use winegap_recon::model::{RawTable, Value};

pub mod csv;
pub mod json;
pub mod xlsx;

/// Table file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tsv,
    Excel,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Excel),
            "" => Err(format!("{}: file has no extension", path.display())),
            other => Err(format!("{}: unsupported file type '.{other}'", path.display())),
        }
    }
}

/// Read a table: first row is the header, blank rows are skipped.
/// `sheet` selects a worksheet of a spreadsheet; ignored for CSV.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<RawTable, String> {
    match TableFormat::from_path(path)? {
        TableFormat::Csv => csv::import(path),
        TableFormat::Tsv => csv::import_tsv(path),
        TableFormat::Excel => xlsx::import(path, sheet),
    }
}

/// Write a table in the format its extension names. Spreadsheet output is
/// xlsx regardless of the spreadsheet extension given.
pub fn write_table(table: &RawTable, path: &Path) -> Result<(), String> {
    match TableFormat::from_path(path)? {
        TableFormat::Csv => csv::export(table, path),
        TableFormat::Tsv => csv::export_tsv(table, path),
        TableFormat::Excel => xlsx::export(table, path),
    }
}

/// Header names with blanks replaced by `Unnamed: <index>`.
pub(crate) fn header_names(cells: impl IntoIterator<Item = String>) -> Vec<String> {
    cells
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("Unnamed: {i}")
            } else {
                h.to_string()
            }
        })
        .collect()
}

/// Pad or cut a data row to the header width. `None` for all-empty rows.
pub(crate) fn fit_row(mut row: Vec<Value>, width: usize) -> Option<Vec<Value>> {
    if row.iter().all(Value::is_empty) {
        return None;
    }
    row.resize(width, Value::Empty);
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("a.CSV")), Ok(TableFormat::Csv));
        assert_eq!(TableFormat::from_path(Path::new("a.tsv")), Ok(TableFormat::Tsv));
        assert_eq!(TableFormat::from_path(Path::new("dir/a.xlsx")), Ok(TableFormat::Excel));
        assert_eq!(TableFormat::from_path(Path::new("a.ods")), Ok(TableFormat::Excel));
        assert!(TableFormat::from_path(Path::new("a.sheet")).is_err());
        assert!(TableFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_header_names_fill_blanks() {
        let headers = header_names(vec![" URL ".to_string(), String::new(), "Preis".to_string()]);
        assert_eq!(headers, vec!["URL", "Unnamed: 1", "Preis"]);
    }

    #[test]
    fn test_fit_row() {
        assert_eq!(fit_row(vec![Value::Empty, Value::Empty], 3), None);
        assert_eq!(
            fit_row(vec![Value::from("a")], 2),
            Some(vec![Value::from("a"), Value::Empty])
        );
        assert_eq!(
            fit_row(vec![Value::from("a"), Value::from("b"), Value::from("c")], 2),
            Some(vec![Value::from("a"), Value::from("b")])
        );
    }
}
