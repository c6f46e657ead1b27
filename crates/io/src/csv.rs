// CSV/TSV import/export

use std::io::Read;
use std::path::Path;

use log::debug;
use winegap_recon::model::{RawTable, Value};

use crate::{fit_row, header_names};

pub fn import(path: &Path) -> Result<RawTable, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    debug!("{}: delimiter {:?}", path.display(), delimiter as char);
    import_from_string(&content, delimiter).map_err(|e| format!("{}: {e}", path.display()))
}

pub fn import_tsv(path: &Path) -> Result<RawTable, String> {
    let content = read_file_as_utf8(path)?;
    import_from_string(&content, b'\t').map_err(|e| format!("{}: {e}", path.display()))
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the header line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Score: (number of lines with same field count as line 1) * field_count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| format!("{}: {e}", path.display()))?;

    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            // Fall back to Windows-1252 (common for Excel-exported CSVs)
            debug!("{}: not UTF-8, decoding as Windows-1252", path.display());
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    // Excel writes a BOM in front of UTF-8 CSVs
    Ok(content
        .strip_prefix('\u{feff}')
        .map(str::to_string)
        .unwrap_or(content))
}

fn cell(field: &str) -> Value {
    if field.trim().is_empty() {
        Value::Empty
    } else {
        Value::Text(field.to_string())
    }
}

fn import_from_string(content: &str, delimiter: u8) -> Result<RawTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers = loop {
        match records.next() {
            None => return Ok(RawTable::default()),
            Some(record) => {
                let record = record.map_err(|e| e.to_string())?;
                if record.iter().any(|f| !f.trim().is_empty()) {
                    break header_names(record.iter().map(str::to_string));
                }
            }
        }
    };

    let width = headers.len();
    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| e.to_string())?;
        if let Some(row) = fit_row(record.iter().map(cell).collect(), width) {
            rows.push(row);
        }
    }

    Ok(RawTable::new(headers, rows))
}

pub fn export(table: &RawTable, path: &Path) -> Result<(), String> {
    export_with_delimiter(table, path, b',')
}

pub fn export_tsv(table: &RawTable, path: &Path) -> Result<(), String> {
    export_with_delimiter(table, path, b'\t')
}

fn export_with_delimiter(table: &RawTable, path: &Path, delimiter: u8) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| format!("{}: {e}", path.display()))?;

    writer.write_record(&table.headers).map_err(|e| e.to_string())?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Preis;Region\nMerlot;12.5;Schweiz, Tessin\nRioja;19;Spanien, Rioja\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Name,Preis,Weintyp\nMerlot,12.5,Rotwein\nRioja,19,Rotwein\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Name\tPreis\tWeintyp\nMerlot\t12.5\tRotwein\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_pipe_delimiter() {
        let content = "Name|Preis|Weintyp\nMerlot|12.5|Rotwein\n";
        assert_eq!(sniff_delimiter(content), b'|');
    }

    #[test]
    fn test_sniff_comma_with_quoted_regions() {
        let content = "URL,Name,Region\na,Pomerol,\"Frankreich, Bordeaux, Pomerol\"\nb,Fendant,\"Schweiz, Wallis\"\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_import_pads_and_skips_blank_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        fs::write(&path, "SKU;net_product_sales;\n45;1200\n\n;;\n77;300;x;extra\n").unwrap();

        let table = import(&path).unwrap();
        assert_eq!(table.headers, vec!["SKU", "net_product_sales", "Unnamed: 2"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec![Value::from("45"), Value::from("1200"), Value::Empty]);
        assert_eq!(table.rows[1].len(), 3);
        assert_eq!(table.rows[1][2], Value::from("x"));
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coop.csv");
        // "Rosé" and "Rhône" in Windows-1252
        let mut bytes = b"Weintyp,Region\nRos".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b",Rh");
        bytes.push(0xF4);
        bytes.extend_from_slice(b"ne\n");
        fs::write(&path, bytes).unwrap();

        let table = import(&path).unwrap();
        assert_eq!(table.rows[0], vec![Value::from("Rosé"), Value::from("Rhône")]);
    }

    #[test]
    fn test_bom_is_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bom.csv");
        fs::write(&path, "\u{feff}Sku,Lieferant\n45,Vini Italia\n").unwrap();
        assert_eq!(import(&path).unwrap().headers[0], "Sku");
    }

    #[test]
    fn test_empty_file_has_no_headers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "\n\n").unwrap();
        let table = import(&path).unwrap();
        assert!(table.headers.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = import(Path::new("/nonexistent/winegap.csv")).unwrap_err();
        assert!(err.contains("/nonexistent/winegap.csv"));
    }

    #[test]
    fn test_tsv_export_then_import() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gaps.tsv");
        let table = RawTable::new(
            vec!["URL".into(), "Preis".into()],
            vec![
                vec![Value::from("https://coop.ch/a"), Value::Number(12.0)],
                vec![Value::from("https://coop.ch/b"), Value::Number(9.95)],
            ],
        );
        export_tsv(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("https://coop.ch/a\t12\n"));

        let back = import_tsv(&path).unwrap();
        assert_eq!(back.headers, table.headers);
        assert_eq!(back.rows[1][1], Value::from("9.95"));
    }
}
