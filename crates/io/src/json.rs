// JSON export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value as Json};
use winegap_recon::model::{RawTable, Value};

/// Table as an array of objects keyed by header. Empty cells become `null`.
pub fn table_to_json(table: &RawTable) -> Json {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Json> = table
                .headers
                .iter()
                .zip(row)
                .map(|(header, value)| {
                    let json = match value {
                        Value::Empty => Json::Null,
                        Value::Number(n) => serde_json::Number::from_f64(*n)
                            .map(Json::Number)
                            .unwrap_or(Json::Null),
                        Value::Text(s) => Json::String(s.clone()),
                    };
                    (header.clone(), json)
                })
                .collect();
            Json::Object(object)
        })
        .collect();
    Json::Array(rows)
}

/// Pretty-printed JSON of any serializable value, to a file.
pub fn export<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| e.to_string())?;
    writer.write_all(b"\n").map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}
