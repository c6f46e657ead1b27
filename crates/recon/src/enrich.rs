//! Enrichment joins: pull one auxiliary column onto the match table.
//!
//! Both sides go through [`key_of`], the same key function gap detection
//! uses. The join is a left join: every match row survives in order.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::Serialize;

use crate::config::{EnrichPass, ValueKind};
use crate::model::{MatchField, MatchTable, RawTable, Value};
use crate::normalize::key_of;
use crate::outcome::{Outcome, Warning};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichDiagnostics {
    pub column: String,
    /// Distinct keys on the match-table side.
    pub match_keys: usize,
    /// Distinct keys in the auxiliary table.
    pub lookup_keys: usize,
    pub common_keys: usize,
    pub filled_rows: usize,
    /// Auxiliary keys seen on more than one row.
    pub duplicate_keys: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedColumn {
    pub name: String,
    pub values: Vec<Value>,
    pub diagnostics: EnrichDiagnostics,
}

/// An all-empty column for a pass that could not run.
pub fn skipped_column(matches: &MatchTable, pass: &EnrichPass, warning: Warning) -> Outcome<EnrichedColumn> {
    warn!("{warning}");
    Outcome::Warning(
        EnrichedColumn {
            name: pass.column.clone(),
            values: vec![Value::Empty; matches.len()],
            diagnostics: EnrichDiagnostics {
                column: pass.column.clone(),
                ..EnrichDiagnostics::default()
            },
        },
        vec![warning],
    )
}

fn skip(pass: &EnrichPass, reason: impl Into<String>) -> Warning {
    Warning::EnrichmentSkipped {
        column: pass.column.clone(),
        reason: reason.into(),
    }
}

/// Match-side key per row, from the secondary id or the pass override.
fn match_side_keys(matches: &MatchTable, pass: &EnrichPass) -> Result<Vec<Option<String>>, Warning> {
    match &pass.match_column {
        Some(name) => {
            let probe = RawTable::new(matches.headers.clone(), Vec::new());
            let col = probe.column(name).ok_or_else(|| Warning::MissingColumn {
                table: "matches".into(),
                column: name.clone(),
            })?;
            Ok(matches
                .records
                .iter()
                .map(|r| r.raw.get(col).and_then(key_of))
                .collect())
        }
        None => {
            if !matches.has(MatchField::SecondaryId) {
                return Err(skip(pass, "match table has no secondary id column"));
            }
            Ok(matches.records.iter().map(|r| key_of(&r.secondary_id)).collect())
        }
    }
}

pub fn enrich(matches: &MatchTable, aux: Option<&RawTable>, pass: &EnrichPass) -> Outcome<EnrichedColumn> {
    let Some(aux) = aux else {
        return skipped_column(matches, pass, skip(pass, format!("{} not available", pass.file)));
    };
    let keys = match match_side_keys(matches, pass) {
        Ok(keys) => keys,
        Err(w) => return skipped_column(matches, pass, w),
    };
    let Some(key_col) = aux.column(&pass.key) else {
        return skipped_column(
            matches,
            pass,
            Warning::MissingColumn { table: pass.file.clone(), column: pass.key.clone() },
        );
    };
    let Some(value_col) = aux.column(&pass.value) else {
        return skipped_column(
            matches,
            pass,
            Warning::MissingColumn { table: pass.file.clone(), column: pass.value.clone() },
        );
    };

    let mut warnings = Vec::new();
    let mut unparseable = 0usize;
    let mut example = None;

    // First row per key wins.
    let mut lookup: HashMap<String, Value> = HashMap::new();
    let mut duplicates: HashSet<String> = HashSet::new();
    for i in 0..aux.len() {
        let Some(key) = key_of(aux.cell(i, key_col)) else {
            continue;
        };
        if lookup.contains_key(&key) {
            duplicates.insert(key);
            continue;
        }
        let cell = aux.cell(i, value_col);
        let value = match pass.kind {
            ValueKind::Text => cell.as_text().map_or(Value::Empty, Value::Text),
            ValueKind::Number => match cell.as_number() {
                Some(n) => Value::Number(n),
                None => {
                    if !cell.is_empty() {
                        unparseable += 1;
                        example.get_or_insert_with(|| cell.to_string());
                    }
                    Value::Empty
                }
            },
        };
        lookup.insert(key, value);
    }

    if unparseable > 0 {
        warnings.push(Warning::UnparseableValues {
            table: pass.file.clone(),
            column: pass.value.clone(),
            count: unparseable,
            example: example.unwrap_or_default(),
        });
    }
    if !duplicates.is_empty() {
        warnings.push(Warning::DuplicateKeys {
            table: pass.file.clone(),
            column: pass.key.clone(),
            count: duplicates.len(),
        });
    }

    let values: Vec<Value> = keys
        .iter()
        .map(|k| {
            k.as_ref()
                .and_then(|k| lookup.get(k))
                .cloned()
                .unwrap_or(Value::Empty)
        })
        .collect();

    let match_keys: HashSet<&String> = keys.iter().flatten().collect();
    let common_keys = match_keys.iter().filter(|k| lookup.contains_key(**k)).count();
    let diagnostics = EnrichDiagnostics {
        column: pass.column.clone(),
        match_keys: match_keys.len(),
        lookup_keys: lookup.len(),
        common_keys,
        filled_rows: values.iter().filter(|v| !v.is_empty()).count(),
        duplicate_keys: duplicates.len(),
    };
    debug!(
        "enrich {}: match_keys={} lookup_keys={} common={} filled={} duplicates={}",
        diagnostics.column,
        diagnostics.match_keys,
        diagnostics.lookup_keys,
        diagnostics.common_keys,
        diagnostics.filled_rows,
        diagnostics.duplicate_keys,
    );

    if diagnostics.common_keys == 0 && diagnostics.match_keys > 0 && diagnostics.lookup_keys > 0 {
        warn!(
            "enrich {}: no keys in common between match table and {}",
            pass.column, pass.file
        );
    }
    if diagnostics.filled_rows == 0 && diagnostics.common_keys > 0 {
        warnings.push(Warning::SparseEnrichment {
            column: pass.column.clone(),
            common_keys: diagnostics.common_keys,
        });
    }

    Outcome::from_parts(
        EnrichedColumn {
            name: pass.column.clone(),
            values,
            diagnostics,
        },
        warnings,
    )
}

/// The match table as read plus the enriched columns. A column that
/// already exists under the same name is overwritten.
pub fn enriched_table(matches: &MatchTable, columns: &[EnrichedColumn]) -> RawTable {
    let mut table = matches.to_raw();
    for column in columns {
        let idx = match table.column(&column.name) {
            Some(idx) => idx,
            None => {
                table.headers.push(column.name.clone());
                for row in &mut table.rows {
                    row.push(Value::Empty);
                }
                table.headers.len() - 1
            }
        };
        for (row, value) in table.rows.iter_mut().zip(&column.values) {
            row[idx] = value.clone();
        }
    }
    table
}

/// Look up an enriched value for a match row by column name.
pub fn column_value<'a>(columns: &'a [EnrichedColumn], name: &str, row: usize) -> Option<&'a Value> {
    columns
        .iter()
        .find(|c| c.name == name)
        .and_then(|c| c.values.get(row))
        .filter(|v| !v.is_empty())
}
