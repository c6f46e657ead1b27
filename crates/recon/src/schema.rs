//! Schema binding: raw tables to typed records.
//!
//! Each table is checked once here. Missing columns and unparseable cells
//! become warnings and `None` fields; nothing downstream re-validates.

use std::collections::BTreeSet;

use crate::config::{CatalogConfig, MatchTableConfig, StatusConfig};
use crate::error::ReconError;
use crate::model::{
    CatalogField, CatalogRecord, CatalogRole, CatalogTable, MatchConfidence, MatchField,
    MatchRecord, MatchTable, RawTable, StatusLabels, Value,
};
use crate::outcome::{Outcome, Warning};

/// Spreadsheet row number of a 0-based data row (header is row 1).
pub fn sheet_row(index: usize) -> usize {
    index + 2
}

/// Per-column tally of cells that failed coercion.
struct Unparseable<'a> {
    table: &'a str,
    column: &'a str,
    count: usize,
    example: Option<String>,
}

impl<'a> Unparseable<'a> {
    fn new(table: &'a str, column: &'a str) -> Self {
        Self {
            table,
            column,
            count: 0,
            example: None,
        }
    }

    fn record(&mut self, cell: &Value) {
        self.count += 1;
        if self.example.is_none() {
            self.example = Some(cell.to_string());
        }
    }

    fn into_warning(self) -> Option<Warning> {
        (self.count > 0).then(|| Warning::UnparseableValues {
            table: self.table.to_string(),
            column: self.column.to_string(),
            count: self.count,
            example: self.example.unwrap_or_default(),
        })
    }
}

fn text_at(table: &RawTable, row: usize, col: Option<usize>) -> Option<String> {
    col.and_then(|c| table.cell(row, c).as_text())
}

fn number_at(table: &RawTable, row: usize, col: Option<usize>, bad: &mut Unparseable<'_>) -> Option<f64> {
    let cell = table.cell(row, col?);
    if cell.is_empty() {
        return None;
    }
    let n = cell.as_number();
    if n.is_none() {
        bad.record(cell);
    }
    n
}

fn year_at(table: &RawTable, row: usize, col: Option<usize>, bad: &mut Unparseable<'_>) -> Option<i32> {
    let cell = table.cell(row, col?);
    if cell.is_empty() {
        return None;
    }
    match cell.as_number() {
        Some(n) if n.fract() == 0.0 && (0.0..=9999.0).contains(&n) => Some(n as i32),
        _ => {
            bad.record(cell);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

pub fn bind_catalog(role: CatalogRole, config: &CatalogConfig, table: RawTable) -> Outcome<CatalogTable> {
    let label = config.label.clone().unwrap_or_else(|| role.to_string());
    if table.headers.is_empty() {
        return Outcome::Failure(ReconError::Configuration(format!(
            "{label} catalog has no header row"
        )));
    }

    let mut warnings = Vec::new();
    let mut present = BTreeSet::new();
    let cols = &config.columns;
    let mut locate = |field: CatalogField, name: &str| {
        let col = table.column(name);
        match col {
            Some(_) => {
                present.insert(field);
            }
            None => warnings.push(Warning::MissingColumn {
                table: label.clone(),
                column: name.to_string(),
            }),
        }
        col
    };
    let id = locate(CatalogField::Id, &cols.id);
    let name = locate(CatalogField::Name, &cols.name);
    let producer = locate(CatalogField::Producer, &cols.producer);
    let price = locate(CatalogField::Price, &cols.price);
    let wine_type = locate(CatalogField::WineType, &cols.wine_type);
    let region = locate(CatalogField::Region, &cols.region);
    let vintage = locate(CatalogField::Vintage, &cols.vintage);

    let mut bad_price = Unparseable::new(&label, &cols.price);
    let mut bad_vintage = Unparseable::new(&label, &cols.vintage);

    let records = (0..table.len())
        .map(|i| CatalogRecord {
            row: i,
            id: text_at(&table, i, id),
            name: text_at(&table, i, name),
            producer: text_at(&table, i, producer),
            price: number_at(&table, i, price, &mut bad_price),
            wine_type: text_at(&table, i, wine_type),
            region: text_at(&table, i, region),
            vintage: year_at(&table, i, vintage, &mut bad_vintage),
            raw: table.rows[i].clone(),
        })
        .collect();

    warnings.extend(bad_price.into_warning());
    warnings.extend(bad_vintage.into_warning());

    let headers = table.headers;
    Outcome::from_parts(
        CatalogTable {
            role,
            label,
            headers,
            records,
            present,
        },
        warnings,
    )
}

// ---------------------------------------------------------------------------
// Match table
// ---------------------------------------------------------------------------

const MATCH_TABLE: &str = "matches";

/// Fold a status cell and a score cell into one confidence.
///
/// The status decides whether the row is a match. The score only refines
/// a match into `Scored` or `Verified`. Returns `true` as second element
/// when the two disagree.
pub fn fold_confidence(
    status: Option<&str>,
    score: Option<f64>,
    rules: &StatusConfig,
) -> (MatchConfidence, bool) {
    let sentinel = score == Some(rules.verified_score);
    let candidate = score.filter(|s| *s > 0.0 && *s <= 100.0);

    let Some(status) = status else {
        return match score {
            _ if sentinel => (MatchConfidence::Verified, false),
            Some(s) if s > 0.0 => (MatchConfidence::Scored { score: s }, false),
            _ => (MatchConfidence::Unmatched { candidate: None }, false),
        };
    };

    let rejected = status == rules.no_match.trim()
        || (!rules.valid.is_empty() && !rules.valid.iter().any(|v| v.trim() == status));
    if rejected {
        return (MatchConfidence::Unmatched { candidate }, sentinel);
    }
    if status == rules.verified.trim() || sentinel {
        return (MatchConfidence::Verified, false);
    }
    match score {
        Some(s) if s > 0.0 => (MatchConfidence::Scored { score: s }, false),
        None => (MatchConfidence::Verified, false),
        Some(_) => (MatchConfidence::Verified, true),
    }
}

pub fn bind_matches(config: &MatchTableConfig, table: RawTable) -> Outcome<MatchTable> {
    if table.headers.is_empty() {
        return Outcome::Failure(ReconError::Configuration(
            "match table has no header row".into(),
        ));
    }

    let mut warnings = Vec::new();
    let mut present = BTreeSet::new();
    let cols = &config.columns;
    let mut locate = |field: MatchField, name: &str| {
        let col = table.column(name);
        match col {
            Some(_) => {
                present.insert(field);
            }
            None => warnings.push(Warning::MissingColumn {
                table: MATCH_TABLE.into(),
                column: name.to_string(),
            }),
        }
        col
    };
    let primary_id = locate(MatchField::PrimaryId, &cols.primary_id);
    let primary_name = locate(MatchField::PrimaryName, &cols.primary_name);
    let primary_producer = locate(MatchField::PrimaryProducer, &cols.primary_producer);
    let primary_price = locate(MatchField::PrimaryPrice, &cols.primary_price);
    let secondary_id = locate(MatchField::SecondaryId, &cols.secondary_id);
    let secondary_name = locate(MatchField::SecondaryName, &cols.secondary_name);
    let secondary_producer = locate(MatchField::SecondaryProducer, &cols.secondary_producer);
    let secondary_price = locate(MatchField::SecondaryPrice, &cols.secondary_price);
    let score = locate(MatchField::Score, &cols.score);
    let status = locate(MatchField::Status, &cols.status);

    let rules = &config.status;
    let mut bad_primary_price = Unparseable::new(MATCH_TABLE, &cols.primary_price);
    let mut bad_secondary_price = Unparseable::new(MATCH_TABLE, &cols.secondary_price);
    let mut bad_score = Unparseable::new(MATCH_TABLE, &cols.score);
    let mut conflicts = 0usize;
    let mut first_conflict = None;

    let mut records = Vec::with_capacity(table.len());
    for i in 0..table.len() {
        let raw_score = number_at(&table, i, score, &mut bad_score);
        let score_value = match raw_score {
            Some(s) if s == rules.verified_score || (0.0..=100.0).contains(&s) => Some(s),
            Some(_) => {
                if let Some(c) = score {
                    bad_score.record(table.cell(i, c));
                }
                None
            }
            None => None,
        };
        let status_text = text_at(&table, i, status);
        let (confidence, conflict) = fold_confidence(status_text.as_deref(), score_value, rules);
        if conflict {
            conflicts += 1;
            first_conflict.get_or_insert(sheet_row(i));
        }

        records.push(MatchRecord {
            row: i,
            primary_id: text_at(&table, i, primary_id),
            primary_name: text_at(&table, i, primary_name),
            primary_producer: text_at(&table, i, primary_producer),
            primary_price: number_at(&table, i, primary_price, &mut bad_primary_price),
            secondary_id: secondary_id.map_or(Value::Empty, |c| table.cell(i, c).clone()),
            secondary_name: text_at(&table, i, secondary_name),
            secondary_producer: text_at(&table, i, secondary_producer),
            secondary_price: number_at(&table, i, secondary_price, &mut bad_secondary_price),
            confidence,
            raw: table.rows[i].clone(),
        });
    }

    warnings.extend(bad_primary_price.into_warning());
    warnings.extend(bad_secondary_price.into_warning());
    warnings.extend(bad_score.into_warning());
    if let Some(first_row) = first_conflict {
        warnings.push(Warning::ConfidenceConflicts {
            count: conflicts,
            first_row,
        });
    }

    let headers = table.headers;
    Outcome::from_parts(
        MatchTable {
            headers,
            records,
            present,
            score_header: cols.score.clone(),
            status_header: cols.status.clone(),
            labels: StatusLabels {
                no_match: rules.no_match.clone(),
                verified: rules.verified.clone(),
                scored: rules.scored.clone(),
                verified_score: rules.verified_score,
            },
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CatalogColumns, MatchColumns};

    fn catalog_config() -> CatalogConfig {
        CatalogConfig {
            label: Some("Coop".into()),
            file: "coop.csv".into(),
            sheet: None,
            region_delimiter: ",".into(),
            region_scheme: None,
            columns: CatalogColumns {
                id: "URL".into(),
                name: "Name".into(),
                producer: "Produzent".into(),
                price: "Preis".into(),
                wine_type: "Weintyp".into(),
                region: "Region".into(),
                vintage: "Jahrgang".into(),
            },
        }
    }

    fn match_config() -> MatchTableConfig {
        MatchTableConfig {
            file: "matches.csv".into(),
            sheet: None,
            columns: MatchColumns::default(),
            status: StatusConfig::default(),
        }
    }

    fn row(cells: &[&str]) -> Vec<Value> {
        cells
            .iter()
            .map(|c| if c.is_empty() { Value::Empty } else { Value::from(*c) })
            .collect()
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // ---- Catalog ----

    #[test]
    fn catalog_binds_fields() {
        let table = RawTable::new(
            headers(&["URL", "Name", "Produzent", "Preis", "Weintyp", "Region", "Jahrgang"]),
            vec![row(&["u1", "Margaux", "Château M", "12.50", "Rotwein", "Frankreich, Bordeaux", "2019"])],
        );
        let out = bind_catalog(CatalogRole::Primary, &catalog_config(), table);
        assert!(out.warnings().is_empty());
        let cat = out.value().unwrap();
        let r = &cat.records[0];
        assert_eq!(r.id.as_deref(), Some("u1"));
        assert_eq!(r.price, Some(12.5));
        assert_eq!(r.vintage, Some(2019));
        assert!(cat.has(CatalogField::Region));
    }

    #[test]
    fn catalog_missing_column_warns() {
        let table = RawTable::new(headers(&["URL", "Name"]), vec![row(&["u1", "x"])]);
        let out = bind_catalog(CatalogRole::Primary, &catalog_config(), table);
        let cat = out.value().unwrap();
        assert!(!cat.has(CatalogField::Price));
        assert_eq!(cat.records[0].price, None);
        assert!(out.warnings().contains(&Warning::MissingColumn {
            table: "Coop".into(),
            column: "Preis".into(),
        }));
    }

    #[test]
    fn catalog_unparseable_cells_aggregate() {
        let table = RawTable::new(
            headers(&["URL", "Preis", "Jahrgang"]),
            vec![row(&["u1", "n/a", "NV"]), row(&["u2", "abc", "2020"]), row(&["u3", "9", ""])],
        );
        let out = bind_catalog(CatalogRole::Primary, &catalog_config(), table);
        let cat = out.value().unwrap();
        assert_eq!(cat.records[2].price, Some(9.0));
        assert_eq!(cat.records[0].vintage, None);
        let price = out.warnings().iter().find(|w| {
            matches!(w, Warning::UnparseableValues { column, .. } if column == "Preis")
        });
        match price {
            Some(Warning::UnparseableValues { count, example, .. }) => {
                assert_eq!(*count, 2);
                assert_eq!(example, "n/a");
            }
            other => panic!("expected price warning, got {other:?}"),
        }
    }

    #[test]
    fn catalog_without_headers_fails() {
        let out = bind_catalog(CatalogRole::Primary, &catalog_config(), RawTable::default());
        assert!(out.is_failure());
    }

    // ---- Confidence folding ----

    #[test]
    fn fold_status_wins() {
        let rules = StatusConfig::default();
        assert_eq!(
            fold_confidence(Some("Kein Match"), Some(72.0), &rules),
            (MatchConfidence::Unmatched { candidate: Some(72.0) }, false)
        );
        assert_eq!(
            fold_confidence(Some("Kein Match"), Some(-1.0), &rules),
            (MatchConfidence::Unmatched { candidate: None }, true)
        );
        assert_eq!(
            fold_confidence(Some("Match"), Some(-1.0), &rules),
            (MatchConfidence::Verified, false)
        );
        assert_eq!(
            fold_confidence(Some("Match"), Some(93.0), &rules),
            (MatchConfidence::Scored { score: 93.0 }, false)
        );
        assert_eq!(
            fold_confidence(Some("Match"), Some(0.0), &rules),
            (MatchConfidence::Verified, true)
        );
        assert_eq!(
            fold_confidence(Some("Manueller Match"), Some(88.0), &rules),
            (MatchConfidence::Verified, false)
        );
    }

    #[test]
    fn fold_without_status_uses_score() {
        let rules = StatusConfig::default();
        assert_eq!(fold_confidence(None, Some(-1.0), &rules).0, MatchConfidence::Verified);
        assert_eq!(fold_confidence(None, Some(55.0), &rules).0, MatchConfidence::Scored { score: 55.0 });
        assert_eq!(fold_confidence(None, None, &rules).0, MatchConfidence::Unmatched { candidate: None });
    }

    #[test]
    fn fold_respects_allowlist() {
        let rules = StatusConfig {
            valid: vec!["Match".into()],
            ..StatusConfig::default()
        };
        assert!(fold_confidence(Some("Match"), Some(90.0), &rules).0.is_match());
        assert!(!fold_confidence(Some("Vielleicht"), Some(90.0), &rules).0.is_match());
    }

    // ---- Match table ----

    #[test]
    fn bind_matches_reports_conflicts_and_bad_scores() {
        let table = RawTable::new(
            headers(&["Coop_URL", "FP_Sku", "Fuzzy_Score", "Match_Status"]),
            vec![
                row(&["u1", "100.0", "95", "Match"]),
                row(&["u2", "", "-1", "Kein Match"]),
                row(&["u3", "7", "250", "Match"]),
            ],
        );
        let out = bind_matches(&match_config(), table);
        let m = out.value().unwrap();
        assert_eq!(m.records[0].confidence, MatchConfidence::Scored { score: 95.0 });
        assert_eq!(m.records[0].secondary_id, Value::from("100.0"));
        assert!(!m.records[1].confidence.is_match());
        assert_eq!(m.records[2].confidence, MatchConfidence::Verified);
        assert!(out.warnings().contains(&Warning::ConfidenceConflicts { count: 1, first_row: 3 }));
        assert!(out.warnings().iter().any(|w| matches!(
            w,
            Warning::UnparseableValues { column, count: 1, .. } if column == "Fuzzy_Score"
        )));
    }

    #[test]
    fn bind_matches_missing_status_column() {
        let table = RawTable::new(
            headers(&["Coop_URL", "FP_Sku", "Fuzzy_Score"]),
            vec![row(&["u1", "1", "-1"]), row(&["u2", "2", ""])],
        );
        let out = bind_matches(&match_config(), table);
        let m = out.value().unwrap();
        assert!(!m.has(MatchField::Status));
        assert!(m.records[0].confidence.is_verified());
        assert!(!m.records[1].confidence.is_match());
    }
}
