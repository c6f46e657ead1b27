//! Gap detection: primary catalog rows without a real match.

use std::collections::HashSet;

use log::debug;
use serde::Serialize;

use crate::error::ReconError;
use crate::model::{CatalogField, CatalogRecord, CatalogTable, MatchField, MatchTable, RawTable};
use crate::normalize::normalize_sku;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapCounts {
    pub num_primary_total: usize,
    pub num_distinct_matched_ids: usize,
    pub num_gaps: usize,
    /// Matched ids that do not occur in the primary catalog.
    pub num_matched_ids_unknown: usize,
}

#[derive(Debug, Clone)]
pub struct GapReport {
    pub counts: GapCounts,
    /// Gap records in catalog order.
    pub gaps: Vec<CatalogRecord>,
    headers: Vec<String>,
}

impl GapReport {
    /// Gap rows in the primary catalog's own schema.
    pub fn gap_table(&self) -> RawTable {
        RawTable::new(
            self.headers.clone(),
            self.gaps.iter().map(|r| r.raw.clone()).collect(),
        )
    }

    /// Gap rows as a catalog, for the comparison analyses.
    pub fn as_catalog(&self, whole: &CatalogTable) -> CatalogTable {
        CatalogTable {
            records: self.gaps.clone(),
            ..whole.clone()
        }
    }

    pub fn filtered(&self, filter: &GapFilter) -> GapReport {
        let gaps: Vec<CatalogRecord> = self.gaps.iter().filter(|r| filter.accepts(r)).cloned().collect();
        GapReport {
            counts: GapCounts {
                num_gaps: gaps.len(),
                ..self.counts
            },
            gaps,
            headers: self.headers.clone(),
        }
    }
}

pub fn detect_gaps(primary: &CatalogTable, matches: &MatchTable) -> Result<GapReport, ReconError> {
    if matches.is_empty() {
        return Err(ReconError::Configuration("match table is empty".into()));
    }
    if !matches.has(MatchField::PrimaryId) {
        return Err(ReconError::Configuration(
            "match table has no primary id column".into(),
        ));
    }
    if !matches.has(MatchField::Status) && !matches.has(MatchField::Score) {
        return Err(ReconError::Configuration(
            "match table has neither a status nor a score column".into(),
        ));
    }
    if !primary.has(CatalogField::Id) {
        return Err(ReconError::Configuration(format!(
            "{} catalog has no id column",
            primary.label
        )));
    }

    let matched: HashSet<String> = matches
        .real_matches()
        .filter_map(|r| r.primary_id.as_deref().and_then(normalize_sku))
        .collect();

    let mut known = HashSet::new();
    let mut gaps = Vec::new();
    for record in &primary.records {
        match record.id.as_deref().and_then(normalize_sku) {
            Some(key) if matched.contains(&key) => {
                known.insert(key);
            }
            _ => gaps.push(record.clone()),
        }
    }

    let counts = GapCounts {
        num_primary_total: primary.len(),
        num_distinct_matched_ids: matched.len(),
        num_gaps: gaps.len(),
        num_matched_ids_unknown: matched.len() - known.len(),
    };
    debug!(
        "gaps: total={} matched_ids={} gaps={} unknown_ids={}",
        counts.num_primary_total,
        counts.num_distinct_matched_ids,
        counts.num_gaps,
        counts.num_matched_ids_unknown
    );

    Ok(GapReport {
        counts,
        gaps,
        headers: primary.headers.clone(),
    })
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Output filter for the gap table. Bounds are inclusive; once a bound is
/// set, records without a price are excluded.
#[derive(Debug, Clone, Default)]
pub struct GapFilter {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub wine_types: Vec<String>,
}

impl GapFilter {
    pub fn is_empty(&self) -> bool {
        self.min_price.is_none() && self.max_price.is_none() && self.wine_types.is_empty()
    }

    pub fn accepts(&self, record: &CatalogRecord) -> bool {
        if self.min_price.is_some() || self.max_price.is_some() {
            let Some(price) = record.price else {
                return false;
            };
            if self.min_price.is_some_and(|min| price < min) {
                return false;
            }
            if self.max_price.is_some_and(|max| price > max) {
                return false;
            }
        }
        if !self.wine_types.is_empty() {
            let Some(wine_type) = record.wine_type.as_deref() else {
                return false;
            };
            if !self.wine_types.iter().any(|t| t.trim() == wine_type) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{CatalogRole, MatchConfidence, MatchRecord, StatusLabels, Value};

    fn catalog(ids: &[Option<&str>]) -> CatalogTable {
        CatalogTable {
            role: CatalogRole::Primary,
            label: "Coop".into(),
            headers: vec!["URL".into()],
            records: ids
                .iter()
                .enumerate()
                .map(|(i, id)| CatalogRecord {
                    row: i,
                    id: id.map(str::to_string),
                    name: None,
                    producer: None,
                    price: Some(10.0 * (i as f64 + 1.0)),
                    wine_type: Some(if i % 2 == 0 { "Rotwein" } else { "Weisswein" }.into()),
                    region: None,
                    vintage: None,
                    raw: vec![id.map_or(Value::Empty, Value::from)],
                })
                .collect(),
            present: [CatalogField::Id].into_iter().collect(),
        }
    }

    fn match_table(rows: &[(&str, MatchConfidence)]) -> MatchTable {
        MatchTable {
            headers: vec!["Coop_URL".into()],
            records: rows
                .iter()
                .enumerate()
                .map(|(i, (id, confidence))| MatchRecord {
                    row: i,
                    primary_id: Some(id.to_string()),
                    primary_name: None,
                    primary_producer: None,
                    primary_price: None,
                    secondary_id: Value::Empty,
                    secondary_name: None,
                    secondary_producer: None,
                    secondary_price: None,
                    confidence: *confidence,
                    raw: Vec::new(),
                })
                .collect(),
            present: [MatchField::PrimaryId, MatchField::Status].into_iter().collect(),
            score_header: "Fuzzy_Score".into(),
            status_header: "Match_Status".into(),
            labels: StatusLabels {
                no_match: "Kein Match".into(),
                verified: "Manueller Match".into(),
                scored: "Automatischer Match".into(),
                verified_score: -1.0,
            },
        }
    }

    const SCORED: MatchConfidence = MatchConfidence::Scored { score: 90.0 };
    const NONE: MatchConfidence = MatchConfidence::Unmatched { candidate: None };

    // ---- Detection ----

    #[test]
    fn unmatched_rows_are_gaps() {
        let primary = catalog(&[Some("A"), Some("B"), Some("C")]);
        let matches = match_table(&[("A", SCORED), ("B", NONE), ("Z", MatchConfidence::Verified)]);
        let report = detect_gaps(&primary, &matches).unwrap();
        let ids: Vec<_> = report.gaps.iter().map(|r| r.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(
            report.counts,
            GapCounts {
                num_primary_total: 3,
                num_distinct_matched_ids: 2,
                num_gaps: 2,
                num_matched_ids_unknown: 1,
            }
        );
    }

    #[test]
    fn absent_ids_are_always_gaps() {
        let primary = catalog(&[None, Some("nan"), Some("A")]);
        let matches = match_table(&[("A", SCORED)]);
        let report = detect_gaps(&primary, &matches).unwrap();
        assert_eq!(report.counts.num_gaps, 2);
    }

    #[test]
    fn ids_compare_by_normalized_key() {
        let primary = catalog(&[Some("45")]);
        let matches = match_table(&[("45.0", SCORED)]);
        assert_eq!(detect_gaps(&primary, &matches).unwrap().counts.num_gaps, 0);
    }

    #[test]
    fn gap_table_keeps_input_schema() {
        let primary = catalog(&[Some("A"), Some("B")]);
        let matches = match_table(&[("A", SCORED)]);
        let table = detect_gaps(&primary, &matches).unwrap().gap_table();
        assert_eq!(table.headers, vec!["URL"]);
        assert_eq!(table.rows, vec![vec![Value::from("B")]]);
    }

    // ---- Configuration errors ----

    #[test]
    fn empty_match_table_fails() {
        let err = detect_gaps(&catalog(&[Some("A")]), &match_table(&[])).unwrap_err();
        assert_eq!(err, ReconError::Configuration("match table is empty".into()));
    }

    #[test]
    fn missing_id_columns_fail() {
        let mut matches = match_table(&[("A", SCORED)]);
        matches.present = BTreeSet::from([MatchField::Status]);
        assert!(detect_gaps(&catalog(&[Some("A")]), &matches).is_err());

        let mut matches = match_table(&[("A", SCORED)]);
        matches.present = BTreeSet::from([MatchField::PrimaryId]);
        let err = detect_gaps(&catalog(&[Some("A")]), &matches).unwrap_err();
        assert!(err.to_string().contains("neither a status nor a score"));

        let mut primary = catalog(&[Some("A")]);
        primary.present.clear();
        assert!(detect_gaps(&primary, &match_table(&[("A", SCORED)])).is_err());
    }

    // ---- Filter ----

    #[test]
    fn filter_by_price_and_type() {
        let primary = catalog(&[Some("A"), Some("B"), Some("C"), Some("D")]);
        let report = detect_gaps(&primary, &match_table(&[("X", SCORED)])).unwrap();

        let filter = GapFilter {
            min_price: Some(20.0),
            max_price: Some(30.0),
            wine_types: Vec::new(),
        };
        let ids: Vec<_> = report.filtered(&filter).gaps.into_iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, vec!["B", "C"]);

        let filter = GapFilter {
            wine_types: vec!["Rotwein".into()],
            ..GapFilter::default()
        };
        let filtered = report.filtered(&filter);
        assert_eq!(filtered.counts.num_gaps, 2);
        assert_eq!(filtered.counts.num_primary_total, 4);
    }
}
