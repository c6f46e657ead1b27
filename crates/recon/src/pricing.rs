//! Price comparison and sales analyses over real matches.
//!
//! Differences are primary minus secondary, relative to the secondary price:
//! a negative `diff_pct` means the primary retailer is cheaper.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::distribution::{distribution, CategoryOrder, Distribution};
use crate::enrich::{column_value, EnrichedColumn};
use crate::error::ReconError;
use crate::model::{MatchConfidence, MatchRecord, MatchTable};
use crate::outcome::{Outcome, Warning};

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Percentile with linear interpolation between closest ranks. `q` in [0, 1].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------
// Price differences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceDiff {
    /// Match table row (0-based).
    pub row: usize,
    pub primary_name: Option<String>,
    pub primary_producer: Option<String>,
    pub secondary_name: Option<String>,
    pub secondary_producer: Option<String>,
    pub primary_price: f64,
    pub secondary_price: f64,
    pub diff_chf: f64,
    pub diff_pct: f64,
    pub confidence: MatchConfidence,
}

fn price_diff(record: &MatchRecord) -> Option<PriceDiff> {
    if !record.confidence.is_match() {
        return None;
    }
    let primary = record.primary_price?;
    let secondary = record.secondary_price.filter(|p| *p > 0.0)?;
    let diff = primary - secondary;
    Some(PriceDiff {
        row: record.row,
        primary_name: record.primary_name.clone(),
        primary_producer: record.primary_producer.clone(),
        secondary_name: record.secondary_name.clone(),
        secondary_producer: record.secondary_producer.clone(),
        primary_price: primary,
        secondary_price: secondary,
        diff_chf: round2(diff),
        diff_pct: round1(diff / secondary * 100.0),
        confidence: record.confidence,
    })
}

/// Real matches with both prices and a positive secondary price.
pub fn price_diffs(matches: &MatchTable) -> Vec<PriceDiff> {
    matches.records.iter().filter_map(price_diff).collect()
}

// ---------------------------------------------------------------------------
// Matching overview
// ---------------------------------------------------------------------------

const SCORE_EDGES: [f64; 7] = [0.0, 40.0, 60.0, 80.0, 90.0, 95.0, 100.0];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchingOverview {
    pub total: usize,
    pub automatic: usize,
    pub verified: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub match_rate_pct: f64,
    /// Automated scores in right-closed classes (0,40] .. (95,100].
    pub score_classes: Distribution,
}

fn score_class(score: f64) -> Option<String> {
    SCORE_EDGES
        .windows(2)
        .find(|w| score > w[0] && score <= w[1])
        .map(|w| format!("({:.0}, {:.0}]", w[0], w[1]))
}

pub fn matching_overview(matches: &MatchTable) -> Outcome<MatchingOverview> {
    let total = matches.len();
    let scores: Vec<f64> = matches
        .records
        .iter()
        .filter_map(|r| match r.confidence {
            MatchConfidence::Scored { score } => Some(score),
            _ => None,
        })
        .collect();
    let automatic = scores.len();
    let verified = matches.records.iter().filter(|r| r.confidence.is_verified()).count();
    let matched = automatic + verified;

    let class_order: Vec<String> = SCORE_EDGES
        .windows(2)
        .map(|w| format!("({:.0}, {:.0}]", w[0], w[1]))
        .collect();
    let classes: Vec<String> = scores.iter().filter_map(|s| score_class(*s)).collect();
    let score_classes = distribution(classes.iter().map(String::as_str), CategoryOrder::Fixed(&class_order));

    let mut warnings = Vec::new();
    if total == 0 {
        warnings.push(Warning::NoData {
            section: "matching".into(),
            reason: "match table has no rows".into(),
        });
    }

    Outcome::from_parts(
        MatchingOverview {
            total,
            automatic,
            verified,
            matched,
            unmatched: total - matched,
            match_rate_pct: if total == 0 {
                0.0
            } else {
                matched as f64 / total as f64 * 100.0
            },
            score_classes,
        },
        warnings,
    )
}

// ---------------------------------------------------------------------------
// Price summary
// ---------------------------------------------------------------------------

/// Labels of the five price-difference bins, named after the catalogs.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceCategories {
    labels: [String; 5],
}

impl PriceCategories {
    pub fn new(primary: &str, secondary: &str) -> Self {
        Self {
            labels: [
                format!("{primary} >5% günstiger"),
                format!("{primary} 2–5% günstiger"),
                "Preis ähnlich (±2%)".to_string(),
                format!("{secondary} 2–5% günstiger"),
                format!("{secondary} >5% günstiger"),
            ],
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Category of a percentage difference over right-closed bins
    /// (-inf,-5] (-5,-2] (-2,2] (2,5] (5,inf).
    pub fn of(&self, diff_pct: f64) -> &str {
        let bin = if diff_pct <= -5.0 {
            0
        } else if diff_pct <= -2.0 {
            1
        } else if diff_pct <= 2.0 {
            2
        } else if diff_pct <= 5.0 {
            3
        } else {
            4
        };
        &self.labels[bin]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSummary {
    pub compared: usize,
    pub categories: Distribution,
    /// Pairs with |diff_pct| <= 2.
    pub similar: usize,
    pub median_pct: Option<f64>,
    pub mean_pct: Option<f64>,
    /// Largest absolute percentage differences first.
    pub outliers: Vec<PriceDiff>,
}

pub fn price_summary(
    matches: &MatchTable,
    bins: &PriceCategories,
    outliers: usize,
) -> Outcome<PriceSummary> {
    let diffs = price_diffs(matches);
    let pcts: Vec<f64> = diffs.iter().map(|d| d.diff_pct).collect();

    let categories = distribution(pcts.iter().map(|p| bins.of(*p)), CategoryOrder::Fixed(bins.labels()));

    let mut top = diffs.clone();
    top.sort_by(|a, b| desc(a.diff_pct.abs(), b.diff_pct.abs()));
    top.truncate(outliers);

    let mut warnings = Vec::new();
    if diffs.is_empty() {
        warnings.push(Warning::NoData {
            section: "prices".into(),
            reason: "no real match has both prices".into(),
        });
    }

    Outcome::from_parts(
        PriceSummary {
            compared: diffs.len(),
            categories,
            similar: pcts.iter().filter(|p| p.abs() <= 2.0).count(),
            median_pct: percentile(&pcts, 0.5),
            mean_pct: (!pcts.is_empty()).then(|| pcts.iter().sum::<f64>() / pcts.len() as f64),
            outliers: top,
        },
        warnings,
    )
}

// ---------------------------------------------------------------------------
// Sales performance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesRow {
    pub row: usize,
    pub primary_name: Option<String>,
    pub secondary_name: Option<String>,
    pub sales: f64,
    pub diff_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierShare {
    pub supplier: String,
    pub matches: usize,
    pub sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performance {
    pub top_wines: Vec<SalesRow>,
    pub suppliers_by_count: Vec<SupplierShare>,
    pub suppliers_by_sales: Vec<SupplierShare>,
}

fn sales_column<'a>(
    enriched: &'a [EnrichedColumn],
    name: &str,
) -> Result<&'a EnrichedColumn, ReconError> {
    enriched
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| ReconError::Configuration(format!("no enriched column '{name}'")))
}

fn sales_rows(matches: &MatchTable, enriched: &[EnrichedColumn], column: &str) -> Vec<SalesRow> {
    let diffs: HashMap<usize, f64> = price_diffs(matches).into_iter().map(|d| (d.row, d.diff_pct)).collect();
    matches
        .real_matches()
        .filter_map(|r| {
            let sales = column_value(enriched, column, r.row)?.as_number()?;
            Some(SalesRow {
                row: r.row,
                primary_name: r.primary_name.clone(),
                secondary_name: r.secondary_name.clone(),
                sales,
                diff_pct: diffs.get(&r.row).copied(),
            })
        })
        .collect()
}

pub fn performance(
    matches: &MatchTable,
    enriched: &[EnrichedColumn],
    analysis: &AnalysisConfig,
) -> Outcome<Performance> {
    if let Err(e) = sales_column(enriched, &analysis.sales_column) {
        return Outcome::Failure(e);
    }
    let mut warnings = Vec::new();

    let mut top_wines = sales_rows(matches, enriched, &analysis.sales_column);
    if top_wines.is_empty() {
        warnings.push(Warning::NoData {
            section: "performance".into(),
            reason: format!("no real match has a value in '{}'", analysis.sales_column),
        });
    }
    top_wines.sort_by(|a, b| desc(a.sales, b.sales));
    top_wines.truncate(analysis.top_wines);

    let mut by_supplier: HashMap<String, SupplierShare> = HashMap::new();
    if sales_column(enriched, &analysis.supplier_column).is_ok() {
        for r in matches.real_matches() {
            let Some(supplier) = column_value(enriched, &analysis.supplier_column, r.row).and_then(|v| v.as_text())
            else {
                continue;
            };
            let sales = column_value(enriched, &analysis.sales_column, r.row)
                .and_then(|v| v.as_number())
                .unwrap_or(0.0);
            let entry = by_supplier.entry(supplier.clone()).or_insert(SupplierShare {
                supplier,
                matches: 0,
                sales: 0.0,
            });
            entry.matches += 1;
            entry.sales += sales;
        }
    } else {
        warnings.push(Warning::NoData {
            section: "performance".into(),
            reason: format!("no enriched column '{}'", analysis.supplier_column),
        });
    }

    let mut suppliers_by_count: Vec<SupplierShare> = by_supplier.values().cloned().collect();
    suppliers_by_count.sort_by(|a, b| b.matches.cmp(&a.matches).then_with(|| a.supplier.cmp(&b.supplier)));
    suppliers_by_count.truncate(analysis.top_suppliers);

    let mut suppliers_by_sales: Vec<SupplierShare> = by_supplier.into_values().collect();
    suppliers_by_sales.sort_by(|a, b| desc(a.sales, b.sales).then_with(|| a.supplier.cmp(&b.supplier)));
    suppliers_by_sales.truncate(analysis.top_suppliers);

    Outcome::from_parts(
        Performance {
            top_wines,
            suppliers_by_count,
            suppliers_by_sales,
        },
        warnings,
    )
}

// ---------------------------------------------------------------------------
// Sweet spots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweetSpots {
    pub sales_threshold: f64,
    pub primary_pricier_pct: f64,
    pub secondary_pricier_pct: f64,
    /// Pairs with both a price difference and sales.
    pub considered: usize,
    /// Primary retailer pricier, secondary sells well.
    pub sweet_spots: Vec<SalesRow>,
    /// Secondary retailer pricier, still sells well.
    pub pricing_opportunities: Vec<SalesRow>,
}

pub fn sweet_spots(
    matches: &MatchTable,
    enriched: &[EnrichedColumn],
    analysis: &AnalysisConfig,
) -> Outcome<SweetSpots> {
    if let Err(e) = sales_column(enriched, &analysis.sales_column) {
        return Outcome::Failure(e);
    }
    let rows: Vec<SalesRow> = sales_rows(matches, enriched, &analysis.sales_column)
        .into_iter()
        .filter(|r| r.diff_pct.is_some())
        .collect();
    let sales: Vec<f64> = rows.iter().map(|r| r.sales).collect();

    let config = &analysis.sweet_spot;
    let threshold = config
        .min_sales
        .or_else(|| percentile(&sales, 0.75))
        .unwrap_or(0.0);

    let pick = |keep: &dyn Fn(f64) -> bool| {
        let mut picked: Vec<SalesRow> = rows
            .iter()
            .filter(|r| r.sales >= threshold && r.diff_pct.is_some_and(keep))
            .cloned()
            .collect();
        picked.sort_by(|a, b| desc(a.sales, b.sales));
        picked
    };
    let sweet = pick(&|d| d >= config.primary_pricier_pct);
    let opportunities = pick(&|d| d <= -config.secondary_pricier_pct);

    let mut warnings = Vec::new();
    if rows.is_empty() {
        warnings.push(Warning::NoData {
            section: "sweet_spots".into(),
            reason: "no real match has both a price difference and sales".into(),
        });
    }

    Outcome::from_parts(
        SweetSpots {
            sales_threshold: threshold,
            primary_pricier_pct: config.primary_pricier_pct,
            secondary_pricier_pct: config.secondary_pricier_pct,
            considered: rows.len(),
            sweet_spots: sweet,
            pricing_opportunities: opportunities,
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::enrich::EnrichDiagnostics;
    use crate::model::{MatchField, StatusLabels, Value};

    fn record(row: usize, confidence: MatchConfidence, primary: Option<f64>, secondary: Option<f64>) -> MatchRecord {
        MatchRecord {
            row,
            primary_id: Some(format!("u{row}")),
            primary_name: Some(format!("Coop {row}")),
            primary_producer: None,
            primary_price: primary,
            secondary_id: Value::from(format!("{row}")),
            secondary_name: Some(format!("FP {row}")),
            secondary_producer: None,
            secondary_price: secondary,
            confidence,
            raw: Vec::new(),
        }
    }

    fn table(records: Vec<MatchRecord>) -> MatchTable {
        MatchTable {
            headers: Vec::new(),
            records,
            present: BTreeSet::from([MatchField::PrimaryId, MatchField::Status]),
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

    fn scored(s: f64) -> MatchConfidence {
        MatchConfidence::Scored { score: s }
    }

    fn column(name: &str, values: Vec<Value>) -> EnrichedColumn {
        EnrichedColumn {
            name: name.into(),
            values,
            diagnostics: EnrichDiagnostics::default(),
        }
    }

    // ---- Helpers ----

    #[test]
    fn percentile_interpolates() {
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[4.0], 0.75), Some(4.0));
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(2.5));
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 0.75), Some(3.25));
    }

    #[test]
    fn rounding() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round1(-4.96), -5.0);
    }

    #[test]
    fn price_category_bins_are_right_closed() {
        let bins = PriceCategories::new("Coop", "FP");
        assert_eq!(bins.of(-5.0), "Coop >5% günstiger");
        assert_eq!(bins.of(-4.9), "Coop 2–5% günstiger");
        assert_eq!(bins.of(-2.0), "Coop 2–5% günstiger");
        assert_eq!(bins.of(2.0), "Preis ähnlich (±2%)");
        assert_eq!(bins.of(5.0), "FP 2–5% günstiger");
        assert_eq!(bins.of(5.1), "FP >5% günstiger");
    }

    #[test]
    fn price_categories_follow_catalog_labels() {
        let bins = PriceCategories::new("Denner", "Mövenpick");
        assert_eq!(bins.of(-12.0), "Denner >5% günstiger");
        assert_eq!(bins.of(3.0), "Mövenpick 2–5% günstiger");
        assert!(bins.labels().iter().all(|l| !l.contains("Coop") && !l.contains("FP")));
    }

    // ---- Price differences ----

    #[test]
    fn diffs_only_for_real_matches_with_prices() {
        let m = table(vec![
            record(0, scored(90.0), Some(11.0), Some(10.0)),
            record(1, MatchConfidence::Verified, Some(9.5), Some(10.0)),
            record(2, MatchConfidence::Unmatched { candidate: Some(40.0) }, Some(5.0), Some(10.0)),
            record(3, scored(80.0), Some(5.0), Some(0.0)),
            record(4, scored(80.0), None, Some(10.0)),
        ]);
        let diffs = price_diffs(&m);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].diff_chf, 1.0);
        assert_eq!(diffs[0].diff_pct, 10.0);
        assert_eq!(diffs[1].diff_pct, -5.0);
    }

    #[test]
    fn summary_counts_and_outliers() {
        let m = table(vec![
            record(0, scored(90.0), Some(11.0), Some(10.0)),
            record(1, scored(90.0), Some(10.1), Some(10.0)),
            record(2, scored(90.0), Some(7.0), Some(10.0)),
        ]);
        let out = price_summary(&m, &PriceCategories::new("Coop", "FP"), 2);
        let s = out.value().unwrap();
        assert_eq!(s.compared, 3);
        assert_eq!(s.similar, 1);
        assert_eq!(s.categories.count("FP >5% günstiger"), 1);
        assert_eq!(s.categories.count("Coop >5% günstiger"), 1);
        assert_eq!(s.median_pct, Some(1.0));
        assert_eq!(s.outliers.len(), 2);
        assert_eq!(s.outliers[0].row, 2);
    }

    #[test]
    fn summary_without_pairs_warns() {
        let out = price_summary(&table(Vec::new()), &PriceCategories::new("Coop", "FP"), 5);
        assert_eq!(out.value().unwrap().compared, 0);
        assert!(matches!(out.warnings()[0], Warning::NoData { .. }));
    }

    // ---- Overview ----

    #[test]
    fn overview_counts_and_classes() {
        let m = table(vec![
            record(0, scored(100.0), None, None),
            record(1, scored(40.0), None, None),
            record(2, MatchConfidence::Verified, None, None),
            record(3, MatchConfidence::Unmatched { candidate: None }, None, None),
        ]);
        let o = matching_overview(&m).into_value().unwrap();
        assert_eq!((o.total, o.automatic, o.verified, o.matched, o.unmatched), (4, 2, 1, 3, 1));
        assert_eq!(o.match_rate_pct, 75.0);
        assert_eq!(o.score_classes.count("(95, 100]"), 1);
        assert_eq!(o.score_classes.count("(0, 40]"), 1);
    }

    // ---- Performance + sweet spots ----

    fn sales_fixture() -> (MatchTable, Vec<EnrichedColumn>) {
        let m = table(vec![
            record(0, scored(90.0), Some(12.0), Some(10.0)),
            record(1, scored(90.0), Some(8.0), Some(10.0)),
            record(2, scored(90.0), Some(10.0), Some(10.0)),
            record(3, MatchConfidence::Unmatched { candidate: None }, Some(30.0), Some(10.0)),
        ]);
        let enriched = vec![
            column(
                "NPS_FP",
                vec![Value::Number(5000.0), Value::Number(9000.0), Value::Number(100.0), Value::Number(1e6)],
            ),
            column(
                "FP_Lieferant",
                vec![Value::from("A"), Value::from("B"), Value::from("A"), Value::from("C")],
            ),
        ];
        (m, enriched)
    }

    #[test]
    fn performance_ranks_real_matches() {
        let (m, enriched) = sales_fixture();
        let p = performance(&m, &enriched, &AnalysisConfig::default()).into_value().unwrap();
        assert_eq!(p.top_wines.iter().map(|w| w.row).collect::<Vec<_>>(), vec![1, 0, 2]);
        assert_eq!(p.suppliers_by_count[0].supplier, "A");
        assert_eq!(p.suppliers_by_count[0].matches, 2);
        assert_eq!(p.suppliers_by_sales[0].supplier, "B");
        assert!(p.suppliers_by_sales.iter().all(|s| s.supplier != "C"));
    }

    #[test]
    fn performance_without_sales_fails() {
        let (m, _) = sales_fixture();
        assert!(performance(&m, &[], &AnalysisConfig::default()).is_failure());
    }

    #[test]
    fn sweet_spot_directions() {
        let (m, enriched) = sales_fixture();
        let mut analysis = AnalysisConfig::default();
        analysis.sweet_spot.min_sales = Some(1000.0);
        let s = sweet_spots(&m, &enriched, &analysis).into_value().unwrap();
        assert_eq!(s.considered, 3);
        assert_eq!(s.sweet_spots.iter().map(|r| r.row).collect::<Vec<_>>(), vec![0]);
        assert_eq!(s.pricing_opportunities.iter().map(|r| r.row).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn sweet_spot_threshold_defaults_to_p75() {
        let (m, enriched) = sales_fixture();
        let s = sweet_spots(&m, &enriched, &AnalysisConfig::default()).into_value().unwrap();
        assert_eq!(s.sales_threshold, 7000.0);
        assert!(s.sweet_spots.is_empty());
        assert_eq!(s.pricing_opportunities.len(), 1);
    }
}
