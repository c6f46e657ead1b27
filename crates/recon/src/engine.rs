use std::collections::{BTreeMap, HashMap, HashSet};

use log::{info, warn};
use serde::Serialize;

use crate::config::{AnalysisConfig, EnrichPass, RunConfig};
use crate::distribution::{
    band_distribution, compare, compare_band_mix, distribution, BandMixComparison, CategoryOrder,
    Comparison, Distribution, Notable, PriceBands,
};
use crate::enrich::{enrich, enriched_table, skipped_column, EnrichDiagnostics, EnrichedColumn};
use crate::error::ReconError;
use crate::gaps::{detect_gaps, GapCounts, GapReport};
use crate::model::{CatalogField, CatalogRecord, CatalogRole, CatalogTable, MatchTable, RawTable};
use crate::outcome::{Outcome, OutcomeStatus, Warning};
use crate::pricing::{
    matching_overview, performance, price_summary, sweet_spots, MatchingOverview, Performance,
    PriceCategories, PriceSummary, SweetSpots,
};
use crate::producer::ProducerNormalizer;
use crate::profile::{country_distribution, profile, region_distribution, CatalogProfile};
use crate::region::{RegionResolver, RegionTables};

/// Pre-loaded, schema-bound inputs for one run.
#[derive(Debug, Clone)]
pub struct ReconInput {
    pub primary: Outcome<CatalogTable>,
    pub secondary: Outcome<CatalogTable>,
    pub matches: Outcome<MatchTable>,
    /// Auxiliary tables keyed by the enrich pass's output column. An `Err`
    /// carries the load failure; the pass is then skipped.
    pub lookups: HashMap<String, Result<RawTable, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub primary_label: String,
    pub secondary_label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vintages: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub warned: usize,
    pub failed: usize,
}

impl RunSummary {
    fn count(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Success => self.succeeded += 1,
            OutcomeStatus::Warning => self.warned += 1,
            OutcomeStatus::Failure => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryComparison {
    pub country: String,
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerCount {
    pub producer: String,
    pub gaps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub dimension: String,
    pub threshold_pp: f64,
    pub notable: Notable,
}

/// Gap subset against the whole primary catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapAnalysis {
    pub counts: GapCounts,
    pub wine_types: Comparison,
    pub price_bands: PriceBands,
    pub prices: Comparison,
    pub band_mix: Vec<BandMixComparison>,
    pub countries: Comparison,
    pub regions: Vec<CountryComparison>,
    pub producers: Comparison,
    pub top_producers: Distribution,
    /// Gap producers whose normalized name the secondary catalog never carries.
    pub producers_not_carried: Vec<ProducerCount>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub meta: ReportMeta,
    pub summary: RunSummary,
    /// Row counts per bound input table.
    pub inputs: BTreeMap<String, Outcome<usize>>,
    pub primary_profile: Outcome<CatalogProfile>,
    pub secondary_profile: Outcome<CatalogProfile>,
    pub enrichment: Outcome<Vec<EnrichDiagnostics>>,
    pub matching: Outcome<MatchingOverview>,
    pub prices: Outcome<PriceSummary>,
    pub performance: Outcome<Performance>,
    pub sweet_spots: Outcome<SweetSpots>,
    pub gaps: Outcome<GapAnalysis>,
    /// Match table with derived status and enrichment columns.
    #[serde(skip)]
    pub enriched: Option<RawTable>,
    #[serde(skip)]
    pub gap_report: Option<GapReport>,
}

impl AnalysisReport {
    /// Every warning of every input and section.
    pub fn warnings(&self) -> Vec<&Warning> {
        let sections = [
            self.primary_profile.warnings(),
            self.secondary_profile.warnings(),
            self.enrichment.warnings(),
            self.matching.warnings(),
            self.prices.warnings(),
            self.performance.warnings(),
            self.sweet_spots.warnings(),
            self.gaps.warnings(),
        ];
        self.inputs
            .values()
            .map(Outcome::warnings)
            .chain(sections)
            .flatten()
            .collect()
    }
}

/// Run one analysis that needs `input`, or propagate its failure.
fn needs<T, U>(input: &Outcome<T>, f: impl FnOnce(&T) -> Outcome<U>) -> Outcome<U> {
    match input.value() {
        Some(v) => f(v),
        None => Outcome::Failure(
            input
                .error()
                .cloned()
                .unwrap_or_else(|| ReconError::Configuration("input not available".into())),
        ),
    }
}

fn resolver_for<'a>(
    regions: &'a RegionTables,
    config: &'a RunConfig,
    role: CatalogRole,
) -> Result<RegionResolver<'a>, ReconError> {
    match role {
        CatalogRole::Primary => regions.resolver(
            config.primary.scheme_name("primary"),
            &config.primary.region_delimiter,
        ),
        CatalogRole::Secondary => regions.resolver(
            config.secondary.scheme_name("secondary"),
            &config.secondary.region_delimiter,
        ),
    }
}

/// Run every enrichment pass. Passes never fail the run: a missing table or
/// column yields an empty column plus a warning.
pub fn enrich_all(
    matches: &MatchTable,
    passes: &[EnrichPass],
    lookups: &HashMap<String, Result<RawTable, String>>,
) -> Outcome<Vec<EnrichedColumn>> {
    let mut columns = Vec::with_capacity(passes.len());
    let mut warnings = Vec::new();
    for pass in passes {
        let outcome = match lookups.get(&pass.column) {
            Some(Ok(table)) => enrich(matches, Some(table), pass),
            Some(Err(reason)) => skipped_column(
                matches,
                pass,
                Warning::EnrichmentSkipped {
                    column: pass.column.clone(),
                    reason: reason.clone(),
                },
            ),
            None => enrich(matches, None, pass),
        };
        let (column, w) = match outcome.into_parts() {
            Ok(parts) => parts,
            Err(e) => return Outcome::Failure(e),
        };
        columns.push(column);
        warnings.extend(w);
    }
    Outcome::from_parts(columns, warnings)
}

/// Run the full analysis. Every section degrades independently; the report
/// is always produced.
pub fn run(config: &RunConfig, input: &ReconInput, regions: &RegionTables) -> AnalysisReport {
    let analysis = &config.analysis;
    let vintages = &analysis.vintages;
    let primary = input.primary.clone().map(|t| t.filter_vintages(vintages));
    let secondary = input.secondary.clone().map(|t| t.filter_vintages(vintages));
    let matches = &input.matches;

    let mut inputs = BTreeMap::new();
    inputs.insert("primary".to_string(), primary.clone().map(|t| t.len()));
    inputs.insert("secondary".to_string(), secondary.clone().map(|t| t.len()));
    inputs.insert("matches".to_string(), matches.clone().map(|t| t.len()));

    let primary_profile = needs(&primary, |catalog| match resolver_for(regions, config, CatalogRole::Primary) {
        Ok(resolver) => profile(catalog, &resolver, analysis),
        Err(e) => Outcome::Failure(e),
    });
    let secondary_profile = needs(&secondary, |catalog| {
        match resolver_for(regions, config, CatalogRole::Secondary) {
            Ok(resolver) => profile(catalog, &resolver, analysis),
            Err(e) => Outcome::Failure(e),
        }
    });

    let enriched_columns = needs(matches, |m| enrich_all(m, &config.enrich, &input.lookups));
    let columns: &[EnrichedColumn] = enriched_columns.value().map(Vec::as_slice).unwrap_or(&[]);
    let enriched = matches.value().map(|m| enriched_table(m, columns));
    let enrichment = enriched_columns
        .clone()
        .map(|cols| cols.into_iter().map(|c| c.diagnostics).collect());

    let matching = needs(matches, matching_overview);
    let bins = PriceCategories::new(&config.primary_label(), &config.secondary_label());
    let prices = needs(matches, |m| price_summary(m, &bins, analysis.outliers));
    let performance = needs(matches, |m| performance(m, columns, analysis));
    let sweet_spots = needs(matches, |m| sweet_spots(m, columns, analysis));

    let gap_report = needs(&primary, |p| needs(matches, |m| Outcome::from(detect_gaps(p, m))));
    let gaps = needs(&gap_report, |report| {
        needs(&primary, |p| {
            gap_analysis(p, secondary.value(), report, regions, config)
        })
    });

    let mut summary = RunSummary::default();
    for status in [
        primary_profile.status(),
        secondary_profile.status(),
        enrichment.status(),
        matching.status(),
        prices.status(),
        performance.status(),
        sweet_spots.status(),
        gaps.status(),
    ] {
        summary.count(status);
    }
    info!(
        "run '{}': {} section(s) ok, {} with warnings, {} failed",
        config.name, summary.succeeded, summary.warned, summary.failed
    );

    AnalysisReport {
        meta: ReportMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            primary_label: config.primary_label(),
            secondary_label: config.secondary_label(),
            vintages: vintages.clone(),
        },
        summary,
        inputs,
        primary_profile,
        secondary_profile,
        enrichment,
        matching,
        prices,
        performance,
        sweet_spots,
        gaps,
        enriched,
        gap_report: gap_report.into_value(),
    }
}

// ---------------------------------------------------------------------------
// Gap analysis
// ---------------------------------------------------------------------------

fn producer_names(records: &[CatalogRecord]) -> Vec<&str> {
    records
        .iter()
        .filter_map(|r| r.producer.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn no_data(reason: impl Into<String>) -> Warning {
    Warning::NoData {
        section: "gaps".into(),
        reason: reason.into(),
    }
}

/// Gap producer counts for producers whose key is absent from `carried`.
fn not_carried(
    gaps: &[CatalogRecord],
    carried: &HashSet<String>,
    normalizer: &ProducerNormalizer,
    top: usize,
) -> Vec<ProducerCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in producer_names(gaps) {
        match normalizer.key(Some(name)) {
            Some(key) if !carried.contains(&key) => *counts.entry(name).or_default() += 1,
            _ => {}
        }
    }
    let mut rows: Vec<ProducerCount> = counts
        .into_iter()
        .map(|(producer, gaps)| ProducerCount {
            producer: producer.to_string(),
            gaps,
        })
        .collect();
    rows.sort_by(|a, b| b.gaps.cmp(&a.gaps).then_with(|| a.producer.cmp(&b.producer)));
    rows.truncate(top);
    rows
}

fn gap_analysis(
    primary: &CatalogTable,
    secondary: Option<&CatalogTable>,
    report: &GapReport,
    regions: &RegionTables,
    config: &RunConfig,
) -> Outcome<GapAnalysis> {
    let a: &AnalysisConfig = &config.analysis;
    let resolver = match resolver_for(regions, config, CatalogRole::Primary) {
        Ok(r) => r,
        Err(e) => return Outcome::Failure(e),
    };
    let normalizer = match ProducerNormalizer::new(&config.producers) {
        Ok(n) => n,
        Err(e) => return Outcome::Failure(e),
    };
    let gaps = &report.gaps;
    let whole = &primary.records;
    let mut warnings = Vec::new();
    if gaps.is_empty() {
        warnings.push(no_data("no gaps"));
    }

    let types = CategoryOrder::Fixed(&a.wine_types);
    let wine_types = compare(
        &distribution(gaps.iter().filter_map(|r| r.wine_type.as_deref()), types),
        &distribution(whole.iter().filter_map(|r| r.wine_type.as_deref()), types),
        types,
    );

    let max_price = gaps
        .iter()
        .chain(whole)
        .filter_map(|r| r.price)
        .fold(0.0_f64, f64::max);
    let price_bands = PriceBands::standard(max_price, &a.currency);
    let prices = compare(
        &band_distribution(gaps, &price_bands),
        &band_distribution(whole, &price_bands),
        CategoryOrder::Fixed(&price_bands.labels),
    );
    let band_mix = compare_band_mix(gaps, whole, &price_bands, &a.wine_types);

    let countries = compare(
        &country_distribution(gaps, &resolver),
        &country_distribution(whole, &resolver),
        CategoryOrder::ByCount,
    )
    .top(a.top_countries);
    let regions = a
        .countries
        .iter()
        .map(|country| CountryComparison {
            country: country.clone(),
            comparison: compare(
                &region_distribution(gaps, &resolver, country),
                &region_distribution(whole, &resolver, country),
                CategoryOrder::ByCount,
            ),
        })
        .collect();

    if !primary.has(CatalogField::Producer) {
        warnings.push(no_data(format!("{} catalog has no producer column", primary.label)));
    }
    let gap_producers = distribution(producer_names(gaps), CategoryOrder::ByCount);
    let producers = compare(
        &gap_producers,
        &distribution(producer_names(whole), CategoryOrder::ByCount),
        CategoryOrder::ByCount,
    )
    .top(a.producer_comparison_top);
    let top_producers = Distribution {
        categories: gap_producers.categories.iter().take(a.top_producers).cloned().collect(),
        ..gap_producers.clone()
    };

    let producers_not_carried = match secondary {
        Some(s) if s.has(CatalogField::Producer) => {
            let carried: HashSet<String> = s
                .records
                .iter()
                .filter_map(|r| normalizer.key(r.producer.as_deref()))
                .collect();
            not_carried(gaps, &carried, &normalizer, a.top_producers)
        }
        Some(s) => {
            warnings.push(no_data(format!("{} catalog has no producer column", s.label)));
            Vec::new()
        }
        None => {
            warn!("secondary catalog unavailable, skipping carried-producer check");
            warnings.push(no_data("secondary catalog unavailable"));
            Vec::new()
        }
    };

    let findings = [
        ("wine_types", &wine_types, a.threshold_pp),
        ("price_bands", &prices, a.price_threshold_pp),
        ("countries", &countries, a.threshold_pp),
    ]
    .into_iter()
    .filter_map(|(dimension, comparison, threshold_pp)| {
        let notable = comparison.notable(threshold_pp);
        (!notable.is_empty()).then(|| Finding {
            dimension: dimension.to_string(),
            threshold_pp,
            notable,
        })
    })
    .collect();

    Outcome::from_parts(
        GapAnalysis {
            counts: report.counts,
            wine_types,
            price_bands,
            prices,
            band_mix,
            countries,
            regions,
            producers,
            top_producers,
            producers_not_carried,
            findings,
        },
        warnings,
    )
}
