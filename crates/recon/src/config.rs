use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub primary: CatalogConfig,
    pub secondary: CatalogConfig,
    pub matches: MatchTableConfig,
    #[serde(default)]
    pub enrich: Vec<EnrichPass>,
    #[serde(default)]
    pub producers: ProducerVocabulary,
    /// Region table override. The bundled table is used when absent.
    #[serde(default)]
    pub regions: Option<String>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Display name used in reports ("Coop", "Flaschenpost").
    #[serde(default)]
    pub label: Option<String>,
    pub file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default = "default_region_delimiter")]
    pub region_delimiter: String,
    /// Region scheme name; defaults to the catalog's role.
    #[serde(default)]
    pub region_scheme: Option<String>,
    pub columns: CatalogColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogColumns {
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_producer")]
    pub producer: String,
    #[serde(default = "default_price")]
    pub price: String,
    #[serde(default = "default_wine_type")]
    pub wine_type: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_vintage")]
    pub vintage: String,
}

fn default_region_delimiter() -> String {
    ",".into()
}
fn default_name() -> String {
    "Name".into()
}
fn default_producer() -> String {
    "Produzent".into()
}
fn default_price() -> String {
    "Preis".into()
}
fn default_wine_type() -> String {
    "Weintyp".into()
}
fn default_region() -> String {
    "Region".into()
}
fn default_vintage() -> String {
    "Jahrgang".into()
}

// ---------------------------------------------------------------------------
// Match table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MatchTableConfig {
    pub file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub columns: MatchColumns,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchColumns {
    pub primary_id: String,
    pub primary_name: String,
    pub primary_producer: String,
    pub primary_price: String,
    pub secondary_id: String,
    pub secondary_name: String,
    pub secondary_producer: String,
    pub secondary_price: String,
    pub score: String,
    pub status: String,
}

impl Default for MatchColumns {
    fn default() -> Self {
        Self {
            primary_id: "Coop_URL".into(),
            primary_name: "Coop_Name".into(),
            primary_producer: "Coop_Produzent".into(),
            primary_price: "Coop_Preis".into(),
            secondary_id: "FP_Sku".into(),
            secondary_name: "FP_Name".into(),
            secondary_producer: "FP_Produzent".into(),
            secondary_price: "FP_Preis".into(),
            score: "Fuzzy_Score".into(),
            status: "Match_Status".into(),
        }
    }
}

/// Status vocabulary of the match table.
///
/// `no_match` marks rows without a correspondence. When `valid` is
/// non-empty only the listed statuses count as real matches. `verified`
/// and `scored` are the labels written back for manual and automated
/// matches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub no_match: String,
    pub verified: String,
    pub scored: String,
    pub valid: Vec<String>,
    pub verified_score: f64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            no_match: "Kein Match".into(),
            verified: "Manueller Match".into(),
            scored: "Automatischer Match".into(),
            valid: Vec::new(),
            verified_score: -1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// One left join onto the match table.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichPass {
    /// Output column name (e.g. `FP_Lieferant`).
    pub column: String,
    pub file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    /// Key column in the auxiliary table.
    pub key: String,
    /// Value column in the auxiliary table.
    pub value: String,
    #[serde(default)]
    pub kind: ValueKind,
    /// Match-table column to join on instead of the secondary id.
    #[serde(default)]
    pub match_column: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Text,
    Number,
}

// ---------------------------------------------------------------------------
// Producers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerVocabulary {
    pub suffixes: Vec<String>,
    pub exclusions: Vec<String>,
}

const DEFAULT_SUFFIXES: &[&str] = &["e figli", "et fils", "y hijos", "vignerons", "vigneron"];

const DEFAULT_EXCLUSIONS: &[&str] = &[
    "azienda agricola",
    "marchesi de",
    "barons de",
    "baron philippe",
    "feudi di",
    "feudi",
    "ac",
    "a.c.",
    "aoc",
    "aop",
    "do",
    "doc",
    "igt",
    "docg",
    "igp",
    "doca",
    "vinhos",
    "appellation",
    "controlee",
    "maison",
    "fratelli",
    "tenuta",
    "cantina",
    "famille",
    "marchesi",
    "raventos",
    "tenimenti",
    "azienda",
    "agricola",
    "cantine",
    "bodega",
    "estate",
    "winery",
    "bodegas",
    "domaine",
    "domaines",
    "weingut",
];

impl Default for ProducerVocabulary {
    fn default() -> Self {
        Self {
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Fixed category order for wine-type breakdowns.
    pub wine_types: Vec<String>,
    /// Countries that get a macro-region breakdown.
    pub countries: Vec<String>,
    pub top_countries: usize,
    pub top_producers: usize,
    pub producer_comparison_top: usize,
    /// Share difference (percentage points) worth reporting.
    pub threshold_pp: f64,
    pub price_threshold_pp: f64,
    pub outliers: usize,
    pub top_wines: usize,
    pub top_suppliers: usize,
    pub sweet_spot: SweetSpotConfig,
    /// Vintage allowlist applied to both catalogs. Empty keeps all.
    pub vintages: Vec<i32>,
    pub currency: String,
    /// Enriched column holding sales figures.
    pub sales_column: String,
    /// Enriched column holding supplier names.
    pub supplier_column: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            wine_types: ["Rotwein", "Weisswein", "Roséwein", "Schaumwein"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            countries: ["Frankreich", "Italien", "Schweiz", "Spanien"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            top_countries: 10,
            top_producers: 30,
            producer_comparison_top: 15,
            threshold_pp: 2.0,
            price_threshold_pp: 5.0,
            outliers: 20,
            top_wines: 15,
            top_suppliers: 10,
            sweet_spot: SweetSpotConfig::default(),
            vintages: Vec::new(),
            currency: "CHF".into(),
            sales_column: "NPS_FP".into(),
            supplier_column: "FP_Lieferant".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweetSpotConfig {
    /// Minimum % by which the primary price exceeds the secondary one.
    pub primary_pricier_pct: f64,
    /// Minimum % by which the secondary price exceeds the primary one.
    pub secondary_pricier_pct: f64,
    /// Sales threshold. The 75th percentile of matched sales when absent.
    pub min_sales: Option<f64>,
}

impl Default for SweetSpotConfig {
    fn default() -> Self {
        Self {
            primary_pricier_pct: 10.0,
            secondary_pricier_pct: 10.0,
            min_sales: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Xlsx,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: RunConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        for (role, catalog) in [("primary", &self.primary), ("secondary", &self.secondary)] {
            if catalog.columns.id.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "{role}: id column must not be empty"
                )));
            }
            if catalog.region_delimiter.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "{role}: region_delimiter must not be empty"
                )));
            }
        }

        if self.matches.columns.primary_id.trim().is_empty()
            || self.matches.columns.secondary_id.trim().is_empty()
        {
            return Err(ReconError::ConfigValidation(
                "matches: id columns must not be empty".into(),
            ));
        }
        if self.matches.status.no_match.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "matches.status.no_match must not be empty".into(),
            ));
        }
        if self.matches.status.verified_score > 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "matches.status.verified_score must be <= 0, got {}",
                self.matches.status.verified_score
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for pass in &self.enrich {
            if pass.column.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "enrich: column must not be empty".into(),
                ));
            }
            if !seen.insert(pass.column.trim()) {
                return Err(ReconError::ConfigValidation(format!(
                    "enrich: duplicate column '{}'",
                    pass.column
                )));
            }
            if pass.key.trim().is_empty() || pass.value.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "enrich '{}': key and value columns must not be empty",
                    pass.column
                )));
            }
        }

        let a = &self.analysis;
        for (label, value) in [
            ("threshold_pp", a.threshold_pp),
            ("price_threshold_pp", a.price_threshold_pp),
            ("sweet_spot.primary_pricier_pct", a.sweet_spot.primary_pricier_pct),
            ("sweet_spot.secondary_pricier_pct", a.sweet_spot.secondary_pricier_pct),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "analysis.{label} must be >= 0, got {value}"
                )));
            }
        }
        if a.sweet_spot.min_sales.is_some_and(|v| !v.is_finite()) {
            return Err(ReconError::ConfigValidation(
                "analysis.sweet_spot.min_sales must be finite".into(),
            ));
        }
        for (label, value) in [
            ("top_countries", a.top_countries),
            ("top_producers", a.top_producers),
            ("producer_comparison_top", a.producer_comparison_top),
            ("outliers", a.outliers),
            ("top_wines", a.top_wines),
            ("top_suppliers", a.top_suppliers),
        ] {
            if value == 0 {
                return Err(ReconError::ConfigValidation(format!(
                    "analysis.{label} must be > 0"
                )));
            }
        }

        Ok(())
    }

    pub fn primary_label(&self) -> String {
        self.primary.label.clone().unwrap_or_else(|| "primary".into())
    }

    pub fn secondary_label(&self) -> String {
        self.secondary.label.clone().unwrap_or_else(|| "secondary".into())
    }
}

impl CatalogConfig {
    pub fn scheme_name<'a>(&'a self, role: &'a str) -> &'a str {
        self.region_scheme.as_deref().unwrap_or(role)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
