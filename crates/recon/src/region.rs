//! Hierarchical region strings and macro-region tables.
//!
//! Catalogs write origins as delimited paths ("Frankreich, Bordeaux" or
//! "Italien > Veneto > Asolo"). The first segment is the country; the rest is
//! kept as one compound subregion. Macro regions come from external tables
//! so that new subregions need no code change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::normalize::{capitalize, slugify};

/// Compiled-in default tables.
pub const BUNDLED_REGIONS: &str = include_str!("../data/regions.toml");

// ---------------------------------------------------------------------------
// Path parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionPath {
    pub country: String,
    /// Everything after the first delimiter, or `None` when absent.
    pub subregion: Option<String>,
}

impl RegionPath {
    pub fn parse(raw: &str, delimiter: &str) -> Self {
        let token = split_token(delimiter);
        match raw.split_once(token) {
            Some((country, rest)) => {
                let rest = rest.trim();
                Self {
                    country: country.trim().to_string(),
                    subregion: (!rest.is_empty()).then(|| rest.to_string()),
                }
            }
            None => Self {
                country: raw.trim().to_string(),
                subregion: None,
            },
        }
    }
}

/// The delimiter without surrounding padding, so `" > "` also splits `"a>b"`.
fn split_token(delimiter: &str) -> &str {
    let trimmed = delimiter.trim();
    if trimmed.is_empty() {
        delimiter
    } else {
        trimmed
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStyle {
    #[default]
    Slug,
    Raw,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    #[default]
    Capitalize,
    FirstSegment,
    Label,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainsRule {
    pub needle: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountryTable {
    #[serde(default)]
    pub key: Option<KeyStyle>,
    #[serde(default)]
    pub collapse_hyphens: Option<bool>,
    #[serde(default)]
    pub fallback: Option<Fallback>,
    #[serde(default)]
    pub fallback_label: Option<String>,
    #[serde(default)]
    pub contains: Vec<ContainsRule>,
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionScheme {
    #[serde(default = "default_no_subregion")]
    pub no_subregion: String,
    #[serde(default)]
    pub key: KeyStyle,
    #[serde(default)]
    pub collapse_hyphens: bool,
    #[serde(default)]
    pub fallback: Fallback,
    #[serde(default)]
    pub fallback_label: Option<String>,
    #[serde(default)]
    pub countries: BTreeMap<String, CountryTable>,
}

fn default_no_subregion() -> String {
    "Keine Subregion".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionTables {
    pub schemes: BTreeMap<String, RegionScheme>,
}

impl RegionTables {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let tables: RegionTables =
            toml::from_str(input).map_err(|e| ReconError::RegionTable(e.to_string()))?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn bundled() -> Result<Self, ReconError> {
        Self::from_toml(BUNDLED_REGIONS)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        for (scheme_name, scheme) in &self.schemes {
            if scheme.no_subregion.trim().is_empty() {
                return Err(ReconError::RegionTable(format!(
                    "scheme '{scheme_name}': no_subregion must not be empty"
                )));
            }
            for (country, table) in &scheme.countries {
                let fallback = table.fallback.unwrap_or(scheme.fallback);
                let label = table.fallback_label.as_ref().or(scheme.fallback_label.as_ref());
                if fallback == Fallback::Label && label.map_or(true, |l| l.trim().is_empty()) {
                    return Err(ReconError::RegionTable(format!(
                        "scheme '{scheme_name}', country '{country}': fallback = \"label\" needs fallback_label"
                    )));
                }
                if table.contains.iter().any(|r| r.needle.is_empty()) {
                    return Err(ReconError::RegionTable(format!(
                        "scheme '{scheme_name}', country '{country}': empty contains needle"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn resolver(&self, scheme: &str, delimiter: &str) -> Result<RegionResolver<'_>, ReconError> {
        let scheme = self.schemes.get(scheme).ok_or_else(|| {
            ReconError::RegionTable(format!("unknown region scheme '{scheme}'"))
        })?;
        Ok(RegionResolver {
            scheme,
            delimiter: delimiter.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// One catalog's view of the region tables.
#[derive(Debug, Clone)]
pub struct RegionResolver<'a> {
    scheme: &'a RegionScheme,
    delimiter: String,
}

impl RegionResolver<'_> {
    pub fn parse(&self, raw: &str) -> RegionPath {
        RegionPath::parse(raw, &self.delimiter)
    }

    pub fn country(&self, raw: &str) -> String {
        self.parse(raw).country
    }

    /// Macro region of `path` within its country.
    pub fn macro_region(&self, path: &RegionPath) -> String {
        let empty = CountryTable::default();
        let table = self.scheme.countries.get(&path.country).unwrap_or(&empty);

        let subregion = path.subregion.as_deref().unwrap_or(&self.scheme.no_subregion);
        let key = match table.key.unwrap_or(self.scheme.key) {
            KeyStyle::Slug => slugify(
                subregion,
                table.collapse_hyphens.unwrap_or(self.scheme.collapse_hyphens),
            ),
            KeyStyle::Raw => subregion.trim().to_string(),
        };

        if let Some(rule) = table.contains.iter().find(|r| key.contains(&r.needle)) {
            return rule.label.clone();
        }
        if let Some(label) = table.map.get(&key) {
            return label.clone();
        }
        match table.fallback.unwrap_or(self.scheme.fallback) {
            Fallback::Capitalize => capitalize(&key),
            Fallback::FirstSegment => subregion
                .split(split_token(&self.delimiter))
                .next()
                .unwrap_or(subregion)
                .trim()
                .to_string(),
            Fallback::Label => table
                .fallback_label
                .clone()
                .or_else(|| self.scheme.fallback_label.clone())
                .unwrap_or_default(),
        }
    }
}
