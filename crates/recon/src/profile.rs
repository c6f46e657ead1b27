//! Assortment profile of a single catalog.

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::distribution::{
    band_distribution, band_mix, distribution, BandMix, CategoryOrder, Distribution, PriceBands,
};
use crate::model::{CatalogField, CatalogRecord, CatalogTable};
use crate::outcome::{Outcome, Warning};
use crate::region::RegionResolver;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRegions {
    pub country: String,
    pub regions: Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogProfile {
    pub label: String,
    pub total: usize,
    pub wine_types: Distribution,
    pub price_bands: PriceBands,
    pub prices: Distribution,
    pub band_mix: Vec<BandMix>,
    pub top_countries: Distribution,
    pub regions: Vec<CountryRegions>,
}

pub fn country_distribution(records: &[CatalogRecord], resolver: &RegionResolver<'_>) -> Distribution {
    let countries: Vec<String> = records
        .iter()
        .filter_map(|r| r.region.as_deref())
        .map(|raw| resolver.country(raw))
        .collect();
    distribution(countries.iter().map(String::as_str), CategoryOrder::ByCount)
}

/// Macro-region breakdown of the records from `country`.
pub fn region_distribution(
    records: &[CatalogRecord],
    resolver: &RegionResolver<'_>,
    country: &str,
) -> Distribution {
    let regions: Vec<String> = records
        .iter()
        .filter_map(|r| r.region.as_deref())
        .map(|raw| resolver.parse(raw))
        .filter(|path| path.country == country)
        .map(|path| resolver.macro_region(&path))
        .collect();
    distribution(regions.iter().map(String::as_str), CategoryOrder::ByCount)
}

fn no_data(section: &str, reason: impl Into<String>) -> Warning {
    Warning::NoData {
        section: section.to_string(),
        reason: reason.into(),
    }
}

pub fn profile(
    catalog: &CatalogTable,
    resolver: &RegionResolver<'_>,
    analysis: &AnalysisConfig,
) -> Outcome<CatalogProfile> {
    let mut warnings = Vec::new();
    let section = format!("{} profile", catalog.label);
    if catalog.is_empty() {
        warnings.push(no_data(&section, "catalog has no rows"));
    }
    for (field, what) in [
        (CatalogField::WineType, "wine types"),
        (CatalogField::Price, "prices"),
        (CatalogField::Region, "regions"),
    ] {
        if !catalog.has(field) {
            warnings.push(no_data(&section, format!("no {what} column")));
        }
    }

    let wine_types = distribution(
        catalog.records.iter().filter_map(|r| r.wine_type.as_deref()),
        CategoryOrder::Fixed(&analysis.wine_types),
    );

    let max_price = catalog.prices().fold(0.0_f64, f64::max);
    let price_bands = PriceBands::standard(max_price, &analysis.currency);
    let prices = band_distribution(&catalog.records, &price_bands);
    let mix = band_mix(&catalog.records, &price_bands, &analysis.wine_types);

    let top_countries = country_distribution(&catalog.records, resolver).truncated(analysis.top_countries);
    let regions = analysis
        .countries
        .iter()
        .map(|country| CountryRegions {
            country: country.clone(),
            regions: region_distribution(&catalog.records, resolver, country),
        })
        .collect();

    Outcome::from_parts(
        CatalogProfile {
            label: catalog.label.clone(),
            total: catalog.len(),
            wine_types,
            price_bands,
            prices,
            band_mix: mix,
            top_countries,
            regions,
        },
        warnings,
    )
}
