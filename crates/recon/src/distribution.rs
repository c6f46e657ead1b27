//! Categorical distributions and subset-vs-whole comparisons.
//!
//! Shares are always relative to their own distribution's total, so a gap
//! set a tenth the size of the catalog still compares on equal footing.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::model::CatalogRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub count: usize,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Distribution {
    pub total: usize,
    pub categories: Vec<CategoryShare>,
}

#[derive(Debug, Clone, Copy)]
pub enum CategoryOrder<'a> {
    /// Exactly these categories, in this order. Others are ignored.
    Fixed(&'a [String]),
    /// Every category seen, most frequent first.
    ByCount,
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

impl Distribution {
    pub fn count(&self, category: &str) -> usize {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map_or(0, |c| c.count)
    }

    pub fn share_pct(&self, category: &str) -> f64 {
        share(self.count(category), self.total)
    }

    /// The first `n` categories, with shares relative to their own sum.
    pub fn truncated(&self, n: usize) -> Distribution {
        let kept: Vec<_> = self.categories.iter().take(n).cloned().collect();
        let total = kept.iter().map(|c| c.count).sum();
        Distribution {
            total,
            categories: kept
                .into_iter()
                .map(|mut c| {
                    c.share_pct = share(c.count, total);
                    c
                })
                .collect(),
        }
    }
}

pub fn distribution<'a>(values: impl IntoIterator<Item = &'a str>, order: CategoryOrder<'_>) -> Distribution {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        let v = v.trim();
        if !v.is_empty() {
            *counts.entry(v).or_default() += 1;
        }
    }

    let ordered: Vec<(String, usize)> = match order {
        CategoryOrder::Fixed(list) => list
            .iter()
            .map(|c| (c.clone(), counts.get(c.trim()).copied().unwrap_or(0)))
            .collect(),
        CategoryOrder::ByCount => {
            let mut all: Vec<(String, usize)> =
                counts.iter().map(|(k, v)| (k.to_string(), *v)).collect();
            all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            all
        }
    };

    let total = ordered.iter().map(|(_, n)| n).sum();
    Distribution {
        total,
        categories: ordered
            .into_iter()
            .map(|(category, count)| CategoryShare {
                share_pct: share(count, total),
                category,
                count,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareDelta {
    pub category: String,
    pub subset_count: usize,
    pub subset_share_pct: f64,
    pub whole_count: usize,
    pub whole_share_pct: f64,
    /// Percentage points, subset minus whole.
    pub delta_pp: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comparison {
    pub subset_total: usize,
    pub whole_total: usize,
    pub rows: Vec<ShareDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Notable {
    pub over: Vec<ShareDelta>,
    pub under: Vec<ShareDelta>,
}

impl Notable {
    pub fn is_empty(&self) -> bool {
        self.over.is_empty() && self.under.is_empty()
    }
}

/// Per-category share difference between two distributions.
pub fn compare(subset: &Distribution, whole: &Distribution, order: CategoryOrder<'_>) -> Comparison {
    let categories: Vec<String> = match order {
        CategoryOrder::Fixed(list) => list.to_vec(),
        CategoryOrder::ByCount => {
            let mut seen = HashSet::new();
            let mut all: Vec<String> = subset
                .categories
                .iter()
                .chain(&whole.categories)
                .filter(|c| seen.insert(c.category.clone()))
                .map(|c| c.category.clone())
                .collect();
            all.sort_by(|a, b| {
                subset
                    .count(b)
                    .cmp(&subset.count(a))
                    .then_with(|| whole.count(b).cmp(&whole.count(a)))
                    .then_with(|| a.cmp(b))
            });
            all
        }
    };

    let rows = categories
        .into_iter()
        .map(|category| {
            let subset_count = subset.count(&category);
            let whole_count = whole.count(&category);
            let subset_share_pct = share(subset_count, subset.total);
            let whole_share_pct = share(whole_count, whole.total);
            ShareDelta {
                category,
                subset_count,
                subset_share_pct,
                whole_count,
                whole_share_pct,
                delta_pp: subset_share_pct - whole_share_pct,
            }
        })
        .collect();

    Comparison {
        subset_total: subset.total,
        whole_total: whole.total,
        rows,
    }
}

impl Comparison {
    /// Categories over- or under-represented by at least `threshold_pp`,
    /// largest deviation first.
    pub fn notable(&self, threshold_pp: f64) -> Notable {
        let by_magnitude = |a: &ShareDelta, b: &ShareDelta| {
            b.delta_pp
                .abs()
                .partial_cmp(&a.delta_pp.abs())
                .unwrap_or(Ordering::Equal)
        };
        let mut over: Vec<ShareDelta> =
            self.rows.iter().filter(|r| r.delta_pp >= threshold_pp).cloned().collect();
        let mut under: Vec<ShareDelta> =
            self.rows.iter().filter(|r| r.delta_pp <= -threshold_pp).cloned().collect();
        over.sort_by(by_magnitude);
        under.sort_by(by_magnitude);
        Notable { over, under }
    }

    /// Rows among the `n` largest categories of either side, order kept.
    pub fn top(&self, n: usize) -> Comparison {
        let rank = |key: fn(&ShareDelta) -> usize| -> HashSet<String> {
            let mut rows: Vec<&ShareDelta> = self.rows.iter().filter(|r| key(r) > 0).collect();
            rows.sort_by(|a, b| key(b).cmp(&key(a)).then_with(|| a.category.cmp(&b.category)));
            rows.into_iter().take(n).map(|r| r.category.clone()).collect()
        };
        let keep: HashSet<String> = rank(|r| r.subset_count)
            .union(&rank(|r| r.whole_count))
            .cloned()
            .collect();
        Comparison {
            rows: self.rows.iter().filter(|r| keep.contains(&r.category)).cloned().collect(),
            ..self.clone()
        }
    }

    pub fn delta_sum(&self) -> f64 {
        self.rows.iter().map(|r| r.delta_pp).sum()
    }
}

// ---------------------------------------------------------------------------
// Price bands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBands {
    pub edges: Vec<f64>,
    pub labels: Vec<String>,
}

impl PriceBands {
    /// 0–20, 20–50, 50–100 and, when `max_price` exceeds 100, a fourth
    /// band up to the rounded maximum. A catalog topping out at 100 gets
    /// three bands rather than an always-present empty fourth one.
    pub fn standard(max_price: f64, currency: &str) -> Self {
        let mut edges = vec![0.0, 20.0, 50.0, 100.0];
        if max_price > 100.0 {
            edges.push(max_price);
        }
        let labels = edges
            .windows(2)
            .map(|w| format!("{:.0}–{:.0} {currency}", w[0], w[1].round()))
            .collect();
        Self { edges, labels }
    }

    /// Band index of `price`. Bands are half-open except the last, which
    /// includes its upper edge.
    pub fn band(&self, price: f64) -> Option<usize> {
        let last = self.edges.len().checked_sub(2)?;
        self.edges.windows(2).enumerate().find_map(|(i, w)| {
            let inside = if i == last {
                price >= w[0] && price <= w[1]
            } else {
                price >= w[0] && price < w[1]
            };
            inside.then_some(i)
        })
    }

    pub fn label_of(&self, price: f64) -> Option<&str> {
        self.band(price).map(|i| self.labels[i].as_str())
    }
}

/// Price-band distribution of the records that have a price.
pub fn band_distribution(records: &[CatalogRecord], bands: &PriceBands) -> Distribution {
    distribution(
        records.iter().filter_map(|r| r.price).filter_map(|p| bands.label_of(p)),
        CategoryOrder::Fixed(&bands.labels),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandMix {
    pub band: String,
    pub mix: Distribution,
}

/// Wine-type mix within each price band.
pub fn band_mix(records: &[CatalogRecord], bands: &PriceBands, types: &[String]) -> Vec<BandMix> {
    bands
        .labels
        .iter()
        .enumerate()
        .map(|(i, label)| BandMix {
            band: label.clone(),
            mix: distribution(
                records
                    .iter()
                    .filter(|r| r.price.and_then(|p| bands.band(p)) == Some(i))
                    .filter_map(|r| r.wine_type.as_deref()),
                CategoryOrder::Fixed(types),
            ),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandMixComparison {
    pub band: String,
    pub comparison: Comparison,
}

pub fn compare_band_mix(
    subset: &[CatalogRecord],
    whole: &[CatalogRecord],
    bands: &PriceBands,
    types: &[String],
) -> Vec<BandMixComparison> {
    band_mix(subset, bands, types)
        .into_iter()
        .zip(band_mix(whole, bands, types))
        .map(|(s, w)| BandMixComparison {
            band: s.band,
            comparison: compare(&s.mix, &w.mix, CategoryOrder::Fixed(types)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> Vec<String> {
        ["Rotwein", "Weisswein", "Roséwein", "Schaumwein"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    // ---- Distribution ----

    #[test]
    fn fixed_order_ignores_other_categories() {
        let order = types();
        let d = distribution(
            ["Rotwein", "Rotwein", "Weisswein", "Süsswein", ""],
            CategoryOrder::Fixed(&order),
        );
        assert_eq!(d.total, 3);
        assert_eq!(d.categories.len(), 4);
        assert_eq!(d.categories[0].count, 2);
        assert_eq!(d.categories[3].count, 0);
        assert!((d.categories[0].share_pct - 66.666).abs() < 0.01);
    }

    #[test]
    fn by_count_order() {
        let d = distribution(["b", "a", "b", "c", "a", "b"], CategoryOrder::ByCount);
        let names: Vec<_> = d.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    // ---- Comparison ----

    #[test]
    fn comparison_deltas_sum_to_zero() {
        let order = types();
        let subset = distribution(["Rotwein", "Weisswein", "Weisswein"], CategoryOrder::Fixed(&order));
        let whole = distribution(
            ["Rotwein", "Rotwein", "Rotwein", "Weisswein", "Roséwein"],
            CategoryOrder::Fixed(&order),
        );
        let cmp = compare(&subset, &whole, CategoryOrder::Fixed(&order));
        assert!(cmp.delta_sum().abs() < 1e-9);
        assert!((cmp.rows[1].delta_pp - (200.0 / 3.0 - 20.0)).abs() < 1e-9);

        let notable = cmp.notable(2.0);
        assert_eq!(notable.over[0].category, "Weisswein");
        assert_eq!(notable.under[0].category, "Rotwein");
    }

    #[test]
    fn comparison_with_empty_subset() {
        let order = types();
        let subset = distribution(Vec::<&str>::new(), CategoryOrder::Fixed(&order));
        let whole = distribution(["Rotwein"], CategoryOrder::Fixed(&order));
        let cmp = compare(&subset, &whole, CategoryOrder::Fixed(&order));
        assert_eq!(cmp.rows[0].subset_share_pct, 0.0);
        assert_eq!(cmp.rows[0].delta_pp, -100.0);
    }

    #[test]
    fn top_keeps_union_of_leaders() {
        let subset = distribution(["x", "x", "y"], CategoryOrder::ByCount);
        let whole = distribution(["z", "z", "z", "y", "w"], CategoryOrder::ByCount);
        let cmp = compare(&subset, &whole, CategoryOrder::ByCount).top(1);
        let names: Vec<_> = cmp.rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(names, vec!["x", "z"]);
    }

    // ---- Price bands ----

    #[test]
    fn bands_up_to_hundred() {
        let bands = PriceBands::standard(80.0, "CHF");
        assert_eq!(bands.labels, vec!["0–20 CHF", "20–50 CHF", "50–100 CHF"]);
        assert_eq!(bands.band(0.0), Some(0));
        assert_eq!(bands.band(20.0), Some(1));
        assert_eq!(bands.band(100.0), Some(2));
        assert_eq!(bands.band(100.5), None);
        assert_eq!(bands.band(-1.0), None);
        assert_eq!(PriceBands::standard(100.0, "CHF").labels.len(), 3);
    }

    #[test]
    fn bands_above_hundred() {
        let bands = PriceBands::standard(249.6, "CHF");
        assert_eq!(bands.labels.len(), 4);
        assert_eq!(bands.labels[3], "100–250 CHF");
        assert_eq!(bands.band(100.0), Some(3));
        assert_eq!(bands.band(249.6), Some(3));
    }
}
