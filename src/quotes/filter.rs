//! Insurer, coverage-band and premium-sort view over accumulated quotes.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::NormalizedQuote;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsurerFilter {
    #[default]
    All,
    /// Exact provider display name.
    Named(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum CoverageBand {
    #[serde(rename = "upto_25k")]
    Upto25k,
    #[serde(rename = "25k_50k")]
    From25kTo50k,
    #[serde(rename = "50k_100k")]
    From50kTo100k,
    #[serde(rename = "100k_250k")]
    From100kTo250k,
    #[serde(rename = "250k_500k")]
    From250kTo500k,
    #[serde(rename = "500k_1m")]
    From500kTo1m,
    #[serde(rename = "above_1m")]
    Above1m,
    /// `[75000, 125000]`, always sorted by premium, highest first.
    #[default]
    #[serde(rename = "most_popular")]
    MostPopular,
    /// No coverage filtering.
    #[serde(rename = "show_all")]
    ShowAll,
}

impl CoverageBand {
    pub const ALL: [CoverageBand; 9] = [
        CoverageBand::Upto25k,
        CoverageBand::From25kTo50k,
        CoverageBand::From50kTo100k,
        CoverageBand::From100kTo250k,
        CoverageBand::From250kTo500k,
        CoverageBand::From500kTo1m,
        CoverageBand::Above1m,
        CoverageBand::MostPopular,
        CoverageBand::ShowAll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageBand::Upto25k => "upto_25k",
            CoverageBand::From25kTo50k => "25k_50k",
            CoverageBand::From50kTo100k => "50k_100k",
            CoverageBand::From100kTo250k => "100k_250k",
            CoverageBand::From250kTo500k => "250k_500k",
            CoverageBand::From500kTo1m => "500k_1m",
            CoverageBand::Above1m => "above_1m",
            CoverageBand::MostPopular => "most_popular",
            CoverageBand::ShowAll => "show_all",
        }
    }

    /// Whether `sum_insured` falls inside the band. Fixed bands are `[min, max)`.
    pub fn contains(&self, sum_insured: f64) -> bool {
        let si = if sum_insured.is_finite() { sum_insured } else { 0.0 };
        let (min, max) = match self {
            CoverageBand::Upto25k => (0.0, 25_000.0),
            CoverageBand::From25kTo50k => (25_000.0, 50_000.0),
            CoverageBand::From50kTo100k => (50_000.0, 100_000.0),
            CoverageBand::From100kTo250k => (100_000.0, 250_000.0),
            CoverageBand::From250kTo500k => (250_000.0, 500_000.0),
            CoverageBand::From500kTo1m => (500_000.0, 1_000_000.0),
            CoverageBand::Above1m => (1_000_000.0, f64::INFINITY),
            CoverageBand::MostPopular => return (75_000.0..=125_000.0).contains(&si),
            CoverageBand::ShowAll => return true,
        };
        si >= min && si < max
    }
}

impl fmt::Display for CoverageBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverageBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        CoverageBand::ALL
            .into_iter()
            .find(|band| band.as_str() == wanted)
            .ok_or_else(|| format!("Unknown coverage band '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSort {
    #[default]
    LowToHigh,
    HighToLow,
}

impl FromStr for PriceSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "low_to_high" | "lowtohigh" | "asc" => Ok(PriceSort::LowToHigh),
            "high_to_low" | "hightolow" | "desc" => Ok(PriceSort::HighToLow),
            _ => Err(format!("Unknown price sort '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuoteFilters {
    #[serde(default)]
    pub insurer: InsurerFilter,
    #[serde(default)]
    pub coverage_band: CoverageBand,
    #[serde(default)]
    pub price_sort: PriceSort,
}

impl QuoteFilters {
    /// True when any filter differs from its default.
    pub fn any_active(&self) -> bool {
        *self != QuoteFilters::default()
    }

    pub fn reset(&mut self) {
        *self = QuoteFilters::default();
    }
}

/// Derives the displayed list. Input order is kept among equal premiums.
pub fn apply(quotes: &[NormalizedQuote], filters: &QuoteFilters) -> Vec<NormalizedQuote> {
    let mut view: Vec<NormalizedQuote> = quotes
        .iter()
        .filter(|quote| match &filters.insurer {
            InsurerFilter::All => true,
            InsurerFilter::Named(name) => quote.provider == *name,
        })
        .filter(|quote| filters.coverage_band.contains(quote.sum_insured))
        .cloned()
        .collect();

    // Most popular carries its own ordering and ignores the requested sort.
    let descending = filters.coverage_band == CoverageBand::MostPopular
        || filters.price_sort == PriceSort::HighToLow;

    view.sort_by(|a, b| {
        let ordering = compare_premium(a, b);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    view
}

/// Quotes that can be bought: a positive premium is required.
pub fn purchasable(quotes: &[NormalizedQuote]) -> Vec<NormalizedQuote> {
    quotes.iter().filter(|q| q.is_purchasable()).cloned().collect()
}

/// Distinct provider names in order of first appearance, for the insurer picker.
pub fn providers(quotes: &[NormalizedQuote]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for quote in quotes {
        if !names.contains(&quote.provider) {
            names.push(quote.provider.clone());
        }
    }
    names
}

/// Non-finite premiums compare as `0`.
fn compare_premium(a: &NormalizedQuote, b: &NormalizedQuote) -> Ordering {
    let key = |q: &NormalizedQuote| if q.net_premium.is_finite() { q.net_premium } else { 0.0 };
    key(a).total_cmp(&key(b))
}
