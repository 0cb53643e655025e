//! Cross-year trends over the successfully built years.
//!
//! RULES:
//!   - Every change is measured against the earliest study year.
//!   - A zero or missing baseline has no change (None), never ±inf.
//!   - A multiplier that was positive in the baseline year and is exactly
//!     zero later is flagged as a data revision, not an efficiency gain.

use crate::{
    footprint::{DestinationViewRow, PriceIntensityRow, SectorFootprintRow},
    types::StudyYear,
};
use serde::Serialize;

/// Movers logged in each direction.
const TOP_MOVERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrendRow {
    pub category:            String,
    pub year:                StudyYear,
    pub footprint:           f64,
    pub change_vs_first_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiplierTrendRow {
    pub code:                String,
    pub name:                String,
    pub year:                StudyYear,
    pub multiplier:          f64,
    pub change_vs_first_pct: Option<f64>,
    pub dropped_to_zero:     bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntensityTrendRow {
    pub year:               StudyYear,
    pub deflator:           f64,
    pub intensity_nominal:  f64,
    pub intensity_real:     f64,
    pub nominal_change_pct: Option<f64>,
    pub real_change_pct:    Option<f64>,
}

fn change_pct(base: f64, value: f64) -> Option<f64> {
    (base != 0.0).then(|| 100.0 * (value - base) / base)
}

fn sorted_years(years: impl Iterator<Item = StudyYear>) -> Vec<StudyYear> {
    let mut years: Vec<StudyYear> = years.collect();
    years.sort_unstable();
    years.dedup();
    years
}

/// Destination-category footprint per year. A category absent from a
/// year counts as zero there.
pub fn category_trends<'a>(rows: impl IntoIterator<Item = &'a DestinationViewRow>) -> Vec<CategoryTrendRow> {
    let rows: Vec<&DestinationViewRow> = rows.into_iter().collect();
    let years = sorted_years(rows.iter().map(|r| r.year));
    let Some(&first) = years.first() else {
        return Vec::new();
    };

    let mut categories: Vec<&str> = Vec::new();
    for r in &rows {
        if !categories.contains(&r.category.as_str()) {
            categories.push(&r.category);
        }
    }
    let value = |category: &str, year: StudyYear| -> f64 {
        rows.iter()
            .filter(|r| r.year == year && r.category == category)
            .map(|r| r.footprint)
            .sum()
    };

    let mut out = Vec::with_capacity(categories.len() * years.len());
    for category in categories {
        let base = value(category, first);
        for &year in &years {
            let footprint = value(category, year);
            out.push(CategoryTrendRow {
                category: category.to_string(),
                year,
                footprint,
                change_vs_first_pct: change_pct(base, footprint),
            });
        }
    }
    if let Some(&last) = years.last() {
        log_movers("category footprint", first, last, out.iter().filter(|r| r.year == last).filter_map(
            |r| r.change_vs_first_pct.map(|c| (r.category.as_str(), c)),
        ));
    }
    out
}

/// Type I resource multiplier WL[j] per sector code across years.
pub fn multiplier_trends<'a>(rows: impl IntoIterator<Item = &'a SectorFootprintRow>) -> Vec<MultiplierTrendRow> {
    let rows: Vec<&SectorFootprintRow> = rows.into_iter().collect();
    let years = sorted_years(rows.iter().map(|r| r.year));
    let Some(&first) = years.first() else {
        return Vec::new();
    };

    let mut codes: Vec<&str> = Vec::new();
    for r in &rows {
        if !codes.contains(&r.code.as_str()) {
            codes.push(&r.code);
        }
    }

    let mut out = Vec::with_capacity(rows.len());
    for code in codes {
        let find = |year: StudyYear| rows.iter().find(|r| r.year == year && r.code == code);
        let base = find(first).map(|r| r.multiplier);
        for &year in &years {
            let Some(row) = find(year) else { continue };
            let dropped_to_zero = year != first && row.multiplier == 0.0 && base.is_some_and(|b| b > 0.0);
            if dropped_to_zero {
                log::warn!(
                    "multiplier {code} ({}) fell to zero in {year} from {:.3} in {first}; treat as a data revision",
                    row.name,
                    base.unwrap_or_default()
                );
            }
            out.push(MultiplierTrendRow {
                code: code.to_string(),
                name: row.name.clone(),
                year,
                multiplier: row.multiplier,
                change_vs_first_pct: base.and_then(|b| change_pct(b, row.multiplier)),
                dropped_to_zero,
            });
        }
    }
    if let Some(&last) = years.last() {
        log_movers("multiplier", first, last, out.iter().filter(|r| r.year == last && !r.dropped_to_zero).filter_map(
            |r| r.change_vs_first_pct.map(|c| (r.code.as_str(), c)),
        ));
    }
    out
}

/// Nominal and real footprint intensity per year.
pub fn intensity_trends<'a>(rows: impl IntoIterator<Item = &'a PriceIntensityRow>) -> Vec<IntensityTrendRow> {
    let mut rows: Vec<&PriceIntensityRow> = rows.into_iter().collect();
    rows.sort_by_key(|r| r.year);
    let Some(base) = rows.first().copied() else {
        return Vec::new();
    };
    rows.iter()
        .map(|r| IntensityTrendRow {
            year:               r.year,
            deflator:           r.deflator,
            intensity_nominal:  r.intensity_nominal,
            intensity_real:     r.intensity_real,
            nominal_change_pct: change_pct(base.intensity_nominal, r.intensity_nominal),
            real_change_pct:    change_pct(base.intensity_real, r.intensity_real),
        })
        .collect()
}

fn log_movers<'a>(metric: &str, first: StudyYear, last: StudyYear, changes: impl Iterator<Item = (&'a str, f64)>) {
    let mut changes: Vec<(&str, f64)> = changes.collect();
    if first == last || changes.is_empty() {
        return;
    }
    changes.sort_by(|a, b| a.1.total_cmp(&b.1));
    let fell: Vec<String> = changes.iter().take(TOP_MOVERS).map(|(k, c)| format!("{k} {c:+.1}%")).collect();
    let rose: Vec<String> = changes.iter().rev().take(TOP_MOVERS).map(|(k, c)| format!("{k} {c:+.1}%")).collect();
    log::info!("{metric} trend {first}→{last}: fell most [{}]; rose most [{}]", fell.join(", "), rose.join(", "));
}
