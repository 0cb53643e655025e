//! Concordance and the intensity/demand mapper.
//!
//! A concordance relates an external sector classification (size M)
//! to the internal sector space (size N) through named categories:
//!   external codes ──► category ──► internal codes
//!
//! RULES:
//!   - Validated once at construction, never trusted afterward.
//!   - Every external code belongs to exactly one category.
//!   - Every category reaches at least one internal sector.
//!   - Demand is split equally across a category's internal sectors
//!     and must be conserved within tolerance.
//!   - Internal sectors reached by no category get intensity 0.

use crate::{
    config::IntensityAllocation,
    error::{TwfError, TwfResult},
    sector::SectorSpace,
    types::{SectorCode, StudyYear, Vector},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A vector keyed by external sector code.
pub type ExternalVector = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcordanceEntry {
    pub id:            String,
    pub name:          String,
    pub category_type: String,
    #[serde(default)]
    pub external:      Vec<String>,
    pub internal:      Vec<SectorCode>,
}

#[derive(Debug, Clone)]
pub struct Concordance {
    year:        StudyYear,
    entries:     Vec<ConcordanceEntry>,
    /// Resolved internal indices, parallel to `entries`.
    targets:     Vec<Vec<usize>>,
    /// External code → entry position.
    by_external: HashMap<String, usize>,
}

impl Concordance {
    pub fn new(year: StudyYear, space: &SectorSpace, entries: Vec<ConcordanceEntry>) -> TwfResult<Self> {
        let mut by_external: HashMap<String, usize> = HashMap::new();
        let mut targets = Vec::with_capacity(entries.len());

        for (pos, entry) in entries.iter().enumerate() {
            if entry.internal.is_empty() {
                return Err(TwfError::concordance(
                    year,
                    &entry.id,
                    "category maps to zero internal sectors",
                ));
            }
            let mut resolved = Vec::with_capacity(entry.internal.len());
            for code in &entry.internal {
                let idx = space.index_of(code).ok_or_else(|| {
                    TwfError::concordance(
                        year,
                        code,
                        format!("internal sector of category {} is not in the sector space", entry.id),
                    )
                })?;
                if resolved.contains(&idx) {
                    return Err(TwfError::concordance(
                        year,
                        code,
                        format!("internal sector listed twice in category {}", entry.id),
                    ));
                }
                resolved.push(idx);
            }
            targets.push(resolved);

            for code in &entry.external {
                if let Some(&other) = by_external.get(code) {
                    return Err(TwfError::concordance(
                        year,
                        code,
                        format!(
                            "external sector appears in categories {} and {}",
                            entries[other].id, entry.id
                        ),
                    ));
                }
                by_external.insert(code.clone(), pos);
            }
        }

        log::debug!(
            "year={year} concordance: {} categories, {} external sectors",
            entries.len(),
            by_external.len()
        );
        Ok(Self { year, entries, targets, by_external })
    }

    fn entry_for(&self, code: &str) -> TwfResult<usize> {
        self.by_external.get(code).copied().ok_or_else(|| {
            TwfError::concordance(self.year, code, "external sector is absent from the concordance")
        })
    }

    /// Sum a keyed external vector into per-category totals.
    fn category_totals(&self, source: &ExternalVector, what: &str) -> TwfResult<Vec<f64>> {
        let mut totals = vec![0.0; self.entries.len()];
        for (code, &value) in source {
            if !value.is_finite() || value < 0.0 {
                return Err(TwfError::InvariantViolation {
                    year:  self.year,
                    what:  format!("{what} of external sector {code} must be finite and non-negative"),
                    left:  value,
                    right: 0.0,
                });
            }
            let pos = self.entry_for(code)?;
            totals[pos] += value;
        }
        Ok(totals)
    }

    /// Remap a resource-intensity vector onto the internal sector space.
    /// `unit_factor` converts the external unit into the model's monetary unit.
    pub fn map_intensity(
        &self,
        space: &SectorSpace,
        source: &ExternalVector,
        unit_factor: f64,
        allocation: IntensityAllocation,
    ) -> TwfResult<Vector> {
        if !(unit_factor > 0.0 && unit_factor.is_finite()) {
            return Err(TwfError::config("unit_factor", unit_factor, "must be finite and > 0"));
        }
        let totals = self.category_totals(source, "intensity")?;
        let mut w = Vector::zeros(space.len());
        for (total, targets) in totals.iter().zip(&self.targets) {
            let value = total * unit_factor;
            let per_sector = match allocation {
                IntensityAllocation::Replicate  => value,
                IntensityAllocation::EqualShare => value / targets.len() as f64,
            };
            for &idx in targets {
                w[idx] += per_sector;
            }
        }

        let nonzero = w.iter().filter(|&&v| v > 0.0).count();
        log::debug!(
            "year={} intensity: {nonzero}/{} sectors non-zero, Σ={:.1}",
            self.year,
            space.len(),
            w.sum()
        );
        Ok(w)
    }

    /// Remap a final-demand vector: each category's demand is split
    /// equally across its internal sectors, then conservation is checked.
    pub fn map_demand(
        &self,
        space: &SectorSpace,
        label: &str,
        source: &ExternalVector,
        tolerance_pct: f64,
    ) -> TwfResult<Vector> {
        let totals = self.category_totals(source, "demand")?;
        let mut y = Vector::zeros(space.len());
        for (total, targets) in totals.iter().zip(&self.targets) {
            let per_sector = total / targets.len() as f64;
            for &idx in targets {
                y[idx] += per_sector;
            }
        }

        let expected: f64 = source.values().sum();
        let actual = y.sum();
        let diff_pct = check_conservation(self.year, label, actual, expected, tolerance_pct)?;
        log::debug!(
            "year={} demand[{label}]: Σ internal {actual:.1} vs Σ external {expected:.1} (Δ {diff_pct:.4}%)",
            self.year
        );
        Ok(y)
    }
}

/// Relative difference of `actual` from `expected` in percent, or a
/// `Conservation` error when it exceeds `tolerance_pct`.
fn check_conservation(
    year: StudyYear,
    label: &str,
    actual: f64,
    expected: f64,
    tolerance_pct: f64,
) -> TwfResult<f64> {
    let diff_pct = if expected == 0.0 {
        if actual == 0.0 { 0.0 } else { f64::INFINITY }
    } else {
        100.0 * (actual - expected).abs() / expected.abs()
    };
    if diff_pct > tolerance_pct {
        return Err(TwfError::Conservation {
            year,
            label: label.to_string(),
            actual,
            expected,
            diff_pct,
            tolerance_pct,
        });
    }
    Ok(diff_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_loss_beyond_tolerance_is_a_conservation_error() {
        match check_conservation(2019, "inbound", 97.0, 100.0, 2.0) {
            Err(TwfError::Conservation { year, label, diff_pct, .. }) => {
                assert_eq!(year, 2019);
                assert_eq!(label, "inbound");
                assert!((diff_pct - 3.0).abs() < 1e-12);
            }
            other => panic!("expected Conservation, got {other:?}"),
        }
    }

    #[test]
    fn demand_within_tolerance_passes() {
        let diff = check_conservation(2019, "domestic", 99.0, 100.0, 2.0).unwrap();
        assert!((diff - 1.0).abs() < 1e-12);
        assert_eq!(check_conservation(2019, "empty", 0.0, 0.0, 2.0).unwrap(), 0.0);
        assert!(check_conservation(2019, "phantom", 1.0, 0.0, 2.0).is_err());
    }
}
