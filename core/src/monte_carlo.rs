//! Monte Carlo uncertainty propagation over one year's footprint.
//!
//! Per trial, every parameter group draws one multiplicative factor from
//! its own stream. Factors scale W rows, Y rows or activity terms; the
//! total is recomputed and only the scalar and the factors are kept.
//!
//! RULES:
//!   - A factor ≤ 0 or non-finite fails the run. Never clip.
//!   - Trials may run on any worker; results are collected in trial
//!     order so summaries are bit-identical for a given seed.
//!   - Variance attribution is Spearman ρ², not a sum-to-one partition.

use crate::{
    config::{MonteCarloConfig, PerturbationTarget},
    error::{TwfError, TwfResult},
    footprint::total_footprint,
    rng::RngBank,
    sector::SectorSpace,
    types::{Matrix, StudyYear, Vector},
    year::YearBundle,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];

/// A direct-use volume from an activity × coefficient estimate,
/// perturbed by the groups it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTerm {
    pub label:   String,
    pub base_m3: f64,
    #[serde(default)]
    pub groups:  Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncertaintyRow {
    pub year:              StudyYear,
    pub trials:            usize,
    pub seed:              u64,
    pub baseline:          f64,
    pub baseline_indirect: f64,
    pub baseline_activity: f64,
    pub p5:                f64,
    pub p25:               f64,
    pub p50:               f64,
    pub p75:               f64,
    pub p95:               f64,
    /// (P95 − P5) / P50, in percent.
    pub range_pct:         f64,
    pub dominant_group:    String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityRow {
    pub year:               StudyYear,
    pub group:              String,
    pub spearman_rho:       f64,
    pub variance_share_pct: f64,
    pub dominant:           bool,
}

#[derive(Debug, Clone)]
pub struct MonteCarloResult {
    pub summary:     UncertaintyRow,
    pub sensitivity: Vec<SensitivityRow>,
    /// Trial totals in trial order.
    pub totals:      Vec<f64>,
}

impl MonteCarloResult {
    pub fn dominant(&self) -> Option<&SensitivityRow> {
        self.sensitivity.iter().find(|r| r.dominant)
    }
}

/// Group targets resolved against one sector space.
enum Resolved {
    Intensity(Vec<bool>),
    Demand(Vec<bool>),
    Activity,
}

struct Trial {
    factors: Vec<f64>,
    total:   f64,
}

pub fn simulate_bundle(bundle: &YearBundle, mc: &MonteCarloConfig) -> TwfResult<MonteCarloResult> {
    simulate(bundle.year, &bundle.space, &bundle.w, bundle.l(), &bundle.y, &bundle.activity, mc)
}

pub fn simulate(
    year: StudyYear,
    space: &SectorSpace,
    w: &Vector,
    l: &Matrix,
    y: &Vector,
    activity: &[ActivityTerm],
    mc: &MonteCarloConfig,
) -> TwfResult<MonteCarloResult> {
    let n = space.len();
    if w.len() != n || y.len() != n || l.shape() != (n, n) {
        return Err(TwfError::dimension(year, "Monte Carlo inputs", n, w.len().max(y.len()).max(l.nrows())));
    }

    let targets: Vec<Resolved> = mc
        .groups
        .iter()
        .map(|g| match &g.target {
            PerturbationTarget::Intensity { classes } => Resolved::Intensity(space.class_mask(classes)),
            PerturbationTarget::Demand { classes } if classes.is_empty() => Resolved::Demand(vec![true; n]),
            PerturbationTarget::Demand { classes } => Resolved::Demand(space.class_mask(classes)),
            PerturbationTarget::Activity => Resolved::Activity,
        })
        .collect();

    // Activity term → slots of the groups it references.
    let mut activity_slots = Vec::with_capacity(activity.len());
    for term in activity {
        if !term.base_m3.is_finite() || term.base_m3 < 0.0 {
            return Err(TwfError::config(
                &format!("activity[{}].base_m3", term.label),
                term.base_m3,
                "must be finite and >= 0",
            ));
        }
        let mut slots = Vec::with_capacity(term.groups.len());
        for name in &term.groups {
            let slot = mc.groups.iter().position(|g| &g.name == name).ok_or_else(|| {
                TwfError::config(
                    &format!("activity[{}].groups", term.label),
                    name,
                    "references an unknown parameter group",
                )
            })?;
            if !matches!(targets[slot], Resolved::Activity) {
                return Err(TwfError::config(
                    &format!("activity[{}].groups", term.label),
                    name,
                    "group does not target activity terms",
                ));
            }
            slots.push(slot);
        }
        activity_slots.push(slots);
    }

    let baseline_indirect = total_footprint(w, l, y);
    let baseline_activity: f64 = activity.iter().map(|t| t.base_m3).sum();
    let baseline = baseline_indirect + baseline_activity;

    let bank = RngBank::new(mc.seed);
    let run_trial = |trial: usize| -> TwfResult<Trial> {
        let mut factors = Vec::with_capacity(mc.groups.len());
        for (slot, group) in mc.groups.iter().enumerate() {
            let f = bank.for_draw(trial, slot).sample(&group.distribution);
            if !(f > 0.0 && f.is_finite()) {
                return Err(TwfError::NonPhysicalDraw {
                    year,
                    group: group.name.clone(),
                    trial,
                    value: f,
                });
            }
            factors.push(f);
        }

        let mut wt = w.clone();
        let mut yt = y.clone();
        for (target, &f) in targets.iter().zip(&factors) {
            match target {
                Resolved::Intensity(mask) => scale_masked(&mut wt, mask, f),
                Resolved::Demand(mask) => scale_masked(&mut yt, mask, f),
                Resolved::Activity => {}
            }
        }
        let direct: f64 = activity
            .iter()
            .zip(&activity_slots)
            .map(|(term, slots)| term.base_m3 * slots.iter().map(|&s| factors[s]).product::<f64>())
            .sum();
        Ok(Trial { factors, total: total_footprint(&wt, l, &yt) + direct })
    };

    let trials: Vec<Trial> = (0..mc.trials)
        .into_par_iter()
        .map(run_trial)
        .collect::<TwfResult<Vec<_>>>()?;

    let totals: Vec<f64> = trials.iter().map(|t| t.total).collect();
    let mut sorted = totals.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let [p5, p25, p50, p75, p95] = PERCENTILES.map(|p| percentile(&sorted, p));

    let output_ranks = average_ranks(&totals);
    let mut sensitivity: Vec<SensitivityRow> = mc
        .groups
        .iter()
        .enumerate()
        .map(|(slot, group)| {
            let drawn: Vec<f64> = trials.iter().map(|t| t.factors[slot]).collect();
            let rho = pearson(&average_ranks(&drawn), &output_ranks);
            SensitivityRow {
                year,
                group: group.name.clone(),
                spearman_rho: rho,
                variance_share_pct: 100.0 * rho * rho,
                dominant: false,
            }
        })
        .collect();

    let mut dominant_group = String::new();
    let mut best: Option<usize> = None;
    for (i, row) in sensitivity.iter().enumerate() {
        if best.map_or(true, |b| row.spearman_rho.abs() > sensitivity[b].spearman_rho.abs()) {
            best = Some(i);
        }
    }
    if let Some(b) = best {
        sensitivity[b].dominant = true;
        dominant_group = sensitivity[b].group.clone();
    }

    let summary = UncertaintyRow {
        year,
        trials: mc.trials,
        seed: mc.seed,
        baseline,
        baseline_indirect,
        baseline_activity,
        p5,
        p25,
        p50,
        p75,
        p95,
        range_pct: if p50 == 0.0 { 0.0 } else { 100.0 * (p95 - p5) / p50 },
        dominant_group,
    };
    log::info!(
        "year={year} monte carlo: trials={} baseline={baseline:.1} P5={p5:.1} P50={p50:.1} P95={p95:.1} dominant={}",
        mc.trials,
        summary.dominant_group
    );
    Ok(MonteCarloResult { summary, sensitivity, totals })
}

fn scale_masked(v: &mut Vector, mask: &[bool], factor: f64) {
    for (x, &hit) in v.iter_mut().zip(mask) {
        if hit {
            *x *= factor;
        }
    }
}

/// Linear interpolation between closest ranks over sorted data.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = p / 100.0 * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// 1-based ranks; ties share the mean of the ranks they span.
pub(crate) fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let mean_rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = mean_rank;
        }
        start = end;
    }
    ranks
}

/// Pearson correlation; 0 when either side has no variance.
pub(crate) fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        0.0
    } else {
        cov / (var_a * var_b).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 5.0);
        assert!((percentile(&sorted, 5.0) - 1.2).abs() < 1e-12);
        assert!((percentile(&sorted, 75.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn ties_share_average_rank() {
        let ranks = average_ranks(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn monotone_series_has_unit_rank_correlation() {
        let x = [0.1, 0.5, 0.2, 0.9, 0.7];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.powi(3) * 100.0).collect();
        let rho = pearson(&average_ranks(&x), &average_ranks(&y));
        assert!((rho - 1.0).abs() < 1e-12, "rho {rho}");
    }

    #[test]
    fn constant_series_has_zero_correlation() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
    }
}
