//! Structural decomposition of a footprint change between two years.
//!
//! TWF = W·L·Y. With Δ· = ·₁ − ·₀ the two-polar effects are
//!   W_effect = ½[ΔW·L₀·Y₀ + ΔW·L₁·Y₁]
//!   L_effect = ½[W₁·ΔL·Y₀ + W₀·ΔL·Y₁]
//!   Y_effect = ½[W₀·L₀·ΔY + W₁·L₁·ΔY]
//! and sum to TWF₁ − TWF₀ with no residual beyond rounding.
//! The L term pairs opposite-year W and Y; pairing same-year weights
//! does not close the identity.

use crate::{
    error::{TwfError, TwfResult},
    footprint::total_footprint,
    types::{Matrix, StudyYear, Vector},
    year::YearBundle,
};
use serde::Serialize;

const RESIDUAL_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdaResult {
    pub from_year:      StudyYear,
    pub to_year:        StudyYear,
    pub twf_from:       f64,
    pub twf_to:         f64,
    pub delta:          f64,
    pub w_effect:       f64,
    pub l_effect:       f64,
    pub y_effect:       f64,
    pub effects_sum:    f64,
    pub residual:       f64,
    pub w_effect_pct:   f64,
    pub l_effect_pct:   f64,
    pub y_effect_pct:   f64,
}

/// One year's (W, L, Y), already aligned to a shared ordering.
pub struct Polar<'a> {
    pub year: StudyYear,
    pub w:    &'a Vector,
    pub l:    &'a Matrix,
    pub y:    &'a Vector,
}

impl Polar<'_> {
    fn check(&self, n: usize) -> TwfResult<()> {
        if self.w.len() != n {
            return Err(TwfError::dimension(self.year, "SDA intensity W", n, self.w.len()));
        }
        if self.l.shape() != (n, n) {
            return Err(TwfError::dimension(self.year, "SDA Leontief inverse", n, self.l.nrows()));
        }
        if self.y.len() != n {
            return Err(TwfError::dimension(self.year, "SDA final demand Y", n, self.y.len()));
        }
        Ok(())
    }
}

pub fn decompose(start: Polar<'_>, end: Polar<'_>) -> TwfResult<SdaResult> {
    let n = start.w.len();
    start.check(n)?;
    end.check(n)?;

    let (w0, l0, y0) = (start.w, start.l, start.y);
    let (w1, l1, y1) = (end.w, end.l, end.y);
    let dw = w1 - w0;
    let dl = l1 - l0;
    let dy = y1 - y0;

    let w_effect = 0.5 * (dw.dot(&(l0 * y0)) + dw.dot(&(l1 * y1)));
    let l_effect = 0.5 * (w1.dot(&(&dl * y0)) + w0.dot(&(&dl * y1)));
    let y_effect = 0.5 * (l0.tr_mul(w0).dot(&dy) + l1.tr_mul(w1).dot(&dy));

    let twf_from = total_footprint(w0, l0, y0);
    let twf_to = total_footprint(w1, l1, y1);
    let delta = twf_to - twf_from;
    let effects_sum = w_effect + l_effect + y_effect;
    let residual = delta - effects_sum;

    let scale = twf_from.abs().max(twf_to.abs()).max(1.0);
    if residual.abs() > RESIDUAL_TOLERANCE * scale {
        return Err(TwfError::InvariantViolation {
            year:  end.year,
            what:  format!("SDA effects {}→{} do not sum to the footprint change", start.year, end.year),
            left:  effects_sum,
            right: delta,
        });
    }

    let share = |effect: f64| if delta == 0.0 { 0.0 } else { 100.0 * effect / delta.abs() };
    let result = SdaResult {
        from_year: start.year,
        to_year: end.year,
        twf_from,
        twf_to,
        delta,
        w_effect,
        l_effect,
        y_effect,
        effects_sum,
        residual,
        w_effect_pct: share(w_effect),
        l_effect_pct: share(l_effect),
        y_effect_pct: share(y_effect),
    };
    log::info!(
        "sda {}→{}: Δ={:.1} W={:.1} L={:.1} Y={:.1} residual={:.3e}",
        result.from_year, result.to_year, delta, w_effect, l_effect, y_effect, residual
    );
    Ok(result)
}

/// Decompose two built years, moving `end` onto `start`'s sector ordering first.
pub fn decompose_years(start: &YearBundle, end: &YearBundle) -> TwfResult<SdaResult> {
    let (w1, l1, y1) = end.reconciled_onto(&start.space)?;
    decompose(
        Polar { year: start.year, w: &start.w, l: start.l(), y: &start.y },
        Polar { year: end.year, w: &w1, l: &l1, y: &y1 },
    )
}
