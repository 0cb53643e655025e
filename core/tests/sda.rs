//! Structural decomposition tests.

use twf_core::{
    error::TwfError,
    footprint::total_footprint,
    sda::{decompose, Polar},
    types::{Matrix, Vector},
};

fn year0() -> (Vector, Matrix, Vector) {
    (
        Vector::from_column_slice(&[5000.0, 12.0, 0.5]),
        Matrix::from_row_slice(3, 3, &[
            1.20, 0.80, 0.10,
            0.30, 1.50, 0.20,
            0.40, 0.60, 1.30,
        ]),
        Vector::from_column_slice(&[10.0, 150.0, 300.0]),
    )
}

fn year1() -> (Vector, Matrix, Vector) {
    (
        Vector::from_column_slice(&[4200.0, 15.0, 0.4]),
        Matrix::from_row_slice(3, 3, &[
            1.25, 0.70, 0.12,
            0.28, 1.60, 0.25,
            0.45, 0.55, 1.35,
        ]),
        Vector::from_column_slice(&[12.0, 210.0, 260.0]),
    )
}

#[test]
fn effects_sum_to_observed_change() {
    let (w0, l0, y0) = year0();
    let (w1, l1, y1) = year1();
    let r = decompose(
        Polar { year: 2015, w: &w0, l: &l0, y: &y0 },
        Polar { year: 2019, w: &w1, l: &l1, y: &y1 },
    )
    .unwrap();

    let expected = total_footprint(&w1, &l1, &y1) - total_footprint(&w0, &l0, &y0);
    let sum = r.w_effect + r.l_effect + r.y_effect;
    let rel = (sum - expected).abs() / expected.abs();
    assert!(rel < 1e-6, "effects sum {sum} vs Δ {expected} (rel {rel:e})");
    assert!(r.residual.abs() < 1e-6 * r.twf_to.abs());
    assert_eq!((r.from_year, r.to_year), (2015, 2019));

    let pct_sum = r.w_effect_pct + r.l_effect_pct + r.y_effect_pct;
    assert!((pct_sum - 100.0 * expected.signum()).abs() < 1e-6, "shares {pct_sum}");
}

#[test]
fn scalar_case_closes_without_residual() {
    // Every factor doubles: TWF goes 1 → 8.
    let one = Vector::from_element(1, 1.0);
    let l_one = Matrix::from_element(1, 1, 1.0);
    let two = Vector::from_element(1, 2.0);
    let l_two = Matrix::from_element(1, 1, 2.0);
    let r = decompose(
        Polar { year: 2015, w: &one, l: &l_one, y: &one },
        Polar { year: 2019, w: &two, l: &l_two, y: &two },
    )
    .unwrap();
    assert_eq!(r.delta, 7.0);
    assert!((r.effects_sum - 7.0).abs() < 1e-12);
    // Symmetric growth gives symmetric attribution.
    assert!((r.w_effect - r.y_effect).abs() < 1e-12);
}

#[test]
fn identical_years_give_zero_effects() {
    let (w, l, y) = year0();
    let r = decompose(
        Polar { year: 2019, w: &w, l: &l, y: &y },
        Polar { year: 2019, w: &w, l: &l, y: &y },
    )
    .unwrap();
    assert_eq!(r.w_effect, 0.0);
    assert_eq!(r.l_effect, 0.0);
    assert_eq!(r.y_effect, 0.0);
    assert_eq!(r.delta, 0.0);
    assert_eq!(r.w_effect_pct, 0.0);
}

#[test]
fn dimension_mismatch_is_fatal() {
    let (w0, l0, y0) = year0();
    let w1 = Vector::from_element(2, 1.0);
    let l1 = Matrix::identity(2, 2);
    let y1 = Vector::from_element(2, 1.0);
    let err = decompose(
        Polar { year: 2015, w: &w0, l: &l0, y: &y0 },
        Polar { year: 2019, w: &w1, l: &l1, y: &y1 },
    )
    .unwrap_err();
    assert!(matches!(err, TwfError::DimensionMismatch { year: 2019, expected: 3, actual: 2, .. }), "got {err:?}");
}
