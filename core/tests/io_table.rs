//! Technology-matrix builder tests.

use twf_core::{
    config::AnalysisConfig,
    error::TwfError,
    io_table::{check_stability, spectral_radius, SupplyUse, TechnologyMatrix, ValidationWarning},
    sector::{Sector, SectorClass, SectorSpace},
    types::{Matrix, Vector},
};

fn space(year: u16) -> SectorSpace {
    let sector = |code: &str, class, category: &str| Sector {
        code:            code.into(),
        name:            format!("Sector {code}"),
        class,
        demand_category: category.into(),
    };
    SectorSpace::new(
        year,
        vec![
            sector("S01", SectorClass::Agriculture, "Agriculture"),
            sector("S02", SectorClass::Manufacturing, "Food Mfg"),
            sector("S03", SectorClass::Services, "Services"),
        ],
    )
    .unwrap()
}

fn coefficients() -> Matrix {
    Matrix::from_row_slice(3, 3, &[
        0.10, 0.20, 0.05,
        0.15, 0.10, 0.10,
        0.05, 0.10, 0.20,
    ])
}

/// Supply/use accounts whose PTA reconstruction yields `coefficients()`
/// with x = q = [100, 200, 150].
fn balanced_accounts() -> (Matrix, Matrix, Vector) {
    let x = [100.0, 200.0, 150.0];
    let a = coefficients();
    let supply = Matrix::from_diagonal(&Vector::from_column_slice(&x));
    let use_table = Matrix::from_fn(3, 3, |i, j| a[(i, j)] * x[j]);
    let col = use_table.row_sum();
    let y = Vector::from_fn(3, |j, _| x[j] - col[j]);
    (supply, use_table, y)
}

#[test]
fn leontief_inverse_satisfies_identity() {
    let config = AnalysisConfig::default_test();
    let tm = TechnologyMatrix::from_coefficients(2019, &space(2019), coefficients(), &config).unwrap();

    let residual = (&tm.l * (Matrix::identity(3, 3) - &tm.a) - Matrix::identity(3, 3)).abs().max();
    assert!(residual < 1e-10, "L·(I−A) deviates from I by {residual:e}");
    assert!(tm.report.spectral_radius < 1.0);
    assert!(tm.report.all_column_sums_below_one());
    assert!(tm.l.iter().all(|&v| v >= 0.0), "Leontief inverse has negative entries");
    assert!(tm.report.warnings.is_empty(), "unexpected warnings: {:?}", tm.report.warnings);
}

#[test]
fn spectral_radius_at_or_above_one_is_fatal() {
    let config = AnalysisConfig::default_test();
    let a = Matrix::from_row_slice(3, 3, &[
        0.5, 0.6, 0.0,
        0.6, 0.5, 0.0,
        0.0, 0.0, 0.1,
    ]);
    assert!((spectral_radius(&a) - 1.1).abs() < 1e-9);

    let err = TechnologyMatrix::from_coefficients(2022, &space(2022), a, &config).unwrap_err();
    match err {
        TwfError::NumericalInstability { year, reason, value } => {
            assert_eq!(year, 2022);
            assert!(reason.contains("S0"), "reason should name a sector: {reason}");
            assert!((value - 1.1).abs() < 1e-9);
        }
        other => panic!("expected NumericalInstability, got {other:?}"),
    }
}

#[test]
fn identity_coefficients_fail_the_radius_check() {
    let config = AnalysisConfig::default_test();
    // A = I makes I − A singular, but ρ(A) = 1 is caught first.
    let err = TechnologyMatrix::from_coefficients(2019, &space(2019), Matrix::identity(3, 3), &config)
        .unwrap_err();
    match err {
        TwfError::NumericalInstability { year, reason, value } => {
            assert_eq!(year, 2019);
            assert!(reason.contains("spectral radius"), "{reason}");
            assert!((value - 1.0).abs() < 1e-9);
        }
        other => panic!("expected NumericalInstability, got {other:?}"),
    }
}

#[test]
fn prebuilt_inverse_at_six_decimals_is_accepted() {
    let config = AnalysisConfig::default_test();
    let exact = TechnologyMatrix::from_coefficients(2019, &space(2019), coefficients(), &config).unwrap();
    let published = exact.l.map(|v| (v * 1e6).round() / 1e6);
    assert!((&published - &exact.l).abs().max() > 0.0, "rounding should perturb L");

    let tm = TechnologyMatrix::from_parts(2019, &space(2019), coefficients(), published, &config).unwrap();
    assert!(tm.report.identity_residual > config.inverse_tolerance);
    assert!(tm.report.identity_residual < config.prebuilt_inverse_tolerance);
}

#[test]
fn supply_use_reconstructs_coefficients() {
    let config = AnalysisConfig::default_test();
    let (supply, use_table, y) = balanced_accounts();
    let accounts = SupplyUse::with_derived_totals(supply, use_table, y, config.min_divisor);

    let tm = TechnologyMatrix::from_supply_use(2019, &space(2019), &accounts, &config).unwrap();
    let diff = (&tm.a - coefficients()).abs().max();
    assert!(diff < 1e-12, "A differs from the source coefficients by {diff:e}");
    assert!(tm.report.balance.iter().all(|c| c.passed), "{:?}", tm.report.balance);

    let totals = tm.report.totals.as_ref().expect("supply/use totals");
    assert!((totals.total_output - 450.0).abs() < 1e-9);
    assert!(totals.balance_error_pct < 1e-9);
}

#[test]
fn balance_mismatch_is_a_warning_not_an_error() {
    let config = AnalysisConfig::default_test();
    let (supply, use_table, y) = balanced_accounts();
    // Published q is 5% above the demand-side output.
    let accounts = SupplyUse {
        product_supply: Vector::from_column_slice(&[105.0, 210.0, 157.5]),
        total_output:   Vector::from_column_slice(&[100.0, 200.0, 150.0]),
        final_demand:   Some(y),
        supply,
        use_table,
    };

    let tm = TechnologyMatrix::from_supply_use(2019, &space(2019), &accounts, &config).unwrap();
    assert!(
        tm.report.warnings.iter().any(|w| matches!(w, ValidationWarning::Balance { .. })),
        "expected a balance warning, got {:?}",
        tm.report.warnings
    );
}

#[test]
fn mismatched_use_table_is_a_dimension_error() {
    let config = AnalysisConfig::default_test();
    let (supply, _, y) = balanced_accounts();
    let accounts = SupplyUse {
        supply,
        use_table:      Matrix::zeros(3, 2),
        product_supply: Vector::from_element(3, 1.0),
        total_output:   Vector::from_element(3, 1.0),
        final_demand:   Some(y),
    };
    let err = TechnologyMatrix::from_supply_use(2019, &space(2019), &accounts, &config).unwrap_err();
    assert!(matches!(err, TwfError::DimensionMismatch { year: 2019, .. }), "got {err:?}");
}

#[test]
fn inconsistent_prebuilt_pair_is_rejected() {
    let config = AnalysisConfig::default_test();
    let l = Matrix::identity(3, 3) * 1.5;
    let err = TechnologyMatrix::from_parts(2019, &space(2019), coefficients(), l, &config).unwrap_err();
    match err {
        TwfError::NumericalInstability { value, .. } => assert!(value > config.inverse_tolerance),
        other => panic!("expected NumericalInstability, got {other:?}"),
    }
}

#[test]
fn drift_beyond_threshold_flags_the_sector() {
    let config = AnalysisConfig::default_test();
    let s = space(2015);
    let before = TechnologyMatrix::from_coefficients(2015, &s, coefficients(), &config).unwrap();

    let mut shifted = coefficients();
    for i in 0..3 {
        shifted[(i, 0)] *= 1.5;
    }
    let after = TechnologyMatrix::from_coefficients(2019, &s, shifted, &config).unwrap();

    let drift = check_stability(&s, &before, &after, config.drift_threshold_pct);
    assert_eq!(drift.warnings.len(), 1, "{:?}", drift.warnings);
    match &drift.warnings[0] {
        ValidationWarning::Drift { sector, change_pct, .. } => {
            assert_eq!(sector, "S01");
            assert!((change_pct - 50.0).abs() < 1e-9);
        }
        other => panic!("expected a drift warning, got {other:?}"),
    }
    let unchanged = drift.change_pct[1].expect("non-zero column sum");
    assert!(unchanged.abs() < 1e-12);
}
