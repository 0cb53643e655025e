//! Technology-matrix builder: supply/use accounts → A → Leontief inverse L.
//!
//! Product technology assumption:
//!   D = diag(1/q)·V     market shares, products × industries
//!   Z = U·Dᵗ            intermediate flows, products × products
//!   A = Z·diag(1/x)     technical coefficients
//!   L = (I − A)⁻¹       Leontief inverse
//!
//! RULES:
//!   - ρ(A) ≥ 1 or a singular (I − A) is fatal for the year.
//!   - Balance mismatches and column sums ≥ 1 are advisories only.
//!   - A and L are read-only once built.

use crate::{
    config::AnalysisConfig,
    error::{TwfError, TwfResult},
    sector::SectorSpace,
    types::{Matrix, StudyYear, Vector},
};
use nalgebra::linalg::Schur;
use serde::{Deserialize, Serialize};

const SCHUR_MAX_ITERATIONS: usize = 10_000;
const GELFAND_SQUARINGS: usize = 24;
const NEGATIVE_TOLERANCE: f64 = -1e-12;

/// Rectangular supply/use accounts for one year, in one monetary unit.
#[derive(Debug, Clone)]
pub struct SupplyUse {
    /// V: products × industries.
    pub supply:         Matrix,
    /// U: products × industries.
    pub use_table:      Matrix,
    /// q: total supply per product.
    pub product_supply: Vector,
    /// x: total output per product.
    pub total_output:   Vector,
    /// y: total final demand per product, when published.
    pub final_demand:   Option<Vector>,
}

impl SupplyUse {
    /// Derive q from the supply rows and x from the demand side
    /// (column sums of Z plus final demand) when upstream gives neither.
    pub fn with_derived_totals(supply: Matrix, use_table: Matrix, final_demand: Vector, min_divisor: f64) -> Self {
        let product_supply = row_sums(&supply);
        let z = intermediate_flows(&supply, &use_table, &product_supply, min_divisor);
        let total_output = column_sums(&z) + &final_demand;
        Self {
            supply,
            use_table,
            product_supply,
            total_output,
            final_demand: Some(final_demand),
        }
    }
}

/// Non-fatal data-quality findings. Logged, stored, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    Balance {
        label:    String,
        actual:   f64,
        expected: f64,
        diff_pct: f64,
    },
    Drift {
        sector:     String,
        from_year:  StudyYear,
        to_year:    StudyYear,
        prev_sum:   f64,
        next_sum:   f64,
        change_pct: f64,
    },
    DriftShapeMismatch {
        from_year: StudyYear,
        to_year:   StudyYear,
        prev:      usize,
        next:      usize,
    },
    ColumnSumAtOrAboveOne {
        sector:     String,
        column_sum: f64,
    },
    NegativeEntries {
        matrix: String,
        count:  usize,
        min:    f64,
    },
    LeontiefDiagonalBelowOne {
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub label:    String,
    pub actual:   f64,
    pub expected: f64,
    pub diff_pct: f64,
    pub passed:   bool,
}

/// Monetary totals, available only when A was derived from supply/use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTotals {
    pub total_output:       f64,
    pub total_intermediate: f64,
    pub total_final_demand: f64,
    /// 100 · max|x − (Zᵗ1 + y)| / max x.
    pub balance_error_pct:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub spectral_radius:        f64,
    pub max_column_sum:         f64,
    pub columns_at_or_above_one: usize,
    pub identity_residual:      f64,
    pub balance:                Vec<BalanceCheck>,
    pub totals:                 Option<FlowTotals>,
    pub warnings:               Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn all_column_sums_below_one(&self) -> bool {
        self.columns_at_or_above_one == 0
    }
}

/// A validated (A, L) pair for one year.
#[derive(Debug, Clone)]
pub struct TechnologyMatrix {
    pub year:   StudyYear,
    pub a:      Matrix,
    pub l:      Matrix,
    pub report: ValidationReport,
}

impl TechnologyMatrix {
    /// Full builder: supply/use → D → Z → A → L, with balance checks.
    pub fn from_supply_use(
        year: StudyYear,
        space: &SectorSpace,
        accounts: &SupplyUse,
        config: &AnalysisConfig,
    ) -> TwfResult<Self> {
        let n = space.len();
        let (rows, cols) = accounts.supply.shape();
        if rows != n {
            return Err(TwfError::dimension(year, "supply rows (products)", n, rows));
        }
        if accounts.use_table.shape() != (rows, cols) {
            return Err(TwfError::dimension(
                year,
                "use table industries",
                cols,
                accounts.use_table.ncols(),
            ));
        }
        if accounts.use_table.nrows() != n {
            return Err(TwfError::dimension(year, "use rows (products)", n, accounts.use_table.nrows()));
        }
        if accounts.product_supply.len() != n {
            return Err(TwfError::dimension(year, "product supply q", n, accounts.product_supply.len()));
        }
        if accounts.total_output.len() != n {
            return Err(TwfError::dimension(year, "total output x", n, accounts.total_output.len()));
        }
        if let Some(y) = &accounts.final_demand {
            if y.len() != n {
                return Err(TwfError::dimension(year, "final demand y", n, y.len()));
            }
        }

        let z = intermediate_flows(
            &accounts.supply,
            &accounts.use_table,
            &accounts.product_supply,
            config.min_divisor,
        );
        let x = &accounts.total_output;
        let a = Matrix::from_fn(n, n, |i, j| z[(i, j)] / safe_divisor(x[j], config.min_divisor));

        log::debug!(
            "year={year} io: V={:.0} U={:.0} Z={:.0} x={:.0}",
            accounts.supply.sum(),
            accounts.use_table.sum(),
            z.sum(),
            x.sum()
        );

        let mut built = Self::from_coefficients(year, space, a, config)?;

        let tol = config.balance_tolerance_pct;
        let mut balance = vec![balance_check(
            "intermediate flows Z vs use table U",
            z.sum(),
            accounts.use_table.sum(),
            tol,
        )];
        let z_cols = column_sums(&z);
        let (final_total, balance_error_pct) = match &accounts.final_demand {
            Some(y) => {
                let reconstructed = &z_cols + y;
                balance.push(balance_check(
                    "output balance x vs Z column sums + y",
                    x.sum(),
                    reconstructed.sum(),
                    tol,
                ));
                let max_x = x.max();
                let worst = (x - &reconstructed).abs().max();
                let err = if max_x > 0.0 { 100.0 * worst / max_x } else { 0.0 };
                (y.sum(), err)
            }
            None => (0.0, 0.0),
        };
        balance.push(balance_check(
            "demand-side x vs supply-side q",
            x.sum(),
            accounts.product_supply.sum(),
            tol,
        ));

        for check in balance.iter().filter(|c| !c.passed) {
            log::warn!(
                "year={year} balance: {} {:.0} vs {:.0} (Δ {:.2}%)",
                check.label,
                check.actual,
                check.expected,
                check.diff_pct
            );
            built.report.warnings.push(ValidationWarning::Balance {
                label:    check.label.clone(),
                actual:   check.actual,
                expected: check.expected,
                diff_pct: check.diff_pct,
            });
        }
        built.report.balance = balance;
        built.report.totals = Some(FlowTotals {
            total_output:       x.sum(),
            total_intermediate: z.sum(),
            total_final_demand: final_total,
            balance_error_pct,
        });
        Ok(built)
    }

    /// Entry point when A was built upstream. L is computed here.
    pub fn from_coefficients(
        year: StudyYear,
        space: &SectorSpace,
        a: Matrix,
        config: &AnalysisConfig,
    ) -> TwfResult<Self> {
        check_square(year, space, &a, "A")?;
        let rho = stable_spectral_radius(year, space, &a)?;

        let n = a.nrows();
        let i_minus_a = Matrix::identity(n, n) - &a;
        let l = leontief_inverse(year, &i_minus_a)?;

        Self::validated(year, space, a, l, &i_minus_a, rho, config.inverse_tolerance)
    }

    /// Entry point when both A and L were built upstream.
    /// The pair must satisfy L·(I − A) = I to within
    /// `prebuilt_inverse_tolerance` × max(1, max |L|), since a published L
    /// carries only a few decimals.
    pub fn from_parts(
        year: StudyYear,
        space: &SectorSpace,
        a: Matrix,
        l: Matrix,
        config: &AnalysisConfig,
    ) -> TwfResult<Self> {
        check_square(year, space, &a, "A")?;
        check_square(year, space, &l, "L")?;
        let rho = stable_spectral_radius(year, space, &a)?;
        let i_minus_a = Matrix::identity(a.nrows(), a.nrows()) - &a;
        let scale = l.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
        let tolerance = config.prebuilt_inverse_tolerance * scale;
        Self::validated(year, space, a, l, &i_minus_a, rho, tolerance)
    }

    fn validated(
        year: StudyYear,
        space: &SectorSpace,
        a: Matrix,
        l: Matrix,
        i_minus_a: &Matrix,
        rho: f64,
        tolerance: f64,
    ) -> TwfResult<Self> {
        let n = a.nrows();
        let residual = (&l * i_minus_a - Matrix::identity(n, n)).abs().max();
        if residual > tolerance {
            return Err(TwfError::NumericalInstability {
                year,
                reason: "L·(I − A) deviates from the identity".into(),
                value:  residual,
            });
        }

        let mut warnings = Vec::new();
        let col_sums = column_sums(&a);
        let mut columns_at_or_above_one = 0;
        for (j, &sum) in col_sums.iter().enumerate() {
            if sum >= 1.0 {
                columns_at_or_above_one += 1;
                warnings.push(ValidationWarning::ColumnSumAtOrAboveOne {
                    sector:     space.get(j).code.clone(),
                    column_sum: sum,
                });
            }
        }
        for (label, m) in [("A", &a), ("L", &l)] {
            let negatives: Vec<f64> = m.iter().copied().filter(|&v| v < NEGATIVE_TOLERANCE).collect();
            if !negatives.is_empty() {
                warnings.push(ValidationWarning::NegativeEntries {
                    matrix: label.to_string(),
                    count:  negatives.len(),
                    min:    negatives.iter().copied().fold(f64::INFINITY, f64::min),
                });
            }
        }
        let low_diagonal = l.diagonal().iter().filter(|&&d| d < 1.0).count();
        if low_diagonal > 0 {
            warnings.push(ValidationWarning::LeontiefDiagonalBelowOne { count: low_diagonal });
        }
        for w in &warnings {
            log::warn!("year={year} io: {w:?}");
        }

        let max_column_sum = if n == 0 { 0.0 } else { col_sums.max() };
        log::info!(
            "year={year} io: n={n} rho={rho:.6} max_col_sum={max_column_sum:.4} identity_residual={residual:.2e}"
        );

        Ok(Self {
            year,
            a,
            l,
            report: ValidationReport {
                spectral_radius: rho,
                max_column_sum,
                columns_at_or_above_one,
                identity_residual: residual,
                balance: Vec::new(),
                totals: None,
                warnings,
            },
        })
    }

    pub fn column_sums(&self) -> Vector {
        column_sums(&self.a)
    }
}

/// Year-over-year coefficient drift for two aligned A matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub from_year:  StudyYear,
    pub to_year:    StudyYear,
    /// % change in each column sum; None where the earlier sum is zero.
    pub change_pct: Vec<Option<f64>>,
    pub warnings:   Vec<ValidationWarning>,
}

/// Flag every sector whose A column sum moved by more than
/// `threshold_pct` percent. `next` must already be in `space` order.
pub fn check_stability(
    space: &SectorSpace,
    prev: &TechnologyMatrix,
    next: &TechnologyMatrix,
    threshold_pct: f64,
) -> DriftReport {
    let (from_year, to_year) = (prev.year, next.year);
    if prev.a.shape() != next.a.shape() || prev.a.nrows() != space.len() {
        let warning = ValidationWarning::DriftShapeMismatch {
            from_year,
            to_year,
            prev: prev.a.nrows(),
            next: next.a.nrows(),
        };
        log::warn!("drift {from_year}→{to_year}: {warning:?}");
        return DriftReport { from_year, to_year, change_pct: Vec::new(), warnings: vec![warning] };
    }

    let before = prev.column_sums();
    let after = next.column_sums();
    let mut warnings = Vec::new();
    let change_pct: Vec<Option<f64>> = before
        .iter()
        .zip(after.iter())
        .enumerate()
        .map(|(j, (&b, &a))| {
            if b <= 0.0 {
                return None;
            }
            let pct = 100.0 * (a - b) / b;
            if pct.abs() > threshold_pct {
                warnings.push(ValidationWarning::Drift {
                    sector:     space.get(j).code.clone(),
                    from_year,
                    to_year,
                    prev_sum:   b,
                    next_sum:   a,
                    change_pct: pct,
                });
            }
            Some(pct)
        })
        .collect();

    let known: Vec<f64> = change_pct.iter().flatten().map(|p| p.abs()).collect();
    let mean = if known.is_empty() { 0.0 } else { known.iter().sum::<f64>() / known.len() as f64 };
    log::info!(
        "drift {from_year}→{to_year}: mean |Δ|={mean:.1}% flagged={}/{} (threshold {threshold_pct}%)",
        warnings.len(),
        space.len()
    );
    for w in &warnings {
        log::warn!("drift {from_year}→{to_year}: {w:?}");
    }
    DriftReport { from_year, to_year, change_pct, warnings }
}

/// ρ(A) = max |λ|. Uses the Schur form; falls back to the Gelfand
/// limit ‖Aᵏ‖^(1/k) if the QR iteration does not converge.
pub fn spectral_radius(a: &Matrix) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    match Schur::try_new(a.clone(), f64::EPSILON, SCHUR_MAX_ITERATIONS) {
        Some(schur) => schur
            .complex_eigenvalues()
            .iter()
            .map(|c| c.re.hypot(c.im))
            .fold(0.0, f64::max),
        None => {
            log::warn!("Schur iteration did not converge; using Gelfand estimate for ρ(A)");
            gelfand_estimate(a)
        }
    }
}

fn stable_spectral_radius(year: StudyYear, space: &SectorSpace, a: &Matrix) -> TwfResult<f64> {
    let rho = spectral_radius(a);
    if rho.is_finite() && rho < 1.0 {
        return Ok(rho);
    }
    let sums = column_sums(a);
    let worst = sums.iter().enumerate().fold((0usize, f64::NEG_INFINITY), |acc, (j, &s)| {
        if s > acc.1 { (j, s) } else { acc }
    });
    let code = if space.is_empty() { "-".to_string() } else { space.get(worst.0).code.clone() };
    Err(TwfError::NumericalInstability {
        year,
        reason: format!(
            "spectral radius of A >= 1 (largest column sum {:.4} at sector {code})",
            worst.1
        ),
        value:  rho,
    })
}

/// (I − A)⁻¹ via LU. A singular system reports its determinant.
fn leontief_inverse(year: StudyYear, i_minus_a: &Matrix) -> TwfResult<Matrix> {
    let lu = i_minus_a.clone().lu();
    lu.try_inverse().ok_or_else(|| TwfError::NumericalInstability {
        year,
        reason: "I − A is singular; Leontief inverse does not exist".into(),
        value:  lu.determinant(),
    })
}

fn gelfand_estimate(a: &Matrix) -> f64 {
    let mut m = a.abs();
    let mut log_scale = 0.0;
    let mut power = 1.0;
    let norm = induced_one_norm(&m);
    if norm == 0.0 {
        return 0.0;
    }
    m /= norm;
    log_scale += norm.ln();
    for _ in 0..GELFAND_SQUARINGS {
        m = &m * &m;
        log_scale *= 2.0;
        power *= 2.0;
        let norm = induced_one_norm(&m);
        if norm == 0.0 {
            return 0.0;
        }
        m /= norm;
        log_scale += norm.ln();
    }
    (log_scale / power).exp()
}

fn induced_one_norm(m: &Matrix) -> f64 {
    m.column_iter().map(|c| c.abs().sum()).fold(0.0, f64::max)
}

fn check_square(year: StudyYear, space: &SectorSpace, m: &Matrix, label: &str) -> TwfResult<()> {
    let n = space.len();
    if m.nrows() != n {
        return Err(TwfError::dimension(year, &format!("{label} rows"), n, m.nrows()));
    }
    if m.ncols() != n {
        return Err(TwfError::dimension(year, &format!("{label} columns"), n, m.ncols()));
    }
    Ok(())
}

fn intermediate_flows(supply: &Matrix, use_table: &Matrix, q: &Vector, min_divisor: f64) -> Matrix {
    let (rows, cols) = supply.shape();
    let d = Matrix::from_fn(rows, cols, |i, j| supply[(i, j)] / safe_divisor(q[i], min_divisor));
    use_table * d.transpose()
}

fn balance_check(label: &str, actual: f64, expected: f64, tol_pct: f64) -> BalanceCheck {
    let diff_pct = if expected == 0.0 {
        if actual == 0.0 { 0.0 } else { f64::INFINITY }
    } else {
        100.0 * (actual - expected).abs() / expected.abs()
    };
    BalanceCheck {
        label: label.to_string(),
        actual,
        expected,
        diff_pct,
        passed: diff_pct <= tol_pct,
    }
}

pub(crate) fn safe_divisor(v: f64, min_divisor: f64) -> f64 {
    if v < min_divisor { 1.0 } else { v }
}

pub(crate) fn column_sums(m: &Matrix) -> Vector {
    Vector::from_iterator(m.ncols(), m.column_iter().map(|c| c.sum()))
}

pub(crate) fn row_sums(m: &Matrix) -> Vector {
    Vector::from_iterator(m.nrows(), m.row_iter().map(|r| r.sum()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gelfand_matches_known_radius() {
        // Eigenvalues 0.5 and 0.2.
        let a = Matrix::from_row_slice(2, 2, &[0.5, 0.1, 0.0, 0.2]);
        let est = gelfand_estimate(&a);
        assert!((est - 0.5).abs() < 1e-3, "estimate {est}");
    }

    #[test]
    fn schur_radius_handles_complex_pairs() {
        // Rotation scaled by 0.6: eigenvalues ±0.6i.
        let a = Matrix::from_row_slice(2, 2, &[0.0, -0.6, 0.6, 0.0]);
        assert!((spectral_radius(&a) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn singular_system_has_no_inverse() {
        // Rank-one I − A.
        let i_minus_a = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        match leontief_inverse(2019, &i_minus_a) {
            Err(TwfError::NumericalInstability { year, reason, value }) => {
                assert_eq!(year, 2019);
                assert!(reason.contains("singular"), "{reason}");
                assert!(value.abs() < 1e-12, "determinant {value}");
            }
            other => panic!("expected NumericalInstability, got {other:?}"),
        }
    }

    #[test]
    fn regular_system_inverts() {
        let i_minus_a = Matrix::from_row_slice(2, 2, &[0.9, -0.1, -0.2, 0.8]);
        let l = leontief_inverse(2019, &i_minus_a).unwrap();
        let residual = (&l * &i_minus_a - Matrix::identity(2, 2)).abs().max();
        assert!(residual < 1e-12);
    }

    #[test]
    fn zero_divisors_are_treated_as_one() {
        assert_eq!(safe_divisor(0.0, 0.001), 1.0);
        assert_eq!(safe_divisor(5.0, 0.001), 5.0);
    }
}
