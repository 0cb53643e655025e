//! Study input bundle: the serde boundary for per-year data.
//!
//! Matrices arrive as row lists; vectors arrive keyed by external code.
//! Nothing here is trusted until `YearInput::build` has validated it.

use crate::{
    concordance::{Concordance, ConcordanceEntry, ExternalVector},
    config::AnalysisConfig,
    error::{TwfError, TwfResult},
    io_table::{SupplyUse, TechnologyMatrix},
    monte_carlo::ActivityTerm,
    sector::{Sector, SectorSpace},
    types::{Matrix, StudyYear, Vector},
    year::{DemandComponent, YearBundle},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyInput {
    pub years: Vec<YearInput>,
}

impl StudyInput {
    pub fn load(path: &Path) -> TwfResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Where a year's A (and possibly L) comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TechnologySource {
    SupplyUse {
        supply:         Vec<Vec<f64>>,
        use_table:      Vec<Vec<f64>>,
        #[serde(default)]
        product_supply: Option<Vec<f64>>,
        #[serde(default)]
        total_output:   Option<Vec<f64>>,
        #[serde(default)]
        final_demand:   Option<Vec<f64>>,
    },
    Coefficients {
        a: Vec<Vec<f64>>,
    },
    Prebuilt {
        a: Vec<Vec<f64>>,
        l: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandInput {
    pub label:  String,
    pub values: ExternalVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearInput {
    pub year:        StudyYear,
    pub sectors:     Vec<Sector>,
    pub technology:  TechnologySource,
    pub concordance: Vec<ConcordanceEntry>,
    pub intensity:   ExternalVector,
    #[serde(default = "unit")]
    pub unit_factor: f64,
    pub demand:      Vec<DemandInput>,
    #[serde(default)]
    pub activity:    Vec<ActivityTerm>,
    /// CPI of this year over the base year's CPI.
    #[serde(default)]
    pub deflator:    Option<f64>,
}

fn unit() -> f64 {
    1.0
}

impl YearInput {
    /// Validate and assemble the year's (A, L, W, Y) bundle.
    pub fn build(&self, config: &AnalysisConfig) -> TwfResult<YearBundle> {
        let year = self.year;
        let space = SectorSpace::new(year, self.sectors.clone())?;
        if space.is_empty() {
            return Err(TwfError::dimension(year, "sector space", 1, 0));
        }
        let technology = self.build_technology(&space, config)?;

        let concordance = Concordance::new(year, &space, self.concordance.clone())?;
        let w = concordance.map_intensity(
            &space,
            &self.intensity,
            self.unit_factor,
            config.intensity_allocation,
        )?;

        if self.demand.is_empty() {
            return Err(TwfError::config(
                &format!("years[{year}].demand"),
                "[]",
                "at least one demand component is required",
            ));
        }
        let components = self
            .demand
            .iter()
            .map(|d| {
                let y = concordance.map_demand(&space, &d.label, &d.values, config.conservation_tolerance_pct)?;
                Ok(DemandComponent { label: d.label.clone(), y })
            })
            .collect::<TwfResult<Vec<_>>>()?;

        let bundle = YearBundle::from_components(space, technology, w, components)?
            .with_activity(self.activity.clone())
            .with_deflator(self.deflator.unwrap_or(1.0))?;
        log::info!(
            "year={year} bundle: {} sectors, ρ(A)={:.4}, Σ W={:.1}, Σ Y={:.1}, deflator={:.4}",
            bundle.space.len(),
            bundle.technology.report.spectral_radius,
            bundle.w.sum(),
            bundle.y.sum(),
            bundle.deflator
        );
        Ok(bundle)
    }

    fn build_technology(&self, space: &SectorSpace, config: &AnalysisConfig) -> TwfResult<TechnologyMatrix> {
        let year = self.year;
        match &self.technology {
            TechnologySource::Coefficients { a } => {
                let a = matrix_from_rows(year, "A", a)?;
                TechnologyMatrix::from_coefficients(year, space, a, config)
            }
            TechnologySource::Prebuilt { a, l } => {
                let a = matrix_from_rows(year, "A", a)?;
                let l = matrix_from_rows(year, "L", l)?;
                TechnologyMatrix::from_parts(year, space, a, l, config)
            }
            TechnologySource::SupplyUse { supply, use_table, product_supply, total_output, final_demand } => {
                let v = matrix_from_rows(year, "supply V", supply)?;
                let u = matrix_from_rows(year, "use U", use_table)?;
                let y = final_demand.as_deref().map(Vector::from_column_slice);
                let accounts = match (product_supply, total_output, y) {
                    (Some(q), Some(x), y) => SupplyUse {
                        supply:         v,
                        use_table:      u,
                        product_supply: Vector::from_column_slice(q),
                        total_output:   Vector::from_column_slice(x),
                        final_demand:   y,
                    },
                    (None, None, Some(y)) => {
                        if u.shape() != v.shape() {
                            return Err(TwfError::dimension(year, "use table industries", v.ncols(), u.ncols()));
                        }
                        if y.len() != v.nrows() {
                            return Err(TwfError::dimension(year, "final demand y", v.nrows(), y.len()));
                        }
                        SupplyUse::with_derived_totals(v, u, y, config.min_divisor)
                    }
                    _ => {
                        return Err(TwfError::config(
                            &format!("years[{year}].technology"),
                            "supply_use",
                            "give both product_supply and total_output, or final_demand alone",
                        ))
                    }
                };
                TechnologyMatrix::from_supply_use(year, space, &accounts, config)
            }
        }
    }
}

/// Dense matrix from a row list; ragged rows are a dimension mismatch.
pub fn matrix_from_rows(year: StudyYear, what: &str, rows: &[Vec<f64>]) -> TwfResult<Matrix> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
        return Err(TwfError::dimension(year, &format!("{what} row length"), ncols, bad.len()));
    }
    Ok(Matrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}
