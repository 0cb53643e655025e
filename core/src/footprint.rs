//! Footprint propagator: W through L against Y.
//!
//!   WL     = Wᵗ·L                   multiplier per unit of final demand
//!   TWF[j] = WL[j]·Y[j]             footprint attributed to destination j
//!   P[i,j] = W[i]·L[i,j]·Y[j]       pull matrix, source i → destination j
//!
//! RULES:
//!   - Σ rows of P == Σ cols of P == Σ TWF. A mismatch is an invariant
//!     violation, never a warning.
//!   - Scenario bands keep only their scalars.

use crate::{
    config::ScenarioBand,
    error::{TwfError, TwfResult},
    sector::{SectorClass, SectorSpace},
    types::{Matrix, StudyYear, Vector},
    year::{DemandComponent, YearBundle},
};
use serde::Serialize;

/// Relative tolerance for the two-view total identity.
const VIEW_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Footprint {
    pub year:        StudyYear,
    pub multipliers: Vector,
    pub per_sector:  Vector,
    pub pull:        Matrix,
    pub total:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceViewRow {
    pub year:      StudyYear,
    pub class:     SectorClass,
    pub footprint: f64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationViewRow {
    pub year:      StudyYear,
    pub category:  String,
    pub footprint: f64,
    pub share_pct: f64,
}

/// One cell of the destination × source cross-table: how much of a
/// demand category's footprint is drawn from one source class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralRow {
    pub year:      StudyYear,
    pub category:  String,
    pub class:     SectorClass,
    pub footprint: f64,
    /// Share of the category's footprint.
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorFootprintRow {
    pub year:         StudyYear,
    pub code:         String,
    pub name:         String,
    pub class:        SectorClass,
    pub demand:       f64,
    pub intensity:    f64,
    pub multiplier:   f64,
    pub footprint:    f64,
    /// W[j]·Y[j]
    pub direct:       f64,
    /// TWF[j] − W[j]·Y[j]
    pub supply_chain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRow {
    pub year:  StudyYear,
    pub band:  String,
    pub low:   f64,
    pub base:  f64,
    pub high:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitRow {
    pub year:      StudyYear,
    pub component: String,
    pub demand:    f64,
    pub footprint: f64,
    /// Footprint per monetary unit of demand.
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryIntensityRow {
    pub year:           StudyYear,
    pub category:       String,
    pub demand:         f64,
    pub footprint:      f64,
    pub intensity:      f64,
    pub demand_share_pct: f64,
    pub weighted_score: f64,
}

/// Footprint intensity at current and at base-year prices. Water is
/// physical, so only the demand denominator is deflated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceIntensityRow {
    pub year:              StudyYear,
    pub deflator:          f64,
    pub demand_nominal:    f64,
    pub demand_real:       f64,
    pub footprint:         f64,
    pub intensity_nominal: f64,
    pub intensity_real:    f64,
}

fn check_shapes(year: StudyYear, w: &Vector, l: &Matrix, y: &Vector) -> TwfResult<()> {
    let n = l.nrows();
    if l.ncols() != n {
        return Err(TwfError::dimension(year, "Leontief inverse columns", n, l.ncols()));
    }
    if w.len() != n {
        return Err(TwfError::dimension(year, "intensity W", n, w.len()));
    }
    if y.len() != n {
        return Err(TwfError::dimension(year, "final demand Y", n, y.len()));
    }
    Ok(())
}

/// Scalar total only: (Wᵗ·L)·Y. Used wherever the pull matrix is not needed.
pub fn total_footprint(w: &Vector, l: &Matrix, y: &Vector) -> f64 {
    (l.tr_mul(w)).dot(y)
}

/// Full propagation for one year.
pub fn propagate(year: StudyYear, w: &Vector, l: &Matrix, y: &Vector) -> TwfResult<Footprint> {
    check_shapes(year, w, l, y)?;
    let n = l.nrows();
    let multipliers = l.tr_mul(w);
    let per_sector = multipliers.component_mul(y);
    let pull = Matrix::from_fn(n, n, |i, j| w[i] * l[(i, j)] * y[j]);
    let total = per_sector.sum();

    log::debug!("year={year} footprint: total={total:.1} pull Σ={:.1}", pull.sum());
    Ok(Footprint { year, multipliers, per_sector, pull, total })
}

impl Footprint {
    pub fn from_bundle(bundle: &YearBundle) -> TwfResult<Self> {
        propagate(bundle.year, &bundle.w, bundle.l(), &bundle.y)
    }

    /// Row sums of P grouped by source class, in `SectorClass::ALL` order.
    pub fn source_view(&self, space: &SectorSpace) -> Vec<SourceViewRow> {
        let rows = self.pull.column_sum();
        let mut by_class = vec![0.0; SectorClass::ALL.len()];
        for (i, &v) in rows.iter().enumerate() {
            let slot = SectorClass::ALL
                .iter()
                .position(|c| *c == space.get(i).class)
                .unwrap_or(0);
            by_class[slot] += v;
        }
        let total: f64 = by_class.iter().sum();
        SectorClass::ALL
            .iter()
            .zip(by_class)
            .map(|(&class, footprint)| SourceViewRow {
                year: self.year,
                class,
                footprint,
                share_pct: pct(footprint, total),
            })
            .collect()
    }

    /// Column sums of P grouped by destination demand category,
    /// in first-appearance order.
    pub fn destination_view(&self, space: &SectorSpace) -> Vec<DestinationViewRow> {
        let cols = self.pull.row_sum();
        let mut groups: Vec<(String, f64)> = Vec::new();
        for (j, &v) in cols.iter().enumerate() {
            let category = &space.get(j).demand_category;
            match groups.iter_mut().find(|(c, _)| c == category) {
                Some((_, acc)) => *acc += v,
                None => groups.push((category.clone(), v)),
            }
        }
        let total: f64 = groups.iter().map(|(_, v)| v).sum();
        groups
            .into_iter()
            .map(|(category, footprint)| DestinationViewRow {
                year: self.year,
                category,
                footprint,
                share_pct: pct(footprint, total),
            })
            .collect()
    }

    /// P summed over source class (rows) and destination category
    /// (columns). Categories in first-appearance order, classes in
    /// `SectorClass::ALL` order; every pair gets a row.
    pub fn structural_view(&self, space: &SectorSpace) -> Vec<StructuralRow> {
        let classes = SectorClass::ALL.len();
        let slot_of = |i: usize| {
            SectorClass::ALL
                .iter()
                .position(|c| *c == space.get(i).class)
                .unwrap_or(0)
        };
        let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
        for (j, column) in self.pull.column_iter().enumerate() {
            let category = &space.get(j).demand_category;
            let pos = match groups.iter().position(|(c, _)| c == category) {
                Some(pos) => pos,
                None => {
                    groups.push((category.clone(), vec![0.0; classes]));
                    groups.len() - 1
                }
            };
            for (i, &v) in column.iter().enumerate() {
                groups[pos].1[slot_of(i)] += v;
            }
        }

        let mut rows = Vec::with_capacity(groups.len() * classes);
        for (category, by_class) in groups {
            let total: f64 = by_class.iter().sum();
            for (&class, footprint) in SectorClass::ALL.iter().zip(by_class) {
                rows.push(StructuralRow {
                    year: self.year,
                    category: category.clone(),
                    class,
                    footprint,
                    share_pct: pct(footprint, total),
                });
            }
        }
        rows
    }

    /// Both views and Σ TWF must agree.
    pub fn check_views(&self, space: &SectorSpace) -> TwfResult<()> {
        let source: f64 = self.source_view(space).iter().map(|r| r.footprint).sum();
        let destination: f64 = self.destination_view(space).iter().map(|r| r.footprint).sum();
        let scale = self.total.abs().max(1.0);
        for (what, value) in [
            ("source view total vs Σ TWF", source),
            ("destination view total vs Σ TWF", destination),
        ] {
            if (value - self.total).abs() > VIEW_TOLERANCE * scale {
                return Err(TwfError::InvariantViolation {
                    year: self.year,
                    what: what.into(),
                    left: value,
                    right: self.total,
                });
            }
        }
        Ok(())
    }

    pub fn sector_rows(&self, space: &SectorSpace, w: &Vector, y: &Vector) -> Vec<SectorFootprintRow> {
        space
            .sectors()
            .iter()
            .enumerate()
            .map(|(j, s)| {
                let direct = w[j] * y[j];
                SectorFootprintRow {
                    year:         self.year,
                    code:         s.code.clone(),
                    name:         s.name.clone(),
                    class:        s.class,
                    demand:       y[j],
                    intensity:    w[j],
                    multiplier:   self.multipliers[j],
                    footprint:    self.per_sector[j],
                    direct,
                    supply_chain: self.per_sector[j] - direct,
                }
            })
            .collect()
    }

    /// Per demand category: demand, footprint and intensity, with the
    /// category's demand share and intensity × share as an impact score.
    pub fn category_intensity(&self, space: &SectorSpace, y: &Vector) -> Vec<CategoryIntensityRow> {
        let mut groups: Vec<(String, f64, f64)> = Vec::new();
        for (j, s) in space.sectors().iter().enumerate() {
            match groups.iter_mut().find(|(c, _, _)| *c == s.demand_category) {
                Some((_, d, f)) => {
                    *d += y[j];
                    *f += self.per_sector[j];
                }
                None => groups.push((s.demand_category.clone(), y[j], self.per_sector[j])),
            }
        }
        let total_demand: f64 = groups.iter().map(|(_, d, _)| d).sum();
        groups
            .into_iter()
            .map(|(category, demand, footprint)| {
                let intensity = if demand > 0.0 { footprint / demand } else { 0.0 };
                let share = pct(demand, total_demand);
                CategoryIntensityRow {
                    year: self.year,
                    category,
                    demand,
                    footprint,
                    intensity,
                    demand_share_pct: share,
                    weighted_score: intensity * share / 100.0,
                }
            })
            .collect()
    }
}

/// LOW/BASE/HIGH totals, one row per band. Each band scales only the
/// W rows of its classes.
pub fn scenario_bands(bundle: &YearBundle, bands: &[ScenarioBand]) -> Vec<ScenarioRow> {
    let l = bundle.l();
    let base = total_footprint(&bundle.w, l, &bundle.y);
    bands
        .iter()
        .map(|band| {
            let mask = bundle.space.class_mask(&band.classes);
            let scaled = |factor: f64| {
                let w = Vector::from_iterator(
                    bundle.w.len(),
                    bundle.w.iter().zip(&mask).map(|(&v, &hit)| if hit { v * factor } else { v }),
                );
                total_footprint(&w, l, &bundle.y)
            };
            let row = ScenarioRow {
                year: bundle.year,
                band: band.label.clone(),
                low:  scaled(band.low),
                base,
                high: scaled(band.high),
            };
            log::debug!(
                "year={} scenario[{}]: low={:.1} base={:.1} high={:.1}",
                row.year, row.band, row.low, row.base, row.high
            );
            row
        })
        .collect()
}

pub fn price_intensity(bundle: &YearBundle, footprint: &Footprint) -> PriceIntensityRow {
    let demand_nominal = bundle.y.sum();
    let demand_real = bundle.real_demand().sum();
    let per_unit = |demand: f64| if demand > 0.0 { footprint.total / demand } else { 0.0 };
    PriceIntensityRow {
        year: bundle.year,
        deflator: bundle.deflator,
        demand_nominal,
        demand_real,
        footprint: footprint.total,
        intensity_nominal: per_unit(demand_nominal),
        intensity_real: per_unit(demand_real),
    }
}

/// Footprint per demand component plus a combined row.
pub fn demand_split(year: StudyYear, w: &Vector, l: &Matrix, components: &[DemandComponent]) -> TwfResult<Vec<SplitRow>> {
    let mut rows = Vec::with_capacity(components.len() + 1);
    let (mut demand_total, mut footprint_total) = (0.0, 0.0);
    for c in components {
        check_shapes(year, w, l, &c.y)?;
        let demand = c.y.sum();
        let footprint = total_footprint(w, l, &c.y);
        demand_total += demand;
        footprint_total += footprint;
        rows.push(split_row(year, &c.label, demand, footprint));
    }
    if !components.is_empty() {
        rows.push(split_row(year, "combined", demand_total, footprint_total));
    }
    Ok(rows)
}

fn split_row(year: StudyYear, label: &str, demand: f64, footprint: f64) -> SplitRow {
    SplitRow {
        year,
        component: label.to_string(),
        demand,
        footprint,
        intensity: if demand > 0.0 { footprint / demand } else { 0.0 },
    }
}

pub(crate) fn pct(part: f64, total: f64) -> f64 {
    if total == 0.0 { 0.0 } else { 100.0 * part / total }
}
