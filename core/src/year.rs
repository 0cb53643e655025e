//! Per-year parameter bundle: the read-only (A, L, W, Y) tuple.
//!
//! RULE: Built once per year, then only borrowed.
//! Every vector and matrix in a bundle is in `space` order.

use crate::{
    error::{TwfError, TwfResult},
    io_table::TechnologyMatrix,
    monte_carlo::ActivityTerm,
    sector::SectorSpace,
    types::{Matrix, StudyYear, Vector},
};

/// One named slice of final demand, e.g. inbound or domestic.
#[derive(Debug, Clone)]
pub struct DemandComponent {
    pub label: String,
    pub y:     Vector,
}

#[derive(Debug, Clone)]
pub struct YearBundle {
    pub year:       StudyYear,
    pub space:      SectorSpace,
    pub technology: TechnologyMatrix,
    /// Resource intensity per monetary unit of output.
    pub w:          Vector,
    /// Total final demand; the sum of `components` when those exist.
    pub y:          Vector,
    pub components: Vec<DemandComponent>,
    pub activity:   Vec<ActivityTerm>,
    /// Price index of this year over the base year; 1.0 when not given.
    pub deflator:   f64,
}

impl YearBundle {
    pub fn new(
        space: SectorSpace,
        technology: TechnologyMatrix,
        w: Vector,
        y: Vector,
    ) -> TwfResult<Self> {
        let year = technology.year;
        let n = space.len();
        if technology.a.nrows() != n {
            return Err(TwfError::dimension(year, "technology matrix", n, technology.a.nrows()));
        }
        check_vector(year, &space, &w, "intensity W")?;
        check_vector(year, &space, &y, "final demand Y")?;
        Ok(Self {
            year,
            space,
            technology,
            w,
            y,
            components: Vec::new(),
            activity: Vec::new(),
            deflator: 1.0,
        })
    }

    /// Build from named demand components; Y becomes their sum.
    pub fn from_components(
        space: SectorSpace,
        technology: TechnologyMatrix,
        w: Vector,
        components: Vec<DemandComponent>,
    ) -> TwfResult<Self> {
        let year = technology.year;
        let mut y = Vector::zeros(space.len());
        for c in &components {
            check_vector(year, &space, &c.y, &format!("demand component {}", c.label))?;
            y += &c.y;
        }
        let mut bundle = Self::new(space, technology, w, y)?;
        bundle.components = components;
        Ok(bundle)
    }

    pub fn with_activity(mut self, activity: Vec<ActivityTerm>) -> Self {
        self.activity = activity;
        self
    }

    /// Base-year price deflator. Must be finite and > 0.
    pub fn with_deflator(mut self, deflator: f64) -> TwfResult<Self> {
        if !(deflator > 0.0 && deflator.is_finite()) {
            return Err(TwfError::config(
                &format!("years[{}].deflator", self.year),
                deflator,
                "must be finite and > 0",
            ));
        }
        self.deflator = deflator;
        Ok(self)
    }

    /// Y at base-year prices.
    pub fn real_demand(&self) -> Vector {
        &self.y / self.deflator
    }

    pub fn l(&self) -> &Matrix {
        &self.technology.l
    }

    /// (W, L, Y) laid out in `target` order.
    pub fn reconciled_onto(&self, target: &SectorSpace) -> TwfResult<(Vector, Matrix, Vector)> {
        if self.space.same_ordering(target) {
            return Ok((self.w.clone(), self.technology.l.clone(), self.y.clone()));
        }
        log::debug!("year={} reconciling sector ordering onto a {}-sector space", self.year, target.len());
        Ok((
            target.reconcile_vector(self.year, &self.space, &self.w)?,
            target.reconcile_matrix(self.year, &self.space, &self.technology.l)?,
            target.reconcile_vector(self.year, &self.space, &self.y)?,
        ))
    }
}

fn check_vector(year: StudyYear, space: &SectorSpace, v: &Vector, what: &str) -> TwfResult<()> {
    if v.len() != space.len() {
        return Err(TwfError::dimension(year, what, space.len(), v.len()));
    }
    if let Some((i, &value)) = v.iter().enumerate().find(|(_, x)| !x.is_finite() || **x < 0.0) {
        return Err(TwfError::InvariantViolation {
            year,
            what: format!("{what} entry for sector {} must be finite and non-negative", space.get(i).code),
            left: value,
            right: 0.0,
        });
    }
    Ok(())
}
