//! Pathway ranking and sector dependency (hypothetical extraction).
//!
//! Paths are the positive cells of the pull matrix, ranked descending.
//! Ties break on (source index, destination index) so a ranking is a
//! pure function of P.

use crate::{
    footprint::{pct, Footprint},
    sector::{SectorClass, SectorSpace},
    types::{Matrix, StudyYear, Vector},
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathRow {
    pub year:                 StudyYear,
    pub rank:                 usize,
    pub source_code:          String,
    pub source_name:          String,
    pub source_class:         SectorClass,
    pub destination_code:     String,
    pub destination_name:     String,
    pub destination_category: String,
    pub value:                f64,
    pub share_pct:            f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathClassSummaryRow {
    pub year:      StudyYear,
    pub class:     SectorClass,
    pub paths:     usize,
    pub value:     f64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyRow {
    pub year:           StudyYear,
    pub rank:           usize,
    pub code:           String,
    pub name:           String,
    pub class:          SectorClass,
    /// x_t[i] = Σⱼ L[i,j]·Y[j]
    pub demand_output:  f64,
    pub dependency_pct: f64,
    pub intensity:      f64,
    /// W[i]·x_t[i]
    pub resource:       f64,
}

/// Top `k` cells of the pull matrix, largest first.
pub fn top_paths(footprint: &Footprint, space: &SectorSpace, k: usize) -> Vec<PathRow> {
    let pull = &footprint.pull;
    let total = pull.sum();
    let mut cells: Vec<(usize, usize, f64)> = Vec::new();
    for j in 0..pull.ncols() {
        for i in 0..pull.nrows() {
            let v = pull[(i, j)];
            if v > 0.0 {
                cells.push((i, j, v));
            }
        }
    }
    cells.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
    cells.truncate(k);

    log::debug!(
        "year={} pathways: kept {} of {} cells",
        footprint.year,
        cells.len(),
        pull.len()
    );
    cells
        .into_iter()
        .enumerate()
        .map(|(r, (i, j, value))| {
            let (src, dst) = (space.get(i), space.get(j));
            PathRow {
                year:                 footprint.year,
                rank:                 r + 1,
                source_code:          src.code.clone(),
                source_name:          src.name.clone(),
                source_class:         src.class,
                destination_code:     dst.code.clone(),
                destination_name:     dst.name.clone(),
                destination_category: dst.demand_category.clone(),
                value,
                share_pct:            pct(value, total),
            }
        })
        .collect()
}

/// Top-K paths grouped by source class. Shares are of the top-K value.
pub fn summarize_by_class(year: StudyYear, paths: &[PathRow]) -> Vec<PathClassSummaryRow> {
    let kept: f64 = paths.iter().map(|p| p.value).sum();
    SectorClass::ALL
        .iter()
        .filter_map(|&class| {
            let hits: Vec<&PathRow> = paths.iter().filter(|p| p.source_class == class).collect();
            if hits.is_empty() {
                return None;
            }
            let value: f64 = hits.iter().map(|p| p.value).sum();
            Some(PathClassSummaryRow {
                year,
                class,
                paths: hits.len(),
                value,
                share_pct: pct(value, kept),
            })
        })
        .collect()
}

/// Demand-driven output per sector and its share of the total.
pub fn dependency_index(
    year: StudyYear,
    space: &SectorSpace,
    l: &Matrix,
    y: &Vector,
    w: &Vector,
) -> Vec<DependencyRow> {
    let x_t = l * y;
    let total = x_t.sum();
    let mut rows: Vec<DependencyRow> = space
        .sectors()
        .iter()
        .enumerate()
        .map(|(i, s)| DependencyRow {
            year,
            rank: 0,
            code: s.code.clone(),
            name: s.name.clone(),
            class: s.class,
            demand_output: x_t[i],
            dependency_pct: pct(x_t[i], total),
            intensity: w[i],
            resource: w[i] * x_t[i],
        })
        .collect();
    rows.sort_by(|a, b| b.dependency_pct.total_cmp(&a.dependency_pct));
    for (r, row) in rows.iter_mut().enumerate() {
        row.rank = r + 1;
    }
    rows
}
