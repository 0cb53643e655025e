//! Pathway ranking and dependency index tests.

use std::collections::HashSet;
use twf_core::{
    footprint::propagate,
    pathway::{dependency_index, summarize_by_class, top_paths},
    sector::{Sector, SectorClass, SectorSpace},
    types::{Matrix, Vector},
};

const YEAR: u16 = 2019;

fn space() -> SectorSpace {
    let sector = |code: &str, class, category: &str| Sector {
        code:            code.into(),
        name:            format!("Sector {code}"),
        class,
        demand_category: category.into(),
    };
    SectorSpace::new(
        YEAR,
        vec![
            sector("S01", SectorClass::Agriculture, "Agriculture"),
            sector("S02", SectorClass::Manufacturing, "Food Mfg"),
            sector("S03", SectorClass::Electricity, "Utilities"),
            sector("S04", SectorClass::Services, "Services"),
        ],
    )
    .unwrap()
}

fn inputs() -> (Vector, Matrix, Vector) {
    (
        Vector::from_column_slice(&[4000.0, 15.0, 60.0, 2.0]),
        Matrix::from_row_slice(4, 4, &[
            1.20, 0.80, 0.10, 0.05,
            0.30, 1.50, 0.20, 0.10,
            0.10, 0.20, 1.10, 0.30,
            0.40, 0.60, 0.30, 1.30,
        ]),
        Vector::from_column_slice(&[5.0, 150.0, 0.0, 300.0]),
    )
}

#[test]
fn top_paths_are_sorted_and_unique() {
    let (w, l, y) = inputs();
    let s = space();
    let fp = propagate(YEAR, &w, &l, &y).unwrap();
    let paths = top_paths(&fp, &s, 50);

    // Column S03 has zero demand, so only 12 of 16 cells are positive.
    assert_eq!(paths.len(), 12);
    assert!(paths.windows(2).all(|p| p[0].value > p[1].value), "not strictly descending");
    let pairs: HashSet<(&str, &str)> =
        paths.iter().map(|p| (p.source_code.as_str(), p.destination_code.as_str())).collect();
    assert_eq!(pairs.len(), paths.len(), "duplicate (source, destination) pairs");
    assert!(paths.iter().enumerate().all(|(i, p)| p.rank == i + 1));

    let share_total: f64 = paths.iter().map(|p| p.share_pct).sum();
    assert!((share_total - 100.0).abs() < 1e-9, "shares of all positive cells sum to {share_total}");
    assert_eq!(paths[0].source_code, "S01");
}

#[test]
fn top_k_truncates_and_summarizes_by_source_class() {
    let (w, l, y) = inputs();
    let s = space();
    let fp = propagate(YEAR, &w, &l, &y).unwrap();
    let paths = top_paths(&fp, &s, 5);
    assert_eq!(paths.len(), 5);

    let summary = summarize_by_class(YEAR, &paths);
    let counted: usize = summary.iter().map(|r| r.paths).sum();
    assert_eq!(counted, 5);
    let shares: f64 = summary.iter().map(|r| r.share_pct).sum();
    assert!((shares - 100.0).abs() < 1e-9);
}

#[test]
fn ties_break_on_source_then_destination() {
    let s = space();
    let w = Vector::from_element(4, 1.0);
    let l = Matrix::identity(4, 4);
    let y = Vector::from_element(4, 10.0);
    let fp = propagate(YEAR, &w, &l, &y).unwrap();
    let paths = top_paths(&fp, &s, 4);
    let order: Vec<&str> = paths.iter().map(|p| p.source_code.as_str()).collect();
    assert_eq!(order, ["S01", "S02", "S03", "S04"]);
}

#[test]
fn dependency_index_sums_to_hundred() {
    let (w, l, y) = inputs();
    let rows = dependency_index(YEAR, &space(), &l, &y, &w);

    let total: f64 = rows.iter().map(|r| r.dependency_pct).sum();
    assert!((total - 100.0).abs() < 1e-9, "dependency indices sum to {total}");
    assert!(rows.windows(2).all(|r| r[0].dependency_pct >= r[1].dependency_pct));

    let x_t = &l * &y;
    for row in &rows {
        let i = space().index_of(&row.code).unwrap();
        assert!((row.demand_output - x_t[i]).abs() < 1e-9);
        assert!((row.resource - w[i] * x_t[i]).abs() < 1e-6);
    }
}
