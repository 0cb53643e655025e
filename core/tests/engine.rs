//! Multi-year engine tests: per-year isolation, SDA pairing, artifacts.

use twf_core::{
    artifacts::ArtifactWriter,
    concordance::ConcordanceEntry,
    engine::AnalysisEngine,
    error::TwfError,
    input::{DemandInput, StudyInput, TechnologySource, YearInput},
    monte_carlo::ActivityTerm,
    sector::{Sector, SectorClass},
};

fn sectors() -> Vec<Sector> {
    let sector = |code: &str, class, category: &str| Sector {
        code:            code.into(),
        name:            format!("Sector {code}"),
        class,
        demand_category: category.into(),
    };
    vec![
        sector("S01", SectorClass::Agriculture, "Agriculture"),
        sector("S02", SectorClass::Manufacturing, "Food Mfg"),
        sector("S03", SectorClass::Services, "Services"),
    ]
}

fn concordance() -> Vec<ConcordanceEntry> {
    ["1", "2", "3"]
        .iter()
        .map(|n| ConcordanceEntry {
            id:            format!("C{n}"),
            name:          format!("Category {n}"),
            category_type: "Goods".into(),
            external:      vec![format!("E{n}")],
            internal:      vec![format!("S0{n}")],
        })
        .collect()
}

fn keyed(values: [f64; 3]) -> std::collections::BTreeMap<String, f64> {
    values.iter().enumerate().map(|(i, v)| (format!("E{}", i + 1), *v)).collect()
}

fn year_input(year: u16, scale: f64) -> YearInput {
    YearInput {
        year,
        sectors: sectors(),
        technology: TechnologySource::Coefficients {
            a: vec![
                vec![0.10, 0.20 * scale, 0.05],
                vec![0.15, 0.10, 0.10],
                vec![0.05, 0.10, 0.20],
            ],
        },
        concordance: concordance(),
        intensity: keyed([5000.0 * scale, 20.0, 3.0]),
        unit_factor: 1.0,
        demand: vec![
            DemandInput { label: "inbound".into(), values: keyed([0.0, 50.0 * scale, 200.0]) },
            DemandInput { label: "domestic".into(), values: keyed([10.0, 100.0, 100.0 * scale]) },
        ],
        activity: vec![ActivityTerm {
            label:   "hotels".into(),
            base_m3: 20_000.0,
            groups:  vec!["hotel_coeff_mult".into()],
        }],
        deflator: None,
    }
}

/// `year_input` with a fourth sector S04 fed by external code E4.
fn four_sector_input(year: u16) -> YearInput {
    let mut input = year_input(year, 1.0);
    input.sectors.push(Sector {
        code:            "S04".into(),
        name:            "Sector S04".into(),
        class:           SectorClass::Services,
        demand_category: "Services".into(),
    });
    input.technology = TechnologySource::Coefficients {
        a: vec![
            vec![0.10, 0.20, 0.05, 0.05],
            vec![0.15, 0.10, 0.10, 0.05],
            vec![0.05, 0.10, 0.20, 0.10],
            vec![0.05, 0.05, 0.05, 0.10],
        ],
    };
    input.concordance.push(ConcordanceEntry {
        id:            "C4".into(),
        name:          "Category 4".into(),
        category_type: "Services".into(),
        external:      vec!["E4".into()],
        internal:      vec!["S04".into()],
    });
    input.intensity.insert("E4".into(), 4.0);
    for d in &mut input.demand {
        d.values.insert("E4".into(), 25.0);
    }
    input
}

fn engine() -> AnalysisEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    AnalysisEngine::build_test(300, 42).unwrap()
}

#[test]
fn consecutive_years_produce_sda_and_drift() {
    let input = StudyInput { years: vec![year_input(2019, 1.1), year_input(2015, 1.0)] };
    let report = engine().run(&input).unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let years: Vec<u16> = report.outcomes.iter().map(|o| o.year()).collect();
    assert_eq!(years, [2015, 2019]);
    assert_eq!(report.io_summary.len(), 2);
    assert_eq!(report.drift.len(), 3);

    assert_eq!(report.sda.len(), 1);
    let sda = &report.sda[0];
    let t0 = report.outcome(2015).unwrap().footprint.total;
    let t1 = report.outcome(2019).unwrap().footprint.total;
    assert!(((sda.twf_to - sda.twf_from) - (t1 - t0)).abs() < 1e-6 * t1);
    assert!(sda.residual.abs() < 1e-6 * t1);

    let outcome = report.outcome(2015).unwrap();
    assert_eq!(outcome.scenarios.len(), 3);
    assert_eq!(outcome.split.len(), 3);
    assert_eq!(outcome.uncertainty.summary.trials, 300);
    assert!((outcome.uncertainty.summary.baseline_activity - 20_000.0).abs() < 1e-9);
}

#[test]
fn a_failed_year_does_not_stop_the_others() {
    let mut broken = year_input(2022, 1.0);
    broken.concordance[2].internal.clear();
    let mut unstable = year_input(2017, 1.0);
    unstable.technology = TechnologySource::Coefficients {
        a: vec![vec![0.5, 0.6, 0.0], vec![0.6, 0.5, 0.0], vec![0.0, 0.0, 0.1]],
    };
    let input = StudyInput {
        years: vec![year_input(2015, 1.0), unstable, year_input(2019, 1.05), broken],
    };
    let report = engine().run(&input).unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failed_years(), [2017, 2022]);
    let concordance = report.failures.iter().find(|f| f.year == 2022).unwrap();
    assert_eq!(concordance.stage, "build");
    assert!(concordance.message.contains("C3"), "{}", concordance.message);
    let numeric = report.failures.iter().find(|f| f.year == 2017).unwrap();
    assert!(numeric.message.contains("spectral radius"), "{}", numeric.message);

    // SDA pairs the surviving years.
    assert_eq!(report.sda.len(), 1);
    assert_eq!((report.sda[0].from_year, report.sda[0].to_year), (2015, 2019));
}

#[test]
fn duplicate_years_are_a_configuration_error() {
    let input = StudyInput { years: vec![year_input(2019, 1.0), year_input(2019, 1.0)] };
    let err = engine().run(&input).unwrap_err();
    assert!(matches!(err, TwfError::Configuration { .. }), "got {err:?}");
}

#[test]
fn study_input_round_trips_through_json() {
    let input = StudyInput { years: vec![year_input(2015, 1.0)] };
    let json = serde_json::to_string(&input).unwrap();
    let parsed: StudyInput = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, input);
}

#[test]
fn artifacts_are_written_per_table() {
    let input = StudyInput { years: vec![year_input(2015, 1.0), year_input(2019, 1.1)] };
    let report = engine().run(&input).unwrap();

    let dir = std::env::temp_dir().join(format!("twf-artifacts-{}", std::process::id()));
    let writer = ArtifactWriter::new(&dir).unwrap();
    let summary = writer.write_report(&report);

    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    for table in [
        "sector_footprint",
        "structural_view",
        "price_intensity",
        "top_paths",
        "dependency",
        "uncertainty",
        "sda",
        "io_summary",
        "category_trends",
        "multiplier_trends",
        "intensity_trends",
    ] {
        let path = dir.join(format!("{table}.csv"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().count() > 1, "{table} has no data rows");
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sda_failure_keeps_both_years_built() {
    let input = StudyInput { years: vec![year_input(2015, 1.0), four_sector_input(2019)] };
    let report = engine().run(&input).unwrap();

    let years: Vec<u16> = report.outcomes.iter().map(|o| o.year()).collect();
    assert_eq!(years, [2015, 2019]);
    assert!(report.failed_years().is_empty(), "{:?}", report.failures);
    assert!(report.sda.is_empty());
    assert_eq!(report.sda_failures.len(), 1);
    let failure = &report.sda_failures[0];
    assert_eq!((failure.from_year, failure.to_year), (2015, 2019));
    assert!(failure.message.contains("Dimension mismatch"), "{}", failure.message);
}

#[test]
fn trends_compare_each_year_with_the_first() {
    let mut later = year_input(2019, 1.1);
    later.deflator = Some(1.2);
    let input = StudyInput { years: vec![year_input(2015, 1.0), later] };
    let report = engine().run(&input).unwrap();
    let (first, last) = (report.outcome(2015).unwrap(), report.outcome(2019).unwrap());

    // Three categories × two years.
    assert_eq!(report.category_trends.len(), 6);
    for row in report.category_trends.iter().filter(|r| r.year == 2015) {
        assert_eq!(row.change_vs_first_pct, Some(0.0), "{row:?}");
    }
    let services_then = first.destination_view.iter().find(|r| r.category == "Services").unwrap().footprint;
    let services_now = last.destination_view.iter().find(|r| r.category == "Services").unwrap().footprint;
    let services = report
        .category_trends
        .iter()
        .find(|r| r.category == "Services" && r.year == 2019)
        .unwrap();
    let expected = 100.0 * (services_now - services_then) / services_then;
    assert!((services.change_vs_first_pct.unwrap() - expected).abs() < 1e-9);

    assert_eq!(report.multiplier_trends.len(), 6);
    assert!(report.multiplier_trends.iter().all(|r| !r.dropped_to_zero));

    assert_eq!(report.intensity_trends.len(), 2);
    let real = &report.intensity_trends[1];
    assert_eq!(real.deflator, 1.2);
    assert!((real.intensity_real - 1.2 * real.intensity_nominal).abs() < 1e-9 * real.intensity_real);
    assert_eq!(report.io_summary[1].deflator, 1.2);
    assert_eq!(last.price.deflator, 1.2);
}

#[test]
fn non_positive_deflator_fails_only_its_year() {
    let mut bad = year_input(2019, 1.0);
    bad.deflator = Some(0.0);
    let input = StudyInput { years: vec![year_input(2015, 1.0), bad] };
    let report = engine().run(&input).unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.failed_years(), [2019]);
    assert!(report.failures[0].message.contains("deflator"), "{}", report.failures[0].message);
}
