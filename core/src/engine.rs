//! The analysis engine: runs every study year through the full chain.
//!
//! EXECUTION ORDER (per year, fixed):
//!   1. Build        sector space, A/L, concordance, W, Y
//!   2. Propagate    WL, TWF, pull matrix, both views
//!   3. Scenarios    LOW/BASE/HIGH bands, demand split, real-price intensity
//!   4. Pathways     top-K paths, dependency index
//!   5. Monte Carlo  percentiles, variance attribution
//! Then across years: drift between built years, SDA on consecutive pairs,
//! category / multiplier / intensity trends.
//!
//! RULES:
//!   - A fatal error aborts only its own year. Other years still run.
//!   - A failed SDA pair is recorded on its own; both years stay built.
//!   - Configuration errors abort the whole run before any year starts.
//!   - Outcomes are kept in ascending year order.

use crate::{
    config::AnalysisConfig,
    error::{TwfError, TwfResult},
    footprint::{
        demand_split, price_intensity, scenario_bands, CategoryIntensityRow, DestinationViewRow,
        Footprint, PriceIntensityRow, ScenarioRow, SectorFootprintRow, SourceViewRow, SplitRow,
        StructuralRow,
    },
    input::StudyInput,
    io_table::{check_stability, DriftReport, TechnologyMatrix, ValidationWarning},
    monte_carlo::{simulate_bundle, MonteCarloResult},
    pathway::{dependency_index, summarize_by_class, top_paths, DependencyRow, PathClassSummaryRow, PathRow},
    sda::{decompose_years, SdaResult},
    trend::{
        category_trends, intensity_trends, multiplier_trends, CategoryTrendRow, IntensityTrendRow,
        MultiplierTrendRow,
    },
    types::StudyYear,
    year::YearBundle,
};
use serde::Serialize;
use std::collections::HashSet;

/// Everything computed for one successfully built year.
#[derive(Debug, Clone)]
pub struct YearOutcome {
    pub bundle:             YearBundle,
    pub footprint:          Footprint,
    pub sectors:            Vec<SectorFootprintRow>,
    pub source_view:        Vec<SourceViewRow>,
    pub destination_view:   Vec<DestinationViewRow>,
    pub structural:         Vec<StructuralRow>,
    pub scenarios:          Vec<ScenarioRow>,
    pub split:              Vec<SplitRow>,
    pub category_intensity: Vec<CategoryIntensityRow>,
    pub price:              PriceIntensityRow,
    pub paths:              Vec<PathRow>,
    pub path_summary:       Vec<PathClassSummaryRow>,
    pub dependency:         Vec<DependencyRow>,
    pub uncertainty:        MonteCarloResult,
}

impl YearOutcome {
    pub fn year(&self) -> StudyYear {
        self.bundle.year
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearFailure {
    pub year:    StudyYear,
    pub stage:   String,
    pub message: String,
}

/// An SDA pair that could not be decomposed. Both years keep their outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdaFailure {
    pub from_year: StudyYear,
    pub to_year:   StudyYear,
    pub message:   String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IoSummaryRow {
    pub year:               StudyYear,
    pub sectors:            usize,
    pub deflator:           f64,
    pub total_output:       Option<f64>,
    /// Total output at base-year prices.
    pub total_output_real:  Option<f64>,
    pub total_intermediate: Option<f64>,
    pub total_final_demand: Option<f64>,
    pub balance_error_pct:  Option<f64>,
    pub spectral_radius:    f64,
    pub max_column_sum:     f64,
    pub identity_residual:  f64,
    pub warnings:           usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarningRow {
    pub year:   StudyYear,
    pub kind:   String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftRow {
    pub from_year:  StudyYear,
    pub to_year:    StudyYear,
    pub code:       String,
    pub change_pct: Option<f64>,
    pub flagged:    bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub outcomes:          Vec<YearOutcome>,
    pub sda:               Vec<SdaResult>,
    pub sda_failures:      Vec<SdaFailure>,
    pub io_summary:        Vec<IoSummaryRow>,
    pub drift:             Vec<DriftRow>,
    pub warnings:          Vec<WarningRow>,
    pub failures:          Vec<YearFailure>,
    pub category_trends:   Vec<CategoryTrendRow>,
    pub multiplier_trends: Vec<MultiplierTrendRow>,
    pub intensity_trends:  Vec<IntensityTrendRow>,
}

impl AnalysisReport {
    pub fn outcome(&self, year: StudyYear) -> Option<&YearOutcome> {
        self.outcomes.iter().find(|o| o.year() == year)
    }

    /// Years whose build or analysis failed. SDA failures are not year failures.
    pub fn failed_years(&self) -> Vec<StudyYear> {
        let mut years: Vec<StudyYear> = self.failures.iter().map(|f| f.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

pub struct AnalysisEngine {
    config: AnalysisConfig,
}

impl AnalysisEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Engine with `AnalysisConfig::default_test()` and a reduced trial count.
    pub fn build_test(trials: usize, seed: u64) -> TwfResult<Self> {
        let config = AnalysisConfig::builder().trials(trials).seed(seed).build()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self, input: &StudyInput) -> TwfResult<AnalysisReport> {
        self.config.validate()?;
        let mut seen = HashSet::new();
        for y in &input.years {
            if !seen.insert(y.year) {
                return Err(TwfError::config("years.year", y.year, "each study year may appear once"));
            }
        }
        let mut years: Vec<_> = input.years.iter().collect();
        years.sort_by_key(|y| y.year);

        let mut report = AnalysisReport::default();
        for year_input in years {
            let year = year_input.year;
            let bundle = match year_input.build(&self.config) {
                Ok(b) => b,
                Err(e) => {
                    record_failure(&mut report, year, "build", &e);
                    continue;
                }
            };
            match self.analyse_year(bundle) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => record_failure(&mut report, year, "analyse", &e),
            }
        }

        for outcome in &report.outcomes {
            let tech = &outcome.bundle.technology;
            report.io_summary.push(io_summary_row(&outcome.bundle));
            for w in &tech.report.warnings {
                report.warnings.push(warning_row(outcome.year(), w));
            }
        }

        for pair in report.outcomes.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let drift = self.drift_between(prev, next);
            for (j, change) in drift.change_pct.iter().enumerate() {
                let code = prev.bundle.space.get(j).code.clone();
                let flagged = drift.warnings.iter().any(
                    |w| matches!(w, ValidationWarning::Drift { sector, .. } if *sector == code),
                );
                report.drift.push(DriftRow {
                    from_year: drift.from_year,
                    to_year: drift.to_year,
                    code,
                    change_pct: *change,
                    flagged,
                });
            }
            for w in &drift.warnings {
                report.warnings.push(warning_row(next.year(), w));
            }
        }

        for pair in report.outcomes.windows(2) {
            let (from_year, to_year) = (pair[0].year(), pair[1].year());
            match decompose_years(&pair[0].bundle, &pair[1].bundle) {
                Ok(result) => report.sda.push(result),
                Err(e) => {
                    log::error!("sda {from_year}→{to_year} failed: {e}");
                    report.sda_failures.push(SdaFailure { from_year, to_year, message: e.to_string() });
                }
            }
        }

        report.category_trends = category_trends(report.outcomes.iter().flat_map(|o| &o.destination_view));
        report.multiplier_trends = multiplier_trends(report.outcomes.iter().flat_map(|o| &o.sectors));
        report.intensity_trends = intensity_trends(report.outcomes.iter().map(|o| &o.price));

        log::info!(
            "run complete: {} years built, {} failures, {} SDA pairs, {} SDA failures",
            report.outcomes.len(),
            report.failures.len(),
            report.sda.len(),
            report.sda_failures.len()
        );
        Ok(report)
    }

    /// Steps 2–5 for one built year.
    pub fn analyse_year(&self, bundle: YearBundle) -> TwfResult<YearOutcome> {
        let space = &bundle.space;
        let footprint = Footprint::from_bundle(&bundle)?;
        footprint.check_views(space)?;

        let pull_sum = footprint.pull.sum();
        log::info!(
            "year={} footprint: total={:.1} multiplier Σ={:.3} pull Σ={pull_sum:.1}",
            bundle.year,
            footprint.total,
            footprint.multipliers.sum()
        );

        let sectors = footprint.sector_rows(space, &bundle.w, &bundle.y);
        let source_view = footprint.source_view(space);
        let destination_view = footprint.destination_view(space);
        let structural = footprint.structural_view(space);
        let category_intensity = footprint.category_intensity(space, &bundle.y);
        let price = price_intensity(&bundle, &footprint);
        let scenarios = scenario_bands(&bundle, &self.config.scenario_bands);
        let split = demand_split(bundle.year, &bundle.w, bundle.l(), &bundle.components)?;

        let paths = top_paths(&footprint, space, self.config.top_k_paths);
        let path_summary = summarize_by_class(bundle.year, &paths);
        let dependency = dependency_index(bundle.year, space, bundle.l(), &bundle.y, &bundle.w);

        let uncertainty = simulate_bundle(&bundle, &self.config.monte_carlo)?;

        Ok(YearOutcome {
            bundle,
            footprint,
            sectors,
            source_view,
            destination_view,
            structural,
            scenarios,
            split,
            category_intensity,
            price,
            paths,
            path_summary,
            dependency,
            uncertainty,
        })
    }

    /// Column-sum drift of `next` against `prev`, on `prev`'s ordering.
    fn drift_between(&self, prev: &YearOutcome, next: &YearOutcome) -> DriftReport {
        let threshold = self.config.drift_threshold_pct;
        let space = &prev.bundle.space;
        let next_tech = &next.bundle.technology;
        match space.reconcile_matrix(next.year(), &next.bundle.space, &next_tech.a) {
            Ok(a) => {
                let aligned = TechnologyMatrix { a, ..next_tech.clone() };
                check_stability(space, &prev.bundle.technology, &aligned, threshold)
            }
            Err(e) => {
                log::warn!("drift {}→{}: sector spaces differ: {e}", prev.year(), next.year());
                DriftReport {
                    from_year:  prev.year(),
                    to_year:    next.year(),
                    change_pct: Vec::new(),
                    warnings:   vec![ValidationWarning::DriftShapeMismatch {
                        from_year: prev.year(),
                        to_year:   next.year(),
                        prev:      space.len(),
                        next:      next.bundle.space.len(),
                    }],
                }
            }
        }
    }
}

fn record_failure(report: &mut AnalysisReport, year: StudyYear, stage: &str, e: &TwfError) {
    log::error!("year={year} {stage} failed: {e}");
    report.failures.push(YearFailure {
        year,
        stage:   stage.to_string(),
        message: e.to_string(),
    });
}

fn io_summary_row(bundle: &YearBundle) -> IoSummaryRow {
    let tech = &bundle.technology;
    let totals = tech.report.totals.as_ref();
    IoSummaryRow {
        year:               bundle.year,
        sectors:            bundle.space.len(),
        deflator:           bundle.deflator,
        total_output:       totals.map(|t| t.total_output),
        total_output_real:  totals.map(|t| t.total_output / bundle.deflator),
        total_intermediate: totals.map(|t| t.total_intermediate),
        total_final_demand: totals.map(|t| t.total_final_demand),
        balance_error_pct:  totals.map(|t| t.balance_error_pct),
        spectral_radius:    tech.report.spectral_radius,
        max_column_sum:     tech.report.max_column_sum,
        identity_residual:  tech.report.identity_residual,
        warnings:           tech.report.warnings.len(),
    }
}

fn warning_row(year: StudyYear, w: &ValidationWarning) -> WarningRow {
    let kind = match w {
        ValidationWarning::Balance { .. }                  => "balance",
        ValidationWarning::Drift { .. }                    => "drift",
        ValidationWarning::DriftShapeMismatch { .. }       => "drift_shape_mismatch",
        ValidationWarning::ColumnSumAtOrAboveOne { .. }    => "column_sum_at_or_above_one",
        ValidationWarning::NegativeEntries { .. }          => "negative_entries",
        ValidationWarning::LeontiefDiagonalBelowOne { .. } => "leontief_diagonal_below_one",
    };
    WarningRow {
        year,
        kind:   kind.to_string(),
        detail: serde_json::to_string(w).unwrap_or_else(|_| format!("{w:?}")),
    }
}
