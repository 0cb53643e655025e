//! Flat tabular artifacts: one CSV per table.
//!
//! RULES:
//!   - One row per entity, one column per field. No nesting.
//!   - Every table is written independently. A failed table is
//!     recorded and the rest are still written.

use crate::{
    engine::AnalysisReport,
    error::TwfResult,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactFailure {
    pub table:   String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactSummary {
    pub written:  Vec<PathBuf>,
    pub failures: Vec<ArtifactFailure>,
}

pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> TwfResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `rows` to `<dir>/<table>.csv`.
    pub fn write_table<T: Serialize>(&self, table: &str, rows: &[T]) -> TwfResult<PathBuf> {
        let path = self.dir.join(format!("{table}.csv"));
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        log::debug!("artifact {table}: {} rows → {}", rows.len(), path.display());
        Ok(path)
    }

    pub fn write_report(&self, report: &AnalysisReport) -> ArtifactSummary {
        let mut summary = ArtifactSummary::default();
        let mut record = |table: &str, result: TwfResult<PathBuf>| match result {
            Ok(path) => summary.written.push(path),
            Err(e) => {
                log::error!("artifact {table} failed: {e}");
                summary.failures.push(ArtifactFailure {
                    table:   table.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let outcomes = &report.outcomes;
        record("io_summary", self.write_table("io_summary", &report.io_summary));
        record("validation_warnings", self.write_table("validation_warnings", &report.warnings));
        record("coefficient_drift", self.write_table("coefficient_drift", &report.drift));
        record("sda", self.write_table("sda", &report.sda));
        record("sda_failures", self.write_table("sda_failures", &report.sda_failures));
        record("year_failures", self.write_table("year_failures", &report.failures));
        record("category_trends", self.write_table("category_trends", &report.category_trends));
        record("multiplier_trends", self.write_table("multiplier_trends", &report.multiplier_trends));
        record("intensity_trends", self.write_table("intensity_trends", &report.intensity_trends));

        let sectors: Vec<_> = outcomes.iter().flat_map(|o| o.sectors.iter()).collect();
        record("sector_footprint", self.write_table("sector_footprint", &sectors));
        let source: Vec<_> = outcomes.iter().flat_map(|o| o.source_view.iter()).collect();
        record("source_view", self.write_table("source_view", &source));
        let destination: Vec<_> = outcomes.iter().flat_map(|o| o.destination_view.iter()).collect();
        record("destination_view", self.write_table("destination_view", &destination));
        let structural: Vec<_> = outcomes.iter().flat_map(|o| o.structural.iter()).collect();
        record("structural_view", self.write_table("structural_view", &structural));
        let scenarios: Vec<_> = outcomes.iter().flat_map(|o| o.scenarios.iter()).collect();
        record("scenarios", self.write_table("scenarios", &scenarios));
        let split: Vec<_> = outcomes.iter().flat_map(|o| o.split.iter()).collect();
        record("demand_split", self.write_table("demand_split", &split));
        let categories: Vec<_> = outcomes.iter().flat_map(|o| o.category_intensity.iter()).collect();
        record("category_intensity", self.write_table("category_intensity", &categories));
        let price: Vec<_> = outcomes.iter().map(|o| &o.price).collect();
        record("price_intensity", self.write_table("price_intensity", &price));
        let paths: Vec<_> = outcomes.iter().flat_map(|o| o.paths.iter()).collect();
        record("top_paths", self.write_table("top_paths", &paths));
        let path_summary: Vec<_> = outcomes.iter().flat_map(|o| o.path_summary.iter()).collect();
        record("path_class_summary", self.write_table("path_class_summary", &path_summary));
        let dependency: Vec<_> = outcomes.iter().flat_map(|o| o.dependency.iter()).collect();
        record("dependency", self.write_table("dependency", &dependency));
        let uncertainty: Vec<_> = outcomes.iter().map(|o| &o.uncertainty.summary).collect();
        record("uncertainty", self.write_table("uncertainty", &uncertainty));
        let sensitivity: Vec<_> = outcomes.iter().flat_map(|o| o.uncertainty.sensitivity.iter()).collect();
        record("sensitivity", self.write_table("sensitivity", &sensitivity));

        log::info!(
            "artifacts: {} tables written, {} failed → {}",
            summary.written.len(),
            summary.failures.len(),
            self.dir.display()
        );
        summary
    }
}
