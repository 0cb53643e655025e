//! twf-runner: batch runner for the tourism water footprint engine.
//!
//! Usage:
//!   twf-runner --input study.json --out ./artifacts
//!   twf-runner --input study.json --config analysis.json --seed 7 --trials 2000

use anyhow::{Context, Result};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use twf_core::{
    artifacts::{ArtifactFailure, ArtifactWriter},
    config::AnalysisConfig,
    engine::AnalysisEngine,
    input::StudyInput,
    types::StudyYear,
};

#[derive(Serialize)]
struct RunManifest {
    run_id:            String,
    started_at:        chrono::DateTime<chrono::Utc>,
    finished_at:       chrono::DateTime<chrono::Utc>,
    input:             String,
    seed:              u64,
    trials:            usize,
    years_succeeded:   Vec<StudyYear>,
    years_failed:      Vec<StudyYear>,
    sda_pairs:         usize,
    sda_failures:      usize,
    tables_written:    usize,
    artifact_failures: Vec<ArtifactFailure>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let input = string_arg(&args, "--input").context("--input <study.json> is required")?;
    let out_dir = string_arg(&args, "--out").unwrap_or_else(|| "./artifacts".to_string());

    let mut config = match string_arg(&args, "--config") {
        Some(path) => AnalysisConfig::load(&path)?,
        None => AnalysisConfig::default_test(),
    };
    config.monte_carlo.seed = parse_arg(&args, "--seed", config.monte_carlo.seed);
    config.monte_carlo.trials = parse_arg(&args, "--trials", config.monte_carlo.trials);
    config.validate()?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now();

    println!("twf-runner: tourism water footprint");
    println!("  run:     {run_id}");
    println!("  input:   {input}");
    println!("  out:     {out_dir}");
    println!("  seed:    {}", config.monte_carlo.seed);
    println!("  trials:  {}", config.monte_carlo.trials);
    println!();

    let study = StudyInput::load(PathBuf::from(&input).as_path())
        .with_context(|| format!("Cannot load study input {input}"))?;
    let engine = AnalysisEngine::new(config);
    let report = engine.run(&study)?;

    for outcome in &report.outcomes {
        let mc = &outcome.uncertainty.summary;
        println!(
            "  {}  total {:>16.1}  P5 {:>16.1}  P95 {:>16.1}  dominant {}",
            outcome.year(),
            outcome.footprint.total,
            mc.p5,
            mc.p95,
            mc.dominant_group
        );
    }
    for sda in &report.sda {
        println!(
            "  {}→{}  Δ {:>14.1}  W {:>14.1}  L {:>14.1}  Y {:>14.1}",
            sda.from_year, sda.to_year, sda.delta, sda.w_effect, sda.l_effect, sda.y_effect
        );
    }
    for failure in &report.sda_failures {
        println!("  {}→{}  SDA FAILED: {}", failure.from_year, failure.to_year, failure.message);
    }
    for failure in &report.failures {
        println!("  {} FAILED at {}: {}", failure.year, failure.stage, failure.message);
    }

    let writer = ArtifactWriter::new(&out_dir)?;
    let artifacts = writer.write_report(&report);

    let manifest = RunManifest {
        run_id,
        started_at,
        finished_at: chrono::Utc::now(),
        input,
        seed: engine.config().monte_carlo.seed,
        trials: engine.config().monte_carlo.trials,
        years_succeeded: report.outcomes.iter().map(|o| o.year()).collect(),
        years_failed: report.failed_years(),
        sda_pairs: report.sda.len(),
        sda_failures: report.sda_failures.len(),
        tables_written: artifacts.written.len(),
        artifact_failures: artifacts.failures,
    };
    let manifest_path = writer.dir().join("run_manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    println!();
    println!(
        "Done. {} years, {} failed, {} tables → {}",
        manifest.years_succeeded.len(),
        manifest.years_failed.len(),
        manifest.tables_written,
        manifest_path.display()
    );
    Ok(())
}

fn string_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].clone())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
