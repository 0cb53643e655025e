//! Analysis configuration: built once, frozen, passed by reference.
//!
//! RULE: Nothing mutates an AnalysisConfig after build().
//! Every component takes `&AnalysisConfig`.
//! In tests, use AnalysisConfig::default_test().

use crate::{
    error::{TwfError, TwfResult},
    sector::SectorClass,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a concordance category's intensity reaches its internal sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityAllocation {
    /// Every mapped internal sector receives the category intensity.
    Replicate,
    /// The category intensity is divided equally among its internal sectors.
    EqualShare,
}

/// A fixed LOW/BASE/HIGH multiplier band over a set of W rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBand {
    pub label:   String,
    pub classes: Vec<SectorClass>,
    pub low:     f64,
    pub high:    f64,
}

/// Multiplicative factor distributions. All are centred near 1.0 in practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Distribution {
    /// exp(N(mu, sigma)), with mu and sigma on the log scale.
    LogNormal { mu: f64, sigma: f64 },
    Normal { mean: f64, sd: f64 },
    Uniform { low: f64, high: f64 },
}

impl Distribution {
    fn validate(&self, group: &str) -> TwfResult<()> {
        let field = format!("monte_carlo.groups[{group}].distribution");
        match *self {
            Distribution::LogNormal { mu, sigma } => {
                if !mu.is_finite() || !sigma.is_finite() || sigma < 0.0 {
                    return Err(TwfError::config(
                        &field,
                        format!("lognormal(mu={mu}, sigma={sigma})"),
                        "mu must be finite and sigma finite and >= 0",
                    ));
                }
            }
            Distribution::Normal { mean, sd } => {
                if !mean.is_finite() || !sd.is_finite() || sd < 0.0 || mean <= 0.0 {
                    return Err(TwfError::config(
                        &field,
                        format!("normal(mean={mean}, sd={sd})"),
                        "mean must be finite and > 0, sd finite and >= 0",
                    ));
                }
            }
            Distribution::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() || low <= 0.0 || high < low {
                    return Err(TwfError::config(
                        &field,
                        format!("uniform(low={low}, high={high})"),
                        "bounds must satisfy 0 < low <= high",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// What a parameter group's factor multiplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerturbationTarget {
    /// W rows whose class is listed.
    Intensity { classes: Vec<SectorClass> },
    /// Y rows whose class is listed; an empty list means every sector.
    Demand {
        #[serde(default)]
        classes: Vec<SectorClass>,
    },
    /// Activity terms that reference this group by name.
    Activity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroup {
    pub name:         String,
    pub distribution: Distribution,
    pub target:       PerturbationTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub trials: usize,
    pub seed:   u64,
    pub groups: Vec<ParameterGroup>,
}

impl MonteCarloConfig {
    pub fn group(&self, name: &str) -> Option<&ParameterGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub balance_tolerance_pct:      f64,
    pub conservation_tolerance_pct: f64,
    pub drift_threshold_pct:        f64,
    pub inverse_tolerance:          f64,
    /// Identity tolerance for an upstream L, relative to max(1, max |L|).
    #[serde(default = "default_prebuilt_inverse_tolerance")]
    pub prebuilt_inverse_tolerance: f64,
    pub min_divisor:                f64,
    pub top_k_paths:                usize,
    pub intensity_allocation:       IntensityAllocation,
    pub scenario_bands:             Vec<ScenarioBand>,
    pub monte_carlo:                MonteCarloConfig,
}

impl AnalysisConfig {
    /// Load from a JSON file, then validate.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            balance_tolerance_pct:      1.0,
            conservation_tolerance_pct: 2.0,
            drift_threshold_pct:        30.0,
            inverse_tolerance:          1e-8,
            prebuilt_inverse_tolerance: default_prebuilt_inverse_tolerance(),
            min_divisor:                0.001,
            top_k_paths:                50,
            intensity_allocation:       IntensityAllocation::Replicate,
            scenario_bands: vec![
                ScenarioBand {
                    label:   "Agriculture".into(),
                    classes: vec![SectorClass::Agriculture],
                    low:     0.80,
                    high:    1.20,
                },
                ScenarioBand {
                    label:   "Electricity".into(),
                    classes: vec![SectorClass::Electricity],
                    low:     0.80,
                    high:    1.20,
                },
                ScenarioBand {
                    label:   "Petroleum".into(),
                    classes: vec![SectorClass::Petroleum],
                    low:     0.80,
                    high:    1.20,
                },
            ],
            monte_carlo: MonteCarloConfig {
                trials: 10_000,
                seed:   42,
                groups: vec![
                    ParameterGroup {
                        name:         "agr_water_mult".into(),
                        distribution: Distribution::LogNormal { mu: 0.0, sigma: 0.30 },
                        target:       PerturbationTarget::Intensity {
                            classes: vec![SectorClass::Agriculture],
                        },
                    },
                    ParameterGroup {
                        name:         "hotel_coeff_mult".into(),
                        distribution: Distribution::LogNormal { mu: 0.0, sigma: 0.25 },
                        target:       PerturbationTarget::Activity,
                    },
                    ParameterGroup {
                        name:         "rest_coeff_mult".into(),
                        distribution: Distribution::Normal { mean: 1.0, sd: 0.15 },
                        target:       PerturbationTarget::Activity,
                    },
                    ParameterGroup {
                        name:         "dom_tourist_mult".into(),
                        distribution: Distribution::Normal { mean: 1.0, sd: 0.08 },
                        target:       PerturbationTarget::Activity,
                    },
                    ParameterGroup {
                        name:         "inb_tourist_mult".into(),
                        distribution: Distribution::Normal { mean: 1.0, sd: 0.05 },
                        target:       PerturbationTarget::Activity,
                    },
                    ParameterGroup {
                        name:         "rail_coeff_mult".into(),
                        distribution: Distribution::Normal { mean: 1.0, sd: 0.20 },
                        target:       PerturbationTarget::Activity,
                    },
                    ParameterGroup {
                        name:         "air_coeff_mult".into(),
                        distribution: Distribution::Normal { mean: 1.0, sd: 0.20 },
                        target:       PerturbationTarget::Activity,
                    },
                ],
            },
        }
    }

    /// Reject out-of-range bounds before any computation runs.
    pub fn validate(&self) -> TwfResult<()> {
        positive_pct("balance_tolerance_pct", self.balance_tolerance_pct)?;
        positive_pct("conservation_tolerance_pct", self.conservation_tolerance_pct)?;
        positive_pct("drift_threshold_pct", self.drift_threshold_pct)?;
        if !(self.inverse_tolerance > 0.0 && self.inverse_tolerance < 1.0) {
            return Err(TwfError::config(
                "inverse_tolerance",
                self.inverse_tolerance,
                "must lie in (0, 1)",
            ));
        }
        if !(self.prebuilt_inverse_tolerance >= self.inverse_tolerance
            && self.prebuilt_inverse_tolerance < 1.0)
        {
            return Err(TwfError::config(
                "prebuilt_inverse_tolerance",
                self.prebuilt_inverse_tolerance,
                "must lie in [inverse_tolerance, 1)",
            ));
        }
        if !(self.min_divisor > 0.0 && self.min_divisor.is_finite()) {
            return Err(TwfError::config("min_divisor", self.min_divisor, "must be > 0"));
        }
        if self.top_k_paths == 0 {
            return Err(TwfError::config("top_k_paths", 0, "must be >= 1"));
        }
        for band in &self.scenario_bands {
            if band.classes.is_empty() {
                return Err(TwfError::config(
                    &format!("scenario_bands[{}].classes", band.label),
                    "[]",
                    "a band must scale at least one sector class",
                ));
            }
            if !(band.low > 0.0 && band.low <= 1.0 && band.high >= 1.0 && band.high.is_finite()) {
                return Err(TwfError::config(
                    &format!("scenario_bands[{}]", band.label),
                    format!("low={} high={}", band.low, band.high),
                    "multipliers must satisfy 0 < low <= 1 <= high",
                ));
            }
        }
        self.validate_monte_carlo()
    }

    fn validate_monte_carlo(&self) -> TwfResult<()> {
        let mc = &self.monte_carlo;
        if mc.trials < 2 {
            return Err(TwfError::config("monte_carlo.trials", mc.trials, "must be >= 2"));
        }
        let mut seen = HashSet::new();
        for group in &mc.groups {
            if group.name.trim().is_empty() {
                return Err(TwfError::config("monte_carlo.groups.name", "\"\"", "must be non-empty"));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(TwfError::config(
                    "monte_carlo.groups.name",
                    &group.name,
                    "group names must be unique",
                ));
            }
            group.distribution.validate(&group.name)?;
            if let PerturbationTarget::Intensity { classes } = &group.target {
                if classes.is_empty() {
                    return Err(TwfError::config(
                        &format!("monte_carlo.groups[{}].target.classes", group.name),
                        "[]",
                        "an intensity group must scale at least one sector class",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_prebuilt_inverse_tolerance() -> f64 {
    1e-4
}

fn positive_pct(field: &str, value: f64) -> TwfResult<()> {
    if value > 0.0 && value < 100.0 {
        Ok(())
    } else {
        Err(TwfError::config(field, value, "must lie in (0, 100)"))
    }
}

/// Builder producing a validated, frozen AnalysisConfig.
/// Starts from the production defaults.
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self { config: AnalysisConfig::default_test() }
    }

    pub fn balance_tolerance_pct(mut self, pct: f64) -> Self {
        self.config.balance_tolerance_pct = pct;
        self
    }

    pub fn conservation_tolerance_pct(mut self, pct: f64) -> Self {
        self.config.conservation_tolerance_pct = pct;
        self
    }

    pub fn drift_threshold_pct(mut self, pct: f64) -> Self {
        self.config.drift_threshold_pct = pct;
        self
    }

    pub fn prebuilt_inverse_tolerance(mut self, tol: f64) -> Self {
        self.config.prebuilt_inverse_tolerance = tol;
        self
    }

    pub fn top_k_paths(mut self, k: usize) -> Self {
        self.config.top_k_paths = k;
        self
    }

    pub fn intensity_allocation(mut self, rule: IntensityAllocation) -> Self {
        self.config.intensity_allocation = rule;
        self
    }

    pub fn scenario_bands(mut self, bands: Vec<ScenarioBand>) -> Self {
        self.config.scenario_bands = bands;
        self
    }

    pub fn trials(mut self, trials: usize) -> Self {
        self.config.monte_carlo.trials = trials;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.monte_carlo.seed = seed;
        self
    }

    pub fn parameter_groups(mut self, groups: Vec<ParameterGroup>) -> Self {
        self.config.monte_carlo.groups = groups;
        self
    }

    pub fn build(self) -> TwfResult<AnalysisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for AnalysisConfigBuilder {
    fn default() -> Self { Self::new() }
}
