use crate::types::StudyYear;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TwfError {
    #[error("Configuration error: {field} = {value}: {reason}")]
    Configuration {
        field:  String,
        value:  String,
        reason: String,
    },

    #[error("Concordance error (year {year}): sector {code}: {reason}")]
    Concordance {
        year:   StudyYear,
        code:   String,
        reason: String,
    },

    #[error(
        "Conservation error (year {year}): {label} remapped total {actual:.3} vs source {expected:.3} \
         (Δ {diff_pct:.3}% > {tolerance_pct}%)"
    )]
    Conservation {
        year:          StudyYear,
        label:         String,
        actual:        f64,
        expected:      f64,
        diff_pct:      f64,
        tolerance_pct: f64,
    },

    #[error("Numerical instability (year {year}): {reason} (value {value:.6})")]
    NumericalInstability {
        year:   StudyYear,
        reason: String,
        value:  f64,
    },

    #[error("Dimension mismatch (year {year}): {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        year:     StudyYear,
        what:     String,
        expected: usize,
        actual:   usize,
    },

    #[error("Invariant violation (year {year}): {what}: {left:.6} vs {right:.6}")]
    InvariantViolation {
        year:  StudyYear,
        what:  String,
        left:  f64,
        right: f64,
    },

    #[error("Non-physical draw (year {year}): group '{group}' trial {trial} drew factor {value}")]
    NonPhysicalDraw {
        year:  StudyYear,
        group: String,
        trial: usize,
        value: f64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TwfError {
    pub fn config(field: &str, value: impl ToString, reason: &str) -> Self {
        Self::Configuration {
            field:  field.to_string(),
            value:  value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn concordance(year: StudyYear, code: &str, reason: impl Into<String>) -> Self {
        Self::Concordance {
            year,
            code:   code.to_string(),
            reason: reason.into(),
        }
    }

    pub fn dimension(year: StudyYear, what: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            year,
            what: what.to_string(),
            expected,
            actual,
        }
    }
}

pub type TwfResult<T> = Result<T, TwfError>;
