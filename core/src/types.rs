//! Shared primitive types used across the entire engine.

/// A study year, e.g. 2019. Each year owns its own A, L, W, Y.
pub type StudyYear = u16;

/// A stable sector identifier, unique within one sector space.
pub type SectorCode = String;

/// Numeric values are dense f64 matrices/vectors from nalgebra.
pub type Matrix = nalgebra::DMatrix<f64>;
pub type Vector = nalgebra::DVector<f64>;
