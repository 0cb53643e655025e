//! Tourism water footprint engine.
//!
//! Environmentally-extended input-output analysis over multiple study
//! years: technology matrices and Leontief inverses, intensity and
//! demand remapping, footprint propagation, structural decomposition,
//! Monte Carlo uncertainty and pathway ranking.

pub mod artifacts;
pub mod concordance;
pub mod config;
pub mod engine;
pub mod error;
pub mod footprint;
pub mod input;
pub mod io_table;
pub mod monte_carlo;
pub mod pathway;
pub mod rng;
pub mod sda;
pub mod sector;
pub mod trend;
pub mod types;
pub mod year;
