// src/simulation/mod.rs

pub mod config;
pub mod costing;
pub mod engine;

pub use config::{RunMode, SimulationConfig};
pub use engine::{MetricsRow, Phase, Simulator};
