// src/simulation/config.rs

use serde::{Deserialize, Serialize};

/// Which snapshots a run records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One end-of-period row per node.
    #[default]
    Summary,
    /// Intermediate per-phase rows as well.
    Detailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of periods; a run covers t = 0..horizon.
    pub horizon: u32,
    /// Periods between placing an order and the parent processing it.
    #[serde(default = "default_order_processing_delay")]
    pub order_processing_delay: u32,
    #[serde(default)]
    pub mode: RunMode,
    /// Top-level seed for every stochastic stream without its own seed.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Attribute transport costs to every shipment.
    #[serde(default)]
    pub transport_costing: bool,
}

fn default_order_processing_delay() -> u32 {
    1
}

impl SimulationConfig {
    pub fn new(horizon: u32) -> Self {
        Self {
            horizon,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_order_processing_delay(mut self, delay: u32) -> Self {
        self.order_processing_delay = delay;
        self
    }

    pub fn with_transport_costing(mut self, enabled: bool) -> Self {
        self.transport_costing = enabled;
        self
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon: 30,
            order_processing_delay: default_order_processing_delay(),
            mode: RunMode::Summary,
            seed: None,
            transport_costing: false,
        }
    }
}
