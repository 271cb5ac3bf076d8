// src/lib.rs

//! Multi-echelon inventory network simulation.
//!
//! Suppliers, warehouses and retailers hold stock, serve demand or child
//! orders, and reorder upstream under stochastic lead times. The
//! [`Simulator`] advances the whole network one period at a time and
//! records one [`MetricsRow`] per node per period.

pub mod error;
pub mod io;
pub mod model;
pub mod rng;
pub mod simulation;
pub mod strategy;

pub use error::{ConfigError, Result, TransportError};
pub use io::scenario::{NetworkDescription, Scenario};
pub use model::{Network, NodeId, NodeType, SupplyNode};
pub use simulation::{MetricsRow, Phase, RunMode, SimulationConfig, Simulator};
