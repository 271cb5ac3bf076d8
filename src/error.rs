// src/error.rs

//! Error types for building and running an inventory network.
//!
//! Only configuration problems are errors. Data-quality anomalies are
//! clamped and logged, and broken invariants abort the run.

use thiserror::Error;

use crate::model::NodeId;

/// Problems with a network description, rejected before any period runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate node id '{0}'")]
    DuplicateNode(NodeId),

    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),

    /// A child may only be supplied by one parent.
    #[error("node '{child}' already sourced from '{existing}', cannot add parent '{attempted}'")]
    MultiSourcingViolation {
        child: NodeId,
        existing: NodeId,
        attempted: NodeId,
    },

    #[error("network is not a DAG (cycle or unreachable component), ordered {ordered} of {total} nodes")]
    NotADag { ordered: usize, total: usize },

    #[error("route {route} has non-positive transport capacity {capacity}")]
    InvalidCapacity { route: String, capacity: f64 },

    #[error("invalid lead time distribution: {0}")]
    InvalidLeadTime(String),

    #[error("invalid demand source for node '{node}': {reason}")]
    InvalidDemand { node: NodeId, reason: String },

    #[error("invalid policy for node '{node}': {reason}")]
    InvalidPolicy { node: NodeId, reason: String },

    #[error("node '{node}' has negative initial inventory {qty}")]
    NegativeInventory { node: NodeId, qty: i64 },

    #[error("order processing delay must be at least one period")]
    InvalidOrderDelay,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raised by the transport planner when a route cannot carry anything at all.
#[derive(Debug, Error, PartialEq)]
pub enum TransportError {
    #[error("invalid transport capacity {capacity} for route {route}")]
    InvalidCapacity { route: String, capacity: f64 },
}

impl From<TransportError> for ConfigError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidCapacity { route, capacity } => {
                ConfigError::InvalidCapacity { route, capacity }
            }
        }
    }
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
