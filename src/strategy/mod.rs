// src/strategy/mod.rs

pub mod implementations;
pub mod traits;

pub use implementations::PolicySpec;
pub use traits::{InventorySignals, OrderPolicy};
