// src/strategy/traits.rs

use std::fmt::Debug;

/// The inventory signals a node exposes to its replenishment policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventorySignals {
    /// Current on-hand stock.
    pub on_hand: i64,
    /// Unmet end-customer demand (retailers only).
    pub backlog_external: i64,
    /// Unmet child orders, summed over all children.
    pub backlog_children: i64,
    /// Goods shipped toward this node that have not arrived yet.
    pub pipeline_in: i64,
    /// The period the decision is made in.
    pub period: u32,
}

impl InventorySignals {
    /// Inventory position: on-hand minus all backlog plus the pipeline.
    pub fn inventory_position(&self) -> i64 {
        self.on_hand - (self.backlog_external + self.backlog_children) + self.pipeline_in
    }
}

/// Defines the replenishment logic for a node.
///
/// We require `Debug` so node state can be printed, and `Send` + `Sync`
/// so a built network can be moved to another thread as a whole.
pub trait OrderPolicy: Debug + Send + Sync {
    /// Calculates how much to order from the parent this period.
    ///
    /// Implementations must return 0 rather than a negative quantity, and
    /// must return 0 (not skip) on periods where they do not review.
    fn order_qty(&mut self, signals: &InventorySignals) -> i64;

    /// Records one period of demand seen by the node (customer demand for a
    /// retailer, child orders for anything upstream).
    fn observe_demand(&mut self, _qty: i64) {}
}
