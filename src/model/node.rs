// src/model/node.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::model::NodeId;
use crate::strategy::traits::{InventorySignals, OrderPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Supplier,
    Warehouse,
    Retailer,
}

/// Goods en route to a node. Consumed exactly once, in its arrival period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shipment {
    pub arrival_time: u32,
    pub qty: i64,
}

/// A child order that has reached the parent but is not yet processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingOrder {
    pub child: NodeId,
    pub qty: i64,
}

/// A shipment decided by a parent, to be placed on the child's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub child: NodeId,
    /// The lead time as sampled, before the next-period floor.
    pub lead_time: u32,
    pub shipment: Shipment,
}

/// What a shipment observer is told about each outgoing shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentEvent<'a> {
    pub parent: &'a str,
    pub child: &'a str,
    pub period: u32,
    pub lead_time: u32,
    pub qty: i64,
}

/// The state of a single node in the network.
///
/// A node knows nothing about its neighbours. The simulator drives it
/// through the state transitions below, once per phase per period.
#[derive(Debug)]
pub struct SupplyNode {
    // Identity
    pub id: NodeId,
    pub node_type: NodeType,
    pub infinite_supply: bool,

    // Cost parameters (per unit, per period)
    pub holding_cost: f64,
    pub shortage_cost: f64,

    // State Variables
    on_hand: i64,
    backlog_external: i64,                   // Retailer only
    backlog_children: BTreeMap<NodeId, i64>, // Unmet orders per child
    pipeline_in: Vec<Shipment>,              // Shipments en route to this node
    inbound_orders_queue: Vec<IncomingOrder>,

    // The replenishment rule
    policy: Box<dyn OrderPolicy>,
}

impl SupplyNode {
    pub fn new(
        id: impl Into<NodeId>,
        node_type: NodeType,
        initial_inventory: i64,
        policy: Box<dyn OrderPolicy>,
    ) -> Self {
        let id: NodeId = id.into();
        if initial_inventory < 0 {
            warn!(node = %id, initial_inventory, "negative initial inventory clamped to 0");
        }
        Self {
            id,
            node_type,
            infinite_supply: false,
            holding_cost: 0.0,
            shortage_cost: 0.0,
            on_hand: initial_inventory.max(0),
            backlog_external: 0,
            backlog_children: BTreeMap::new(),
            pipeline_in: Vec::new(),
            inbound_orders_queue: Vec::new(),
            policy,
        }
    }

    /// Infinite-supply nodes ship any quantity and never draw down stock.
    pub fn with_infinite_supply(mut self, infinite_supply: bool) -> Self {
        self.infinite_supply = infinite_supply;
        self
    }

    pub fn with_costs(mut self, holding_cost: f64, shortage_cost: f64) -> Self {
        self.holding_cost = holding_cost;
        self.shortage_cost = shortage_cost;
        self
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn backlog_external(&self) -> i64 {
        self.backlog_external
    }

    pub fn backlog_children(&self) -> &BTreeMap<NodeId, i64> {
        &self.backlog_children
    }

    pub fn pipeline_in(&self) -> &[Shipment] {
        &self.pipeline_in
    }

    pub fn inbound_orders(&self) -> &[IncomingOrder] {
        &self.inbound_orders_queue
    }

    pub fn total_pipeline_in(&self) -> i64 {
        self.pipeline_in.iter().map(|s| s.qty).sum()
    }

    pub fn total_backlog_children(&self) -> i64 {
        self.backlog_children.values().sum()
    }

    pub fn is_retailer(&self) -> bool {
        self.node_type == NodeType::Retailer
    }

    /// Moves every shipment due at `t` into on-hand stock.
    ///
    /// Returns the quantity that arrived.
    pub fn receive_shipments(&mut self, t: u32) -> i64 {
        let mut arrived = 0;
        self.pipeline_in.retain(|s| {
            if s.arrival_time == t {
                arrived += s.qty;
                false
            } else {
                true
            }
        });

        if let Some(orphan) = self.pipeline_in.iter().find(|s| s.arrival_time < t) {
            panic!(
                "orphaned shipment at node {}: due t={} but now t={} (qty {})",
                self.id, orphan.arrival_time, t, orphan.qty
            );
        }

        self.on_hand += arrived;
        arrived
    }

    /// Places a shipment on this node's inbound pipeline.
    pub fn schedule_arrival(&mut self, shipment: Shipment) {
        assert!(
            shipment.qty > 0,
            "empty shipment scheduled to node {}",
            self.id
        );
        self.pipeline_in.push(shipment);
    }

    /// Serves owed customer orders from stock before any new demand.
    ///
    /// Returns the quantity served.
    pub fn clear_external_backlog(&mut self) -> i64 {
        let served = self.on_hand.min(self.backlog_external).max(0);
        self.on_hand -= served;
        self.backlog_external -= served;
        served
    }

    /// Retailer only: serve this period's customer demand and backlog the
    /// remainder. Negative demand is clipped to 0.
    ///
    /// Returns `(fulfilled, unfilled)`.
    pub fn process_external_demand(&mut self, demand_qty: i64) -> (i64, i64) {
        let demand = if demand_qty < 0 {
            warn!(node = %self.id, demand = demand_qty, "negative demand clipped to 0");
            0
        } else {
            demand_qty
        };

        let fulfilled = self.on_hand.min(demand);
        self.on_hand -= fulfilled;
        let unfilled = demand - fulfilled;
        self.backlog_external += unfilled;
        (fulfilled, unfilled)
    }

    /// Queues a child order. Backlog is untouched until the orders are
    /// processed, so "received" and "processed" stay distinct events.
    pub fn add_inbound_order(&mut self, child: impl Into<NodeId>, qty: i64) {
        self.inbound_orders_queue.push(IncomingOrder {
            child: child.into(),
            qty,
        });
    }

    /// Serves children: carried backlog plus queued orders, per child.
    ///
    /// Ships what stock allows (everything, for infinite supply), samples a
    /// lead time per shipment through `lead_time`, and backlogs the rest.
    /// Arrival is at `t + max(1, L)`: never in the period it was shipped.
    ///
    /// Returns one [`Dispatch`] per child actually shipped to. The caller
    /// places them on the children's pipelines.
    pub fn process_child_orders(
        &mut self,
        t: u32,
        children: &[NodeId],
        lead_time: &mut dyn FnMut(&str) -> u32,
        mut on_ship: Option<&mut dyn FnMut(&ShipmentEvent<'_>)>,
    ) -> Vec<Dispatch> {
        let mut incoming: BTreeMap<NodeId, i64> = BTreeMap::new();
        for order in self.inbound_orders_queue.drain(..) {
            *incoming.entry(order.child).or_insert(0) += order.qty;
        }

        // Union of children that might need serving, in a stable order.
        let candidates: BTreeSet<NodeId> = children
            .iter()
            .chain(self.backlog_children.keys())
            .chain(incoming.keys())
            .cloned()
            .collect();

        let mut dispatches = Vec::new();
        for child in candidates {
            let need = self.backlog_children.get(&child).copied().unwrap_or(0)
                + incoming.get(&child).copied().unwrap_or(0);
            if need <= 0 {
                continue;
            }

            let ship = if self.infinite_supply {
                need
            } else {
                self.on_hand.min(need)
            };

            if ship > 0 {
                if !self.infinite_supply {
                    self.on_hand -= ship;
                }
                let sampled = lead_time(&child);
                let shipment = Shipment {
                    arrival_time: t + sampled.max(1),
                    qty: ship,
                };
                trace!(
                    parent = %self.id,
                    child = %child,
                    qty = ship,
                    lead_time = sampled,
                    arrival = shipment.arrival_time,
                    "shipment dispatched"
                );
                if let Some(observer) = on_ship.as_mut() {
                    observer(&ShipmentEvent {
                        parent: &self.id,
                        child: &child,
                        period: t,
                        lead_time: sampled,
                        qty: ship,
                    });
                }
                dispatches.push(Dispatch {
                    child: child.clone(),
                    lead_time: sampled,
                    shipment,
                });
            }

            let remaining = need - ship;
            if remaining > 0 {
                self.backlog_children.insert(child, remaining);
            } else {
                self.backlog_children.remove(&child);
            }
        }

        assert!(
            self.on_hand >= 0,
            "negative on-hand at node {} after serving children at t={t}",
            self.id
        );
        dispatches
    }

    pub fn signals(&self, t: u32) -> InventorySignals {
        InventorySignals {
            on_hand: self.on_hand,
            backlog_external: self.backlog_external,
            backlog_children: self.total_backlog_children(),
            pipeline_in: self.total_pipeline_in(),
            period: t,
        }
    }

    /// Runs the policy to decide what to order from the parent at `t`.
    pub fn replenishment_order(&mut self, t: u32) -> i64 {
        let signals = self.signals(t);
        let qty = self.policy.order_qty(&signals);
        assert!(
            qty >= 0,
            "policy of node {} returned negative order {qty} at t={t}",
            self.id
        );
        qty
    }

    /// Lets a forecasting policy see this period's demand.
    pub fn observe_demand(&mut self, qty: i64) {
        self.policy.observe_demand(qty);
    }

    /// Holding plus shortage cost of the current state.
    pub fn period_cost(&self) -> f64 {
        let backlog = self.backlog_external + self.total_backlog_children();
        self.holding_cost * self.on_hand as f64 + self.shortage_cost * backlog as f64
    }

    /// Aborts on any broken stock invariant. A failure here is an engine
    /// defect, never a user error.
    pub fn assert_invariants(&self, t: u32) {
        if !self.infinite_supply {
            assert!(
                self.on_hand >= 0,
                "negative stock at {} t={t}: {}",
                self.id,
                self.on_hand
            );
        }
        assert!(
            self.backlog_external >= 0,
            "negative external backlog at {} t={t}",
            self.id
        );
        assert!(
            self.backlog_children.values().all(|&q| q > 0),
            "non-positive child backlog entry at {} t={t}",
            self.id
        );
        assert!(
            self.pipeline_in.iter().all(|s| s.qty > 0 && s.arrival_time > t),
            "stale or empty pipeline entry at {} t={t}",
            self.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::implementations::BaseStockPolicy;

    fn node(id: &str, node_type: NodeType, on_hand: i64) -> SupplyNode {
        SupplyNode::new(id, node_type, on_hand, Box::new(BaseStockPolicy::new(0)))
    }

    #[test]
    fn negative_initial_inventory_starts_empty() {
        let r = node("R", NodeType::Retailer, -3);
        assert_eq!(r.on_hand(), 0);
        r.assert_invariants(0);
    }

    #[test]
    fn receive_moves_only_due_shipments() {
        let mut r = node("R", NodeType::Retailer, 0);
        r.schedule_arrival(Shipment { arrival_time: 1, qty: 4 });
        r.schedule_arrival(Shipment { arrival_time: 1, qty: 3 });
        r.schedule_arrival(Shipment { arrival_time: 2, qty: 5 });

        assert_eq!(r.receive_shipments(0), 0);
        assert_eq!(r.receive_shipments(1), 7);
        assert_eq!(r.on_hand(), 7);
        assert_eq!(r.total_pipeline_in(), 5);
        assert_eq!(r.receive_shipments(2), 5);
        assert!(r.pipeline_in().is_empty());
    }

    #[test]
    #[should_panic(expected = "orphaned shipment")]
    fn skipped_arrival_is_fatal() {
        let mut r = node("R", NodeType::Retailer, 0);
        r.schedule_arrival(Shipment { arrival_time: 1, qty: 4 });
        r.receive_shipments(2);
    }

    #[test]
    fn demand_is_served_then_backlogged() {
        let mut r = node("R", NodeType::Retailer, 10);
        assert_eq!(r.process_external_demand(5), (5, 0));
        assert_eq!(r.process_external_demand(8), (5, 3));
        assert_eq!(r.on_hand(), 0);
        assert_eq!(r.backlog_external(), 3);
    }

    #[test]
    fn negative_demand_is_clipped() {
        let mut r = node("R", NodeType::Retailer, 5);
        assert_eq!(r.process_external_demand(-7), (0, 0));
        assert_eq!(r.on_hand(), 5);
        assert_eq!(r.backlog_external(), 0);
    }

    #[test]
    fn backlog_clearing_is_bounded_by_stock() {
        let mut r = node("R", NodeType::Retailer, 2);
        r.process_external_demand(6);
        assert_eq!(r.backlog_external(), 4);
        r.schedule_arrival(Shipment { arrival_time: 1, qty: 3 });
        r.receive_shipments(1);
        assert_eq!(r.clear_external_backlog(), 3);
        assert_eq!(r.on_hand(), 0);
        assert_eq!(r.backlog_external(), 1);
    }

    #[test]
    fn child_orders_are_rationed_and_backlogged() {
        let mut w = node("W", NodeType::Warehouse, 10);
        w.add_inbound_order("A", 6);
        w.add_inbound_order("B", 7);
        assert_eq!(w.inbound_orders().len(), 2);
        assert!(w.backlog_children().is_empty());

        let children = vec!["A".to_string(), "B".to_string()];
        let mut events = Vec::new();
        let mut observer = |e: &ShipmentEvent<'_>| {
            events.push((e.child.to_string(), e.period, e.lead_time, e.qty));
        };
        let dispatches =
            w.process_child_orders(3, &children, &mut |_| 2, Some(&mut observer));

        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[0].child, "A");
        assert_eq!(dispatches[0].shipment, Shipment { arrival_time: 5, qty: 6 });
        assert_eq!(dispatches[1].shipment.qty, 4);
        assert_eq!(w.on_hand(), 0);
        assert_eq!(w.backlog_children().get("B"), Some(&3));
        assert_eq!(events, vec![("A".into(), 3, 2, 6), ("B".into(), 3, 2, 4)]);

        // Backlog alone is served once stock returns, and the entry clears.
        w.schedule_arrival(Shipment { arrival_time: 4, qty: 5 });
        w.receive_shipments(4);
        let dispatches = w.process_child_orders(4, &children, &mut |_| 1, None);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].shipment.qty, 3);
        assert!(w.backlog_children().is_empty());
        assert_eq!(w.on_hand(), 2);
    }

    #[test]
    fn zero_lead_time_arrives_next_period() {
        let mut w = node("W", NodeType::Warehouse, 10);
        w.add_inbound_order("R", 4);
        let dispatches = w.process_child_orders(7, &["R".to_string()], &mut |_| 0, None);
        assert_eq!(dispatches[0].lead_time, 0);
        assert_eq!(dispatches[0].shipment.arrival_time, 8);
    }

    #[test]
    fn infinite_supply_never_draws_down() {
        let mut s = node("S", NodeType::Supplier, 0).with_infinite_supply(true);
        s.add_inbound_order("W", 500);
        let dispatches = s.process_child_orders(0, &["W".to_string()], &mut |_| 1, None);
        assert_eq!(dispatches[0].shipment.qty, 500);
        assert_eq!(s.on_hand(), 0);
        assert!(s.backlog_children().is_empty());
    }

    #[test]
    fn period_cost_weights_stock_and_backlog() {
        let mut r = node("R", NodeType::Retailer, 4).with_costs(0.5, 2.0);
        assert_eq!(r.period_cost(), 2.0);
        r.process_external_demand(7);
        assert_eq!(r.period_cost(), 6.0);
    }
}
