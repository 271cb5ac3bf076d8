// src/model/queues.rs

use std::collections::BTreeMap;

use crate::model::NodeId;

/// A replenishment order travelling to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrder {
    pub child: NodeId,
    pub qty: i64,
}

/// Orders placed upstream, keyed by the period they become due at the
/// parent. Due periods are absolute, so any order-processing delay works.
#[derive(Debug, Clone, Default)]
pub struct OrderDelayBook {
    // due period -> parent -> orders, in placement order
    due: BTreeMap<u32, BTreeMap<NodeId, Vec<PendingOrder>>>,
}

impl OrderDelayBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 1: An order is placed. It reaches `parent` at `due_at`.
    pub fn place(&mut self, due_at: u32, parent: &str, child: &str, qty: i64) {
        self.due
            .entry(due_at)
            .or_default()
            .entry(parent.to_string())
            .or_default()
            .push(PendingOrder {
                child: child.to_string(),
                qty,
            });
    }

    /// Step 2: Orders due at `t` are handed over, grouped by parent.
    /// Call this once per period, in increasing `t`.
    pub fn take_due(&mut self, t: u32) -> BTreeMap<NodeId, Vec<PendingOrder>> {
        if let Some((&missed, _)) = self.due.range(..t).next() {
            panic!("orders due at t={missed} were never processed (now t={t})");
        }
        self.due.remove(&t).unwrap_or_default()
    }

    /// Number of orders still in flight.
    pub fn len(&self) -> usize {
        self.due
            .values()
            .flat_map(|by_parent| by_parent.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }

    /// Units still in flight toward `parent`.
    pub fn outstanding_for(&self, parent: &str) -> i64 {
        self.due
            .values()
            .filter_map(|by_parent| by_parent.get(parent))
            .flatten()
            .map(|o| o.qty)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_surface_at_their_due_period() {
        let mut book = OrderDelayBook::new();
        book.place(1, "W", "R1", 5);
        book.place(1, "W", "R2", 3);
        book.place(2, "S", "W", 8);
        assert_eq!(book.len(), 3);
        assert_eq!(book.outstanding_for("W"), 8);

        assert!(book.take_due(0).is_empty());
        let due = book.take_due(1);
        assert_eq!(due.len(), 1);
        assert_eq!(
            due["W"],
            vec![
                PendingOrder { child: "R1".into(), qty: 5 },
                PendingOrder { child: "R2".into(), qty: 3 },
            ]
        );
        assert_eq!(book.take_due(2)["S"][0].qty, 8);
        assert!(book.is_empty());
    }

    #[test]
    #[should_panic(expected = "never processed")]
    fn skipping_a_due_period_is_fatal() {
        let mut book = OrderDelayBook::new();
        book.place(1, "W", "R", 5);
        book.take_due(2);
    }
}
