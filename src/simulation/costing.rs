// src/simulation/costing.rs

//! Post-hoc transport cost attribution.
//!
//! Costs are computed over shipment quantities the engine has already
//! decided. A plan that defers part of the volume does not hold anything
//! back; it only shows up as `deferred_qty` in the ledger.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::TransportError;
use crate::model::node::ShipmentEvent;
use crate::model::transport::{planned_cost, planned_volume, TransportPlanner};
use crate::model::{Network, NodeId};

/// An owned copy of a [`ShipmentEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRecord {
    pub parent: NodeId,
    pub child: NodeId,
    pub period: u32,
    pub lead_time: u32,
    pub qty: i64,
}

impl From<&ShipmentEvent<'_>> for ShipmentRecord {
    fn from(event: &ShipmentEvent<'_>) -> Self {
        Self {
            parent: event.parent.to_string(),
            child: event.child.to_string(),
            period: event.period,
            lead_time: event.lead_time,
            qty: event.qty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportCostRecord {
    pub period: u32,
    pub parent: NodeId,
    pub child: NodeId,
    pub lead_time: u32,
    pub qty: i64,
    pub loads: usize,
    pub planned_qty: f64,
    pub deferred_qty: f64,
    pub load_cost: f64,
    pub unit_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TransportCostLedger {
    planner: TransportPlanner,
    records: Vec<TransportCostRecord>,
}

impl TransportCostLedger {
    pub fn new(planner: TransportPlanner) -> Self {
        Self {
            planner,
            records: Vec::new(),
        }
    }

    /// Plans loads for one shipment and records what they cost.
    pub fn attribute(
        &mut self,
        network: &Network,
        shipment: &ShipmentRecord,
    ) -> Result<&TransportCostRecord, TransportError> {
        let options = network.get_transport_options(&shipment.parent, &shipment.child);
        let plan = self.planner.plan(shipment.qty as f64, &options)?;

        let planned_qty = planned_volume(&plan);
        let load_cost = planned_cost(&plan);
        let unit_cost = network
            .transport_cost_per_unit(&shipment.parent, &shipment.child)
            .map(|per_unit| per_unit * shipment.qty as f64)
            .unwrap_or(0.0);

        self.records.push(TransportCostRecord {
            period: shipment.period,
            parent: shipment.parent.clone(),
            child: shipment.child.clone(),
            lead_time: shipment.lead_time,
            qty: shipment.qty,
            loads: plan.len(),
            planned_qty,
            deferred_qty: (shipment.qty as f64 - planned_qty).max(0.0),
            load_cost,
            unit_cost,
            total_cost: load_cost + unit_cost,
        });
        Ok(&self.records[self.records.len() - 1])
    }

    pub fn records(&self) -> &[TransportCostRecord] {
        &self.records
    }

    pub fn total_cost(&self) -> f64 {
        self.records.iter().map(|r| r.total_cost).sum()
    }

    /// Total cost per (parent, child) route.
    pub fn cost_by_route(&self) -> BTreeMap<(NodeId, NodeId), f64> {
        let mut out = BTreeMap::new();
        for r in &self.records {
            *out.entry((r.parent.clone(), r.child.clone())).or_insert(0.0) += r.total_cost;
        }
        out
    }
}
