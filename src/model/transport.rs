// src/model/transport.rs

//! Load planning for shipments over competing transport options.
//!
//! The planner is deterministic: the lowest-numbered mode that can carry
//! the volume wins outright, full loads first, then at most one partial
//! load priced by its utilization tier. Anything below the minimum
//! utilization is left for a later consolidation opportunity.

use serde::Serialize;

use crate::error::TransportError;

/// Route metadata for one transport option between a parent and a child.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportOption {
    pub route_id: String,
    pub mode: u32,
    /// Volume capacity of one load.
    pub capacity: f64,
    pub cost_full: f64,
    pub cost_half: f64,
    pub cost_quarter: f64,
    pub lead_time: u32,
}

/// One load decided by the planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedShipment {
    pub qty: f64,
    pub mode: u32,
    pub cost: f64,
    pub lead_time: u32,
    /// Utilization bucket: 1.0, 0.5 or 0.25.
    pub utilization: f64,
}

#[derive(Debug, Clone)]
pub struct TransportPlanner {
    min_utilization: f64,
}

impl Default for TransportPlanner {
    fn default() -> Self {
        Self {
            min_utilization: Self::MIN_UTIL,
        }
    }
}

impl TransportPlanner {
    /// Smallest load, as a fraction of capacity, worth sending.
    pub const MIN_UTIL: f64 = 0.25;

    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `requested_volume` into loads on the first mode (ascending)
    /// that accepts it.
    ///
    /// An empty plan means "ship nothing now", not failure.
    pub fn plan(
        &self,
        requested_volume: f64,
        options: &[TransportOption],
    ) -> Result<Vec<PlannedShipment>, TransportError> {
        if requested_volume <= 0.0 {
            return Ok(Vec::new());
        }

        let mut sorted: Vec<&TransportOption> = options.iter().collect();
        sorted.sort_by_key(|opt| opt.mode);

        for opt in sorted {
            let shipments = self.plan_single_option(requested_volume, opt)?;
            if !shipments.is_empty() {
                return Ok(shipments);
            }
        }

        // No feasible transport: the shipment waits.
        Ok(Vec::new())
    }

    fn plan_single_option(
        &self,
        requested_volume: f64,
        opt: &TransportOption,
    ) -> Result<Vec<PlannedShipment>, TransportError> {
        let capacity = opt.capacity;
        if capacity <= 0.0 || !capacity.is_finite() {
            return Err(TransportError::InvalidCapacity {
                route: opt.route_id.clone(),
                capacity,
            });
        }

        if requested_volume < self.min_utilization * capacity {
            return Ok(Vec::new());
        }

        let mut shipments = Vec::new();
        let mut remaining = requested_volume;

        // Full vehicles
        while remaining >= capacity {
            shipments.push(PlannedShipment {
                qty: capacity,
                mode: opt.mode,
                cost: opt.cost_full,
                lead_time: opt.lead_time,
                utilization: 1.0,
            });
            remaining -= capacity;
        }

        // Partial vehicle, or consolidate the remainder later
        if remaining > 0.0 {
            if let Some((utilization, cost)) = self.tier(remaining / capacity, opt) {
                shipments.push(PlannedShipment {
                    qty: remaining,
                    mode: opt.mode,
                    cost,
                    lead_time: opt.lead_time,
                    utilization,
                });
            }
        }

        Ok(shipments)
    }

    fn tier(&self, util: f64, opt: &TransportOption) -> Option<(f64, f64)> {
        if util >= 1.0 {
            Some((1.0, opt.cost_full))
        } else if util >= 0.5 {
            Some((0.5, opt.cost_half))
        } else if util >= self.min_utilization {
            Some((self.min_utilization, opt.cost_quarter))
        } else {
            None
        }
    }
}

/// Total quantity carried by a plan.
pub fn planned_volume(plan: &[PlannedShipment]) -> f64 {
    plan.iter().map(|s| s.qty).sum()
}

/// Total cost of a plan.
pub fn planned_cost(plan: &[PlannedShipment]) -> f64 {
    plan.iter().map(|s| s.cost).sum()
}
