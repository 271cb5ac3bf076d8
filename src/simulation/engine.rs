// src/simulation/engine.rs

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::io::demand::DemandSource;
use crate::model::node::{ShipmentEvent, SupplyNode};
use crate::model::queues::OrderDelayBook;
use crate::model::{Network, NodeId};
use crate::simulation::config::{RunMode, SimulationConfig};
use crate::simulation::costing::{ShipmentRecord, TransportCostLedger};

/// Where in the period a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AfterArrivals,
    AfterBacklogClear,
    AfterDemand,
    AfterShipments,
    AfterOrdering,
    #[serde(rename = "eod")]
    EndOfDay,
}

/// One snapshot of one node. Serializes to one CSV row.
///
/// End-of-day rows carry the whole period's flows; intermediate rows
/// carry only the flows of their own phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRow {
    pub period: u32,
    pub node_id: NodeId,
    pub on_hand: i64,
    pub backlog_external: i64,
    pub backlog_children: i64,
    pub pipeline_in: i64,
    pub orders_to_parent: i64,
    pub received: i64,
    /// Customer demand realized this period, after clipping.
    pub demand: i64,
    /// Customer units served, backlog clearing included.
    pub served: i64,
    /// Units shipped to children.
    pub shipped: i64,
    pub phase: Phase,
}

/// Flows of one node within one period.
#[derive(Debug, Clone, Copy, Default)]
struct PeriodFlows {
    received: i64,
    demand: i64,
    served: i64,
    shipped: i64,
    ordered: i64,
}

/// The periodic-review loop over a whole network.
///
/// Every period runs six phases, and every node finishes a phase before
/// any node starts the next: arrivals, backlog clearing, customer demand,
/// due-order fulfillment, replenishment ordering, snapshot.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    network: Network,
    demand_by_node: BTreeMap<NodeId, Box<dyn DemandSource>>,

    // Parent-before-child, fixed at construction
    topo: Vec<NodeId>,
    orders: OrderDelayBook,
    costs: Option<TransportCostLedger>,
    // Holding plus shortage cost, summed over end-of-day states
    inventory_costs: BTreeMap<NodeId, f64>,

    current_period: u32,
    pub history: Vec<MetricsRow>,
}

impl Simulator {
    /// Fails if the network is not a DAG or the delay is zero; nothing
    /// can fail once the run has started.
    pub fn new(
        config: SimulationConfig,
        network: Network,
        demand_by_node: BTreeMap<NodeId, Box<dyn DemandSource>>,
    ) -> Result<Self> {
        if config.order_processing_delay == 0 {
            return Err(ConfigError::InvalidOrderDelay);
        }
        for id in demand_by_node.keys() {
            if network.node(id).is_none() {
                return Err(ConfigError::UnknownNode(id.clone()));
            }
        }
        let topo = network.topological_order()?;
        let costs = config
            .transport_costing
            .then(TransportCostLedger::default);

        Ok(Self {
            config,
            network,
            demand_by_node,
            topo,
            orders: OrderDelayBook::new(),
            costs,
            inventory_costs: BTreeMap::new(),
            current_period: 0,
            history: Vec::new(),
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topological_order(&self) -> &[NodeId] {
        &self.topo
    }

    pub fn transport_costs(&self) -> Option<&TransportCostLedger> {
        self.costs.as_ref()
    }

    /// Runs every remaining period of the horizon and returns all rows.
    pub fn run(&mut self) -> &[MetricsRow] {
        info!(
            nodes = self.network.len(),
            horizon = self.config.horizon,
            mode = ?self.config.mode,
            "simulation started"
        );
        while self.current_period < self.config.horizon {
            self.step();
        }
        info!(rows = self.history.len(), "simulation finished");
        &self.history
    }

    fn step(&mut self) {
        let t = self.current_period;
        let detailed = self.config.mode == RunMode::Detailed;
        let Self {
            config,
            network,
            demand_by_node,
            topo,
            orders,
            costs,
            inventory_costs,
            history,
            ..
        } = self;

        let mut flows: BTreeMap<&str, PeriodFlows> = topo
            .iter()
            .map(|id| (id.as_str(), PeriodFlows::default()))
            .collect();

        // =================================================================
        // PHASE 1: Arrivals
        // =================================================================
        for id in topo.iter() {
            let node = node_mut(network, id);
            let received = node.receive_shipments(t);
            flow(&mut flows, id).received = received;
            if detailed {
                let phase_flows = PeriodFlows {
                    received,
                    ..PeriodFlows::default()
                };
                snapshot(history, node, t, Phase::AfterArrivals, &phase_flows);
            }
        }

        // =================================================================
        // PHASE 2: Owed customer orders before new ones
        // =================================================================
        for id in topo.iter() {
            let node = node_mut(network, id);
            if !node.is_retailer() || node.backlog_external() <= 0 || node.on_hand() <= 0 {
                continue;
            }
            let served = node.clear_external_backlog();
            flow(&mut flows, id).served += served;
            if detailed && served > 0 {
                let phase_flows = PeriodFlows {
                    served,
                    ..PeriodFlows::default()
                };
                snapshot(history, node, t, Phase::AfterBacklogClear, &phase_flows);
            }
        }

        // =================================================================
        // PHASE 3: Customer demand (retailers only)
        // =================================================================
        for id in topo.iter() {
            let node = node_mut(network, id);
            if !node.is_retailer() {
                continue;
            }
            let demand = demand_by_node
                .get_mut(id)
                .map(|source| source.sample(t))
                .unwrap_or(0);
            let (fulfilled, _) = node.process_external_demand(demand);
            node.observe_demand(demand.max(0));

            let entry = flow(&mut flows, id);
            entry.demand = demand.max(0);
            entry.served += fulfilled;
            if detailed {
                let phase_flows = PeriodFlows {
                    demand: demand.max(0),
                    served: fulfilled,
                    ..PeriodFlows::default()
                };
                snapshot(history, node, t, Phase::AfterDemand, &phase_flows);
            }
        }

        // =================================================================
        // PHASE 4: Parents process the child orders due now
        // =================================================================
        let mut due = orders.take_due(t);
        for id in topo.iter() {
            if network.children(id).is_empty() {
                continue;
            }
            let items = due.remove(id).unwrap_or_default();
            let parent = node_mut(network, id);
            // Quiet periods count as zero demand.
            parent.observe_demand(items.iter().map(|o| o.qty).sum());
            for order in items {
                parent.add_inbound_order(order.child, order.qty);
            }

            let mut events: Vec<ShipmentRecord> = Vec::new();
            let mut record = |event: &ShipmentEvent<'_>| events.push(event.into());
            let observer: Option<&mut dyn FnMut(&ShipmentEvent<'_>)> = if costs.is_some() {
                Some(&mut record)
            } else {
                None
            };
            let dispatches = network.process_child_orders(id, t, observer);
            flow(&mut flows, id).shipped = dispatches.iter().map(|d| d.shipment.qty).sum();

            if let Some(ledger) = costs.as_mut() {
                for event in &events {
                    if let Err(e) = ledger.attribute(network, event) {
                        panic!("transport planning failed for validated route: {e}");
                    }
                }
            }
        }
        assert!(due.is_empty(), "orders due at t={t} for nodes outside the network");

        if detailed {
            for id in topo.iter() {
                let phase_flows = PeriodFlows {
                    shipped: flows[id.as_str()].shipped,
                    ..PeriodFlows::default()
                };
                snapshot(history, node_mut(network, id), t, Phase::AfterShipments, &phase_flows);
            }
        }

        // =================================================================
        // PHASE 5: Replenishment orders upstream
        // =================================================================
        for id in topo.iter() {
            let Some(parent) = network.parent_of(id).map(str::to_string) else {
                continue;
            };
            let node = node_mut(network, id);
            let qty = node.replenishment_order(t);
            if qty > 0 {
                orders.place(t + config.order_processing_delay, &parent, id, qty);
            }
            flow(&mut flows, id).ordered = qty;
            if detailed {
                let phase_flows = PeriodFlows {
                    ordered: qty,
                    ..PeriodFlows::default()
                };
                snapshot(history, node, t, Phase::AfterOrdering, &phase_flows);
            }
        }

        // =================================================================
        // PHASE 6: End-of-day snapshot and invariants
        // =================================================================
        for id in topo.iter() {
            let node = node_mut(network, id);
            snapshot(history, node, t, Phase::EndOfDay, &flows[id.as_str()]);
            *inventory_costs.entry(id.clone()).or_insert(0.0) += node.period_cost();
        }
        for node in network.nodes() {
            node.assert_invariants(t);
        }

        debug!(
            period = t,
            received = flows.values().map(|f| f.received).sum::<i64>(),
            demand = flows.values().map(|f| f.demand).sum::<i64>(),
            shipped = flows.values().map(|f| f.shipped).sum::<i64>(),
            ordered = flows.values().map(|f| f.ordered).sum::<i64>(),
            orders_in_flight = orders.len(),
            "period complete"
        );
        self.current_period += 1;
    }

    /// Inventory cost per node over the periods run so far.
    pub fn cost_breakdown(&self) -> &BTreeMap<NodeId, f64> {
        &self.inventory_costs
    }

    pub fn total_inventory_cost(&self) -> f64 {
        self.inventory_costs.values().sum()
    }

    /// End-of-day rows of one node, in period order.
    pub fn node_history<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a MetricsRow> + 'a {
        self.history
            .iter()
            .filter(move |row| row.phase == Phase::EndOfDay && row.node_id == id)
    }
}

fn node_mut<'a>(network: &'a mut Network, id: &str) -> &'a mut SupplyNode {
    network
        .node_mut(id)
        .unwrap_or_else(|| panic!("node {id} missing from network"))
}

fn flow<'a>(flows: &'a mut BTreeMap<&str, PeriodFlows>, id: &str) -> &'a mut PeriodFlows {
    flows
        .get_mut(id)
        .unwrap_or_else(|| panic!("node {id} missing from period flows"))
}

fn snapshot(history: &mut Vec<MetricsRow>, node: &SupplyNode, t: u32, phase: Phase, flows: &PeriodFlows) {
    history.push(MetricsRow {
        period: t,
        node_id: node.id.clone(),
        on_hand: node.on_hand(),
        backlog_external: node.backlog_external(),
        backlog_children: node.total_backlog_children(),
        pipeline_in: node.total_pipeline_in(),
        orders_to_parent: flows.ordered,
        received: flows.received,
        demand: flows.demand,
        served: flows.served,
        shipped: flows.shipped,
        phase,
    });
}
