// src/model/network.rs

//! Network topology: the node registry and the (parent, child) route sets.
//!
//! Single-sourcing is enforced on insertion. A parent may feed many
//! children and may reach one child over several parallel routes, between
//! which each shipment picks one by weighted draw.

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ConfigError, Result};
use crate::model::lead_time::LeadTimeSampler;
use crate::model::node::{Dispatch, ShipmentEvent, SupplyNode};
use crate::model::transport::TransportOption;
use crate::model::NodeId;
use crate::rng::stream_rng;

/// Fallbacks for transport attributes a route leaves unset.
pub const DEFAULT_CAPACITY: f64 = 100.0;
pub const DEFAULT_COST_FULL: f64 = 100.0;
pub const DEFAULT_COST_HALF: f64 = 60.0;
pub const DEFAULT_COST_QUARTER: f64 = 35.0;
pub const DEFAULT_MODE: u32 = 1;

/// Optional transport attributes of a route.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransportAttrs {
    #[serde(default)]
    pub mode: Option<u32>,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub cost_full: Option<f64>,
    #[serde(default)]
    pub cost_half: Option<f64>,
    #[serde(default)]
    pub cost_quarter: Option<f64>,
    #[serde(default, rename = "transport_cost_per_unit")]
    pub cost_per_unit: Option<f64>,
}

/// One route from a parent to a child.
#[derive(Debug)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
    pub lead_time: Box<dyn LeadTimeSampler>,
    /// Expected lead time, quoted on transport options.
    pub nominal_lead_time: u32,
    /// Route selection weight; unset or non-positive counts as 1.
    pub share: Option<f64>,
    pub transport: TransportAttrs,
}

impl Edge {
    pub fn new(
        parent: impl Into<NodeId>,
        child: impl Into<NodeId>,
        lead_time: Box<dyn LeadTimeSampler>,
        nominal_lead_time: u32,
    ) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            lead_time,
            nominal_lead_time,
            share: None,
            transport: TransportAttrs::default(),
        }
    }

    pub fn with_share(mut self, share: f64) -> Self {
        self.share = Some(share);
        self
    }

    pub fn with_transport(mut self, transport: TransportAttrs) -> Self {
        self.transport = transport;
        self
    }
}

/// Discrete distribution over parallel routes.
///
/// A uniform draw `r` selects the first route whose cumulative normalized
/// share is `>= r`; rounding leftovers fall back to the last route.
#[derive(Debug, Clone)]
pub struct RouteMixer {
    cumulative: Vec<f64>,
    rng: StdRng,
}

impl RouteMixer {
    pub fn new(shares: &[Option<f64>], rng: StdRng) -> Self {
        let weights: Vec<f64> = shares
            .iter()
            .map(|s| match s {
                Some(w) if *w > 0.0 => *w,
                _ => 1.0,
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let mut acc = 0.0;
        let cumulative = weights
            .iter()
            .map(|w| {
                acc += w / total;
                acc
            })
            .collect();
        Self { cumulative, rng }
    }

    /// Route index for a draw in `[0, 1)`.
    pub fn pick(&self, draw: f64) -> usize {
        self.cumulative
            .iter()
            .position(|&c| draw <= c)
            .unwrap_or(self.cumulative.len().saturating_sub(1))
    }

    pub fn sample(&mut self) -> usize {
        let draw: f64 = self.rng.gen();
        self.pick(draw)
    }
}

/// All routes between one (parent, child) pair.
#[derive(Debug)]
pub struct RouteSet {
    routes: Vec<Edge>,
    mixer: Option<RouteMixer>, // Only with two or more routes
}

impl RouteSet {
    pub fn routes(&self) -> &[Edge] {
        &self.routes
    }

    /// One lead-time draw: the single route directly, or a mixed draw.
    pub fn sample_lead_time(&mut self) -> u32 {
        let idx = match self.mixer.as_mut() {
            Some(mixer) => mixer.sample(),
            None => 0,
        };
        self.routes[idx].lead_time.sample()
    }
}

#[derive(Debug, Default)]
pub struct Network {
    nodes: BTreeMap<NodeId, SupplyNode>,
    routes: BTreeMap<(NodeId, NodeId), RouteSet>,

    // Cached adjacency, rebuilt whenever routes change
    parents_of: BTreeMap<NodeId, NodeId>,
    children_of: BTreeMap<NodeId, Vec<NodeId>>,

    // Seeds the route mixers
    seed: Option<u64>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route mixers derive their streams from this seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn add_node(&mut self, node: SupplyNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(ConfigError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Adds a route. Fails without touching the network if the child
    /// already has a different parent.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        for id in [&edge.parent, &edge.child] {
            if !self.nodes.contains_key(id) {
                return Err(ConfigError::UnknownNode(id.clone()));
            }
        }
        if let Some(existing) = self.parents_of.get(&edge.child) {
            if *existing != edge.parent {
                return Err(ConfigError::MultiSourcingViolation {
                    child: edge.child.clone(),
                    existing: existing.clone(),
                    attempted: edge.parent.clone(),
                });
            }
        }
        if let Some(capacity) = edge.transport.capacity {
            if !(capacity > 0.0 && capacity.is_finite()) {
                return Err(ConfigError::InvalidCapacity {
                    route: format!("{}->{}", edge.parent, edge.child),
                    capacity,
                });
            }
        }

        let key = (edge.parent.clone(), edge.child.clone());
        let set = self.routes.entry(key).or_insert_with(|| RouteSet {
            routes: Vec::new(),
            mixer: None,
        });
        set.routes.push(edge);
        if set.routes.len() > 1 {
            let shares: Vec<Option<f64>> = set.routes.iter().map(|e| e.share).collect();
            let first = &set.routes[0];
            let label = format!("routes:{}->{}", first.parent, first.child);
            set.mixer = Some(RouteMixer::new(&shares, stream_rng(None, self.seed, &label)));
        }

        self.rebuild_adjacency();
        Ok(())
    }

    fn rebuild_adjacency(&mut self) {
        self.parents_of.clear();
        self.children_of.clear();
        for (parent, child) in self.routes.keys() {
            self.parents_of.insert(child.clone(), parent.clone());
            self.children_of
                .entry(parent.clone())
                .or_default()
                .push(child.clone());
        }
    }

    pub fn children(&self, id: &str) -> &[NodeId] {
        self.children_of.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents_of.get(id).map(String::as_str)
    }

    pub fn node(&self, id: &str) -> Option<&SupplyNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut SupplyNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SupplyNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges(&self, parent: &str, child: &str) -> &[Edge] {
        self.routes
            .get(&(parent.to_string(), child.to_string()))
            .map(RouteSet::routes)
            .unwrap_or(&[])
    }

    /// One lead-time sampler per child of `parent`.
    pub fn lead_time_sampler_by_child(&mut self, parent: &str) -> BTreeMap<NodeId, &mut RouteSet> {
        Self::child_samplers(&mut self.routes, parent)
    }

    fn child_samplers<'a>(
        routes: &'a mut BTreeMap<(NodeId, NodeId), RouteSet>,
        parent: &str,
    ) -> BTreeMap<NodeId, &'a mut RouteSet> {
        routes
            .iter_mut()
            .filter(|((p, _), _)| p == parent)
            .map(|((_, c), set)| (c.clone(), set))
            .collect()
    }

    /// Every route on (parent, child) as a transport option. Unset
    /// capacity or costs fall back to the defaults above, with a warning.
    pub fn get_transport_options(&self, parent: &str, child: &str) -> Vec<TransportOption> {
        self.edges(parent, child)
            .iter()
            .enumerate()
            .map(|(i, edge)| {
                let route_id = format!("{parent}->{child}#{i}");
                let attrs = &edge.transport;
                let mut defaulted = Vec::new();
                let mut pick = |value: Option<f64>, fallback: f64, name: &'static str| {
                    value.unwrap_or_else(|| {
                        defaulted.push(name);
                        fallback
                    })
                };
                let option = TransportOption {
                    mode: attrs.mode.unwrap_or(DEFAULT_MODE),
                    capacity: pick(attrs.capacity, DEFAULT_CAPACITY, "capacity"),
                    cost_full: pick(attrs.cost_full, DEFAULT_COST_FULL, "cost_full"),
                    cost_half: pick(attrs.cost_half, DEFAULT_COST_HALF, "cost_half"),
                    cost_quarter: pick(attrs.cost_quarter, DEFAULT_COST_QUARTER, "cost_quarter"),
                    lead_time: edge.nominal_lead_time,
                    route_id,
                };
                if !defaulted.is_empty() {
                    warn!(
                        route = %option.route_id,
                        fields = ?defaulted,
                        "transport attributes missing, using defaults"
                    );
                }
                option
            })
            .collect()
    }

    /// Per-unit transport cost of the first route on (parent, child) that
    /// declares one.
    pub fn transport_cost_per_unit(&self, parent: &str, child: &str) -> Option<f64> {
        self.edges(parent, child)
            .iter()
            .find_map(|e| e.transport.cost_per_unit)
    }

    /// Parent-before-child order by in-degree elimination.
    ///
    /// Fails if some node never reaches in-degree zero.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut indegree: BTreeMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        for (_, child) in self.routes.keys() {
            if let Some(d) = indegree.get_mut(child.as_str()) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            for child in self.children(id) {
                if let Some(d) = indegree.get_mut(child.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(ConfigError::NotADag {
                ordered: order.len(),
                total: self.nodes.len(),
            });
        }
        Ok(order)
    }

    /// `parent` serves its children; resulting shipments are placed on the
    /// children's pipelines.
    pub fn process_child_orders(
        &mut self,
        parent: &str,
        t: u32,
        on_ship: Option<&mut dyn FnMut(&ShipmentEvent<'_>)>,
    ) -> Vec<Dispatch> {
        let children = self.children(parent).to_vec();
        let mut samplers = Self::child_samplers(&mut self.routes, parent);
        let node = self
            .nodes
            .get_mut(parent)
            .unwrap_or_else(|| panic!("orders routed to unknown node {parent}"));

        let mut lead_time = |child: &str| match samplers.get_mut(child) {
            Some(set) => set.sample_lead_time(),
            None => panic!("no route from {parent} to {child}"),
        };
        let dispatches = node.process_child_orders(t, &children, &mut lead_time, on_ship);

        for dispatch in &dispatches {
            self.nodes
                .get_mut(&dispatch.child)
                .unwrap_or_else(|| panic!("shipment to unknown node {}", dispatch.child))
                .schedule_arrival(dispatch.shipment);
        }
        dispatches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lead_time::DeterministicLeadTime;
    use crate::model::node::NodeType;
    use crate::strategy::implementations::BaseStockPolicy;

    fn node(id: &str, node_type: NodeType) -> SupplyNode {
        SupplyNode::new(id, node_type, 10, Box::new(BaseStockPolicy::new(0)))
    }

    fn edge(parent: &str, child: &str, lead_time: u32) -> Edge {
        Edge::new(parent, child, Box::new(DeterministicLeadTime(lead_time)), lead_time)
    }

    fn chain() -> Network {
        let mut net = Network::new().with_seed(Some(3));
        net.add_node(node("S", NodeType::Supplier)).unwrap();
        net.add_node(node("W", NodeType::Warehouse)).unwrap();
        net.add_node(node("R1", NodeType::Retailer)).unwrap();
        net.add_node(node("R2", NodeType::Retailer)).unwrap();
        net.add_edge(edge("S", "W", 2)).unwrap();
        net.add_edge(edge("W", "R1", 1)).unwrap();
        net.add_edge(edge("W", "R2", 1)).unwrap();
        net
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut net = chain();
        let err = net.add_node(node("W", NodeType::Warehouse)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateNode(id) if id == "W"));
    }

    #[test]
    fn second_parent_is_rejected_without_side_effects() {
        let mut net = chain();
        net.add_node(node("W2", NodeType::Warehouse)).unwrap();

        let err = net.add_edge(edge("W2", "R1", 1)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MultiSourcingViolation { ref child, ref existing, ref attempted }
                if child == "R1" && existing == "W" && attempted == "W2"
        ));
        assert_eq!(net.parent_of("R1"), Some("W"));
        assert!(net.children("W2").is_empty());
        assert!(net.edges("W2", "R1").is_empty());

        // A parallel route from the same parent is fine.
        net.add_edge(edge("W", "R1", 3)).unwrap();
        assert_eq!(net.edges("W", "R1").len(), 2);
        assert_eq!(net.children("W"), &["R1".to_string(), "R2".to_string()]);
    }

    #[test]
    fn adjacency_lookups_never_fail() {
        let net = chain();
        assert_eq!(net.parent_of("S"), None);
        assert_eq!(net.parent_of("W"), Some("S"));
        assert!(net.children("R1").is_empty());
        assert!(net.children("nope").is_empty());
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let mut net = chain();
        assert!(matches!(
            net.add_edge(edge("W", "R9", 1)),
            Err(ConfigError::UnknownNode(id)) if id == "R9"
        ));
    }

    #[test]
    fn topological_order_puts_parents_first() {
        let order = chain().topological_order().unwrap();
        assert_eq!(order, vec!["S", "W", "R1", "R2"]);
    }

    #[test]
    fn cycle_is_not_a_dag() {
        let mut net = Network::new();
        net.add_node(node("A", NodeType::Warehouse)).unwrap();
        net.add_node(node("B", NodeType::Warehouse)).unwrap();
        net.add_edge(edge("A", "B", 1)).unwrap();
        net.add_edge(edge("B", "A", 1)).unwrap();
        assert!(matches!(
            net.topological_order(),
            Err(ConfigError::NotADag { ordered: 0, total: 2 })
        ));
    }

    #[test]
    fn mixer_tie_break_and_fallback() {
        let rng = stream_rng(Some(1), None, "");
        let mixer = RouteMixer::new(&[Some(1.0), Some(3.0)], rng);
        assert_eq!(mixer.pick(0.0), 0);
        assert_eq!(mixer.pick(0.25), 0); // Exactly on the boundary: first route
        assert_eq!(mixer.pick(0.26), 1);
        assert_eq!(mixer.pick(1.5), 1); // Past the end: last route

        let uniform = RouteMixer::new(&[None, Some(-2.0), None, None], stream_rng(Some(1), None, ""));
        assert_eq!(uniform.pick(0.5), 1);
        assert_eq!(uniform.pick(0.51), 2);
    }

    #[test]
    fn mixed_routes_follow_their_shares() {
        let mut net = chain();
        net.add_edge(edge("W", "R1", 5).with_share(9.0)).unwrap();
        let mut samplers = net.lead_time_sampler_by_child("W");
        assert_eq!(samplers.len(), 2);

        let set = samplers.get_mut("R1").unwrap();
        let draws: Vec<u32> = (0..1000).map(|_| set.sample_lead_time()).collect();
        let slow = draws.iter().filter(|&&l| l == 5).count();
        assert!(draws.iter().all(|&l| l == 1 || l == 5));
        assert!((800..=990).contains(&slow), "slow route drawn {slow} times");

        assert_eq!(samplers.get_mut("R2").unwrap().sample_lead_time(), 1);
    }

    #[test]
    fn transport_options_fill_defaults() {
        let mut net = chain();
        let attrs = TransportAttrs {
            mode: Some(2),
            capacity: Some(40.0),
            cost_full: Some(80.0),
            ..TransportAttrs::default()
        };
        net.add_edge(edge("W", "R2", 3).with_transport(attrs)).unwrap();

        let options = net.get_transport_options("W", "R2");
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].capacity, DEFAULT_CAPACITY);
        assert_eq!(options[0].mode, DEFAULT_MODE);
        assert_eq!(options[1].mode, 2);
        assert_eq!(options[1].capacity, 40.0);
        assert_eq!(options[1].cost_full, 80.0);
        assert_eq!(options[1].cost_half, DEFAULT_COST_HALF);
        assert_eq!(options[1].lead_time, 3);
        assert!(net.get_transport_options("S", "R1").is_empty());
    }

    #[test]
    fn non_positive_capacity_is_a_config_error() {
        let mut net = chain();
        for capacity in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let attrs = TransportAttrs {
                capacity: Some(capacity),
                ..TransportAttrs::default()
            };
            assert!(matches!(
                net.add_edge(edge("W", "R1", 1).with_transport(attrs)),
                Err(ConfigError::InvalidCapacity { .. })
            ));
        }
        assert_eq!(net.edges("W", "R1").len(), 1);
    }

    #[test]
    fn shipments_land_on_child_pipelines() {
        let mut net = chain();
        net.node_mut("W").unwrap().add_inbound_order("R1", 4);
        net.node_mut("W").unwrap().add_inbound_order("R2", 9);

        let dispatches = net.process_child_orders("W", 0, None);
        assert_eq!(dispatches.len(), 2);
        assert_eq!(net.node("W").unwrap().on_hand(), 0);
        assert_eq!(net.node("R1").unwrap().total_pipeline_in(), 4);
        assert_eq!(net.node("R2").unwrap().total_pipeline_in(), 6);
        assert_eq!(net.node("R2").unwrap().pipeline_in()[0].arrival_time, 1);
        assert_eq!(net.node("W").unwrap().backlog_children().get("R2"), Some(&3));
    }
}
