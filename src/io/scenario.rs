// src/io/scenario.rs

//! JSON network descriptions.
//!
//! A description is plain data. [`NetworkDescription::build`] resolves it
//! into a live [`Network`] plus one demand source per retailer, seeding
//! every stochastic stream from the description's top-level seed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{ConfigError, Result};
use crate::io::demand::{DemandSource, DemandSpec};
use crate::model::lead_time::LeadTimeSpec;
use crate::model::network::{Edge, TransportAttrs};
use crate::model::node::{NodeType, SupplyNode};
use crate::model::{Network, NodeId};
use crate::simulation::config::SimulationConfig;
use crate::strategy::implementations::PolicySpec;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NetworkDescription {
    #[serde(default = "default_time_horizon")]
    pub time_horizon: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
    #[serde(default)]
    pub demand: Vec<DemandDescription>,
}

fn default_time_horizon() -> u32 {
    SimulationConfig::default().horizon
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeDescription {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub initial_inventory: i64,
    #[serde(default)]
    pub holding_cost: f64,
    #[serde(default)]
    pub shortage_cost: f64,
    #[serde(default)]
    pub infinite_supply: bool,
    #[serde(default)]
    pub policy: Option<PolicySpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EdgeDescription {
    pub from: NodeId,
    pub to: NodeId,
    pub lead_time: LeadTimeSpec,
    #[serde(default)]
    pub share: Option<f64>,
    #[serde(flatten)]
    pub transport: TransportAttrs,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DemandDescription {
    pub node: NodeId,
    pub generator: DemandSpec,
}

/// A built description, ready to hand to the simulator.
#[derive(Debug)]
pub struct Scenario {
    pub network: Network,
    pub demand_by_node: BTreeMap<NodeId, Box<dyn DemandSource>>,
    pub horizon: u32,
    pub seed: Option<u64>,
}

impl Scenario {
    /// A summary-mode config covering the described horizon.
    pub fn config(&self) -> SimulationConfig {
        SimulationConfig::new(self.horizon).with_seed(self.seed)
    }
}

impl NetworkDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Resolves policies, samplers and demand sources. Relative demand CSV
    /// paths are taken relative to `base_dir`.
    ///
    /// Every call builds fresh state, so two builds of the same seeded
    /// description replay the same run.
    pub fn build(&self, base_dir: Option<&Path>) -> Result<Scenario> {
        let mut network = Network::new().with_seed(self.seed);

        for desc in &self.nodes {
            if desc.initial_inventory < 0 {
                return Err(ConfigError::NegativeInventory {
                    node: desc.id.clone(),
                    qty: desc.initial_inventory,
                });
            }
            let policy = desc.policy.clone().unwrap_or_default().build(&desc.id)?;
            let node = SupplyNode::new(desc.id.clone(), desc.node_type, desc.initial_inventory, policy)
                .with_infinite_supply(desc.infinite_supply)
                .with_costs(desc.holding_cost, desc.shortage_cost);
            network.add_node(node)?;
        }

        for (i, desc) in self.edges.iter().enumerate() {
            let label = format!("lead_time:{}->{}#{i}", desc.from, desc.to);
            let sampler = desc.lead_time.build(self.seed, &label)?;
            let mut edge = Edge::new(desc.from.clone(), desc.to.clone(), sampler, desc.lead_time.nominal())
                .with_transport(desc.transport.clone());
            if let Some(share) = desc.share {
                edge = edge.with_share(share);
            }
            network.add_edge(edge)?;
        }

        let mut demand_by_node = BTreeMap::new();
        for desc in &self.demand {
            let node = network
                .node(&desc.node)
                .ok_or_else(|| ConfigError::UnknownNode(desc.node.clone()))?;
            if !node.is_retailer() {
                warn!(node = %desc.node, "demand attached to a non-retailer is never sampled");
            }
            let source = desc.generator.build(&desc.node, self.seed, base_dir)?;
            if demand_by_node.insert(desc.node.clone(), source).is_some() {
                warn!(node = %desc.node, "duplicate demand entry, keeping the last one");
            }
        }

        info!(
            nodes = network.len(),
            edges = self.edges.len(),
            demand_streams = demand_by_node.len(),
            "network built"
        );
        Ok(Scenario {
            network,
            demand_by_node,
            horizon: self.time_horizon,
            seed: self.seed,
        })
    }
}

/// Reads and builds a description file; demand CSVs resolve next to it.
pub fn load(path: &Path) -> Result<Scenario> {
    NetworkDescription::from_path(path)?.build(path.parent())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ECHELON: &str = r#"{
        "time_horizon": 12,
        "seed": 7,
        "nodes": [
            {"id": "S", "type": "supplier", "infinite_supply": true},
            {"id": "W", "type": "warehouse", "initial_inventory": 40,
             "policy": {"type": "ss", "s": 10, "S": 50}},
            {"id": "R", "type": "retailer", "initial_inventory": 5, "holding_cost": 0.5,
             "policy": {"type": "periodic_review", "review_period": 2, "target_level": 20}}
        ],
        "edges": [
            {"from": "S", "to": "W", "lead_time": {"type": "deterministic", "value": 2}},
            {"from": "W", "to": "R", "lead_time": {"type": "normal_int", "mean": 1.0, "std": 0.5},
             "capacity": 30, "mode": 2, "transport_cost_per_unit": 0.1}
        ],
        "demand": [
            {"node": "R", "generator": {"type": "poisson", "lam": 4.0}}
        ]
    }"#;

    #[test]
    fn parses_and_builds_network() {
        let desc = NetworkDescription::from_json(TWO_ECHELON).unwrap();
        assert_eq!(desc.time_horizon, 12);
        assert_eq!(desc.edges[1].transport.capacity, Some(30.0));
        assert_eq!(desc.edges[1].transport.cost_per_unit, Some(0.1));

        let scenario = desc.build(None).unwrap();
        let net = &scenario.network;
        assert_eq!(net.len(), 3);
        assert_eq!(net.parent_of("R"), Some("W"));
        assert_eq!(net.parent_of("W"), Some("S"));
        assert!(net.node("S").unwrap().infinite_supply);
        assert_eq!(net.node("R").unwrap().holding_cost, 0.5);
        assert_eq!(net.topological_order().unwrap(), vec!["S", "W", "R"]);
        assert!(scenario.demand_by_node.contains_key("R"));
        assert_eq!(scenario.config().horizon, 12);
        assert_eq!(scenario.config().seed, Some(7));
    }

    #[test]
    fn edge_to_unknown_node_is_rejected() {
        let text = r#"{
            "nodes": [{"id": "W", "type": "warehouse"}],
            "edges": [{"from": "W", "to": "R", "lead_time": {"type": "deterministic", "value": 1}}]
        }"#;
        let err = NetworkDescription::from_json(text).unwrap().build(None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNode(id) if id == "R"));
    }

    #[test]
    fn demand_for_unknown_node_is_rejected() {
        let text = r#"{
            "nodes": [{"id": "R", "type": "retailer"}],
            "demand": [{"node": "X", "generator": {"type": "deterministic", "value": 3}}]
        }"#;
        let err = NetworkDescription::from_json(text).unwrap().build(None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNode(id) if id == "X"));
    }

    #[test]
    fn unknown_policy_tag_is_a_parse_error() {
        let text = r#"{
            "nodes": [{"id": "R", "type": "retailer", "policy": {"type": "magic"}}]
        }"#;
        assert!(matches!(
            NetworkDescription::from_json(text),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn negative_initial_inventory_is_rejected() {
        let text = r#"{
            "nodes": [{"id": "R", "type": "retailer", "initial_inventory": -4}]
        }"#;
        let err = NetworkDescription::from_json(text).unwrap().build(None).unwrap_err();
        assert!(matches!(err, ConfigError::NegativeInventory { qty: -4, .. }));
    }

    #[test]
    fn invalid_ss_levels_are_rejected() {
        let text = r#"{
            "nodes": [{"id": "R", "type": "retailer", "policy": {"type": "sS", "s": 9, "S": 3}}]
        }"#;
        let err = NetworkDescription::from_json(text).unwrap().build(None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy { .. }));
    }

    #[test]
    fn load_resolves_demand_csv_next_to_description() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sales.csv"), "date,qty\n2024-01-02,4\n2024-01-01,3\n").unwrap();
        let desc_path = dir.path().join("net.json");
        fs::write(
            &desc_path,
            r#"{
                "time_horizon": 4,
                "nodes": [{"id": "R", "type": "retailer", "initial_inventory": 10}],
                "demand": [{"node": "R", "generator":
                    {"type": "csv", "path": "sales.csv", "date_col": "date",
                     "qty_col": "qty", "strategy": "last"}}]
            }"#,
        )
        .unwrap();

        let mut scenario = load(&desc_path).unwrap();
        let source = scenario.demand_by_node.get_mut("R").unwrap();
        let draws: Vec<i64> = (0..4).map(|t| source.sample(t)).collect();
        assert_eq!(draws, vec![3, 4, 4, 4]);
    }
}
