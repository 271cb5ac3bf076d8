// src/model/mod.rs

pub mod lead_time;
pub mod network;
pub mod node;
pub mod queues;
pub mod transport;

/// Node identity, unique within a network.
pub type NodeId = String;

pub use network::{Edge, Network, RouteMixer, TransportAttrs};
pub use node::{NodeType, Shipment, SupplyNode};
pub use transport::{PlannedShipment, TransportOption, TransportPlanner};
