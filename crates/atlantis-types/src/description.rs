//! Serde model of the world description consumed at startup.
//!
//! The format is the JSON snapshot the simulation harness produces:
//!
//! ```json
//! {"workers": [{"id": 0, "flavor": "General", "desk": [
//!     {"id": 7, "layers": [{"color": "Red", "thickness": 2}]}]}],
//!  "neighbor_map": [[0, 1], [1, 2, 3]],
//!  "score": 0}
//! ```
//!
//! Pearls listed on a worker's desk start at that worker. Edges are
//! undirected; a third element gives the transfer cost (default 1). A worker
//! may carry a `cost_table` overriding the per-kind processing rates.
//! This module only describes the shape; validation happens when the world
//! graph is built.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{PearlColor, WorkerKind};
use crate::ids::{PearlId, WorkerId};

/// Complete description of a world at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldDescription {
    /// Every worker with the pearls initially on its desk.
    pub workers: Vec<WorkerDescription>,
    /// Undirected edges between workers.
    #[serde(default)]
    pub neighbor_map: Vec<EdgeDescription>,
    /// Harness score carried by the snapshot; informational only.
    #[serde(default)]
    pub score: u64,
}

impl WorldDescription {
    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Number of pearls across all desks.
    pub fn pearl_count(&self) -> usize {
        self.workers.iter().map(|w| w.desk.len()).sum()
    }
}

/// One worker entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescription {
    /// Worker identifier.
    pub id: WorkerId,
    /// Capability variant.
    pub flavor: WorkerKind,
    /// Pearls starting at this worker.
    #[serde(default)]
    pub desk: Vec<PearlDescription>,
    /// Optional per-worker processing rates, overriding the kind defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_table: Option<BTreeMap<PearlColor, Decimal>>,
}

/// One pearl entry on a desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PearlDescription {
    /// Pearl identifier.
    pub id: PearlId,
    /// Layers, outermost first. Zero-thickness layers count as digested.
    #[serde(default)]
    pub layers: Vec<LayerDescription>,
}

/// One layer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescription {
    /// Layer color.
    pub color: PearlColor,
    /// Layer thickness.
    pub thickness: u32,
}

/// An undirected edge, optionally weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeDescription {
    /// `[a, b, cost]`
    Weighted(WorkerId, WorkerId, Decimal),
    /// `[a, b]` with the default cost of 1.
    Plain(WorkerId, WorkerId),
}

impl EdgeDescription {
    /// The two endpoints in the order given.
    pub const fn endpoints(&self) -> (WorkerId, WorkerId) {
        match *self {
            Self::Weighted(a, b, _) | Self::Plain(a, b) => (a, b),
        }
    }

    /// The transfer cost of the edge.
    pub const fn cost(&self) -> Decimal {
        match *self {
            Self::Weighted(_, _, cost) => cost,
            Self::Plain(..) => Decimal::ONE,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{"workers":[{"id":0,"flavor":"Vector","desk":[{"id":1246714994,"layers":[{"color":"Blue","thickness":14},{"color":"Red","thickness":12}]}]},{"id":1,"flavor":"General","desk":[]},{"id":2,"flavor":"General","desk":[]},{"id":3,"flavor":"Vector","desk":[]},{"id":4,"flavor":"Matrix","desk":[]}],"neighbor_map":[[0,1],[1,3],[3,4],[0,2],[2,4]],"score":0}"#;

    #[test]
    fn parses_harness_snapshot() {
        let desc = WorldDescription::from_json(FIXTURE).unwrap();
        assert_eq!(desc.workers.len(), 5);
        assert_eq!(desc.neighbor_map.len(), 5);
        assert_eq!(desc.pearl_count(), 1);
        let first = desc.workers.first().unwrap();
        assert_eq!(first.flavor, WorkerKind::Vector);
        assert_eq!(
            first.desk.first().map(|p| p.layers.len()),
            Some(2)
        );
    }

    #[test]
    fn plain_edge_defaults_to_unit_cost() {
        let edge: EdgeDescription = serde_json::from_str("[3, 4]").unwrap();
        assert_eq!(edge.endpoints(), (WorkerId::new(3), WorkerId::new(4)));
        assert_eq!(edge.cost(), Decimal::ONE);
    }

    #[test]
    fn weighted_edge_keeps_cost() {
        let edge: EdgeDescription = serde_json::from_str("[0, 1, 5]").unwrap();
        assert_eq!(edge.cost(), Decimal::from(5));
    }

    #[test]
    fn worker_cost_table_override_parses() {
        let json = r#"{"id":1,"flavor":"Vector","cost_table":{"Red":4,"Blue":"0.25"}}"#;
        let worker: WorkerDescription = serde_json::from_str(json).unwrap();
        let table = worker.cost_table.unwrap();
        assert_eq!(table.get(&PearlColor::Red).copied(), Some(Decimal::from(4)));
        assert_eq!(table.get(&PearlColor::Blue).copied(), Some(Decimal::new(25, 2)));
        assert!(worker.desk.is_empty());
    }

    #[test]
    fn missing_workers_field_is_an_error() {
        assert!(WorldDescription::from_json(r#"{"neighbor_map":[]}"#).is_err());
    }
}
