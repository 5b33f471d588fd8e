//! World graph: workers as nodes, undirected weighted edges between them.
//!
//! The [`World`] owns every [`Worker`] and every active [`Pearl`]. Edges are
//! kept in a symmetric adjacency map, `BTreeMap<WorkerId, BTreeMap<WorkerId,
//! Decimal>>`, so neighbor iteration is always in ascending worker id.
//!
//! Building from a [`WorldDescription`] validates the whole input before
//! anything is returned; a partially built world is never observable.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use atlantis_types::{Pearl, PearlId, PearlLayer, WorkerId, WorldDescription};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::WorldError;
use crate::worker::{CapabilityConfig, CostTable, Worker};

/// The world graph holding all workers, edges, and active pearls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct World {
    /// All workers indexed by identifier.
    workers: BTreeMap<WorkerId, Worker>,
    /// Symmetric adjacency: worker -> neighbor -> edge cost.
    adjacency: BTreeMap<WorkerId, BTreeMap<WorkerId, Decimal>>,
    /// Pearls that are still in the system.
    pearls: BTreeMap<PearlId, Pearl>,
}

/// Build a world from a description using the default capability tables.
///
/// # Errors
///
/// Returns the first [`WorldError`] found in the description.
pub fn build_world(description: &WorldDescription) -> Result<World, WorldError> {
    World::from_description(description, &CapabilityConfig::default())
}

impl World {
    /// Create an empty world.
    pub const fn new() -> Self {
        Self {
            workers: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            pearls: BTreeMap::new(),
        }
    }

    /// Validate a description and build the world it describes.
    ///
    /// Workers use their own `cost_table` when present, otherwise the
    /// table for their kind from `capabilities`. Zero-thickness layers are
    /// dropped. Identical duplicate edges are merged.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] on an empty world, duplicate ids, unknown edge
    /// endpoints, self-loops, negative or conflicting edge costs, and
    /// negative processing rates.
    pub fn from_description(
        description: &WorldDescription,
        capabilities: &CapabilityConfig,
    ) -> Result<Self, WorldError> {
        if description.workers.is_empty() {
            return Err(WorldError::EmptyWorld);
        }

        let mut world = Self::new();
        for entry in &description.workers {
            let table = entry.cost_table.as_ref().map_or_else(
                || capabilities.for_kind(entry.flavor).clone(),
                |rates| CostTable::new(rates.iter().map(|(c, r)| (*c, *r))),
            );
            world.add_worker(Worker::new(entry.id, entry.flavor, table))?;
        }

        for edge in &description.neighbor_map {
            let (a, b) = edge.endpoints();
            world.add_edge(a, b, edge.cost())?;
        }

        for entry in &description.workers {
            for pearl in &entry.desk {
                let layers = pearl
                    .layers
                    .iter()
                    .filter_map(|l| PearlLayer::new(l.color, l.thickness));
                world.insert_pearl(Pearl::new(pearl.id, entry.id, layers))?;
            }
        }

        debug!(
            workers = world.worker_count(),
            edges = world.edge_count(),
            pearls = world.pearl_count(),
            "World built from description"
        );
        Ok(world)
    }

    // -------------------------------------------------------------------
    // Worker operations
    // -------------------------------------------------------------------

    /// Add a worker.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateWorker`] if the id is taken, or
    /// [`WorldError::NegativeRate`] if its cost table is invalid.
    pub fn add_worker(&mut self, worker: Worker) -> Result<(), WorldError> {
        let id = worker.id;
        if self.workers.contains_key(&id) {
            return Err(WorldError::DuplicateWorker(id));
        }
        worker.cost_table().validate(id)?;
        self.workers.insert(id, worker);
        self.adjacency.entry(id).or_default();
        Ok(())
    }

    /// Get a worker by id.
    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    /// Get a mutable reference to a worker.
    pub fn worker_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(&id)
    }

    /// Iterate over all workers in ascending id order.
    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    /// All worker ids in ascending order.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// The lowest worker id, used as the default gate.
    pub fn first_worker_id(&self) -> Option<WorkerId> {
        self.workers.keys().next().copied()
    }

    /// Total queued tasks across all workers.
    pub fn total_load(&self) -> usize {
        self.workers.values().map(Worker::current_load).sum()
    }

    // -------------------------------------------------------------------
    // Edge operations
    // -------------------------------------------------------------------

    /// Add an undirected edge.
    ///
    /// Re-adding an edge with the same cost is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::WorkerNotFound`], [`WorldError::SelfLoop`],
    /// [`WorldError::NegativeEdgeCost`], or [`WorldError::ConflictingEdge`].
    pub fn add_edge(&mut self, a: WorkerId, b: WorkerId, cost: Decimal) -> Result<(), WorldError> {
        for id in [a, b] {
            if !self.workers.contains_key(&id) {
                return Err(WorldError::WorkerNotFound(id));
            }
        }
        if a == b {
            return Err(WorldError::SelfLoop(a));
        }
        if cost.is_sign_negative() && !cost.is_zero() {
            return Err(WorldError::NegativeEdgeCost {
                from: a,
                to: b,
                cost,
            });
        }
        if let Some(existing) = self.edge_cost(a, b) {
            if existing == cost {
                return Ok(());
            }
            return Err(WorldError::ConflictingEdge {
                from: a,
                to: b,
                existing,
                requested: cost,
            });
        }
        self.adjacency.entry(a).or_default().insert(b, cost);
        self.adjacency.entry(b).or_default().insert(a, cost);
        Ok(())
    }

    /// Cost of the edge between two workers, if they are adjacent.
    pub fn edge_cost(&self, a: WorkerId, b: WorkerId) -> Option<Decimal> {
        self.adjacency.get(&a).and_then(|n| n.get(&b)).copied()
    }

    /// Neighbors of a worker with edge costs, ascending by id.
    pub fn neighbors_of(&self, worker: WorkerId) -> Vec<(WorkerId, Decimal)> {
        self.adjacency
            .get(&worker)
            .map(|n| n.iter().map(|(id, cost)| (*id, *cost)).collect())
            .unwrap_or_default()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    /// Every edge once, as `(lower id, higher id, cost)`.
    pub fn edges(&self) -> impl Iterator<Item = (WorkerId, WorkerId, Decimal)> + '_ {
        self.adjacency.iter().flat_map(|(a, neighbors)| {
            neighbors
                .iter()
                .filter(move |(b, _)| a < *b)
                .map(move |(b, cost)| (*a, *b, *cost))
        })
    }

    // -------------------------------------------------------------------
    // Pearl operations
    // -------------------------------------------------------------------

    /// Place a pearl in the world.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicatePearl`] if the id is in use, or
    /// [`WorldError::WorkerNotFound`] if its worker does not exist.
    pub fn insert_pearl(&mut self, pearl: Pearl) -> Result<(), WorldError> {
        if self.pearls.contains_key(&pearl.id) {
            return Err(WorldError::DuplicatePearl(pearl.id));
        }
        if !self.workers.contains_key(&pearl.current_worker) {
            return Err(WorldError::WorkerNotFound(pearl.current_worker));
        }
        self.pearls.insert(pearl.id, pearl);
        Ok(())
    }

    /// Get an active pearl.
    pub fn pearl(&self, id: PearlId) -> Option<&Pearl> {
        self.pearls.get(&id)
    }

    /// Get a mutable reference to an active pearl.
    pub fn pearl_mut(&mut self, id: PearlId) -> Option<&mut Pearl> {
        self.pearls.get_mut(&id)
    }

    /// Iterate over active pearls in ascending id order.
    pub fn pearls(&self) -> impl Iterator<Item = &Pearl> {
        self.pearls.values()
    }

    /// Active pearl ids in ascending order.
    pub fn pearl_ids(&self) -> Vec<PearlId> {
        self.pearls.keys().copied().collect()
    }

    /// Number of active pearls.
    pub fn pearl_count(&self) -> usize {
        self.pearls.len()
    }

    /// Pearls currently held by a worker.
    pub fn pearls_at(&self, worker: WorkerId) -> impl Iterator<Item = &Pearl> {
        self.pearls
            .values()
            .filter(move |p| p.current_worker == worker)
    }

    /// Take a pearl out of the world.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::PearlNotFound`] if it is not active.
    pub fn remove_pearl(&mut self, id: PearlId) -> Result<Pearl, WorldError> {
        self.pearls.remove(&id).ok_or(WorldError::PearlNotFound(id))
    }

    /// Move a pearl to `to`, which must be its current worker or a neighbor.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::PearlNotFound`], [`WorldError::WorkerNotFound`],
    /// or [`WorldError::NotAdjacent`].
    pub fn move_pearl(&mut self, id: PearlId, to: WorkerId) -> Result<(), WorldError> {
        if !self.workers.contains_key(&to) {
            return Err(WorldError::WorkerNotFound(to));
        }
        let from = self
            .pearls
            .get(&id)
            .map(|p| p.current_worker)
            .ok_or(WorldError::PearlNotFound(id))?;
        if from != to && self.edge_cost(from, to).is_none() {
            return Err(WorldError::NotAdjacent { from, to });
        }
        let pearl = self.pearls.get_mut(&id).ok_or(WorldError::PearlNotFound(id))?;
        pearl.current_worker = to;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Path queries
    // -------------------------------------------------------------------

    /// Cheapest path between two workers, inclusive of both ends, with its
    /// total edge cost. `None` when unreachable.
    ///
    /// Dijkstra with a `BTreeSet` keyed on `(distance, id)` as the queue, so
    /// equal-cost ties settle on the lower worker id.
    pub fn shortest_path(&self, start: WorkerId, goal: WorkerId) -> Option<(Vec<WorkerId>, Decimal)> {
        if !self.workers.contains_key(&start) || !self.workers.contains_key(&goal) {
            return None;
        }
        if start == goal {
            return Some((vec![start], Decimal::ZERO));
        }

        let (dist, prev) = self.dijkstra(start, Some(goal));
        let total = dist.get(&goal).copied()?;

        let mut path = VecDeque::new();
        let mut current = goal;
        path.push_front(current);
        while let Some(&predecessor) = prev.get(&current) {
            path.push_front(predecessor);
            current = predecessor;
            if current == start {
                break;
            }
        }

        Some((path.into_iter().collect(), total))
    }

    /// Cheapest edge-cost distance from `start` to every reachable worker.
    pub fn distances_from(&self, start: WorkerId) -> BTreeMap<WorkerId, Decimal> {
        if !self.workers.contains_key(&start) {
            return BTreeMap::new();
        }
        self.dijkstra(start, None).0
    }

    fn dijkstra(
        &self,
        start: WorkerId,
        goal: Option<WorkerId>,
    ) -> (BTreeMap<WorkerId, Decimal>, BTreeMap<WorkerId, WorkerId>) {
        let mut dist: BTreeMap<WorkerId, Decimal> = BTreeMap::new();
        let mut prev: BTreeMap<WorkerId, WorkerId> = BTreeMap::new();
        let mut queue: BTreeSet<(Decimal, WorkerId)> = BTreeSet::new();

        dist.insert(start, Decimal::ZERO);
        queue.insert((Decimal::ZERO, start));

        while let Some((current_dist, current)) = queue.pop_first() {
            if goal == Some(current) {
                break;
            }

            for (neighbor, cost) in self.neighbors_of(current) {
                let Some(new_dist) = current_dist.checked_add(cost) else {
                    continue;
                };
                let is_shorter = dist
                    .get(&neighbor)
                    .is_none_or(|&existing| new_dist < existing);

                if is_shorter {
                    if let Some(&old_dist) = dist.get(&neighbor) {
                        queue.remove(&(old_dist, neighbor));
                    }
                    dist.insert(neighbor, new_dist);
                    prev.insert(neighbor, current);
                    queue.insert((new_dist, neighbor));
                }
            }
        }

        (dist, prev)
    }

    /// Whether every worker can reach every other worker.
    pub fn is_connected(&self) -> bool {
        self.first_worker_id()
            .is_none_or(|start| self.distances_from(start).len() == self.workers.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atlantis_types::{PearlColor, WorkerKind};
    use rust_decimal_macros::dec;

    use super::*;

    fn w(id: u32) -> WorkerId {
        WorkerId::new(id)
    }

    fn parse(json: &str) -> WorldDescription {
        WorldDescription::from_json(json).unwrap()
    }

    /// 0 --1-- 1 --1-- 2, plus a direct 0 --5-- 2.
    fn triangle() -> World {
        build_world(&parse(
            r#"{"workers":[
                {"id":0,"flavor":"General","desk":[{"id":10,"layers":[{"color":"Red","thickness":2}]}]},
                {"id":1,"flavor":"Vector"},
                {"id":2,"flavor":"Matrix"}],
              "neighbor_map":[[0,1],[1,2],[0,2,5]]}"#,
        ))
        .unwrap()
    }

    #[test]
    fn builds_workers_edges_and_pearls() {
        let world = triangle();
        assert_eq!(world.worker_count(), 3);
        assert_eq!(world.edge_count(), 3);
        assert_eq!(world.pearl_count(), 1);
        assert_eq!(world.worker(w(1)).map(|x| x.kind), Some(WorkerKind::Vector));
        assert_eq!(world.pearl(PearlId::new(10)).map(|p| p.current_worker), Some(w(0)));
    }

    #[test]
    fn neighbors_are_sorted_and_symmetric() {
        let world = build_world(&parse(
            r#"{"workers":[{"id":0,"flavor":"General"},{"id":3,"flavor":"General"},
                           {"id":1,"flavor":"General"}],
                "neighbor_map":[[0,3,2],[1,0]]}"#,
        ))
        .unwrap();
        assert_eq!(world.neighbors_of(w(0)), vec![(w(1), dec!(1)), (w(3), dec!(2))]);
        assert_eq!(world.neighbors_of(w(3)), vec![(w(0), dec!(2))]);
        assert_eq!(world.edge_cost(w(1), w(0)), Some(dec!(1)));
        assert!(world.edge_cost(w(1), w(3)).is_none());
    }

    #[test]
    fn empty_world_is_rejected() {
        assert_eq!(
            build_world(&parse(r#"{"workers":[]}"#)),
            Err(WorldError::EmptyWorld)
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dup_worker = parse(r#"{"workers":[{"id":0,"flavor":"General"},{"id":0,"flavor":"Vector"}]}"#);
        assert_eq!(build_world(&dup_worker), Err(WorldError::DuplicateWorker(w(0))));

        let dup_pearl = parse(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":4,"layers":[]}]},
                           {"id":1,"flavor":"General","desk":[{"id":4,"layers":[]}]}]}"#,
        );
        assert_eq!(
            build_world(&dup_pearl),
            Err(WorldError::DuplicatePearl(PearlId::new(4)))
        );
    }

    #[test]
    fn bad_edges_are_rejected() {
        let unknown = parse(r#"{"workers":[{"id":0,"flavor":"General"}],"neighbor_map":[[0,9]]}"#);
        assert_eq!(build_world(&unknown), Err(WorldError::WorkerNotFound(w(9))));

        let self_loop = parse(r#"{"workers":[{"id":0,"flavor":"General"}],"neighbor_map":[[0,0]]}"#);
        assert_eq!(build_world(&self_loop), Err(WorldError::SelfLoop(w(0))));

        let negative = parse(
            r#"{"workers":[{"id":0,"flavor":"General"},{"id":1,"flavor":"General"}],
                "neighbor_map":[[0,1,-2]]}"#,
        );
        assert!(matches!(
            build_world(&negative),
            Err(WorldError::NegativeEdgeCost { .. })
        ));

        let conflicting = parse(
            r#"{"workers":[{"id":0,"flavor":"General"},{"id":1,"flavor":"General"}],
                "neighbor_map":[[0,1,2],[1,0,3]]}"#,
        );
        assert!(matches!(
            build_world(&conflicting),
            Err(WorldError::ConflictingEdge { .. })
        ));
    }

    #[test]
    fn identical_duplicate_edges_merge() {
        let world = build_world(&parse(
            r#"{"workers":[{"id":0,"flavor":"General"},{"id":1,"flavor":"General"}],
                "neighbor_map":[[0,1],[1,0],[0,1,1]]}"#,
        ))
        .unwrap();
        assert_eq!(world.edge_count(), 1);
    }

    #[test]
    fn negative_rate_override_is_rejected() {
        let desc = parse(r#"{"workers":[{"id":2,"flavor":"Vector","cost_table":{"Red":-1}}]}"#);
        assert!(matches!(
            build_world(&desc),
            Err(WorldError::NegativeRate { worker, .. }) if worker == w(2)
        ));
    }

    #[test]
    fn cost_table_override_replaces_kind_defaults() {
        let world = build_world(&parse(
            r#"{"workers":[{"id":1,"flavor":"Vector","cost_table":{"Red":4}}]}"#,
        ))
        .unwrap();
        let table = world.worker(w(1)).unwrap().cost_table();
        assert_eq!(table.rate(PearlColor::Red), Some(dec!(4)));
        assert_eq!(table.rate(PearlColor::Green), None);
    }

    #[test]
    fn zero_thickness_layers_are_dropped() {
        let world = build_world(&parse(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":1,"layers":[
                {"color":"Red","thickness":0},{"color":"Blue","thickness":3}]}]}]}"#,
        ))
        .unwrap();
        let pearl = world.pearl(PearlId::new(1)).unwrap();
        assert_eq!(pearl.layer_count(), 1);
        assert_eq!(pearl.outer_layer().map(PearlLayer::color), Some(PearlColor::Blue));
    }

    #[test]
    fn building_twice_yields_equal_worlds() {
        let desc = parse(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":1,"layers":[{"color":"Red","thickness":3}]}]},
                           {"id":1,"flavor":"Matrix"}],
                "neighbor_map":[[0,1,2]]}"#,
        );
        assert_eq!(build_world(&desc).unwrap(), build_world(&desc).unwrap());
    }

    #[test]
    fn shortest_path_prefers_cheaper_detour() {
        let world = triangle();
        let (path, cost) = world.shortest_path(w(0), w(2)).unwrap();
        assert_eq!(path, vec![w(0), w(1), w(2)]);
        assert_eq!(cost, dec!(2));
    }

    #[test]
    fn shortest_path_same_node() {
        let world = triangle();
        assert_eq!(world.shortest_path(w(1), w(1)), Some((vec![w(1)], Decimal::ZERO)));
    }

    #[test]
    fn shortest_path_unreachable() {
        let world = build_world(&parse(
            r#"{"workers":[{"id":0,"flavor":"General"},{"id":1,"flavor":"General"}]}"#,
        ))
        .unwrap();
        assert!(world.shortest_path(w(0), w(1)).is_none());
        assert!(!world.is_connected());
        assert_eq!(world.distances_from(w(0)).len(), 1);
    }

    #[test]
    fn distances_cover_reachable_workers() {
        let world = triangle();
        let dist = world.distances_from(w(2));
        assert_eq!(dist.get(&w(2)).copied(), Some(dec!(0)));
        assert_eq!(dist.get(&w(1)).copied(), Some(dec!(1)));
        assert_eq!(dist.get(&w(0)).copied(), Some(dec!(2)));
        assert!(world.is_connected());
    }

    #[test]
    fn move_pearl_requires_adjacency() {
        let mut world = build_world(&parse(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":5,"layers":[]}]},
                           {"id":1,"flavor":"General"},{"id":2,"flavor":"General"}],
                "neighbor_map":[[0,1],[1,2]]}"#,
        ))
        .unwrap();
        let pearl = PearlId::new(5);
        assert_eq!(
            world.move_pearl(pearl, w(2)),
            Err(WorldError::NotAdjacent { from: w(0), to: w(2) })
        );
        assert!(world.move_pearl(pearl, w(0)).is_ok());
        assert!(world.move_pearl(pearl, w(1)).is_ok());
        assert_eq!(world.pearls_at(w(1)).count(), 1);
        assert!(world.remove_pearl(pearl).is_ok());
        assert_eq!(world.remove_pearl(pearl), Err(WorldError::PearlNotFound(pearl)));
    }
}
