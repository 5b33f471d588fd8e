//! Economic engine: chooses the worker a pearl's outer layer should go to.
//!
//! For a query `(from, layer)` the engine walks simple paths out of `from`
//! depth-first, neighbors in ascending id order, up to `max_route_hops`
//! hops. Every worker visited (the origin included, at zero edge cost) is
//! priced as:
//!
//! ```text
//! live = path edge cost + capability cost + load_penalty_per_task * load
//!        (+ gate affinity, when enabled)
//! ```
//!
//! `load` is the worker's queue length plus the plans booked on it that
//! have not committed yet, so pearls planned in the same step spread out.
//!
//! A path is only extended while its accumulated edge cost is strictly below
//! the best live cost seen so far, and while it reaches the next worker more
//! cheaply (or in fewer hops at equal cost) than any path found before.
//! Capability costs are always positive, so a pruned branch could never have
//! produced a better or equal candidate. Incapable workers are passed
//! through but never chosen. A price that overflows is not a candidate.
//!
//! Route results are never cached: every query re-reads the workers' live
//! queues and the current bookings.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use atlantis_types::{PearlColor, PearlLayer, WorkerId};
use atlantis_world::{Capability, World};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::EconomyConfig;

/// Errors returned by route queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No capable worker is reachable within the hop bound.
    #[error("no capable worker reachable from {from} for a {color} layer")]
    Unroutable {
        /// Where the query started.
        from: WorkerId,
        /// Color of the layer.
        color: PearlColor,
    },

    /// The query referenced a worker that does not exist.
    #[error("worker not found: {0}")]
    UnknownWorker(WorkerId),

    /// A computed cost came out negative.
    #[error("negative cost {cost} at worker {worker}")]
    NegativeCost {
        /// The worker being priced.
        worker: WorkerId,
        /// The offending cost.
        cost: Decimal,
    },
}

/// A priced candidate destination for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Where the pearl is now.
    pub from_worker: WorkerId,
    /// The worker that would process the layer.
    pub to_worker: WorkerId,
    /// Color of the layer being routed.
    pub layer_color: PearlColor,
    /// Path edge cost plus capability cost.
    pub base_cost: Decimal,
    /// Base cost plus load penalty and gate affinity.
    pub live_cost: Decimal,
    /// Workers visited, `from_worker` first, `to_worker` last.
    pub path: Vec<WorkerId>,
}

impl RouteEntry {
    /// Number of edges on the path.
    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Ranking order: live cost, then lowest worker id, then fewer hops,
    /// then the lexicographically smallest path.
    fn rank(&self, other: &Self) -> Ordering {
        self.live_cost
            .cmp(&other.live_cost)
            .then_with(|| self.to_worker.cmp(&other.to_worker))
            .then_with(|| self.hops().cmp(&other.hops()))
            .then_with(|| self.path.cmp(&other.path))
    }
}

/// Price of processing a layer at one worker, reached over a given path cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Path edge cost plus capability cost.
    pub base_cost: Decimal,
    /// Base cost plus load penalty and gate affinity.
    pub live_cost: Decimal,
}

/// Computes route costs for layers.
#[derive(Debug, Clone)]
pub struct EconomicEngine {
    config: EconomyConfig,
    affinity: BTreeMap<WorkerId, Decimal>,
    bookings: BTreeMap<WorkerId, usize>,
}

impl EconomicEngine {
    /// Create an engine without gate affinity.
    pub fn new(config: &EconomyConfig) -> Self {
        Self {
            config: config.clone(),
            affinity: BTreeMap::new(),
            bookings: BTreeMap::new(),
        }
    }

    /// Create an engine, precomputing gate affinities when enabled.
    ///
    /// A worker's affinity is `max_distance - distance(gate, worker)`, so the
    /// gate itself carries the largest penalty and the farthest workers
    /// none. Workers unreachable from the gate get zero.
    pub fn for_world(config: &EconomyConfig, world: &World, gate: WorkerId) -> Self {
        let mut engine = Self::new(config);
        if config.gate_affinity {
            let distances = world.distances_from(gate);
            let max_distance = distances.values().copied().max().unwrap_or_default();
            engine.affinity = distances
                .into_iter()
                .map(|(worker, d)| (worker, max_distance - d))
                .collect();
        }
        engine
    }

    /// The economy parameters in use.
    pub const fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Gate affinity penalty of a worker.
    pub fn affinity(&self, worker: WorkerId) -> Decimal {
        self.affinity.get(&worker).copied().unwrap_or_default()
    }

    /// Uncommitted plans booked on a worker.
    pub fn bookings(&self, worker: WorkerId) -> usize {
        self.bookings.get(&worker).copied().unwrap_or_default()
    }

    /// Book a new plan's processing step on `worker`.
    pub fn book(&mut self, worker: WorkerId) {
        let count = self.bookings.entry(worker).or_default();
        *count = count.saturating_add(1);
    }

    /// Drop one booking from `worker`, once its plan commits or is replaced.
    pub fn unbook(&mut self, worker: WorkerId) {
        if let Some(count) = self.bookings.get_mut(&worker) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.bookings.remove(&worker);
            }
        }
    }

    /// Price `layer` at `worker` when reaching it costs `edge_cost`.
    ///
    /// Returns `Ok(None)` when the worker cannot process the layer or the
    /// price overflows.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::UnknownWorker`] or [`RouteError::NegativeCost`].
    pub fn quote(
        &self,
        world: &World,
        worker: WorkerId,
        layer: &PearlLayer,
        edge_cost: Decimal,
    ) -> Result<Option<Quote>, RouteError> {
        self.price(world, worker, layer, edge_cost, 0)
    }

    /// Like [`Self::quote`], for a pearl holding one of `worker`'s bookings:
    /// that booking is not charged against itself.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::UnknownWorker`] or [`RouteError::NegativeCost`].
    pub fn requote(
        &self,
        world: &World,
        worker: WorkerId,
        layer: &PearlLayer,
        edge_cost: Decimal,
    ) -> Result<Option<Quote>, RouteError> {
        self.price(world, worker, layer, edge_cost, 1)
    }

    fn price(
        &self,
        world: &World,
        worker: WorkerId,
        layer: &PearlLayer,
        edge_cost: Decimal,
        own_bookings: usize,
    ) -> Result<Option<Quote>, RouteError> {
        let w = world.worker(worker).ok_or(RouteError::UnknownWorker(worker))?;
        let Capability::Cost(capability) = w.evaluate_cost(layer) else {
            return Ok(None);
        };
        let load = w
            .current_load()
            .saturating_add(self.bookings(worker).saturating_sub(own_bookings));
        let priced = edge_cost.checked_add(capability).and_then(|base| {
            self.config
                .load_penalty_per_task
                .checked_mul(Decimal::from(load))
                .and_then(|penalty| base.checked_add(penalty))
                .and_then(|live| live.checked_add(self.affinity(worker)))
                .map(|live| (base, live))
        });
        let Some((base_cost, live_cost)) = priced else {
            debug!(worker = %worker, edge_cost = %edge_cost, "Price overflowed, skipping worker");
            return Ok(None);
        };
        if base_cost < Decimal::ZERO || live_cost < Decimal::ZERO {
            return Err(RouteError::NegativeCost {
                worker,
                cost: base_cost.min(live_cost),
            });
        }
        Ok(Some(Quote {
            base_cost,
            live_cost,
        }))
    }

    /// Every candidate found by the bounded search, best first.
    ///
    /// One entry per destination worker, carrying its cheapest path found.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::UnknownWorker`] if `from` does not exist, or
    /// [`RouteError::NegativeCost`] if a cost came out negative.
    pub fn rank_routes(
        &self,
        world: &World,
        from: WorkerId,
        layer: &PearlLayer,
    ) -> Result<Vec<RouteEntry>, RouteError> {
        if world.worker(from).is_none() {
            return Err(RouteError::UnknownWorker(from));
        }

        let mut search = Search {
            engine: self,
            world,
            from,
            layer,
            best: None,
            reached: BTreeMap::from([(from, (Decimal::ZERO, 0))]),
            candidates: BTreeMap::new(),
        };
        let mut path = vec![from];
        search.visit(&mut path, Decimal::ZERO)?;

        let mut ranked: Vec<RouteEntry> = search.candidates.into_values().collect();
        ranked.sort_by(RouteEntry::rank);
        Ok(ranked)
    }

    /// The cheapest destination for `layer` starting at `from`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Unroutable`] when no capable worker is
    /// reachable, plus the errors of [`Self::rank_routes`].
    pub fn best_route(
        &self,
        world: &World,
        from: WorkerId,
        layer: &PearlLayer,
    ) -> Result<RouteEntry, RouteError> {
        let best = self
            .rank_routes(world, from, layer)?
            .into_iter()
            .next()
            .ok_or(RouteError::Unroutable {
                from,
                color: layer.color(),
            })?;
        debug!(
            from = %from,
            to = %best.to_worker,
            color = %best.layer_color,
            live_cost = %best.live_cost,
            hops = best.hops(),
            "Route selected"
        );
        Ok(best)
    }
}

/// State of one depth-first route search.
struct Search<'a> {
    engine: &'a EconomicEngine,
    world: &'a World,
    from: WorkerId,
    layer: &'a PearlLayer,
    best: Option<Decimal>,
    /// Cheapest `(edge cost, hops)` at which each worker was reached.
    reached: BTreeMap<WorkerId, (Decimal, usize)>,
    candidates: BTreeMap<WorkerId, RouteEntry>,
}

impl Search<'_> {
    fn visit(&mut self, path: &mut Vec<WorkerId>, edge_cost: Decimal) -> Result<(), RouteError> {
        let Some(&here) = path.last() else {
            return Ok(());
        };

        if let Some(quote) = self.engine.quote(self.world, here, self.layer, edge_cost)? {
            debug!(
                worker = %here,
                edge_cost = %edge_cost,
                live_cost = %quote.live_cost,
                "Route candidate"
            );
            self.record(here, quote, path);
        }

        if path.len() > self.engine.config.max_route_hops {
            return Ok(());
        }

        let hops = path.len();
        for (next, cost) in self.world.neighbors_of(here) {
            if path.contains(&next) {
                continue;
            }
            let Some(reached) = edge_cost.checked_add(cost) else {
                continue;
            };
            if self.best.is_some_and(|best| reached >= best) {
                continue;
            }
            if self
                .reached
                .get(&next)
                .is_some_and(|&seen| (reached, hops) >= seen)
            {
                continue;
            }
            self.reached.insert(next, (reached, hops));
            path.push(next);
            self.visit(path, reached)?;
            path.pop();
        }
        Ok(())
    }

    fn record(&mut self, worker: WorkerId, quote: Quote, path: &[WorkerId]) {
        let entry = RouteEntry {
            from_worker: self.from,
            to_worker: worker,
            layer_color: self.layer.color(),
            base_cost: quote.base_cost,
            live_cost: quote.live_cost,
            path: path.to_vec(),
        };
        if self.best.is_none_or(|best| quote.live_cost < best) {
            self.best = Some(quote.live_cost);
        }
        let better = self
            .candidates
            .get(&worker)
            .is_none_or(|existing| entry.rank(existing) == Ordering::Less);
        if better {
            self.candidates.insert(worker, entry);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atlantis_types::{PearlId, WorldDescription};
    use atlantis_world::{Task, build_world};
    use rust_decimal_macros::dec;

    use super::*;

    fn w(id: u32) -> WorkerId {
        WorkerId::new(id)
    }

    fn layer(color: PearlColor, thickness: u32) -> PearlLayer {
        PearlLayer::new(color, thickness).unwrap()
    }

    fn world(json: &str) -> World {
        build_world(&WorldDescription::from_json(json).unwrap()).unwrap()
    }

    fn engine() -> EconomicEngine {
        EconomicEngine::new(&EconomyConfig::default())
    }

    /// A(0 General) --1-- B(1 Vector, Red rate 4, Blue rate 0.25).
    fn pair() -> World {
        world(
            r#"{"workers":[{"id":0,"flavor":"General"},
                           {"id":1,"flavor":"Vector","cost_table":{"Red":4,"Blue":"0.25"}}],
                "neighbor_map":[[0,1]]}"#,
        )
    }

    #[test]
    fn cheaper_neighbor_beats_local_processing() {
        let route = engine().best_route(&pair(), w(0), &layer(PearlColor::Red, 2)).unwrap();
        assert_eq!(route.to_worker, w(1));
        assert_eq!(route.path, vec![w(0), w(1)]);
        assert_eq!(route.base_cost, dec!(1.5));
        assert_eq!(route.live_cost, dec!(1.5));
    }

    #[test]
    fn local_processing_wins_when_cheapest() {
        let route = engine().best_route(&pair(), w(1), &layer(PearlColor::Red, 2)).unwrap();
        assert_eq!(route.to_worker, w(1));
        assert_eq!(route.hops(), 0);
        assert_eq!(route.live_cost, dec!(0.5));
    }

    #[test]
    fn slow_local_rate_sends_layer_back() {
        let route = engine().best_route(&pair(), w(1), &layer(PearlColor::Blue, 1)).unwrap();
        assert_eq!(route.to_worker, w(0));
        assert_eq!(route.live_cost, dec!(2));
    }

    #[test]
    fn load_penalty_shifts_choice() {
        let mut world = pair();
        for i in 0..2 {
            world.worker_mut(w(1)).unwrap().enqueue(Task {
                pearl_id: PearlId::new(i),
                color: PearlColor::Red,
                remaining_steps: 1,
            });
        }
        let route = engine().best_route(&world, w(0), &layer(PearlColor::Red, 2)).unwrap();
        assert_eq!(route.to_worker, w(0));
    }

    #[test]
    fn incapable_workers_are_traversed_not_chosen() {
        // 0 cannot do Green, 1 cannot either, 2 can.
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{"Red":1}},
                           {"id":1,"flavor":"Vector","cost_table":{"Red":1}},
                           {"id":2,"flavor":"Matrix"}],
                "neighbor_map":[[0,1],[1,2]]}"#,
        );
        let ranked = engine().rank_routes(&world, w(0), &layer(PearlColor::Green, 4)).unwrap();
        assert_eq!(ranked.len(), 1);
        let best = ranked.first().unwrap();
        assert_eq!(best.to_worker, w(2));
        assert_eq!(best.path, vec![w(0), w(1), w(2)]);
        assert_eq!(best.live_cost, dec!(4));
    }

    #[test]
    fn unreachable_capability_is_unroutable() {
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{"Red":1}},
                           {"id":1,"flavor":"General"}]}"#,
        );
        assert_eq!(
            engine().best_route(&world, w(0), &layer(PearlColor::Blue, 1)),
            Err(RouteError::Unroutable {
                from: w(0),
                color: PearlColor::Blue
            })
        );
    }

    #[test]
    fn hop_bound_limits_search() {
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{}},
                           {"id":1,"flavor":"Vector","cost_table":{}},
                           {"id":2,"flavor":"General"}],
                "neighbor_map":[[0,1],[1,2]]}"#,
        );
        let config = EconomyConfig {
            max_route_hops: 1,
            ..EconomyConfig::default()
        };
        let engine = EconomicEngine::new(&config);
        assert!(matches!(
            engine.best_route(&world, w(0), &layer(PearlColor::Red, 1)),
            Err(RouteError::Unroutable { .. })
        ));
    }

    #[test]
    fn equal_cost_ties_go_to_lowest_worker_id() {
        // 0 incapable; 1 and 2 both one hop away at the same price.
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{}},
                           {"id":2,"flavor":"General"},{"id":1,"flavor":"General"}],
                "neighbor_map":[[0,2],[0,1]]}"#,
        );
        let ranked = engine().rank_routes(&world, w(0), &layer(PearlColor::Red, 3)).unwrap();
        let order: Vec<WorkerId> = ranked.iter().map(|r| r.to_worker).collect();
        assert_eq!(order, vec![w(1), w(2)]);
    }

    #[test]
    fn cycles_are_never_revisited() {
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{}},
                           {"id":1,"flavor":"Vector","cost_table":{}},
                           {"id":2,"flavor":"Vector","cost_table":{}}],
                "neighbor_map":[[0,1],[1,2],[2,0]]}"#,
        );
        assert!(engine().rank_routes(&world, w(0), &layer(PearlColor::Red, 1)).unwrap().is_empty());
    }

    #[test]
    fn gate_affinity_pushes_work_away_from_gate() {
        // Gate is worker 1; worker 0 sits half a step farther out.
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"General"},{"id":1,"flavor":"General"}],
                "neighbor_map":[[0,1,"0.5"]]}"#,
        );
        let red = layer(PearlColor::Red, 2);

        let plain = engine().best_route(&world, w(1), &red).unwrap();
        assert_eq!(plain.to_worker, w(1));

        let config = EconomyConfig {
            gate_affinity: true,
            ..EconomyConfig::default()
        };
        let engine = EconomicEngine::for_world(&config, &world, w(1));
        assert_eq!(engine.affinity(w(1)), dec!(0.5));
        assert_eq!(engine.affinity(w(0)), dec!(0));
        let route = engine.best_route(&world, w(1), &red).unwrap();
        assert_eq!(route.to_worker, w(0));
        assert_eq!(route.live_cost, dec!(2.5));
    }

    /// Complete graph of `n` General workers with unit edges.
    fn complete(n: u32) -> World {
        let workers: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"id":{i},"flavor":"General"}}"#))
            .collect();
        let edges: Vec<String> = (0..n)
            .flat_map(|a| (a + 1..n).map(move |b| format!("[{a},{b}]")))
            .collect();
        world(&format!(
            r#"{{"workers":[{}],"neighbor_map":[{}]}}"#,
            workers.join(","),
            edges.join(",")
        ))
    }

    #[test]
    fn dense_graph_search_stays_fast() {
        let world = complete(16);
        let started = std::time::Instant::now();
        let ranked = engine().rank_routes(&world, w(0), &layer(PearlColor::Red, 50)).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        assert_eq!(ranked.len(), 16);
        let best = ranked.first().unwrap();
        assert_eq!(best.to_worker, w(0));
        assert_eq!(best.live_cost, dec!(50));
        assert!(ranked.iter().skip(1).all(|r| r.hops() == 1 && r.live_cost == dec!(51)));
    }

    #[test]
    fn equal_cost_prefers_fewer_hops() {
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{}},
                           {"id":1,"flavor":"Vector","cost_table":{}},
                           {"id":2,"flavor":"General"}],
                "neighbor_map":[[0,1,1],[1,2,1],[0,2,2]]}"#,
        );
        let route = engine().best_route(&world, w(0), &layer(PearlColor::Red, 1)).unwrap();
        assert_eq!(route.path, vec![w(0), w(2)]);
        assert_eq!(route.live_cost, dec!(3));
    }

    #[test]
    fn overflowing_price_is_not_a_candidate() {
        let world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{}},
                           {"id":1,"flavor":"Vector",
                            "cost_table":{"Red":"0.0000000000000000000000000001"}}],
                "neighbor_map":[[0,1,"70000000000000000000000000000"]]}"#,
        );
        let red = layer(PearlColor::Red, 1);
        assert_eq!(engine().quote(&world, w(1), &red, Decimal::MAX), Ok(None));
        assert!(matches!(
            engine().best_route(&world, w(0), &red),
            Err(RouteError::Unroutable { .. })
        ));
    }

    #[test]
    fn bookings_count_as_load() {
        let world = pair();
        let red = layer(PearlColor::Red, 2);
        let mut engine = engine();

        engine.book(w(1));
        assert_eq!(engine.bookings(w(1)), 1);
        let quoted = engine.quote(&world, w(1), &red, Decimal::ONE).unwrap().unwrap();
        assert_eq!(quoted.live_cost, dec!(2.5));
        let own = engine.requote(&world, w(1), &red, Decimal::ONE).unwrap().unwrap();
        assert_eq!(own.live_cost, dec!(1.5));

        // Two bookings push the neighbor above local processing.
        engine.book(w(1));
        let route = engine.best_route(&world, w(0), &red).unwrap();
        assert_eq!(route.to_worker, w(0));

        engine.unbook(w(1));
        engine.unbook(w(1));
        assert_eq!(engine.bookings(w(1)), 0);
        assert_eq!(engine.best_route(&world, w(0), &red).unwrap().to_worker, w(1));
    }

    #[test]
    fn unknown_origin_is_reported() {
        assert_eq!(
            engine().rank_routes(&pair(), w(9), &layer(PearlColor::Red, 1)),
            Err(RouteError::UnknownWorker(w(9)))
        );
    }
}
