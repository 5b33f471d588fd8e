//! Execution planner: the per-pearl lifecycle state machine.
//!
//! ```text
//! Unseen --observe--> Planned --commit Process--> InProgress
//!                        ^                            |
//!                        |                      layer finished
//!                        |                            v
//!                        +-------- plan ------- AwaitingReplan
//!
//! last layer finished --> FullyDigested
//!                     \-> Returning --arrive at gate--> FullyDigested
//! no capable worker   --> Stalled --retry--> Planned
//! ```
//!
//! A plan covers only the next layer: `Pass` hops to the chosen worker,
//! then one `Process` step there. Before a plan's pending step is proposed
//! it is re-priced against live workloads; if it drifted past
//! `replan_threshold`, lost an edge, or its target can no longer process
//! the layer, it is replaced. A replanned pearl keeps its plan sequence, so
//! it does not lose its place in first-come-first-served tie breaks.

use std::collections::BTreeMap;

use atlantis_types::{Action, PearlId, PearlPhase, PlanEvent, WorkerId};
use atlantis_world::World;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accounting::PearlTally;
use crate::conflict::Claim;
use crate::economy::{EconomicEngine, RouteEntry, RouteError};
use crate::error::InvariantViolation;

/// One hop or processing step of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    /// Where the pearl is when the step runs.
    pub source: WorkerId,
    /// Where the pearl is after the step.
    pub target: WorkerId,
    /// What the step does.
    pub action: Action,
}

/// The active plan of one pearl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// The pearl the plan belongs to.
    pub pearl_id: PearlId,
    /// What caused the plan to be created.
    pub created_at_event: PlanEvent,
    /// Seniority for first-come-first-served tie breaks.
    pub sequence: u64,
    steps: Vec<PlanStep>,
    cursor: usize,
    planned_cost: Decimal,
    traversed_cost: Decimal,
}

impl ExecutionPlan {
    /// Build a plan that walks `route` and processes its layer at the end.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::RepeatedWorker`] if the route is not a
    /// simple path.
    pub fn from_route(
        pearl_id: PearlId,
        event: PlanEvent,
        sequence: u64,
        route: &RouteEntry,
    ) -> Result<Self, InvariantViolation> {
        for (i, worker) in route.path.iter().enumerate() {
            if route.path.iter().skip(i.saturating_add(1)).any(|w| w == worker) {
                return Err(InvariantViolation::RepeatedWorker {
                    pearl: pearl_id,
                    worker: *worker,
                });
            }
        }

        let process = Action::Process(route.layer_color);
        let hops = route.hops();
        let steps = if hops == 0 {
            vec![PlanStep {
                source: route.to_worker,
                target: route.to_worker,
                action: process,
            }]
        } else {
            route
                .path
                .iter()
                .zip(route.path.iter().skip(1))
                .enumerate()
                .map(|(i, (source, target))| PlanStep {
                    source: *source,
                    target: *target,
                    action: if i.saturating_add(1) == hops {
                        process
                    } else {
                        Action::Pass
                    },
                })
                .collect()
        };

        Ok(Self {
            pearl_id,
            created_at_event: event,
            sequence,
            steps,
            cursor: 0,
            planned_cost: route.live_cost,
            traversed_cost: Decimal::ZERO,
        })
    }

    /// Build a `Pass`-only plan along `path`, used to return a digested
    /// pearl to the gate.
    pub fn returning(pearl_id: PearlId, sequence: u64, path: &[WorkerId], cost: Decimal) -> Self {
        let steps = path
            .iter()
            .zip(path.iter().skip(1))
            .map(|(source, target)| PlanStep {
                source: *source,
                target: *target,
                action: Action::Pass,
            })
            .collect();
        Self {
            pearl_id,
            created_at_event: PlanEvent::FullyDigested,
            sequence,
            steps,
            cursor: 0,
            planned_cost: cost,
            traversed_cost: Decimal::ZERO,
        }
    }

    /// All steps of the plan.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// The next step to dispatch.
    pub fn pending_step(&self) -> Option<&PlanStep> {
        self.steps.get(self.cursor)
    }

    /// Steps not yet committed.
    pub fn remaining_steps(&self) -> &[PlanStep] {
        self.steps.get(self.cursor..).unwrap_or_default()
    }

    /// Whether every step has been committed.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Live cost when the plan was made.
    pub const fn planned_cost(&self) -> Decimal {
        self.planned_cost
    }

    /// Planned cost still ahead of the pearl.
    pub fn remaining_planned_cost(&self) -> Decimal {
        self.planned_cost
            .checked_sub(self.traversed_cost)
            .unwrap_or_default()
            .max(Decimal::ZERO)
    }

    /// The worker the plan ends at.
    pub fn destination(&self) -> Option<WorkerId> {
        self.steps.last().map(|s| s.target)
    }

    /// Edge cost of the remaining steps, or `None` if one of them is no
    /// longer an edge or the sum overflows.
    pub fn remaining_edge_cost(&self, world: &World) -> Option<Decimal> {
        self.remaining_steps().iter().try_fold(Decimal::ZERO, |acc, step| {
            if step.source == step.target {
                Some(acc)
            } else {
                world
                    .edge_cost(step.source, step.target)
                    .and_then(|c| acc.checked_add(c))
            }
        })
    }

    fn advance(&mut self, world: &World) -> Option<PlanStep> {
        let step = *self.pending_step()?;
        if step.source != step.target {
            let cost = world.edge_cost(step.source, step.target).unwrap_or_default();
            self.traversed_cost = self.traversed_cost.checked_add(cost).unwrap_or(Decimal::MAX);
        }
        self.cursor = self.cursor.saturating_add(1);
        Some(step)
    }
}

/// Terminal record of a fully digested pearl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigestRecord {
    /// The pearl.
    pub pearl_id: PearlId,
    /// Step in which it left the system.
    pub step: u64,
    /// Worker it left from.
    pub worker: WorkerId,
}

/// A pearl's pending step, priced for conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    /// The pearl.
    pub pearl_id: PearlId,
    /// The step it wants to commit.
    pub step: PlanStep,
    /// Live cost of the remaining plan.
    pub live_cost: Decimal,
    /// Plan sequence number.
    pub sequence: u64,
    /// Conflicts lost since it last won.
    pub times_lost: u32,
}

impl Proposal {
    /// The conflict claim for this proposal.
    pub const fn claim(&self) -> Claim {
        Claim {
            pearl_id: self.pearl_id,
            target: self.step.target,
            live_cost: self.live_cost,
            sequence: self.sequence,
            times_lost: self.times_lost,
        }
    }
}

/// Lifecycle changes made by the planner during one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanningLog {
    /// Plans created, with the event that caused each.
    pub plans: Vec<(PearlId, PlanEvent)>,
    /// Pearls that became stalled.
    pub stalled: Vec<PearlId>,
    /// Pearls that reached the terminal digested state.
    pub digested: Vec<PearlId>,
}

/// Planner settings taken from the simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    /// Drift allowed between planned and live cost before replanning.
    pub replan_threshold: Decimal,
    /// Route digested pearls back to the gate.
    pub return_to_gate: bool,
    /// The gate worker.
    pub gate: WorkerId,
    /// Retry stalled pearls every N steps; zero disables retries.
    pub stall_retry_steps: u64,
}

#[derive(Debug, Clone)]
struct PearlRecord {
    phase: PearlPhase,
    plan: Option<ExecutionPlan>,
    sequence: Option<u64>,
    times_lost: u32,
    stalled_at: Option<u64>,
    /// Worker holding this pearl's booking until its `Process` commits.
    booked: Option<WorkerId>,
}

impl PearlRecord {
    const fn new() -> Self {
        Self {
            phase: PearlPhase::Planned,
            plan: None,
            sequence: None,
            times_lost: 0,
            stalled_at: None,
            booked: None,
        }
    }
}

/// Tracks every pearl's lifecycle and plan.
#[derive(Debug, Clone)]
pub struct Planner {
    engine: EconomicEngine,
    settings: PlannerSettings,
    records: BTreeMap<PearlId, PearlRecord>,
    digested: Vec<DigestRecord>,
    next_sequence: u64,
}

impl Planner {
    /// Create a planner with no tracked pearls.
    pub const fn new(engine: EconomicEngine, settings: PlannerSettings) -> Self {
        Self {
            engine,
            settings,
            records: BTreeMap::new(),
            digested: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Lifecycle phase of a tracked pearl.
    pub fn phase(&self, pearl: PearlId) -> Option<PearlPhase> {
        self.records.get(&pearl).map(|r| r.phase)
    }

    /// Active plan of a pearl, if any.
    pub fn plan(&self, pearl: PearlId) -> Option<&ExecutionPlan> {
        self.records.get(&pearl).and_then(|r| r.plan.as_ref())
    }

    /// Terminal records, in the order pearls finished.
    pub fn digested(&self) -> &[DigestRecord] {
        &self.digested
    }

    /// Pearls currently stalled.
    pub fn stalled_pearls(&self) -> Vec<PearlId> {
        self.records
            .iter()
            .filter(|(_, r)| r.phase == PearlPhase::Stalled)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether the pearl is tracked and stalled.
    pub fn is_stalled(&self, pearl: PearlId) -> bool {
        self.phase(pearl) == Some(PearlPhase::Stalled)
    }

    /// Pearl counts by lifecycle bucket.
    pub fn tally(&self) -> PearlTally {
        let mut tally = PearlTally {
            entered: self.records.len(),
            ..PearlTally::default()
        };
        for record in self.records.values() {
            match record.phase {
                PearlPhase::FullyDigested => tally.digested = tally.digested.saturating_add(1),
                PearlPhase::Stalled => tally.stalled = tally.stalled.saturating_add(1),
                PearlPhase::InProgress => {
                    tally.active = tally.active.saturating_add(1);
                    tally.in_progress = tally.in_progress.saturating_add(1);
                }
                PearlPhase::Planned | PearlPhase::AwaitingReplan | PearlPhase::Returning => {
                    tally.active = tally.active.saturating_add(1);
                }
            }
        }
        tally
    }

    /// Start tracking every pearl in the world that has no record yet.
    pub fn observe(
        &mut self,
        world: &mut World,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<(), InvariantViolation> {
        let unseen: Vec<PearlId> = world
            .pearl_ids()
            .into_iter()
            .filter(|id| !self.records.contains_key(id))
            .collect();
        for id in unseen {
            if let Some(pearl) = world.pearl(id) {
                let local_cost = world
                    .worker(pearl.current_worker)
                    .and_then(|w| w.cost_pearl(pearl).cost());
                debug!(
                    step,
                    pearl = %id,
                    worker = %pearl.current_worker,
                    layers = pearl.layer_count(),
                    thickness = pearl.remaining_thickness(),
                    local_cost = ?local_cost,
                    "Pearl observed"
                );
            }
            self.records.insert(id, PearlRecord::new());
            self.replan(world, id, PlanEvent::FirstSeen, step, log)?;
        }
        Ok(())
    }

    /// Retry stalled pearls whose retry interval elapsed this step.
    pub fn retry_stalled(
        &mut self,
        world: &mut World,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<(), InvariantViolation> {
        let interval = self.settings.stall_retry_steps;
        if interval == 0 {
            return Ok(());
        }
        let due: Vec<PearlId> = self
            .records
            .iter()
            .filter(|(_, r)| r.phase == PearlPhase::Stalled)
            .filter(|(_, r)| {
                r.stalled_at.is_some_and(|at| {
                    let waited = step.saturating_sub(at);
                    waited > 0 && waited % interval == 0
                })
            })
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            debug!(step, pearl = %id, "Retrying stalled pearl");
            self.replan(world, id, PlanEvent::Replanned, step, log)?;
        }
        Ok(())
    }

    /// Plan pearls awaiting a plan, re-validate existing plans, and price
    /// every pending step. Proposals come back in ascending pearl id.
    pub fn proposals(
        &mut self,
        world: &mut World,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<Vec<Proposal>, InvariantViolation> {
        let proposing: Vec<PearlId> = self
            .records
            .iter()
            .filter(|(_, r)| r.phase.proposes())
            .map(|(id, _)| *id)
            .collect();

        let mut proposals = Vec::with_capacity(proposing.len());
        for id in proposing {
            if self.phase(id) == Some(PearlPhase::AwaitingReplan) {
                self.replan(world, id, PlanEvent::LayerDigested, step, log)?;
            }

            let mut live = self.price(world, id)?;
            if self.phase(id) == Some(PearlPhase::Planned) && live.is_none() {
                debug!(step, pearl = %id, "Plan drifted, replanning");
                self.replan(world, id, PlanEvent::Replanned, step, log)?;
                live = self.price(world, id)?;
            }

            let Some(record) = self.records.get(&id) else {
                continue;
            };
            if !record.phase.proposes() {
                continue;
            }
            let (Some(plan), Some(live_cost)) = (record.plan.as_ref(), live) else {
                continue;
            };
            let Some(pending) = plan.pending_step() else {
                continue;
            };
            debug!(
                step,
                pearl = %id,
                source = %pending.source,
                target = %pending.target,
                action = %pending.action,
                live_cost = %live_cost,
                "Proposal"
            );
            proposals.push(Proposal {
                pearl_id: id,
                step: *pending,
                live_cost,
                sequence: plan.sequence,
                times_lost: record.times_lost,
            });
        }
        Ok(proposals)
    }

    /// Record a lost conflict.
    pub fn on_lost(&mut self, pearl: PearlId) {
        if let Some(record) = self.records.get_mut(&pearl) {
            record.times_lost = record.times_lost.saturating_add(1);
        }
    }

    /// Advance the plan after its pending step was committed.
    ///
    /// The caller has already moved the pearl and queued any task.
    pub fn on_committed(
        &mut self,
        world: &mut World,
        pearl: PearlId,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<(), InvariantViolation> {
        let record = self
            .records
            .get_mut(&pearl)
            .ok_or(InvariantViolation::UnknownPearl(pearl))?;
        record.times_lost = 0;
        let plan = record
            .plan
            .as_mut()
            .ok_or(InvariantViolation::UnknownPearl(pearl))?;
        let committed = plan
            .advance(world)
            .ok_or(InvariantViolation::UnknownPearl(pearl))?;

        let finished = plan.is_finished();

        match (record.phase, committed.action) {
            (PearlPhase::Planned, Action::Process(_)) => {
                record.phase = PearlPhase::InProgress;
                if let Some(worker) = record.booked.take() {
                    self.engine.unbook(worker);
                }
            }
            (PearlPhase::Returning, _) if finished => {
                self.finalize(world, pearl, step, log)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Handle a finished task whose layer was already removed from the pearl.
    pub fn on_layer_finished(
        &mut self,
        world: &mut World,
        pearl: PearlId,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<(), InvariantViolation> {
        let digested = world
            .pearl(pearl)
            .ok_or(InvariantViolation::UnknownPearl(pearl))?
            .is_digested();
        if digested {
            return self.digest(world, pearl, step, log);
        }
        let record = self
            .records
            .get_mut(&pearl)
            .ok_or(InvariantViolation::UnknownPearl(pearl))?;
        record.phase = PearlPhase::AwaitingReplan;
        record.plan = None;
        Ok(())
    }

    /// Whether no pearl can make further progress: every remaining pearl is
    /// stalled and no worker has queued work.
    pub fn is_complete(&self, world: &World) -> bool {
        world.total_load() == 0 && world.pearls().all(|p| self.is_stalled(p.id))
    }

    /// Release the pearl's booking, if it holds one.
    fn unbook(&mut self, id: PearlId) {
        let booked = self.records.get_mut(&id).and_then(|r| r.booked.take());
        if let Some(worker) = booked {
            self.engine.unbook(worker);
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        sequence
    }

    /// Create a fresh plan for the pearl's outer layer.
    fn replan(
        &mut self,
        world: &mut World,
        id: PearlId,
        event: PlanEvent,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<(), InvariantViolation> {
        self.unbook(id);
        let pearl = world.pearl(id).ok_or(InvariantViolation::UnknownPearl(id))?;
        let at = pearl.current_worker;
        let Some(layer) = pearl.outer_layer().copied() else {
            return self.digest(world, id, step, log);
        };

        match self.engine.best_route(world, at, &layer) {
            Ok(route) => {
                let kept = self
                    .records
                    .get(&id)
                    .and_then(|r| r.sequence)
                    .filter(|_| event == PlanEvent::Replanned);
                let sequence = kept.unwrap_or_else(|| self.next_sequence());
                let plan = ExecutionPlan::from_route(id, event, sequence, &route)?;
                debug!(
                    step,
                    pearl = %id,
                    event = ?event,
                    target = %route.to_worker,
                    hops = route.hops(),
                    planned_cost = %plan.planned_cost(),
                    "Plan created"
                );
                self.engine.book(route.to_worker);
                let record = self
                    .records
                    .get_mut(&id)
                    .ok_or(InvariantViolation::UnknownPearl(id))?;
                record.phase = PearlPhase::Planned;
                record.plan = Some(plan);
                record.sequence = Some(sequence);
                record.stalled_at = None;
                record.booked = Some(route.to_worker);
                log.plans.push((id, event));
                Ok(())
            }
            Err(RouteError::Unroutable { from, color }) => {
                warn!(step, pearl = %id, worker = %from, color = %color, "Pearl unroutable, stalling");
                let record = self
                    .records
                    .get_mut(&id)
                    .ok_or(InvariantViolation::UnknownPearl(id))?;
                record.phase = PearlPhase::Stalled;
                record.plan = None;
                record.stalled_at = Some(step);
                log.stalled.push(id);
                Ok(())
            }
            Err(RouteError::UnknownWorker(worker)) => Err(InvariantViolation::UnknownWorker(worker)),
            Err(RouteError::NegativeCost { worker, cost }) => {
                Err(InvariantViolation::NegativeCost { worker, cost })
            }
        }
    }

    /// The last layer is gone: head for the gate, or leave the system.
    fn digest(
        &mut self,
        world: &mut World,
        id: PearlId,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<(), InvariantViolation> {
        let at = world
            .pearl(id)
            .ok_or(InvariantViolation::UnknownPearl(id))?
            .current_worker;
        let gate = self.settings.gate;

        if self.settings.return_to_gate && at != gate {
            if let Some((path, cost)) = world.shortest_path(at, gate) {
                let sequence = self.next_sequence();
                let plan = ExecutionPlan::returning(id, sequence, &path, cost);
                let record = self
                    .records
                    .get_mut(&id)
                    .ok_or(InvariantViolation::UnknownPearl(id))?;
                record.phase = PearlPhase::Returning;
                record.plan = Some(plan);
                record.sequence = Some(sequence);
                log.plans.push((id, PlanEvent::FullyDigested));
                debug!(step, pearl = %id, gate = %gate, hops = path.len().saturating_sub(1), "Returning to gate");
                return Ok(());
            }
            warn!(step, pearl = %id, gate = %gate, "Gate unreachable, digesting in place");
        }

        self.finalize(world, id, step, log)
    }

    /// Remove the pearl from the world and write its terminal record.
    fn finalize(
        &mut self,
        world: &mut World,
        id: PearlId,
        step: u64,
        log: &mut PlanningLog,
    ) -> Result<(), InvariantViolation> {
        self.unbook(id);
        let pearl = world.remove_pearl(id)?;
        let record = self
            .records
            .get_mut(&id)
            .ok_or(InvariantViolation::UnknownPearl(id))?;
        record.phase = PearlPhase::FullyDigested;
        record.plan = None;
        self.digested.push(DigestRecord {
            pearl_id: id,
            step,
            worker: pearl.current_worker,
        });
        log.digested.push(id);
        info!(step, pearl = %id, worker = %pearl.current_worker, "Pearl fully digested");
        Ok(())
    }

    /// Live cost of the pearl's remaining plan, or `None` when the plan
    /// must be replaced.
    fn price(&self, world: &World, id: PearlId) -> Result<Option<Decimal>, InvariantViolation> {
        let Some(record) = self.records.get(&id) else {
            return Err(InvariantViolation::UnknownPearl(id));
        };
        let Some(plan) = record.plan.as_ref() else {
            return Ok(None);
        };
        let pearl = world.pearl(id).ok_or(InvariantViolation::UnknownPearl(id))?;
        let Some(pending) = plan.pending_step() else {
            return Ok(None);
        };
        if pending.source != pearl.current_worker {
            return Err(InvariantViolation::PlanOutOfSync {
                pearl: id,
                planned: pending.source,
                actual: pearl.current_worker,
            });
        }

        let Some(edges) = plan.remaining_edge_cost(world) else {
            if record.phase == PearlPhase::Returning {
                return Err(InvariantViolation::NotAnEdge {
                    pearl: id,
                    from: pending.source,
                    to: pending.target,
                });
            }
            return Ok(None);
        };

        if record.phase == PearlPhase::Returning {
            return Ok(Some(edges));
        }

        let (Some(layer), Some(target)) = (pearl.outer_layer(), plan.destination()) else {
            return Ok(None);
        };
        let quote = if record.booked == Some(target) {
            self.engine.requote(world, target, layer, edges)
        } else {
            self.engine.quote(world, target, layer, edges)
        };
        let quote = quote
            .map_err(|err| match err {
                RouteError::NegativeCost { worker, cost } => {
                    InvariantViolation::NegativeCost { worker, cost }
                }
                RouteError::UnknownWorker(worker) | RouteError::Unroutable { from: worker, .. } => {
                    InvariantViolation::UnknownWorker(worker)
                }
            })?;
        let Some(quote) = quote else {
            return Ok(None);
        };

        let limit = plan
            .remaining_planned_cost()
            .checked_add(self.engine.config().replan_threshold)
            .unwrap_or(Decimal::MAX);
        if quote.live_cost > limit {
            return Ok(None);
        }
        Ok(Some(quote.live_cost))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atlantis_types::{PearlColor, WorldDescription};
    use atlantis_world::{Task, build_world};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::EconomyConfig;

    fn w(id: u32) -> WorkerId {
        WorkerId::new(id)
    }

    fn p(id: u64) -> PearlId {
        PearlId::new(id)
    }

    fn world(json: &str) -> World {
        build_world(&WorldDescription::from_json(json).unwrap()).unwrap()
    }

    fn planner(return_to_gate: bool, stall_retry_steps: u64) -> Planner {
        Planner::new(
            EconomicEngine::new(&EconomyConfig::default()),
            PlannerSettings {
                replan_threshold: dec!(2),
                return_to_gate,
                gate: w(0),
                stall_retry_steps,
            },
        )
    }

    fn route(path: &[u32], color: PearlColor) -> RouteEntry {
        let path: Vec<WorkerId> = path.iter().map(|i| w(*i)).collect();
        RouteEntry {
            from_worker: *path.first().unwrap(),
            to_worker: *path.last().unwrap(),
            layer_color: color,
            base_cost: dec!(3),
            live_cost: dec!(3),
            path,
        }
    }

    #[test]
    fn plan_passes_then_processes() {
        let plan =
            ExecutionPlan::from_route(p(1), PlanEvent::FirstSeen, 0, &route(&[0, 1, 2], PearlColor::Red))
                .unwrap();
        let actions: Vec<Action> = plan.steps().iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![Action::Pass, Action::Process(PearlColor::Red)]);
        assert_eq!(plan.destination(), Some(w(2)));
    }

    #[test]
    fn local_plan_processes_in_place() {
        let plan =
            ExecutionPlan::from_route(p(1), PlanEvent::FirstSeen, 0, &route(&[4], PearlColor::Blue))
                .unwrap();
        assert_eq!(
            plan.steps(),
            &[PlanStep {
                source: w(4),
                target: w(4),
                action: Action::Process(PearlColor::Blue)
            }]
        );
    }

    #[test]
    fn repeated_worker_route_is_rejected() {
        assert_eq!(
            ExecutionPlan::from_route(p(1), PlanEvent::FirstSeen, 0, &route(&[0, 1, 0], PearlColor::Red)),
            Err(InvariantViolation::RepeatedWorker {
                pearl: p(1),
                worker: w(0)
            })
        );
    }

    #[test]
    fn first_observation_creates_plan() {
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":3,"layers":[{"color":"Red","thickness":2}]}]}]}"#,
        );
        let mut planner = planner(false, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::Planned));
        assert_eq!(log.plans, vec![(p(3), PlanEvent::FirstSeen)]);
        assert_eq!(planner.tally().entered, 1);

        let proposals = planner.proposals(&mut world, 1, &mut log).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals.first().map(|x| x.live_cost), Some(dec!(2)));
    }

    #[test]
    fn pearl_without_route_stalls() {
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{"Red":1},
                            "desk":[{"id":3,"layers":[{"color":"Green","thickness":2}]}]}]}"#,
        );
        let mut planner = planner(false, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::Stalled));
        assert_eq!(log.stalled, vec![p(3)]);
        assert!(planner.proposals(&mut world, 1, &mut log).unwrap().is_empty());
        assert!(planner.is_complete(&world));
        assert_eq!(planner.tally().stalled, 1);
    }

    #[test]
    fn empty_pearl_is_digested_on_sight() {
        let mut world = world(r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":3,"layers":[]}]}]}"#);
        let mut planner = planner(false, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::FullyDigested));
        assert_eq!(world.pearl_count(), 0);
        assert_eq!(planner.digested().first().map(|d| d.worker), Some(w(0)));
    }

    #[test]
    fn digested_pearl_away_from_gate_returns() {
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"General"},
                           {"id":1,"flavor":"General","desk":[{"id":3,"layers":[]}]}],
                "neighbor_map":[[0,1]]}"#,
        );
        let mut planner = planner(true, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::Returning));
        assert_eq!(log.plans, vec![(p(3), PlanEvent::FullyDigested)]);

        let proposals = planner.proposals(&mut world, 1, &mut log).unwrap();
        let step = proposals.first().unwrap().step;
        assert_eq!(step.action, Action::Pass);
        world.move_pearl(p(3), step.target).unwrap();
        planner.on_committed(&mut world, p(3), 1, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::FullyDigested));
        assert_eq!(world.pearl_count(), 0);
    }

    #[test]
    fn drifted_plan_is_replanned_keeping_sequence() {
        // Pearl at 0 plans to send Red to 1 (cheap); then 1 gets loaded.
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":3,"layers":[{"color":"Red","thickness":4}]}]},
                           {"id":1,"flavor":"Vector","cost_table":{"Red":4}}],
                "neighbor_map":[[0,1]]}"#,
        );
        let mut planner = planner(false, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        assert_eq!(planner.plan(p(3)).and_then(ExecutionPlan::destination), Some(w(1)));
        let sequence = planner.plan(p(3)).map(|x| x.sequence);

        for i in 10..14 {
            world.worker_mut(w(1)).unwrap().enqueue(Task {
                pearl_id: p(i),
                color: PearlColor::Red,
                remaining_steps: 1,
            });
        }
        let proposals = planner.proposals(&mut world, 2, &mut log).unwrap();
        let plan = planner.plan(p(3)).unwrap();
        assert_eq!(plan.created_at_event, PlanEvent::Replanned);
        assert_eq!(plan.destination(), Some(w(0)));
        assert_eq!(Some(plan.sequence), sequence);
        assert_eq!(proposals.first().map(|x| x.step.target), Some(w(0)));
    }

    #[test]
    fn planned_destinations_are_booked_until_commit() {
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[
                    {"id":3,"layers":[{"color":"Red","thickness":4}]},
                    {"id":4,"layers":[{"color":"Red","thickness":4}]}]},
                           {"id":1,"flavor":"Vector","cost_table":{"Red":4}},
                           {"id":2,"flavor":"Vector","cost_table":{"Red":4}}],
                "neighbor_map":[[0,1],[0,2]]}"#,
        );
        let mut planner = planner(false, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();

        assert_eq!(planner.plan(p(3)).and_then(ExecutionPlan::destination), Some(w(1)));
        assert_eq!(planner.plan(p(4)).and_then(ExecutionPlan::destination), Some(w(2)));
        assert_eq!(planner.engine.bookings(w(1)), 1);
        assert_eq!(planner.engine.bookings(w(2)), 1);

        // Own booking does not count against the pearl's own plan.
        let proposals = planner.proposals(&mut world, 1, &mut log).unwrap();
        assert_eq!(proposals.len(), 2);
        assert!(proposals.iter().all(|x| x.live_cost == dec!(2)));

        planner.on_committed(&mut world, p(3), 1, &mut log).unwrap();
        assert_eq!(planner.engine.bookings(w(1)), 0);
        assert_eq!(planner.engine.bookings(w(2)), 1);
        assert_eq!(planner.records.get(&p(3)).and_then(|r| r.booked), None);
    }

    #[test]
    fn finished_layer_awaits_replan() {
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":3,"layers":[
                {"color":"Red","thickness":1},{"color":"Blue","thickness":1}]}]}]}"#,
        );
        let mut planner = planner(false, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        planner.proposals(&mut world, 1, &mut log).unwrap();
        planner.on_committed(&mut world, p(3), 1, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::InProgress));

        world.pearl_mut(p(3)).unwrap().pop_outer_layer();
        planner.on_layer_finished(&mut world, p(3), 1, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::AwaitingReplan));

        planner.proposals(&mut world, 2, &mut log).unwrap();
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::Planned));
        assert_eq!(log.plans.last(), Some(&(p(3), PlanEvent::LayerDigested)));
    }

    #[test]
    fn stalled_pearl_is_retried_on_interval() {
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"Vector","cost_table":{},
                            "desk":[{"id":3,"layers":[{"color":"Red","thickness":1}]}]}]}"#,
        );
        let mut planner = planner(false, 2);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        planner.retry_stalled(&mut world, 2, &mut log).unwrap();
        assert_eq!(log.stalled.len(), 1);
        planner.retry_stalled(&mut world, 3, &mut log).unwrap();
        assert_eq!(log.stalled.len(), 2);
        assert_eq!(planner.phase(p(3)), Some(PearlPhase::Stalled));
    }

    #[test]
    fn losses_accumulate_until_a_win() {
        let mut world = world(
            r#"{"workers":[{"id":0,"flavor":"General","desk":[{"id":3,"layers":[{"color":"Red","thickness":1}]}]}]}"#,
        );
        let mut planner = planner(false, 0);
        let mut log = PlanningLog::default();
        planner.observe(&mut world, 1, &mut log).unwrap();
        planner.on_lost(p(3));
        planner.on_lost(p(3));
        let proposals = planner.proposals(&mut world, 1, &mut log).unwrap();
        assert_eq!(proposals.first().map(|x| x.times_lost), Some(2));
        planner.on_committed(&mut world, p(3), 1, &mut log).unwrap();
        assert_eq!(planner.records.get(&p(3)).map(|r| r.times_lost), Some(0));
    }
}
