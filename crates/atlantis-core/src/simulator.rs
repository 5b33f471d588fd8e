//! Step cycle: the phased loop that turns plans into committed commands.
//!
//! Each step runs through these phases:
//!
//! 1. **Observe** -- start tracking pearls the planner has not seen.
//! 2. **Retry** -- re-plan stalled pearls whose retry interval elapsed.
//! 3. **Propose** -- every planning pearl, in ascending id, re-validates its
//!    plan and proposes its pending step at live cost.
//! 4. **Resolve** -- at most one claim per target worker is granted; the
//!    rest are requeued and re-priced next step.
//! 5. **Commit** -- winners, in ascending pearl id, move and (for `Process`)
//!    queue a task on the target. One [`Command`] per winner.
//! 6. **Work** -- each worker, in ascending id, works its head task for one
//!    step. A finished task strips the pearl's outer layer.
//! 7. **Verify** -- pearl accounting must balance.
//!
//! The cycle is deterministic: every collection iterated is ordered by id.

use std::collections::BTreeSet;

use atlantis_types::{Action, Command, PearlColor, PearlId, WorkerId};
use atlantis_world::{Task, World, WorldError};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accounting::{self, AccountingResult, PearlTally};
use crate::config::SimulationConfig;
use crate::conflict::{self, Claim, ClaimOutcome};
use crate::economy::EconomicEngine;
use crate::error::{InvariantViolation, SimulationError};
use crate::planner::{DigestRecord, Planner, PlannerSettings, PlanningLog, Proposal};

/// A layer that finished processing during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerDigest {
    /// The pearl.
    pub pearl_id: PearlId,
    /// The worker that processed it.
    pub worker: WorkerId,
    /// Color of the removed layer.
    pub color: PearlColor,
}

/// Everything that happened during one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// The 1-based step index.
    pub step: u64,
    /// Committed commands, sorted by pearl id.
    pub commands: Vec<Command>,
    /// Pearls whose claim lost a conflict and were requeued.
    pub conflicts_lost: Vec<PearlId>,
    /// Layers removed by finished tasks.
    pub layers_digested: Vec<LayerDigest>,
    /// Plans created, pearls stalled, and pearls digested.
    pub planning: PlanningLog,
    /// Pearl counts after the step.
    pub tally: PearlTally,
}

/// Drives a [`World`] forward one step at a time.
///
/// Holds the planner state between steps; the world itself is passed in,
/// so several simulations can run side by side.
#[derive(Debug, Clone)]
pub struct Simulator {
    planner: Planner,
    aging_credit: Decimal,
    step: u64,
}

impl Simulator {
    /// Create a simulator for `world`.
    ///
    /// The gate worker is `simulation.gate_worker`, or the lowest worker id.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::WorkerNotFound`] if the configured gate is not
    /// in the world, or [`WorldError::EmptyWorld`] if it has no workers.
    pub fn new(config: &SimulationConfig, world: &World) -> Result<Self, WorldError> {
        let gate = match config.simulation.gate_worker {
            Some(gate) if world.worker(gate).is_some() => gate,
            Some(gate) => return Err(WorldError::WorkerNotFound(gate)),
            None => world.first_worker_id().ok_or(WorldError::EmptyWorld)?,
        };
        if !world.is_connected() {
            warn!(
                workers = world.worker_count(),
                edges = world.edge_count(),
                "Neighbor graph is disconnected, some pearls may stall"
            );
        }
        let engine = EconomicEngine::for_world(&config.economy, world, gate);
        let settings = PlannerSettings {
            replan_threshold: config.economy.replan_threshold,
            return_to_gate: config.simulation.return_to_gate,
            gate,
            stall_retry_steps: config.simulation.stall_retry_steps,
        };
        Ok(Self {
            planner: Planner::new(engine, settings),
            aging_credit: config.economy.aging_credit,
            step: 0,
        })
    }

    /// Number of steps executed so far.
    pub const fn current_step(&self) -> u64 {
        self.step
    }

    /// The planner, for lifecycle queries.
    pub const fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Pearls that could not be routed.
    pub fn stalled_pearls(&self) -> Vec<PearlId> {
        self.planner.stalled_pearls()
    }

    /// Terminal records of digested pearls.
    pub fn digested(&self) -> &[DigestRecord] {
        self.planner.digested()
    }

    /// Whether no further progress is possible: no active pearl other than
    /// stalled ones, and no queued task.
    pub fn is_complete(&self, world: &World) -> bool {
        self.planner.is_complete(world)
    }

    /// Execute one step and return its commands, sorted by pearl id.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Invariant`] if internal bookkeeping breaks.
    pub fn step(&mut self, world: &mut World) -> Result<Vec<Command>, SimulationError> {
        Ok(self.step_with_report(world)?.commands)
    }

    /// Execute one step and return the full report.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Invariant`] if internal bookkeeping breaks.
    pub fn step_with_report(&mut self, world: &mut World) -> Result<StepReport, SimulationError> {
        self.step = self.step.saturating_add(1);
        let step = self.step;
        let mut report = StepReport {
            step,
            ..StepReport::default()
        };

        // --- Phase 1: Observe ---
        self.planner.observe(world, step, &mut report.planning)?;

        // --- Phase 2: Retry ---
        self.planner.retry_stalled(world, step, &mut report.planning)?;

        // --- Phase 3: Propose ---
        let proposals = self.planner.proposals(world, step, &mut report.planning)?;

        // --- Phase 4: Resolve ---
        let winners = self.phase_resolve(&proposals, &mut report);

        // --- Phase 5: Commit ---
        self.phase_commit(world, &winners, &mut report)?;

        // --- Phase 6: Work ---
        self.phase_work(world, &mut report)?;

        // --- Phase 7: Verify ---
        let tally = self.planner.tally();
        if let AccountingResult::Anomaly(violation) = accounting::verify_accounting(world, &tally) {
            return Err(violation.into());
        }
        report.tally = tally;

        info!(
            step,
            commands = report.commands.len(),
            conflicts_lost = report.conflicts_lost.len(),
            layers_digested = report.layers_digested.len(),
            stalled = tally.stalled,
            digested = tally.digested,
            active = tally.active,
            "Step completed"
        );
        Ok(report)
    }

    /// Phase 4: resolve claims per target worker. Returns the winning
    /// proposals in ascending pearl id.
    fn phase_resolve(&mut self, proposals: &[Proposal], report: &mut StepReport) -> Vec<Proposal> {
        let claims: Vec<Claim> = proposals.iter().map(Proposal::claim).collect();
        let outcomes = conflict::resolve_worker_conflicts(&claims, self.aging_credit);

        let mut winners = Vec::new();
        for proposal in proposals {
            match outcomes.get(&proposal.pearl_id) {
                Some(ClaimOutcome::Granted) => winners.push(*proposal),
                Some(ClaimOutcome::Rejected { winner }) => {
                    debug!(
                        step = self.step,
                        pearl = %proposal.pearl_id,
                        winner = %winner,
                        target = %proposal.step.target,
                        "Conflict lost, requeued"
                    );
                    self.planner.on_lost(proposal.pearl_id);
                    report.conflicts_lost.push(proposal.pearl_id);
                }
                None => {}
            }
        }
        winners.sort_by_key(|p| p.pearl_id);
        winners
    }

    /// Phase 5: apply each winning step to the world.
    fn phase_commit(
        &mut self,
        world: &mut World,
        winners: &[Proposal],
        report: &mut StepReport,
    ) -> Result<(), SimulationError> {
        let step = self.step;
        let mut claimed: BTreeSet<WorkerId> = BTreeSet::new();

        for proposal in winners {
            let id = proposal.pearl_id;
            let (source, target) = (proposal.step.source, proposal.step.target);
            if !claimed.insert(target) {
                return Err(InvariantViolation::DoubleCommit {
                    worker: target,
                    step,
                }
                .into());
            }

            if source != target && world.edge_cost(source, target).is_none() {
                return Err(InvariantViolation::NotAnEdge {
                    pearl: id,
                    from: source,
                    to: target,
                }
                .into());
            }
            world.move_pearl(id, target)?;

            if let Action::Process(color) = proposal.step.action {
                self.queue_task(world, id, target, color)?;
            }

            self.planner.on_committed(world, id, step, &mut report.planning)?;
            report.commands.push(Command {
                step,
                pearl_id: id,
                source_worker: source,
                target_worker: target,
                action: proposal.step.action,
            });
        }
        Ok(())
    }

    /// Queue the pearl's outer layer on `worker`.
    fn queue_task(
        &self,
        world: &mut World,
        pearl: PearlId,
        worker: WorkerId,
        color: PearlColor,
    ) -> Result<(), InvariantViolation> {
        let layer = world
            .pearl(pearl)
            .ok_or(InvariantViolation::UnknownPearl(pearl))?
            .outer_layer()
            .copied();
        let Some(layer) = layer.filter(|l| l.color() == color) else {
            return Err(InvariantViolation::LayerColorMismatch {
                pearl,
                expected: color,
                found: layer.map(|l| l.color()),
            });
        };
        let target = world
            .worker_mut(worker)
            .ok_or(InvariantViolation::UnknownWorker(worker))?;
        let steps = target
            .processing_steps(&layer)
            .ok_or(InvariantViolation::IncapableSelected {
                pearl,
                worker,
                color,
            })?;
        target.enqueue(Task {
            pearl_id: pearl,
            color,
            remaining_steps: steps,
        });
        debug!(step = self.step, pearl = %pearl, worker = %worker, color = %color, steps, "Task queued");
        Ok(())
    }

    /// Phase 6: every worker works its head task for one step.
    fn phase_work(&mut self, world: &mut World, report: &mut StepReport) -> Result<(), SimulationError> {
        let step = self.step;
        for worker_id in world.worker_ids() {
            let finished = world
                .worker_mut(worker_id)
                .ok_or(InvariantViolation::UnknownWorker(worker_id))?
                .advance();
            let Some(task) = finished else {
                continue;
            };

            let pearl = world
                .pearl_mut(task.pearl_id)
                .ok_or(InvariantViolation::UnknownPearl(task.pearl_id))?;
            if pearl.current_worker != worker_id {
                return Err(InvariantViolation::TaskOffSite {
                    pearl: task.pearl_id,
                    worker: worker_id,
                    actual: pearl.current_worker,
                }
                .into());
            }
            let outer = pearl.outer_layer().map(|l| l.color());
            if outer != Some(task.color) {
                return Err(InvariantViolation::LayerColorMismatch {
                    pearl: task.pearl_id,
                    expected: task.color,
                    found: outer,
                }
                .into());
            }
            pearl.pop_outer_layer();

            debug!(step, pearl = %task.pearl_id, worker = %worker_id, color = %task.color, "Layer digested");
            report.layers_digested.push(LayerDigest {
                pearl_id: task.pearl_id,
                worker: worker_id,
                color: task.color,
            });
            self.planner
                .on_layer_finished(world, task.pearl_id, step, &mut report.planning)?;
        }
        Ok(())
    }
}
