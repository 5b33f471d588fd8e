//! Bounded simulation loop.
//!
//! [`run_simulation`] drives [`Simulator::step_with_report`] until the world
//! is complete or the step bound is reached, calling a [`StepCallback`]
//! after every step (the binary uses it to stream commands and render
//! frames). [`run_to_completion`] is the callback-free form.

use atlantis_types::{Command, PearlId};
use atlantis_world::World;
use serde::Serialize;
use tracing::{info, warn};

use crate::accounting::PearlTally;
use crate::error::SimulationError;
use crate::simulator::{Simulator, StepReport};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// Every pearl was digested or stalled and no work remains.
    Completed,
    /// The step bound was hit with work remaining.
    MaxStepsReached,
}

/// Result of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    /// The reason the run ended.
    pub end_reason: EndReason,
    /// Total number of steps executed.
    pub total_steps: u64,
    /// Every committed command, in step order then pearl id.
    pub commands: Vec<Command>,
    /// Pearls left stalled (unroutable).
    pub stalled: Vec<PearlId>,
    /// Pearl counts after the last step.
    pub tally: PearlTally,
}

/// Callback invoked after each step completes.
pub trait StepCallback {
    /// Called after a step completes successfully.
    ///
    /// # Errors
    ///
    /// An error aborts the run and is returned from [`run_simulation`].
    fn on_step(&mut self, report: &StepReport, world: &World) -> Result<(), CallbackError>;
}

/// Error raised by a [`StepCallback`].
#[derive(Debug, thiserror::Error)]
#[error("step callback failed: {message}")]
pub struct CallbackError {
    /// What went wrong.
    pub message: String,
}

/// Errors that can occur during a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A step failed.
    #[error("step error: {source}")]
    Step {
        /// The underlying simulation error.
        #[from]
        source: SimulationError,
    },

    /// The per-step callback failed.
    #[error(transparent)]
    Callback(#[from] CallbackError),
}

/// A no-op step callback.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_step(&mut self, _report: &StepReport, _world: &World) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Run until complete or until `max_steps` steps ran (zero means no bound).
///
/// # Errors
///
/// Returns [`RunnerError::Step`] if a step violates an invariant.
pub fn run_to_completion(
    world: &mut World,
    simulator: &mut Simulator,
    max_steps: u64,
) -> Result<SimulationResult, RunnerError> {
    run_simulation(world, simulator, max_steps, &mut NoOpCallback)
}

/// Run the simulation loop, calling `callback` after every step.
///
/// # Errors
///
/// Returns [`RunnerError`] if a step or the callback fails.
pub fn run_simulation(
    world: &mut World,
    simulator: &mut Simulator,
    max_steps: u64,
    callback: &mut dyn StepCallback,
) -> Result<SimulationResult, RunnerError> {
    let mut commands = Vec::new();
    let mut total_steps: u64 = 0;

    info!(
        max_steps,
        workers = world.worker_count(),
        pearls = world.pearl_count(),
        "Simulation starting"
    );

    let end_reason = loop {
        if simulator.is_complete(world) {
            break EndReason::Completed;
        }
        if max_steps > 0 && total_steps >= max_steps {
            info!(max_steps, "Step limit reached");
            break EndReason::MaxStepsReached;
        }

        let report = simulator.step_with_report(world)?;
        total_steps = total_steps.saturating_add(1);
        callback.on_step(&report, world)?;
        commands.extend(report.commands);
    };

    Ok(SimulationResult {
        end_reason,
        total_steps,
        commands,
        stalled: simulator.stalled_pearls(),
        tally: simulator.planner().tally(),
    })
}

/// Log the end-of-run summary.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_steps = result.total_steps,
        commands = result.commands.len(),
        entered = result.tally.entered,
        digested = result.tally.digested,
        stalled = result.tally.stalled,
        active = result.tally.active,
        "Simulation ended"
    );

    for pearl in &result.stalled {
        warn!(pearl = %pearl, "Pearl left unroutable");
    }
    if result.end_reason == EndReason::MaxStepsReached {
        warn!(active = result.tally.active, "Simulation ended with pearls still active");
    }
}
