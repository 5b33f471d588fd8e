//! Error types for the simulation core.
//!
//! Unroutable pearls are not errors here: they stall and are reported.
//! Everything below means the simulator's own bookkeeping broke, and the
//! run cannot continue.

use atlantis_types::{PearlColor, PearlId, WorkerId};
use atlantis_world::WorldError;
use rust_decimal::Decimal;

/// An internal consistency check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// A route or plan cost came out negative.
    #[error("negative cost {cost} at worker {worker}")]
    NegativeCost {
        /// The worker being priced.
        worker: WorkerId,
        /// The offending cost.
        cost: Decimal,
    },

    /// A route visits the same worker twice.
    #[error("route for pearl {pearl} revisits worker {worker}")]
    RepeatedWorker {
        /// The pearl being routed.
        pearl: PearlId,
        /// The repeated worker.
        worker: WorkerId,
    },

    /// A plan step was committed between workers that share no edge.
    #[error("pearl {pearl} stepped from {from} to {to} without an edge")]
    NotAnEdge {
        /// The pearl being moved.
        pearl: PearlId,
        /// Source worker.
        from: WorkerId,
        /// Target worker.
        to: WorkerId,
    },

    /// A plan's pending step does not start where the pearl is.
    #[error("plan for pearl {pearl} starts at {planned} but pearl is at {actual}")]
    PlanOutOfSync {
        /// The pearl.
        pearl: PearlId,
        /// Source of the pending step.
        planned: WorkerId,
        /// The pearl's actual worker.
        actual: WorkerId,
    },

    /// Two commits targeted one worker in a single step.
    #[error("worker {worker} received two commits in step {step}")]
    DoubleCommit {
        /// The contested worker.
        worker: WorkerId,
        /// The step.
        step: u64,
    },

    /// A worker was handed a layer it cannot process.
    #[error("worker {worker} is incapable of the {color} layer of pearl {pearl}")]
    IncapableSelected {
        /// The pearl.
        pearl: PearlId,
        /// The worker.
        worker: WorkerId,
        /// The layer color.
        color: PearlColor,
    },

    /// A finished task's color does not match the pearl's outer layer.
    #[error("pearl {pearl}: finished {expected} layer but outer layer is {found:?}")]
    LayerColorMismatch {
        /// The pearl.
        pearl: PearlId,
        /// Color of the task that finished.
        expected: PearlColor,
        /// The pearl's actual outer layer color, if any.
        found: Option<PearlColor>,
    },

    /// A finished task belongs to a pearl at a different worker.
    #[error("pearl {pearl} finished at {worker} but sits at {actual}")]
    TaskOffSite {
        /// The pearl.
        pearl: PearlId,
        /// Worker whose task finished.
        worker: WorkerId,
        /// Where the pearl actually is.
        actual: WorkerId,
    },

    /// Pearl counts no longer add up.
    #[error(
        "accounting mismatch: entered {entered} != digested {digested} + stalled {stalled} + active {active} (world holds {in_world})"
    )]
    Accounting {
        /// Pearls ever observed.
        entered: usize,
        /// Pearls fully digested.
        digested: usize,
        /// Pearls stalled.
        stalled: usize,
        /// Pearls still active.
        active: usize,
        /// Pearls the world still holds.
        in_world: usize,
    },

    /// Queued tasks do not match pearls in progress.
    #[error("{tasks} queued tasks but {in_progress} pearls in progress")]
    LoadMismatch {
        /// Tasks across all workers.
        tasks: usize,
        /// Pearls in the in-progress phase.
        in_progress: usize,
    },

    /// Internal state referenced a pearl that does not exist.
    #[error("unknown pearl {0}")]
    UnknownPearl(PearlId),

    /// Internal state referenced a worker that does not exist.
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),

    /// The world rejected an update the simulator believed valid.
    #[error("world rejected update: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },
}

/// Errors that can occur during a simulation step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// An internal invariant was violated.
    #[error("invariant violated: {source}")]
    Invariant {
        /// The violated invariant.
        #[from]
        source: InvariantViolation,
    },
}

impl From<WorldError> for SimulationError {
    fn from(source: WorldError) -> Self {
        Self::Invariant {
            source: InvariantViolation::from(source),
        }
    }
}
