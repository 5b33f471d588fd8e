//! Error types for the `atlantis-world` crate.
//!
//! Every variant describes malformed input or a request that does not fit
//! the topology. Construction errors are raised before the first step runs.

use atlantis_types::{PearlColor, PearlId, WorkerId};
use rust_decimal::Decimal;

/// Errors that can occur while building or mutating the world graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The description contains no workers.
    #[error("world has no workers")]
    EmptyWorld,

    /// A worker was not found in the world graph.
    #[error("worker not found: {0}")]
    WorkerNotFound(WorkerId),

    /// A pearl was not found among the active pearls.
    #[error("pearl not found: {0}")]
    PearlNotFound(PearlId),

    /// Two workers share an identifier.
    #[error("duplicate worker id: {0}")]
    DuplicateWorker(WorkerId),

    /// Two pearls share an identifier.
    #[error("duplicate pearl id: {0}")]
    DuplicatePearl(PearlId),

    /// An edge connects a worker to itself.
    #[error("edge from worker {0} to itself")]
    SelfLoop(WorkerId),

    /// An edge carries a negative transfer cost.
    #[error("edge {from}-{to} has negative cost {cost}")]
    NegativeEdgeCost {
        /// First endpoint.
        from: WorkerId,
        /// Second endpoint.
        to: WorkerId,
        /// The offending cost.
        cost: Decimal,
    },

    /// The same edge is listed twice with different costs.
    #[error("edge {from}-{to} listed with cost {existing} and {requested}")]
    ConflictingEdge {
        /// First endpoint.
        from: WorkerId,
        /// Second endpoint.
        to: WorkerId,
        /// Cost recorded first.
        existing: Decimal,
        /// Cost listed again.
        requested: Decimal,
    },

    /// A cost table carries a negative processing rate.
    #[error("worker {worker} has negative rate {rate} for {color}")]
    NegativeRate {
        /// The worker whose table is invalid.
        worker: WorkerId,
        /// The color with the bad rate.
        color: PearlColor,
        /// The offending rate.
        rate: Decimal,
    },

    /// A pearl was asked to move between workers that share no edge.
    #[error("workers {from} and {to} are not adjacent")]
    NotAdjacent {
        /// Current worker.
        from: WorkerId,
        /// Requested destination.
        to: WorkerId,
    },
}
