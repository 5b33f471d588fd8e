//! Command types emitted by the simulator.
//!
//! A [`Command`] is a value, never stored by the core: each committed plan
//! step produces exactly one, and the step function hands them back sorted
//! by pearl id. The line encoding is byte-stable so an external harness can
//! diff two runs.

use serde::{Deserialize, Serialize};

use crate::enums::PearlColor;
use crate::ids::{PearlId, WorkerId};

/// What a committed plan step does with the pearl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Hand the pearl one hop along an edge without processing it.
    Pass,
    /// Hand the pearl to the target (possibly itself) and queue the outer
    /// layer of the given color on the target's workload.
    Process(PearlColor),
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Pass => f.write_str("Pass"),
            Self::Process(color) => write!(f, "Process:{color}"),
        }
    }
}

/// A single committed action in the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// The 1-based step in which the action was committed.
    pub step: u64,
    /// The pearl being acted on.
    pub pearl_id: PearlId,
    /// Where the pearl was before the action.
    pub source_worker: WorkerId,
    /// Where the pearl is after the action.
    pub target_worker: WorkerId,
    /// The action kind.
    pub action: Action,
}

impl Command {
    /// Encode as one tab-separated line (without the trailing newline):
    /// `step pearl source target action`.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.step, self.pearl_id, self.source_worker, self.target_worker, self.action
        )
    }
}
