//! Pearl accounting verification.
//!
//! After every step the simulator checks that no pearl was silently lost:
//!
//! ```text
//! entered == digested + stalled + active
//! ```
//!
//! and cross-checks the planner's tally against the world itself (pearls
//! still held, tasks still queued). The planner keeps these numbers in step
//! by construction, so a mismatch means corrupted bookkeeping.

use atlantis_world::World;
use serde::Serialize;

use crate::error::InvariantViolation;

/// Pearl counts by lifecycle bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PearlTally {
    /// Pearls ever observed.
    pub entered: usize,
    /// Pearls that reached the terminal digested state.
    pub digested: usize,
    /// Pearls with no reachable capable worker.
    pub stalled: usize,
    /// Pearls still moving or being processed.
    pub active: usize,
    /// Active pearls sitting in a worker queue.
    pub in_progress: usize,
}

/// The result of an accounting check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingResult {
    /// All counts agree.
    Balanced,
    /// A count disagrees.
    Anomaly(InvariantViolation),
}

/// Verify the planner's tally against itself and the world.
pub fn verify_accounting(world: &World, tally: &PearlTally) -> AccountingResult {
    let accounted = tally
        .digested
        .checked_add(tally.stalled)
        .and_then(|n| n.checked_add(tally.active));
    let held = tally.stalled.checked_add(tally.active);

    if accounted != Some(tally.entered) || held != Some(world.pearl_count()) {
        return AccountingResult::Anomaly(InvariantViolation::Accounting {
            entered: tally.entered,
            digested: tally.digested,
            stalled: tally.stalled,
            active: tally.active,
            in_world: world.pearl_count(),
        });
    }

    let tasks = world.total_load();
    if tasks != tally.in_progress {
        return AccountingResult::Anomaly(InvariantViolation::LoadMismatch {
            tasks,
            in_progress: tally.in_progress,
        });
    }

    AccountingResult::Balanced
}
