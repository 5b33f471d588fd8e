//! Conflict resolution for contested workers.
//!
//! A worker accepts at most one new task or arrival per step. When several
//! pearls claim the same target worker in one step, exactly one claim is
//! granted and the rest are rejected and retried next step.
//!
//! Claims are ordered by priority cost, `live_cost - aging_credit *
//! times_lost`, so a pearl that keeps losing eventually sorts first. Ties
//! fall back to plan sequence (first planned, first served) and then to the
//! pearl id.

use std::collections::BTreeMap;

use atlantis_types::{PearlId, WorkerId};
use rust_decimal::Decimal;

/// One pearl's claim on a target worker for the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    /// The claiming pearl.
    pub pearl_id: PearlId,
    /// The worker the pending step moves the pearl to.
    pub target: WorkerId,
    /// Live cost of the pearl's remaining plan.
    pub live_cost: Decimal,
    /// Plan sequence number; lower was planned earlier.
    pub sequence: u64,
    /// Conflicts lost since the pearl last won.
    pub times_lost: u32,
}

impl Claim {
    /// Priority cost of the claim; lower wins. Saturates at [`Decimal::MIN`].
    pub fn priority(&self, aging_credit: Decimal) -> Decimal {
        aging_credit
            .checked_mul(Decimal::from(self.times_lost))
            .and_then(|credit| self.live_cost.checked_sub(credit))
            .unwrap_or(Decimal::MIN)
    }
}

/// The outcome of conflict resolution for a single claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim may commit this step.
    Granted,
    /// Another claim on the same worker won.
    Rejected {
        /// The pearl that won the worker.
        winner: PearlId,
    },
}

/// Resolve all claims of one step.
///
/// Every claim receives exactly one outcome, and each target worker has at
/// most one [`ClaimOutcome::Granted`].
pub fn resolve_worker_conflicts(
    claims: &[Claim],
    aging_credit: Decimal,
) -> BTreeMap<PearlId, ClaimOutcome> {
    let mut by_target: BTreeMap<WorkerId, Vec<&Claim>> = BTreeMap::new();
    for claim in claims {
        by_target.entry(claim.target).or_default().push(claim);
    }

    let mut outcomes = BTreeMap::new();
    for contenders in by_target.into_values() {
        let Some(winner) = contenders.iter().min_by(|a, b| {
            a.priority(aging_credit)
                .cmp(&b.priority(aging_credit))
                .then_with(|| a.sequence.cmp(&b.sequence))
                .then_with(|| a.pearl_id.cmp(&b.pearl_id))
        }) else {
            continue;
        };
        let winner = winner.pearl_id;
        for claim in contenders {
            let outcome = if claim.pearl_id == winner {
                ClaimOutcome::Granted
            } else {
                ClaimOutcome::Rejected { winner }
            };
            outcomes.insert(claim.pearl_id, outcome);
        }
    }
    outcomes
}
