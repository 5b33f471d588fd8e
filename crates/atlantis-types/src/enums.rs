//! Enumeration types for the Atlantis simulation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pearl colors
// ---------------------------------------------------------------------------

/// The color of a pearl layer.
///
/// Each worker kind processes colors at different rates, which is what
/// makes routing a layer to the right worker worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PearlColor {
    /// Red layer.
    Red,
    /// Green layer.
    Green,
    /// Blue layer.
    Blue,
}

impl PearlColor {
    /// All colors in declaration order.
    pub const ALL: [Self; 3] = [Self::Red, Self::Green, Self::Blue];

    /// Single-letter abbreviation used in compact renderings.
    pub const fn initial(self) -> char {
        match self {
            Self::Red => 'R',
            Self::Green => 'G',
            Self::Blue => 'B',
        }
    }
}

impl core::fmt::Display for PearlColor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Red => "Red",
            Self::Green => "Green",
            Self::Blue => "Blue",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Worker kinds
// ---------------------------------------------------------------------------

/// The capability variant of a worker.
///
/// Serialized under the `flavor` key of the world description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkerKind {
    /// Flat baseline cost for every color.
    General,
    /// Fast on green, decent on blue.
    Vector,
    /// Fast on blue, decent on green.
    Matrix,
}

impl core::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::General => "General",
            Self::Vector => "Vector",
            Self::Matrix => "Matrix",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Planning lifecycle
// ---------------------------------------------------------------------------

/// The lifecycle event that caused an execution plan to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlanEvent {
    /// The pearl was observed at a worker for the first time.
    FirstSeen,
    /// A layer finished processing and the pearl still has layers left.
    LayerDigested,
    /// The pearl has no layers left; the plan routes it back to the gate.
    FullyDigested,
    /// The previous plan was invalidated at dispatch time.
    Replanned,
}

/// Where a tracked pearl currently sits in its lifecycle.
///
/// `Unseen` is implicit: a pearl the planner has no record of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PearlPhase {
    /// A plan exists and its pending step is proposed every step.
    Planned,
    /// The pearl sits in a worker's queue while its outer layer is processed.
    InProgress,
    /// A layer completed; a new plan is created at the next step.
    AwaitingReplan,
    /// The pearl is digested and travelling back to the gate worker.
    Returning,
    /// No capable worker is reachable; excluded from commits.
    Stalled,
    /// Terminal: all layers removed and the pearl left the active set.
    FullyDigested,
}

impl PearlPhase {
    /// Whether a pearl in this phase proposes an action during a step.
    pub const fn proposes(self) -> bool {
        matches!(self, Self::Planned | Self::AwaitingReplan | Self::Returning)
    }
}
