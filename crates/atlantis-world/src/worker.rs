//! Worker capability model and per-worker workload queue.
//!
//! A worker's cost for a layer is data, not behaviour: every [`WorkerKind`]
//! looks up a [`CostTable`] of processing rates (thickness units per step).
//! A missing color or a zero rate means the worker cannot process that
//! color at all.
//!
//! Cost is `thickness / rate`. The number of steps a layer occupies the
//! worker is that cost rounded up, with a floor of one step.

use std::collections::{BTreeMap, VecDeque};

use atlantis_types::{Pearl, PearlColor, PearlId, PearlLayer, WorkerId, WorkerKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// Result of asking a worker what a layer would cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The worker can process the layer at this cost.
    Cost(Decimal),
    /// The worker cannot process the layer's color.
    Incapable,
}

impl Capability {
    /// The finite cost, or `None` when incapable.
    pub const fn cost(self) -> Option<Decimal> {
        match self {
            Self::Cost(c) => Some(c),
            Self::Incapable => None,
        }
    }

    /// Whether the worker can process the layer.
    pub const fn is_capable(self) -> bool {
        matches!(self, Self::Cost(_))
    }
}

/// Processing rates per color.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostTable {
    rates: BTreeMap<PearlColor, Decimal>,
}

impl CostTable {
    /// Build a table from `(color, rate)` pairs.
    pub fn new(rates: impl IntoIterator<Item = (PearlColor, Decimal)>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
        }
    }

    /// The same rate for every color.
    pub fn flat(rate: Decimal) -> Self {
        Self::new(PearlColor::ALL.map(|c| (c, rate)))
    }

    /// The usable rate for a color; `None` when missing or zero.
    pub fn rate(&self, color: PearlColor) -> Option<Decimal> {
        self.rates
            .get(&color)
            .copied()
            .filter(|r| r.is_sign_positive() && !r.is_zero())
    }

    /// Reject negative rates.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NegativeRate`] naming the first bad entry.
    pub fn validate(&self, worker: WorkerId) -> Result<(), WorldError> {
        match self.rates.iter().find(|(_, r)| r.is_sign_negative() && !r.is_zero()) {
            Some((color, rate)) => Err(WorldError::NegativeRate {
                worker,
                color: *color,
                rate: *rate,
            }),
            None => Ok(()),
        }
    }

    /// Cost of processing `layer` under this table, saturating at
    /// [`Decimal::MAX`].
    pub fn evaluate(&self, layer: &PearlLayer) -> Capability {
        self.rate(layer.color()).map_or(Capability::Incapable, |rate| {
            Capability::Cost(
                Decimal::from(layer.thickness())
                    .checked_div(rate)
                    .unwrap_or(Decimal::MAX),
            )
        })
    }
}

/// Default cost tables for each worker kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Rates for [`WorkerKind::General`] workers.
    #[serde(default = "default_general")]
    pub general: CostTable,
    /// Rates for [`WorkerKind::Vector`] workers.
    #[serde(default = "default_vector")]
    pub vector: CostTable,
    /// Rates for [`WorkerKind::Matrix`] workers.
    #[serde(default = "default_matrix")]
    pub matrix: CostTable,
}

impl CapabilityConfig {
    /// The table a kind falls back to when a worker has no override.
    pub const fn for_kind(&self, kind: WorkerKind) -> &CostTable {
        match kind {
            WorkerKind::General => &self.general,
            WorkerKind::Vector => &self.vector,
            WorkerKind::Matrix => &self.matrix,
        }
    }
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            general: default_general(),
            vector: default_vector(),
            matrix: default_matrix(),
        }
    }
}

fn default_general() -> CostTable {
    CostTable::flat(Decimal::ONE)
}

fn default_vector() -> CostTable {
    CostTable::new([
        (PearlColor::Red, Decimal::ONE),
        (PearlColor::Green, Decimal::from(5)),
        (PearlColor::Blue, Decimal::from(2)),
    ])
}

fn default_matrix() -> CostTable {
    CostTable::new([
        (PearlColor::Red, Decimal::ONE),
        (PearlColor::Green, Decimal::from(2)),
        (PearlColor::Blue, Decimal::from(10)),
    ])
}

/// A layer-processing job sitting in a worker's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Task {
    /// The pearl whose outer layer is being processed.
    pub pearl_id: PearlId,
    /// Color of the layer; checked against the pearl when the task finishes.
    pub color: PearlColor,
    /// Steps of work left, at least 1 while queued.
    pub remaining_steps: u32,
}

/// A processing node in the world graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    /// Worker identifier.
    pub id: WorkerId,
    /// Capability variant.
    pub kind: WorkerKind,
    cost_table: CostTable,
    workload: VecDeque<Task>,
}

impl Worker {
    /// Create an idle worker.
    pub const fn new(id: WorkerId, kind: WorkerKind, cost_table: CostTable) -> Self {
        Self {
            id,
            kind,
            cost_table,
            workload: VecDeque::new(),
        }
    }

    /// The worker's processing rates.
    pub const fn cost_table(&self) -> &CostTable {
        &self.cost_table
    }

    /// Cost of processing a single layer here. Pure.
    pub fn evaluate_cost(&self, layer: &PearlLayer) -> Capability {
        self.cost_table.evaluate(layer)
    }

    /// Cost of processing every remaining layer of a pearl here.
    ///
    /// Saturates at [`Decimal::MAX`].
    pub fn cost_pearl(&self, pearl: &Pearl) -> Capability {
        let mut total = Decimal::ZERO;
        for layer in pearl.layers() {
            match self.evaluate_cost(layer) {
                Capability::Cost(c) => total = total.checked_add(c).unwrap_or(Decimal::MAX),
                Capability::Incapable => return Capability::Incapable,
            }
        }
        Capability::Cost(total)
    }

    /// Steps the worker needs for `layer`, or `None` when incapable.
    ///
    /// Saturates at `u32::MAX` steps.
    pub fn processing_steps(&self, layer: &PearlLayer) -> Option<u32> {
        let cost = self.evaluate_cost(layer).cost()?;
        Some(cost.ceil().to_u32().unwrap_or(u32::MAX).max(1))
    }

    /// Count of queued and in-progress tasks.
    pub fn current_load(&self) -> usize {
        self.workload.len()
    }

    /// Append a task to the back of the queue.
    pub fn enqueue(&mut self, task: Task) {
        self.workload.push_back(task);
    }

    /// Work the head task for one step. Returns it once finished.
    pub fn advance(&mut self) -> Option<Task> {
        let head = self.workload.front_mut()?;
        head.remaining_steps = head.remaining_steps.saturating_sub(1);
        if head.remaining_steps == 0 {
            self.workload.pop_front()
        } else {
            None
        }
    }
}

impl core::fmt::Display for Worker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}, Load: {}", self.kind, self.id, self.workload.len())
    }
}
