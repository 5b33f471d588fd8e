//! Pearl and layer model.
//!
//! A [`Pearl`] is an ordered stack of [`PearlLayer`]s, outermost first.
//! Layers can only be removed from the outside, which is what keeps the
//! processing order of a pearl fixed no matter where it is routed.

use std::collections::VecDeque;

use serde::Serialize;

use crate::enums::PearlColor;
use crate::ids::{PearlId, WorkerId};

/// One colored, thickness-bearing unit within a pearl.
///
/// Immutable once created; the thickness is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PearlLayer {
    color: PearlColor,
    thickness: u32,
}

impl PearlLayer {
    /// Create a layer, or `None` when `thickness` is zero.
    ///
    /// A zero-thickness layer is already digested and never enters a pearl.
    pub const fn new(color: PearlColor, thickness: u32) -> Option<Self> {
        if thickness == 0 {
            None
        } else {
            Some(Self { color, thickness })
        }
    }

    /// The layer's color.
    pub const fn color(&self) -> PearlColor {
        self.color
    }

    /// The layer's thickness (always at least 1).
    pub const fn thickness(&self) -> u32 {
        self.thickness
    }
}

impl core::fmt::Display for PearlLayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.color.initial(), self.thickness)
    }
}

/// A layered unit of work sitting at (or travelling between) workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pearl {
    /// The pearl's identifier.
    pub id: PearlId,
    /// The worker currently holding the pearl.
    pub current_worker: WorkerId,
    /// Remaining layers, outermost first.
    layers: VecDeque<PearlLayer>,
}

impl Pearl {
    /// Create a pearl at `worker` from layers listed outer-to-inner.
    pub fn new(
        id: PearlId,
        worker: WorkerId,
        layers: impl IntoIterator<Item = PearlLayer>,
    ) -> Self {
        Self {
            id,
            current_worker: worker,
            layers: layers.into_iter().collect(),
        }
    }

    /// The layer that must be processed next, if any.
    pub fn outer_layer(&self) -> Option<&PearlLayer> {
        self.layers.front()
    }

    /// Remaining layers, outermost first.
    pub fn layers(&self) -> impl Iterator<Item = &PearlLayer> {
        self.layers.iter()
    }

    /// Number of layers left.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Whether every layer has been removed.
    pub fn is_digested(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total thickness across all remaining layers.
    pub fn remaining_thickness(&self) -> u64 {
        self.layers.iter().map(|l| u64::from(l.thickness())).sum()
    }

    /// Remove and return the outermost layer.
    pub fn pop_outer_layer(&mut self) -> Option<PearlLayer> {
        self.layers.pop_front()
    }
}

impl core::fmt::Display for Pearl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{},", self.id)?;
        for layer in &self.layers {
            write!(f, " ({layer})")?;
        }
        Ok(())
    }
}
