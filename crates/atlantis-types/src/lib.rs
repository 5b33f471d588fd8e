//! Shared type definitions for the Atlantis pearl-processing simulation.
//!
//! This crate is the single source of truth for the values that cross crate
//! boundaries: identifiers, the pearl model, emitted commands, and the world
//! description read at startup.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe integer wrappers for worker and pearl identifiers
//! - [`enums`] -- Colors, worker kinds, and planning lifecycle enums
//! - [`structs`] -- [`Pearl`] and [`PearlLayer`]
//! - [`commands`] -- [`Command`] values and their line encoding
//! - [`description`] -- Serde model of the input world description

pub mod commands;
pub mod description;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use commands::{Action, Command};
pub use description::{
    EdgeDescription, LayerDescription, PearlDescription, WorkerDescription, WorldDescription,
};
pub use enums::{PearlColor, PearlPhase, PlanEvent, WorkerKind};
pub use ids::{PearlId, WorkerId};
pub use structs::{Pearl, PearlLayer};
