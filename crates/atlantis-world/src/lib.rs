//! Topology and worker capabilities for the Atlantis simulator.
//!
//! This crate models the physical side of the simulation: workers as nodes
//! of an undirected weighted graph, their processing rates per pearl color,
//! their task queues, and the pearls currently sitting at each of them.
//!
//! # Modules
//!
//! - [`error`] -- Error types for world construction and mutation.
//! - [`render`] -- Graphviz DOT rendering of the current world.
//! - [`worker`] -- [`Worker`] with its [`CostTable`], cost evaluation, and
//!   FIFO workload of [`Task`]s.
//! - [`world_map`] -- The [`World`] graph: validation on build, neighbor
//!   queries, pearl placement, and shortest paths.

pub mod error;
pub mod render;
pub mod worker;
pub mod world_map;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use render::render_dot;
pub use worker::{Capability, CapabilityConfig, CostTable, Task, Worker};
pub use world_map::{World, build_world};
