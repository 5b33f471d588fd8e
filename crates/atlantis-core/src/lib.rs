//! Economic engine, execution planner, and step loop for the Atlantis simulator.
//!
//! # Modules
//!
//! - [`accounting`] -- Per-step pearl accounting check.
//! - [`config`] -- YAML configuration loading.
//! - [`conflict`] -- One-claim-per-worker conflict resolution.
//! - [`economy`] -- Bounded route search pricing layers at candidate workers.
//! - [`error`] -- Invariant violations and simulation errors.
//! - [`planner`] -- Per-pearl lifecycle state machine and execution plans.
//! - [`runner`] -- Bounded run loop with per-step callbacks.
//! - [`simulator`] -- The phased step cycle producing commands.

pub mod accounting;
pub mod config;
pub mod conflict;
pub mod economy;
pub mod error;
pub mod planner;
pub mod runner;
pub mod simulator;

pub use config::{ConfigError, SimulationConfig};
pub use economy::{EconomicEngine, RouteEntry, RouteError};
pub use error::{InvariantViolation, SimulationError};
pub use planner::{ExecutionPlan, PlanStep, Planner};
pub use runner::{EndReason, RunnerError, SimulationResult, run_to_completion};
pub use simulator::{Simulator, StepReport};
