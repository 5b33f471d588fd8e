//! Configuration loading and typed config structures for the Atlantis simulator.
//!
//! The canonical configuration lives in `atlantis-config.yaml` next to the
//! binary's working directory. This module defines strongly-typed structs
//! that mirror the YAML structure and a loader that reads it. Every field is
//! optional in the file; missing values take the defaults below.

use std::path::{Path, PathBuf};

use atlantis_types::WorkerId;
use atlantis_world::CapabilityConfig;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulator configuration.
///
/// Mirrors the structure of `atlantis-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Per-kind processing rate tables.
    #[serde(default)]
    pub capabilities: CapabilityConfig,

    /// Route costing and conflict parameters.
    #[serde(default)]
    pub economy: EconomyConfig,

    /// Run bounds and lifecycle toggles.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-step DOT rendering.
    #[serde(default)]
    pub render: RenderConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Route costing and conflict resolution parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EconomyConfig {
    /// Cost added per task already queued at a candidate worker.
    #[serde(default = "default_load_penalty_per_task")]
    pub load_penalty_per_task: Decimal,

    /// How far a plan's live cost may exceed its planned cost before the
    /// plan is recomputed.
    #[serde(default = "default_replan_threshold")]
    pub replan_threshold: Decimal,

    /// Longest route, in hops, the engine explores.
    #[serde(default = "default_max_route_hops")]
    pub max_route_hops: usize,

    /// Priority credit per lost conflict, so a repeatedly losing pearl
    /// eventually sorts first.
    #[serde(default = "default_aging_credit")]
    pub aging_credit: Decimal,

    /// Penalise workers close to the gate so work spreads outwards.
    #[serde(default)]
    pub gate_affinity: bool,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            load_penalty_per_task: default_load_penalty_per_task(),
            replan_threshold: default_replan_threshold(),
            max_route_hops: default_max_route_hops(),
            aging_credit: default_aging_credit(),
            gate_affinity: false,
        }
    }
}

/// Run bounds and lifecycle toggles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Stop after this many steps. Zero means unlimited.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Route fully digested pearls back to the gate worker.
    #[serde(default)]
    pub return_to_gate: bool,

    /// The gate worker. Defaults to the lowest worker id.
    #[serde(default)]
    pub gate_worker: Option<WorkerId>,

    /// Retry stalled pearls every N steps. Zero means never.
    #[serde(default)]
    pub stall_retry_steps: u64,
}

impl Default for SimulationBoundsConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            return_to_gate: false,
            gate_worker: None,
            stall_retry_steps: 0,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Per-step DOT rendering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenderConfig {
    /// Write one `.dot` file per step.
    #[serde(default)]
    pub enabled: bool,

    /// Directory receiving the rendered files.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_path: default_output_path(),
        }
    }
}

const fn default_load_penalty_per_task() -> Decimal {
    Decimal::ONE
}

const fn default_replan_threshold() -> Decimal {
    Decimal::TWO
}

const fn default_max_route_hops() -> usize {
    8
}

const fn default_aging_credit() -> Decimal {
    Decimal::ONE
}

const fn default_max_steps() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("out")
}
