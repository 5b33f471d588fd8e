//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode between reading the input and
//! flushing the last command, and maps each one to a process exit code.

use std::path::PathBuf;

use atlantis_core::runner::RunnerError;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Reading the world description failed.
    #[error("failed to read input {path}: {source}")]
    Input {
        /// Where the description was read from (`-` for stdin).
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The world description is not valid JSON for the expected shape.
    #[error("malformed world description: {source}")]
    Description {
        /// The underlying parse error.
        #[from]
        source: serde_json::Error,
    },

    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: atlantis_core::config::ConfigError,
    },

    /// The description parsed but does not form a valid world.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: atlantis_world::WorldError,
    },

    /// The render directory could not be prepared.
    #[error("failed to prepare render directory {path}: {source}")]
    RenderDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the command stream failed.
    #[error("failed to write output: {source}")]
    Output {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The simulation loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: RunnerError,
    },
}

impl EngineError {
    /// Process exit code for this error.
    ///
    /// Invariant violations inside a step exit with 2; everything else is
    /// a bad input, config, or environment and exits with 1.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Runner {
                source: RunnerError::Step { .. },
            } => 2,
            _ => 1,
        }
    }
}
