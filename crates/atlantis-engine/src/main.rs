//! Command-line driver for the Atlantis pearl simulator.
//!
//! Reads a JSON world description, runs the step loop to completion, and
//! streams one command per line on stdout. Logs go to stderr.
//!
//! # Startup Sequence
//!
//! 1. Parse flags
//! 2. Load configuration (`--config`, else `atlantis-config.yaml` if present)
//! 3. Initialize structured logging
//! 4. Read and validate the world description
//! 5. Run the simulation, streaming commands and optional DOT frames
//! 6. Log the result and exit
//!
//! # Exit codes
//!
//! `0` completed, `1` malformed input or config, `2` invariant violation,
//! `3` step bound reached with pearls still active.

mod cli;
mod error;
mod output;

use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use atlantis_core::config::{LogFormat, LoggingConfig, SimulationConfig};
use atlantis_core::runner::{self, EndReason};
use atlantis_core::simulator::Simulator;
use atlantis_types::WorldDescription;
use atlantis_world::World;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::EngineError;
use crate::output::CommandSink;

/// Exit code when the step bound stops a run with pearls still active.
const EXIT_STEP_BOUND: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(&cli);
    let logging = config
        .as_ref()
        .map_or_else(|_| LoggingConfig::default(), |c| c.logging.clone());
    init_logging(&cli, &logging);

    match config.and_then(|config| run(&cli, &config)) {
        Ok(EndReason::Completed) => ExitCode::SUCCESS,
        Ok(EndReason::MaxStepsReached) => ExitCode::from(EXIT_STEP_BOUND),
        Err(e) => {
            error!(error = %e, "atlantis-engine failed");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Load the configuration file (if any) and apply flag overrides.
fn load_config(cli: &Cli) -> Result<SimulationConfig, EngineError> {
    let mut config = match cli.config_path() {
        Some(path) => SimulationConfig::from_file(&path)?,
        None => SimulationConfig::default(),
    };
    cli.apply(&mut config);
    Ok(config)
}

/// Initialize `tracing` on stderr. `RUST_LOG` wins over the configured level.
fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let format = cli.log_format.map_or(logging.format, Into::into);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn run(cli: &Cli, config: &SimulationConfig) -> Result<EndReason, EngineError> {
    info!(
        max_steps = config.simulation.max_steps,
        return_to_gate = config.simulation.return_to_gate,
        render = config.render.enabled,
        "Configuration loaded"
    );

    let description = read_description(cli.input.as_deref())?;
    let mut world = World::from_description(&description, &config.capabilities)?;
    info!(
        workers = world.worker_count(),
        edges = world.edge_count(),
        pearls = world.pearl_count(),
        "World built"
    );

    let mut simulator = Simulator::new(config, &world)?;

    let render_dir = if config.render.enabled {
        prepare_render_dir(&config.render.output_path)?;
        Some(config.render.output_path.clone())
    } else {
        None
    };
    let stdout = BufWriter::new(std::io::stdout().lock());
    let mut sink = CommandSink::new(stdout, cli.format, render_dir);
    sink.render_initial(&world)
        .map_err(|e| EngineError::from(runner::RunnerError::from(e)))?;

    let result = runner::run_simulation(
        &mut world,
        &mut simulator,
        config.simulation.max_steps,
        &mut sink,
    )?;
    sink.finish()?;

    runner::log_simulation_end(&result);
    Ok(result.end_reason)
}

/// Read the description from `path`, or stdin when absent.
fn read_description(path: Option<&Path>) -> Result<WorldDescription, EngineError> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path).map_err(|source| EngineError::Input {
            path: path.to_path_buf(),
            source,
        })?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|source| EngineError::Input {
                    path: PathBuf::from("-"),
                    source,
                })?;
            text
        }
    };
    Ok(WorldDescription::from_json(&text)?)
}

fn prepare_render_dir(path: &Path) -> Result<(), EngineError> {
    std::fs::create_dir_all(path).map_err(|source| EngineError::RenderDir {
        path: path.to_path_buf(),
        source,
    })
}
