//! Command-line arguments.
//!
//! Flags override the matching fields of the YAML configuration file.

use std::path::{Path, PathBuf};

use atlantis_core::config::{LogFormat, SimulationConfig};
use clap::{Parser, ValueEnum};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "atlantis-config.yaml";

/// Atlantis pearl simulator: reads a world description and streams the
/// commands that digest every pearl.
#[derive(Parser, Debug)]
#[command(name = "atlantis-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// World description JSON (stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log line format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// Command stream format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write one DOT file per step
    #[arg(long)]
    pub enable_render: bool,

    /// Directory for rendered DOT files
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    /// Stop after this many steps (0 = unlimited)
    #[arg(long)]
    pub max_steps: Option<u64>,
}

/// How commands are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Tab-separated line per command.
    Text,
    /// One JSON object per line.
    Json,
}

/// `--log-format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable lines.
    Pretty,
    /// JSON objects.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

impl Cli {
    /// The config file to load, if any.
    ///
    /// An explicit `--config` is always returned so a missing file is an
    /// error; the default file is only used when it exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                default.exists().then(|| default.to_path_buf())
            }
        }
    }

    /// Apply flag overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut SimulationConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
        if self.enable_render {
            config.render.enabled = true;
        }
        if let Some(path) = &self.output_path {
            config.render.output_path.clone_from(path);
        }
        if let Some(max_steps) = self.max_steps {
            config.simulation.max_steps = max_steps;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_read_stdin_as_text() {
        let cli = Cli::try_parse_from(["atlantis-engine"]).unwrap();
        assert!(cli.input.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.enable_render);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "atlantis-engine",
            "--input",
            "world.json",
            "--format",
            "json",
            "--log-format",
            "json",
            "--log-level",
            "debug",
            "--enable-render",
            "--output-path",
            "frames",
            "--max-steps",
            "40",
        ])
        .unwrap();

        let mut config = SimulationConfig::default();
        cli.apply(&mut config);

        assert_eq!(cli.input.as_deref(), Some(Path::new("world.json")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.render.enabled);
        assert_eq!(config.render.output_path, PathBuf::from("frames"));
        assert_eq!(config.simulation.max_steps, 40);
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let cli = Cli::try_parse_from(["atlantis-engine"]).unwrap();
        let mut config = SimulationConfig::default();
        config.simulation.max_steps = 12;
        cli.apply(&mut config);
        assert_eq!(config.simulation.max_steps, 12);
        assert!(!config.render.enabled);
    }

    #[test]
    fn explicit_config_path_is_kept_even_if_missing() {
        let cli =
            Cli::try_parse_from(["atlantis-engine", "--config", "/nonexistent/atlantis.yaml"])
                .unwrap();
        assert_eq!(
            cli.config_path(),
            Some(PathBuf::from("/nonexistent/atlantis.yaml"))
        );
    }
}
