//! Step callback that streams commands and renders frames.

use std::io::Write;
use std::path::PathBuf;

use atlantis_core::runner::{CallbackError, StepCallback};
use atlantis_core::simulator::StepReport;
use atlantis_world::{World, render_dot};
use tracing::debug;

use crate::cli::OutputFormat;

/// Writes each step's commands to `out`, and a DOT frame per step when a
/// render directory is set.
pub struct CommandSink<W: Write> {
    out: W,
    format: OutputFormat,
    render_dir: Option<PathBuf>,
}

impl<W: Write> CommandSink<W> {
    /// Create a sink writing in `format`.
    pub const fn new(out: W, format: OutputFormat, render_dir: Option<PathBuf>) -> Self {
        Self {
            out,
            format,
            render_dir,
        }
    }

    /// Write the frame for the world before the first step.
    pub fn render_initial(&self, world: &World) -> Result<(), CallbackError> {
        self.render(0, world)
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn render(&self, step: u64, world: &World) -> Result<(), CallbackError> {
        let Some(dir) = &self.render_dir else {
            return Ok(());
        };
        let path = dir.join(format!("step_{step:05}.dot"));
        std::fs::write(&path, render_dot(world)).map_err(|e| CallbackError {
            message: format!("failed to write {}: {e}", path.display()),
        })?;
        debug!(step, path = %path.display(), "Frame rendered");
        Ok(())
    }
}

impl<W: Write> StepCallback for CommandSink<W> {
    fn on_step(&mut self, report: &StepReport, world: &World) -> Result<(), CallbackError> {
        for command in &report.commands {
            let line = match self.format {
                OutputFormat::Text => command.to_line(),
                OutputFormat::Json => serde_json::to_string(command).map_err(|e| CallbackError {
                    message: format!("failed to encode command: {e}"),
                })?,
            };
            writeln!(self.out, "{line}").map_err(|e| CallbackError {
                message: format!("failed to write command: {e}"),
            })?;
        }
        self.render(report.step, world)
    }
}
