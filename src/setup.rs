//! Setup file generation.
//!
//! Before anything can be reduced, PypeIt's setup step sorts the raw files into instrument
//! configurations and writes one setup file per configuration. It runs once per invocation,
//! before discovery, and its failure aborts the run.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::Lev2Error;
use crate::models::RunContext;
use crate::process::{self, CommandLine};

/// Name of the log file capturing the setup generator output.
const SETUP_LOG_NAME: &str = "setup.log";

/// Runs the external setup command, e.g. `pypeit_setup`.
#[derive(Debug)]
pub struct SetupGenerator {
    command: CommandLine,
}

impl SetupGenerator {
    /// Returns a new generator running `command`.
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }

    /// Arguments passed to the setup command for `context`.
    fn args(context: &RunContext) -> Vec<OsString> {
        vec![
            "-r".into(),
            context.input_dir.join(&context.root).into_os_string(),
            "-s".into(),
            context.instrument.clone().into(),
            "-c".into(),
            "all".into(),
            "-d".into(),
            context.setup_dir().into_os_string(),
        ]
    }

    /// Path of the setup log for `context`.
    pub fn log_path(context: &RunContext) -> PathBuf {
        context.output_dir.join(SETUP_LOG_NAME)
    }

    /// Generate the setup files for `context` into its setup directory.
    #[tracing::instrument(level = "INFO", skip_all, fields(instrument = %context.instrument))]
    pub async fn generate(&self, context: &RunContext) -> Result<(), Lev2Error> {
        tracing::info!(
            "Looking for files matching {}*",
            context.input_dir.join(&context.root).display()
        );
        tracing::info!("Setup files will be saved in {}", context.setup_dir().display());
        let log = Self::log_path(context);
        let status = process::run_logged(&self.command, Self::args(context), &log, None)
            .await
            .map_err(|err| Lev2Error::Setup {
                message: err.to_string(),
                log: log.clone(),
            })?;
        if !status.success() {
            return Err(Lev2Error::Setup {
                message: format!("{} exited with {}", self.command.program(), status),
                log,
            });
        }
        Ok(())
    }
}
