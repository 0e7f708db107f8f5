//! This file defines the pypeit-lev2 binary entry point.

use std::process::ExitCode;

use pypeit_lev2::app;
use pypeit_lev2::cli;
use pypeit_lev2::tracing;

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    match app::run(&args).await {
        Ok(summary) => app::exit_code(summary.as_ref(), args.strict),
        Err(err) => {
            err.log();
            ExitCode::FAILURE
        }
    }
}
