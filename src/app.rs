//! A single level 2 reduction run, from configuration to summary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use expanduser::expanduser;
use time::OffsetDateTime;

use crate::cli::CommandLineArgs;
use crate::config::Lev2Config;
use crate::discovery;
use crate::dispatcher::Dispatcher;
use crate::error::Lev2Error;
use crate::models::{JobResult, RunContext, RunSummary, WorkUnit};
use crate::notification::{DisabledNotifier, NotificationSink, RtiNotifier};
use crate::process::CommandLine;
use crate::resource_manager;
use crate::runner::ReductionRunner;
use crate::setup::SetupGenerator;

/// Name of the run summary written to the output directory.
pub const SUMMARY_FILE_NAME: &str = "lev2_summary.json";

/// Exit code used with `--strict` when any reduction failed.
const FAILED_JOBS_EXIT_CODE: u8 = 2;

/// Run the tool for the given command line arguments.
///
/// Returns `None` if only the instrument options were requested, otherwise the summary of the
/// run. Failures of individual reductions are reported in the summary, not as errors.
pub async fn run(args: &CommandLineArgs) -> Result<Option<RunSummary>, Lev2Error> {
    let config_path = expand(&args.config_file)?;
    tracing::debug!("loading configuration from {}", config_path.display());
    let config = Lev2Config::load(&config_path)?;

    if args.instrument_options {
        println!("Options are: {}", config.instruments.options());
        return Ok(None);
    }

    let context = Arc::new(build_context(args, &config)?);
    std::fs::create_dir_all(&context.output_dir)
        .map_err(|err| Lev2Error::io(&context.output_dir, err))?;

    if args.skip_setup {
        tracing::info!("Skipping setup, reducing existing setup files");
    } else {
        SetupGenerator::new(command(&args.setup_command)?)
            .generate(&context)
            .await?;
    }

    let units = discovery::discover(&context, &args.extension)?;
    log_units(&units);
    let total = units.len();

    let results = if args.setup_only {
        tracing::info!("Setup only, not reducing {} configurations", total);
        Vec::new()
    } else {
        tracing::info!(
            "Launching {} processes to reduce {} configurations",
            context.concurrency.min(total),
            total
        );
        let runner = ReductionRunner::new(
            command(&args.reduce_command)?,
            args.job_timeout.map(Duration::from_secs),
        );
        match &context.rti {
            Some(rti) => dispatch(runner, RtiNotifier::new(rti.timeout)?, &context, units).await?,
            None => dispatch(runner, DisabledNotifier, &context, units).await?,
        }
    };

    let summary = RunSummary::new(&context, total, args.setup_only, results);
    let summary_path = context.output_dir.join(SUMMARY_FILE_NAME);
    summary.write(&summary_path)?;
    tracing::info!(
        "{} of {} reductions succeeded, {} failed; summary written to {}",
        summary.succeeded,
        summary.total,
        summary.failed,
        summary_path.display()
    );
    Ok(Some(summary))
}

/// Process exit code for a finished run.
///
/// Failed reductions only affect the exit code when `strict` is set.
pub fn exit_code(summary: Option<&RunSummary>, strict: bool) -> ExitCode {
    match summary {
        Some(summary) if strict && summary.has_failures() => {
            ExitCode::from(FAILED_JOBS_EXIT_CODE)
        }
        _ => ExitCode::SUCCESS,
    }
}

/// Build the run context from the command line and configuration.
fn build_context(args: &CommandLineArgs, config: &Lev2Config) -> Result<RunContext, Lev2Error> {
    let instrument = args
        .instrument
        .as_deref()
        .ok_or_else(|| Lev2Error::config("no instrument given"))?;
    let (keck_name, pypeit_name, root) = match (config.instruments.lookup(instrument), &args.root)
    {
        (Some(options), root) => (
            options.keck_name.clone(),
            options.pypeit_name.clone(),
            root.clone().unwrap_or_else(|| options.root.clone()),
        ),
        // Instruments missing from the table can still be reduced given an explicit root.
        (None, Some(root)) => (instrument.to_string(), instrument.to_string(), root.clone()),
        (None, None) => {
            return Err(Lev2Error::UnknownInstrument {
                instrument: instrument.to_string(),
                options: config.instruments.options(),
            })
        }
    };

    let input_dir = match &args.input_dir {
        Some(dir) => expand(dir)?,
        None => std::env::current_dir().map_err(|err| Lev2Error::io(".", err))?,
    };
    let output_dir = match &args.output_dir {
        Some(dir) => expand(dir)?,
        None => std::env::current_dir()
            .map_err(|err| Lev2Error::io(".", err))?
            .join("redux"),
    };
    let concurrency = args
        .num_proc
        .map(|n| n.get())
        .unwrap_or_else(resource_manager::default_slot_limit);
    let rti = if args.no_notify {
        None
    } else {
        config.rti.clone()
    };
    if rti.is_none() {
        tracing::warn!("RTI will not be alerted of completed reductions");
    }

    Ok(RunContext {
        input_dir,
        output_dir,
        setup_dir_name: args.setup_dir.clone(),
        keck_name,
        instrument: pypeit_name,
        root,
        concurrency,
        rti,
        start_time: OffsetDateTime::now_utc(),
    })
}

async fn dispatch<S: NotificationSink + 'static>(
    runner: ReductionRunner,
    notifier: S,
    context: &RunContext,
    units: Vec<WorkUnit>,
) -> Result<Vec<JobResult>, Lev2Error> {
    Dispatcher::new(runner, notifier, context.concurrency)
        .run(units)
        .await
}

fn log_units(units: &[WorkUnit]) {
    tracing::info!("Found the following setup files:");
    for unit in units {
        tracing::info!("    {}", unit.descriptor.display());
        tracing::info!(
            "Output file directory for {}: {}",
            unit.name,
            unit.output_dir().display()
        );
    }
}

fn command(command: &str) -> Result<CommandLine, Lev2Error> {
    CommandLine::parse(command).ok_or_else(|| Lev2Error::config("command must not be empty"))
}

fn expand(path: &str) -> Result<PathBuf, Lev2Error> {
    expanduser(path).map_err(|err| Lev2Error::io(path, err))
}
