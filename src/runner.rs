//! Running a single reduction job.

use std::ffi::OsStr;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::models::{FailureReason, JobResult, JobStatus, WorkUnit};
use crate::process::{self, CommandLine, ProcessError};

/// Job runner trait.
///
/// Executes one [WorkUnit] to completion and reports its outcome. Implementations must not
/// fail: every problem running the job is recorded as a failed [JobResult].
pub trait JobRunner: Send + Sync {
    /// Run the job for `unit`, waiting for it to finish.
    fn execute(&self, unit: WorkUnit) -> impl Future<Output = JobResult> + Send;
}

/// Runs the external reduction command as a child process.
///
/// The command is invoked as `<command> <setup file> -r <output dir> -o`, with its combined
/// output written to `<output>/<job name>.log`.
#[derive(Debug)]
pub struct ReductionRunner {
    command: CommandLine,
    timeout: Option<Duration>,
}

impl ReductionRunner {
    /// Returns a new runner.
    ///
    /// # Arguments
    ///
    /// * `command`: Reduction command, e.g. `run_pypeit`
    /// * `timeout`: Optional limit on how long each reduction may run
    pub fn new(command: CommandLine, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl JobRunner for ReductionRunner {
    #[tracing::instrument(level = "INFO", skip(self, unit), fields(job = %unit.name))]
    async fn execute(&self, unit: WorkUnit) -> JobResult {
        tracing::info!("Processing config from {}", unit.descriptor.display());
        let start = Instant::now();
        let log_path = unit.log_path();
        let output_dir = unit.output_dir();
        let args = [
            unit.descriptor.as_os_str(),
            OsStr::new("-r"),
            output_dir.as_os_str(),
            OsStr::new("-o"),
        ];

        let status = match process::run_logged(&self.command, args, &log_path, self.timeout).await
        {
            Ok(status) if status.success() => JobStatus::Succeeded,
            Ok(status) => JobStatus::Failed(FailureReason::Exit {
                code: status.code(),
            }),
            Err(ProcessError::Timeout { timeout, .. }) => {
                JobStatus::Failed(FailureReason::Timeout {
                    after_secs: timeout.as_secs(),
                })
            }
            Err(err) => {
                tracing::error!("{}", err);
                JobStatus::Failed(FailureReason::Start {
                    message: err.to_string(),
                })
            }
        };

        let result = JobResult::new(&unit, status, start.elapsed());
        match &result.status {
            JobStatus::Succeeded => tracing::info!("Reduced {}", unit.descriptor.display()),
            JobStatus::Failed(reason) => {
                tracing::error!(
                    "Error encountered while reducing {}: {}",
                    unit.descriptor.display(),
                    reason
                );
                tracing::error!("Log can be found at {}", result.log_path.display());
            }
        }
        result
    }
}
