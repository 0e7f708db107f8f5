//! Data types and associated functions and methods

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum_macros::Display;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::RtiConfig;

/// Process-wide settings shared read-only by every job in one invocation.
#[derive(Debug)]
pub struct RunContext {
    /// Directory containing the raw files
    pub input_dir: PathBuf,
    /// Directory reductions and logs are written to
    pub output_dir: PathBuf,
    /// Name of the setup files directory under `input_dir`
    pub setup_dir_name: String,
    /// Keck instrument name, reported to RTI
    pub keck_name: String,
    /// PypeIt spectrograph name. Setup files are named `<instrument>_<index>`.
    pub instrument: String,
    /// Raw file root, e.g. `DE.`
    pub root: String,
    /// Maximum number of reductions running at once
    pub concurrency: usize,
    /// Ingestion settings, if RTI should be alerted
    pub rti: Option<RtiConfig>,
    /// UTC time the run started
    pub start_time: OffsetDateTime,
}

impl RunContext {
    /// Directory the setup files are generated into and discovered from.
    pub fn setup_dir(&self) -> PathBuf {
        self.input_dir.join(&self.setup_dir_name)
    }

    /// Run start time in the form `YYYY-MM-DD HH:MM:SS.ffffff`.
    pub fn start_time_string(&self) -> String {
        format_start_time(self.start_time)
    }
}

pub(crate) fn format_start_time(start_time: OffsetDateTime) -> String {
    let format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
    // Formatting a UTC date with a static description only fails for years beyond 9999.
    start_time
        .format(format)
        .unwrap_or_else(|_| start_time.unix_timestamp().to_string())
}

/// One reducible configuration, represented by its setup file.
#[derive(Clone, Debug)]
pub struct WorkUnit {
    /// Job name, the stem of the setup file, e.g. `keck_deimos_A`
    pub name: String,
    /// Path to the setup file
    pub descriptor: PathBuf,
    /// Shared run context
    pub context: Arc<RunContext>,
}

impl WorkUnit {
    /// Path of the log file capturing the reduction output.
    pub fn log_path(&self) -> PathBuf {
        self.context.output_dir.join(format!("{}.log", self.name))
    }

    /// Directory the reduction writes its products to.
    pub fn output_dir(&self) -> PathBuf {
        self.context.output_dir.join(&self.name)
    }
}

/// Why a reduction job failed.
#[derive(Clone, Debug, Display, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureReason {
    /// The reduction exited with a non-zero status, or was killed by a signal (no code)
    #[strum(serialize = "exited unsuccessfully")]
    Exit { code: Option<i32> },
    /// The log file could not be opened or the reduction could not be launched
    #[strum(serialize = "failed to start")]
    Start { message: String },
    /// The reduction was killed after exceeding the job timeout
    #[strum(serialize = "timed out")]
    Timeout { after_secs: u64 },
    /// The worker running the reduction panicked
    #[strum(serialize = "worker panicked")]
    Panicked { message: String },
}

/// Outcome of a reduction job.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum JobStatus {
    Succeeded,
    Failed(FailureReason),
}

/// Result of running one [WorkUnit] to completion.
#[derive(Clone, Debug, Serialize)]
pub struct JobResult {
    /// Job name
    pub name: String,
    /// Path to the setup file
    pub descriptor: PathBuf,
    /// Outcome
    #[serde(flatten)]
    pub status: JobStatus,
    /// Path to the captured output
    pub log_path: PathBuf,
    /// Directory the reduction wrote its products to
    pub output_dir: PathBuf,
    /// Wall time spent on the job
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl JobResult {
    /// Returns a new result for `unit` with the given status.
    pub fn new(unit: &WorkUnit, status: JobStatus, elapsed: Duration) -> Self {
        Self {
            name: unit.name.clone(),
            descriptor: unit.descriptor.clone(),
            status,
            log_path: unit.log_path(),
            output_dir: unit.output_dir(),
            elapsed,
        }
    }

    /// Returns a failed result for `unit`.
    pub fn failed(unit: &WorkUnit, reason: FailureReason, elapsed: Duration) -> Self {
        Self::new(unit, JobStatus::Failed(reason), elapsed)
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

fn serialize_secs<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_secs_f64())
}

/// Summary of a whole run, written next to the reductions.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// PypeIt spectrograph name
    pub instrument: String,
    /// UTC time the run started
    pub start_time: String,
    /// Whether reductions were skipped
    pub setup_only: bool,
    /// Number of setup files discovered
    pub total: usize,
    /// Number of successful reductions
    pub succeeded: usize,
    /// Number of failed reductions
    pub failed: usize,
    /// Per-job results
    pub results: Vec<JobResult>,
}

impl RunSummary {
    /// Returns a new summary.
    ///
    /// # Arguments
    ///
    /// * `context`: Run context
    /// * `total`: Number of work units discovered
    /// * `setup_only`: Whether reductions were skipped
    /// * `results`: Results of the jobs that ran
    pub fn new(
        context: &RunContext,
        total: usize,
        setup_only: bool,
        results: Vec<JobResult>,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            instrument: context.instrument.clone(),
            start_time: context.start_time_string(),
            setup_only,
            total,
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Whether any reduction failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Write the summary as pretty JSON to `path`.
    pub fn write(&self, path: &Path) -> Result<(), crate::error::Lev2Error> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|err| crate::error::Lev2Error::io(path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::{test_context, test_unit};

    #[test]
    fn unit_paths() {
        let context = test_context("/data/raw", "/data/redux");
        let unit = test_unit(&context, "keck_deimos_A");
        assert_eq!(unit.log_path(), Path::new("/data/redux/keck_deimos_A.log"));
        assert_eq!(unit.output_dir(), Path::new("/data/redux/keck_deimos_A"));
        assert_eq!(context.setup_dir(), Path::new("/data/raw/setup_files"));
    }

    #[test]
    fn start_time_format() {
        let start = time::macros::datetime!(2024-03-05 07:08:09.123456 UTC);
        assert_eq!(format_start_time(start), "2024-03-05 07:08:09.123456");
    }

    #[test]
    fn failure_reason_display() {
        assert_eq!(
            FailureReason::Exit { code: Some(2) }.to_string(),
            "exited unsuccessfully"
        );
        assert_eq!(
            FailureReason::Timeout { after_secs: 10 }.to_string(),
            "timed out"
        );
    }

    #[test]
    fn summary_counts() {
        let context = test_context("/data/raw", "/data/redux");
        let ok = JobResult::new(
            &test_unit(&context, "keck_deimos_A"),
            JobStatus::Succeeded,
            Duration::from_secs(1),
        );
        let failed = JobResult::failed(
            &test_unit(&context, "keck_deimos_B"),
            FailureReason::Exit { code: Some(2) },
            Duration::from_secs(1),
        );
        let summary = RunSummary::new(&context, 2, false, vec![ok, failed]);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.has_failures());
    }

    #[test]
    fn result_json() {
        let context = test_context("/data/raw", "/data/redux");
        let failed = JobResult::failed(
            &test_unit(&context, "keck_deimos_B"),
            FailureReason::Exit { code: Some(2) },
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["name"], "keck_deimos_B");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"]["kind"], "exit");
        assert_eq!(json["reason"]["code"], 2);
        assert_eq!(json["log_path"], "/data/redux/keck_deimos_B.log");
        assert_eq!(json["elapsed"], 1.5);
    }
}
