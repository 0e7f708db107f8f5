use crate::config::RtiConfig;
use crate::models::*;
use crate::notification::NotificationSink;
use crate::process::CommandLine;
use crate::runner::JobRunner;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

/// Configuration file with two instruments and RTI settings.
pub(crate) const TEST_CONFIG: &str = "\
[INSTRUMENTS]
keck_inst_names = DEIMOS KCWI
pypeit_inst_names = keck_deimos keck_kcwi
roots = DE. KB.

[RTI]
url = http://localhost:8000/ingest
user = koa
pw = secret
rti_ingesttype = lev2
rti_reingest = False
rti_testonly = True
rti_dev = False
timeout = 5
";

/// Create a RunContext for `keck_deimos` without RTI settings.
pub(crate) fn test_context(
    input_dir: impl Into<PathBuf>,
    output_dir: impl Into<PathBuf>,
) -> Arc<RunContext> {
    Arc::new(RunContext {
        input_dir: input_dir.into(),
        output_dir: output_dir.into(),
        setup_dir_name: "setup_files".to_string(),
        keck_name: "DEIMOS".to_string(),
        instrument: "keck_deimos".to_string(),
        root: "DE.".to_string(),
        concurrency: 2,
        rti: None,
        start_time: time::macros::datetime!(2024-03-05 07:08:09 UTC),
    })
}

/// Create a RunContext for `keck_deimos` with RTI settings pointing at `url`.
pub(crate) fn test_context_with_rti(
    input_dir: impl Into<PathBuf>,
    output_dir: impl Into<PathBuf>,
    url: &str,
) -> Arc<RunContext> {
    let context = test_context(input_dir, output_dir);
    let mut context = Arc::try_unwrap(context).unwrap();
    context.rti = Some(RtiConfig {
        url: Url::parse(url).unwrap(),
        user: "koa".to_string(),
        password: "secret".to_string(),
        ingest_type: "lev2".to_string(),
        reingest: "False".to_string(),
        test_only: "True".to_string(),
        dev: "False".to_string(),
        timeout: Duration::from_secs(5),
    });
    Arc::new(context)
}

/// Create a WorkUnit called `name` with a setup file in the setup directory.
pub(crate) fn test_unit(context: &Arc<RunContext>, name: &str) -> WorkUnit {
    let descriptor = context.setup_dir().join(format!("{}.pypeit", name));
    test_unit_at(context, name, &descriptor)
}

/// Create a WorkUnit called `name` with the given setup file.
pub(crate) fn test_unit_at(context: &Arc<RunContext>, name: &str, descriptor: &Path) -> WorkUnit {
    WorkUnit {
        name: name.to_string(),
        descriptor: descriptor.to_path_buf(),
        context: context.clone(),
    }
}

/// Create `count` WorkUnits called `keck_deimos_1` to `keck_deimos_<count>`.
pub(crate) fn test_units(context: &Arc<RunContext>, count: usize) -> Vec<WorkUnit> {
    (1..=count)
        .map(|i| test_unit(context, &format!("keck_deimos_{}", i)))
        .collect()
}

/// Create an empty file, and any missing parent directories.
pub(crate) fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "").unwrap();
}

/// Write a shell script into `dir` and return a command running it with `sh`.
pub(crate) fn script_command(dir: &Path, body: &str) -> CommandLine {
    let script = dir.join(format!("script-{}.sh", SCRIPT_ID.fetch_add(1, Ordering::SeqCst)));
    std::fs::write(&script, body).unwrap();
    CommandLine::parse(&format!("sh {}", script.display())).unwrap()
}

static SCRIPT_ID: AtomicUsize = AtomicUsize::new(0);

/// JobRunner that sleeps instead of running a process, tracking how it was called.
#[derive(Debug, Default)]
pub(crate) struct FakeRunner {
    delay: Duration,
    exit_codes: HashMap<String, i32>,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Make the job called `name` fail with exit code `code`.
    pub(crate) fn failing(mut self, name: &str, code: i32) -> Self {
        self.exit_codes.insert(name.to_string(), code);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl JobRunner for FakeRunner {
    async fn execute(&self, unit: WorkUnit) -> JobResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(unit.name.clone());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        let status = match self.exit_codes.get(&unit.name) {
            Some(code) => JobStatus::Failed(FailureReason::Exit { code: Some(*code) }),
            None => JobStatus::Succeeded,
        };
        JobResult::new(&unit, status, self.delay)
    }
}

/// JobRunner that panics for one job and succeeds for the rest.
#[derive(Debug)]
pub(crate) struct PanickingRunner {
    name: String,
}

impl PanickingRunner {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl JobRunner for PanickingRunner {
    async fn execute(&self, unit: WorkUnit) -> JobResult {
        if unit.name == self.name {
            panic!("reduction of {} exploded", unit.name);
        }
        JobResult::new(&unit, JobStatus::Succeeded, Duration::ZERO)
    }
}

/// NotificationSink recording the names of the jobs it was notified of.
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    notified: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    async fn notify(&self, result: &JobResult, _context: &RunContext) {
        self.notified.lock().unwrap().push(result.name.clone());
    }
}

/// NotificationSink that panics whenever it is notified.
#[derive(Debug, Default)]
pub(crate) struct PanickingNotifier;

impl NotificationSink for PanickingNotifier {
    async fn notify(&self, result: &JobResult, _context: &RunContext) {
        panic!("alerting for {} exploded", result.name);
    }
}
