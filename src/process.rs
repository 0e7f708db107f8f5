//! External process execution with output captured to a log file.

use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

/// A command to run: a program plus any leading arguments, e.g. `python -m pypeit.scripts.setup`.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Split a command on whitespace. Returns `None` if it is blank.
    pub fn parse(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(String::from);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Ways running a logged process can fail before it produces an exit status.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The log file could not be created
    #[error("failed to open log file {}: {source}", .path.display())]
    Log {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// The process could not be launched
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Waiting for the process failed
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    /// The process was killed after exceeding its timeout
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
}

/// Run `command` followed by `args`, sending both stdout and stderr to a freshly truncated `log`
/// file, and wait for it to exit.
///
/// The log file handles are owned by this function and closed when it returns, whether or not
/// the process could be launched. With a `timeout` the process is killed once it expires;
/// without one it runs to completion.
///
/// # Arguments
///
/// * `command`: Command to run, its program is looked up in `PATH` if not a path
/// * `args`: Arguments appended to the command
/// * `log`: Path of the log file
/// * `timeout`: Optional time limit
pub async fn run_logged<I, S>(
    command: &CommandLine,
    args: I,
    log: &Path,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = command.program();
    let log_error = |source| ProcessError::Log {
        path: log.to_path_buf(),
        source,
    };
    let stdout = File::create(log).map_err(log_error)?;
    let stderr = stdout.try_clone().map_err(log_error)?;

    let mut builder = Command::new(program);
    builder
        .args(&command.args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    // Own process group, so a timeout also reaches processes started by wrapper scripts.
    #[cfg(unix)]
    builder.process_group(0);
    let mut child = builder
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let wait_error = |source| ProcessError::Wait {
        program: program.to_string(),
        source,
    };
    match timeout {
        None => child.wait().await.map_err(wait_error),
        Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status.map_err(wait_error),
            Err(_) => {
                #[cfg(unix)]
                kill_process_group(&child, program);
                // Reap the child so it does not linger as a zombie.
                if let Err(err) = child.kill().await {
                    tracing::warn!("failed to kill {}: {}", program, err);
                }
                Err(ProcessError::Timeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        },
    }
}

/// Send SIGKILL to the process group led by `child`.
#[cfg(unix)]
fn kill_process_group(child: &tokio::process::Child, program: &str) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::warn!("failed to kill process group of {}: {}", program, err);
    }
}
