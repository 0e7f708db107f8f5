//! Error handling.

use std::error::Error;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

/// Level 2 reduction error type
///
/// This type encapsulates the errors that are fatal to a whole run. Failures of individual
/// reduction jobs are not errors: they are recorded in a [JobResult](crate::models::JobResult)
/// and never propagate past the job that produced them.
#[derive(Debug, Error)]
pub enum Lev2Error {
    /// Invalid or incomplete configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Error reading or parsing the configuration file
    #[error("failed to load configuration file {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// Error scanning the setup files directory
    #[error("failed to discover setup files in {}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem error outside of an individual job
    #[error("I/O error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error building the ingestion HTTP client
    #[error("failed to build ingestion client")]
    NotificationClient(#[from] reqwest::Error),

    /// The setup file name pattern could not be built
    #[error("invalid setup file pattern")]
    Pattern(#[from] regex::Error),

    /// Error acquiring a worker slot
    #[error("error acquiring a worker slot")]
    SemaphoreAcquire(#[from] AcquireError),

    /// Error serialising the run summary
    #[error("failed to serialise run summary")]
    Serialize(#[from] serde_json::Error),

    /// The setup generator could not be run or exited unsuccessfully
    #[error("setup generation failed: {message}; log can be found at {}", .log.display())]
    Setup { message: String, log: PathBuf },

    /// Requested instrument is not in the instrument table
    #[error("unknown instrument {instrument}; available options are: {options}")]
    UnknownInstrument { instrument: String, options: String },
}

impl Lev2Error {
    /// Create a configuration error from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap a [std::io::Error] with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Log this error and its chain of causes at error level.
    pub fn log(&self) {
        event!(Level::ERROR, "{}", self);
        let mut current = self.source();
        while let Some(source) = current {
            event!(Level::ERROR, "Caused by: {}", source);
            current = source.source();
        }
    }
}
