//! Alerting RTI, the ingestion service, that a reduction is ready.
//!
//! Notifications are best effort: a failed alert is logged and never changes the outcome of
//! the job it reports on. There is no retry.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::error::Lev2Error;
use crate::models::{JobResult, RunContext};

/// Query parameters of an ingestion request.
#[derive(Debug, PartialEq, Serialize)]
pub struct NotificationRecord<'a> {
    instrument: &'a str,
    koaid: &'a str,
    ingesttype: &'a str,
    datadir: String,
    start: String,
    reingest: &'a str,
    testonly: &'a str,
    dev: &'a str,
}

impl<'a> NotificationRecord<'a> {
    /// Build the record for a completed job, or `None` if RTI is not configured.
    pub fn new(result: &'a JobResult, context: &'a RunContext) -> Option<Self> {
        let rti = context.rti.as_ref()?;
        Some(Self {
            instrument: &context.keck_name,
            koaid: &result.name,
            ingesttype: &rti.ingest_type,
            datadir: result.output_dir.display().to_string(),
            start: context.start_time_string(),
            reingest: &rti.reingest,
            testonly: &rti.test_only,
            dev: &rti.dev,
        })
    }
}

/// Notification sink trait.
///
/// Invoked once for every successful job. Implementations never fail.
pub trait NotificationSink: Send + Sync {
    /// Report that the products of `result` are ready for ingestion.
    fn notify(&self, result: &JobResult, context: &RunContext)
        -> impl Future<Output = ()> + Send;
}

/// Sends an authenticated HTTP GET to the RTI endpoint configured in the [RunContext].
#[derive(Debug)]
pub struct RtiNotifier {
    client: reqwest::Client,
}

impl RtiNotifier {
    /// Returns a new notifier whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, Lev2Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl NotificationSink for RtiNotifier {
    #[tracing::instrument(level = "DEBUG", skip(self, result, context), fields(job = %result.name))]
    async fn notify(&self, result: &JobResult, context: &RunContext) {
        let (Some(rti), Some(record)) = (&context.rti, NotificationRecord::new(result, context))
        else {
            tracing::debug!("RTI is not configured, not alerting");
            return;
        };
        tracing::info!(
            "Alerting RTI that {} is ready for ingestion",
            result.output_dir.display()
        );
        let request = self
            .client
            .get(rti.url.clone())
            .query(&record)
            .basic_auth(&rti.user, Some(&rti.password));
        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::info!("Sent {} ({})", response.url(), status);
                } else {
                    tracing::warn!("RTI responded with {} to {}", status, response.url());
                }
            }
            Err(err) => {
                tracing::error!("Error caught while alerting RTI at {}: {}", rti.url, err);
            }
        }
    }
}

/// Sink used when notifications are turned off.
#[derive(Debug, Default)]
pub struct DisabledNotifier;

impl NotificationSink for DisabledNotifier {
    async fn notify(&self, result: &JobResult, _context: &RunContext) {
        tracing::debug!("notifications disabled, not alerting RTI for {}", result.name);
    }
}
