//! Bounded parallel dispatch of reduction jobs.
//!
//! The [Dispatcher] owns a fixed set of worker slots (see [ResourceManager]). Work units are
//! dispatched in discovery order, each as soon as a slot is free, and every unit runs exactly
//! once. A failed job never stops the remaining units from running. Successful jobs are
//! reported to the [NotificationSink] after their slot has been released.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::Lev2Error;
use crate::models::{FailureReason, JobResult, RunContext, WorkUnit};
use crate::notification::NotificationSink;
use crate::resource_manager::ResourceManager;
use crate::runner::JobRunner;

/// Runs work units on a bounded pool of worker slots.
#[derive(Debug)]
pub struct Dispatcher<R, S> {
    runner: Arc<R>,
    notifier: Arc<S>,
    resource_manager: ResourceManager,
}

impl<R, S> Dispatcher<R, S>
where
    R: JobRunner + 'static,
    S: NotificationSink + 'static,
{
    /// Returns a new dispatcher.
    ///
    /// # Arguments
    ///
    /// * `runner`: Runs each work unit
    /// * `notifier`: Notified of each successful job
    /// * `slot_limit`: Maximum number of jobs running at once
    pub fn new(runner: R, notifier: S, slot_limit: usize) -> Self {
        Self {
            runner: Arc::new(runner),
            notifier: Arc::new(notifier),
            resource_manager: ResourceManager::new(slot_limit),
        }
    }

    /// Run every unit to completion and return one result per unit.
    ///
    /// Results are in completion order, which need not match the order of `units`.
    #[tracing::instrument(level = "DEBUG", skip_all, fields(units = units.len()))]
    pub async fn run(&self, units: Vec<WorkUnit>) -> Result<Vec<JobResult>, Lev2Error> {
        let total = units.len();
        let mut in_flight = JoinSet::new();

        for unit in units {
            // Waits while every slot is busy.
            let slot = self.resource_manager.worker_slot().await?;
            let runner = self.runner.clone();
            let notifier = self.notifier.clone();
            tracing::debug!(
                "dispatching {} ({} of {} slots free)",
                unit.name,
                self.resource_manager.available_slots(),
                self.resource_manager.total_slots()
            );
            in_flight.spawn(async move {
                let context = unit.context.clone();
                let result = run_isolated(runner, unit).await;
                drop(slot);
                if result.is_success() {
                    notify_isolated(notifier, result.clone(), context).await;
                }
                result
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => tracing::error!("reduction task failed: {}", err),
            }
        }
        Ok(results)
    }
}

/// Run a unit on its own task so that a panicking runner still yields a failed result.
async fn run_isolated<R: JobRunner + 'static>(runner: Arc<R>, unit: WorkUnit) -> JobResult {
    let fallback = unit.clone();
    match tokio::spawn(async move { runner.execute(unit).await }).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!("reduction of {} panicked: {}", fallback.name, err);
            JobResult::failed(
                &fallback,
                FailureReason::Panicked {
                    message: err.to_string(),
                },
                Duration::ZERO,
            )
        }
    }
}

/// Notify on a separate task so that a panicking sink cannot lose the job's result.
async fn notify_isolated<S: NotificationSink + 'static>(
    notifier: Arc<S>,
    result: JobResult,
    context: Arc<RunContext>,
) {
    let name = result.name.clone();
    let notification = tokio::spawn(async move { notifier.notify(&result, &context).await });
    if let Err(err) = notification.await {
        tracing::error!("notification for {} panicked: {}", name, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use crate::models::JobStatus;
    use crate::test_utils::{
        test_context, test_units, FakeRunner, PanickingNotifier, PanickingRunner,
        RecordingNotifier,
    };

    #[tokio::test]
    async fn one_result_per_unit() {
        let context = test_context("/data/raw", "/data/redux");
        for slots in [1, 2, 3, 8] {
            for count in [0, 1, 2, 5, 9] {
                let units = test_units(&context, count);
                let dispatcher = Dispatcher::new(
                    FakeRunner::new(Duration::from_millis(5)),
                    RecordingNotifier::default(),
                    slots,
                );
                let results = dispatcher.run(units).await.unwrap();
                assert_eq!(results.len(), count, "slots={} count={}", slots, count);
                let names = results.iter().map(|r| r.name.clone()).collect::<HashSet<_>>();
                assert_eq!(names.len(), count);
                assert_eq!(dispatcher.runner.calls(), count);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_bounded() {
        let context = test_context("/data/raw", "/data/redux");
        for slots in [1, 2, 3] {
            let dispatcher = Dispatcher::new(
                FakeRunner::new(Duration::from_millis(30)),
                RecordingNotifier::default(),
                slots,
            );
            dispatcher.run(test_units(&context, 8)).await.unwrap();
            assert_eq!(dispatcher.runner.max_running(), slots);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn limit_above_unit_count() {
        let context = test_context("/data/raw", "/data/redux");
        let dispatcher = Dispatcher::new(
            FakeRunner::new(Duration::from_millis(30)),
            RecordingNotifier::default(),
            16,
        );
        let results = dispatcher.run(test_units(&context, 3)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(dispatcher.runner.max_running() <= 3);
    }

    #[tokio::test]
    async fn dispatch_order_is_fifo() {
        let context = test_context("/data/raw", "/data/redux");
        let dispatcher = Dispatcher::new(
            FakeRunner::new(Duration::from_millis(1)),
            RecordingNotifier::default(),
            1,
        );
        dispatcher.run(test_units(&context, 4)).await.unwrap();
        assert_eq!(
            dispatcher.runner.started(),
            ["keck_deimos_1", "keck_deimos_2", "keck_deimos_3", "keck_deimos_4"]
        );
    }

    #[tokio::test]
    async fn failure_does_not_stop_others() {
        let context = test_context("/data/raw", "/data/redux");
        let dispatcher = Dispatcher::new(
            FakeRunner::new(Duration::from_millis(1)).failing("keck_deimos_1", 2),
            RecordingNotifier::default(),
            1,
        );
        let mut results = dispatcher.run(test_units(&context, 2)).await.unwrap();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            results[0].status,
            JobStatus::Failed(FailureReason::Exit { code: Some(2) })
        );
        assert_eq!(results[1].status, JobStatus::Succeeded);
        assert_eq!(dispatcher.notifier.notified(), ["keck_deimos_2"]);
    }

    #[tokio::test]
    async fn notify_iff_success() {
        let context = test_context("/data/raw", "/data/redux");
        let dispatcher = Dispatcher::new(
            FakeRunner::new(Duration::from_millis(1))
                .failing("keck_deimos_2", 1)
                .failing("keck_deimos_4", 3),
            RecordingNotifier::default(),
            2,
        );
        let results = dispatcher.run(test_units(&context, 5)).await.unwrap();
        let mut succeeded = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.name.clone())
            .collect::<Vec<_>>();
        succeeded.sort();
        let mut notified = dispatcher.notifier.notified();
        notified.sort();
        assert_eq!(notified, succeeded);
        assert_eq!(notified, ["keck_deimos_1", "keck_deimos_3", "keck_deimos_5"]);
    }

    #[tokio::test]
    async fn empty() {
        let dispatcher = Dispatcher::new(
            FakeRunner::new(Duration::ZERO),
            RecordingNotifier::default(),
            4,
        );
        assert!(dispatcher.run(vec![]).await.unwrap().is_empty());
        assert_eq!(dispatcher.runner.calls(), 0);
        assert!(dispatcher.notifier.notified().is_empty());
    }

    #[tokio::test]
    async fn panic_becomes_failure() {
        let context = test_context("/data/raw", "/data/redux");
        let dispatcher = Dispatcher::new(
            PanickingRunner::new("keck_deimos_2"),
            RecordingNotifier::default(),
            2,
        );
        let mut results = dispatcher.run(test_units(&context, 3)).await.unwrap();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(results.len(), 3);
        assert!(matches!(
            results[1].status,
            JobStatus::Failed(FailureReason::Panicked { .. })
        ));
        assert!(results[0].is_success());
        assert!(results[2].is_success());
        assert_eq!(results[1].log_path, context.output_dir.join("keck_deimos_2.log"));
    }

    #[tokio::test]
    async fn notification_panic_keeps_result() {
        let context = test_context("/data/raw", "/data/redux");
        let dispatcher = Dispatcher::new(
            FakeRunner::new(Duration::from_millis(1)),
            PanickingNotifier,
            2,
        );
        let results = dispatcher.run(test_units(&context, 3)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_success()));
    }
}
