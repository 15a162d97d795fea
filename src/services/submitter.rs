//! The `DelayTasks` fork in task submission: persist-and-poll-later, or
//! run the attempt synchronously against a throwaway store.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::adapters::null_store::NullStore;
use crate::domain::errors::SchedulerResult;
use crate::domain::models::ScheduledTask;
use crate::domain::ports::Store;
use crate::services::executor::Executor;
use crate::services::handler_registry::HandlerRegistry;
use crate::services::interval_function::IntervalFunction;
use crate::services::occurrence_oracle::OccurrenceOracle;

/// Accepts newly created tasks and routes them per `DelayTasks`: `true`
/// persists the row for the Poller to pick up later; `false` runs the
/// attempt immediately against a `NullStore`-backed executor so the row
/// never touches durable storage and any recurrence clone is discarded
/// rather than saved.
pub struct Submitter {
    delay_tasks: bool,
    store: Arc<dyn Store>,
    immediate_executor: Executor,
}

impl Submitter {
    #[must_use]
    pub fn new(
        delay_tasks: bool,
        store: Arc<dyn Store>,
        registry: Arc<HandlerRegistry>,
        oracle: Arc<dyn OccurrenceOracle>,
        interval_fn: IntervalFunction,
    ) -> Self {
        let immediate_executor = Executor::new(
            registry,
            Arc::new(NullStore) as Arc<dyn Store>,
            oracle,
            interval_fn,
        );
        Self {
            delay_tasks,
            store,
            immediate_executor,
        }
    }

    /// Submit `task` per the configured `DelayTasks` policy. When
    /// `delay_tasks` is true, this returns the persisted row (with its
    /// assigned id); otherwise it returns the row as left after its one
    /// synchronous attempt, still carrying `id = None`.
    #[instrument(skip(self, task, cancel))]
    pub async fn submit(
        &self,
        mut task: ScheduledTask,
        cancel: CancellationToken,
    ) -> SchedulerResult<ScheduledTask> {
        if self.delay_tasks {
            self.store.save(&mut task).await?;
            Ok(task)
        } else {
            self.immediate_executor.execute(task, cancel).await
        }
    }
}
