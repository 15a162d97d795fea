//! Periodically claims due tasks from the `Store` and dispatches them
//! across the `PriorityWorkerPool`, racing each against its own
//! `MaximumRuntime` deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::errors::SchedulerResult;
use crate::domain::models::ScheduledTask;
use crate::domain::ports::Store;
use crate::services::executor::Executor;
use crate::services::worker_pool::PriorityWorkerPool;

/// Tunables for one `Poller` instance.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// How long to sleep between ticks.
    pub sleep_interval: Duration,
    /// Maximum rows claimed from the store in one tick.
    pub read_ahead: usize,
    /// Identifier recorded in `locked_by` for rows this process claims.
    pub worker_id: String,
}

/// Drives the poll-dispatch loop described in the engine's design: claim a
/// batch, hand every row to the pool under its own deadline, and wait for
/// the whole batch to settle before sleeping again.
pub struct Poller {
    store: Arc<dyn Store>,
    pool: Arc<PriorityWorkerPool>,
    executor: Arc<Executor>,
    config: PollerConfig,
}

impl Poller {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        pool: Arc<PriorityWorkerPool>,
        executor: Arc<Executor>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            pool,
            executor,
            config,
        }
    }

    /// Run the poll loop until `cancel` fires. Each iteration sleeps for
    /// `sleep_interval`, then ticks; a tick error is logged and does not
    /// stop the loop — store errors are the caller's concern per the
    /// engine's error-handling policy, not a reason to give up polling.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.config.sleep_interval) => {}
            }

            if cancel.is_cancelled() {
                return;
            }

            if let Err(error) = self.tick(cancel.child_token()).await {
                tracing::error!(%error, "poller tick failed");
            }
        }
    }

    /// Claim up to `read_ahead` due rows and dispatch them. Returns the
    /// number of tasks claimed. The "overflow"/"undeliverable" cases in
    /// the design note are unreachable here: the pool's per-priority
    /// queues are unbounded, so `dispatch` never has leftover work to
    /// re-enter with.
    #[instrument(skip(self, cancel))]
    pub async fn tick(&self, cancel: CancellationToken) -> SchedulerResult<usize> {
        let batch = self
            .store
            .get_and_lock_next_available(self.config.read_ahead, &self.config.worker_id)
            .await?;
        let claimed = batch.len();
        self.dispatch(batch, cancel).await;
        Ok(claimed)
    }

    /// Submit every task in `batch` to the pool and wait for the batch to
    /// finish as a whole: a task whose `maximum_runtime` elapses first has
    /// its own child cancellation token signaled, but every task's result
    /// is awaited concurrently with the others, not one at a time.
    async fn dispatch(&self, batch: Vec<ScheduledTask>, cancel: CancellationToken) {
        let waits = batch.into_iter().map(|task| self.submit_with_deadline(task, cancel.child_token()));
        futures::future::join_all(waits).await;
    }

    async fn submit_with_deadline(&self, task: ScheduledTask, task_cancel: CancellationToken) {
        let priority = task.priority;
        let deadline = task.maximum_runtime;
        let executor = Arc::clone(&self.executor);
        let run_cancel = task_cancel.clone();
        let unit = Box::pin(async move {
            let _ = executor.execute(task, run_cancel).await;
        });

        let completion = self.pool.submit(priority, unit).await;

        match deadline {
            Some(limit) => {
                tokio::select! {
                    result = completion => { let _ = result; }
                    () = tokio::time::sleep(limit) => {
                        task_cancel.cancel();
                    }
                }
            }
            None => {
                let _ = completion.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Handler, HandlerHooks, HandlerReference};
    use crate::domain::ports::TypeResolver;
    use crate::services::handler_registry::HandlerRegistry;
    use crate::services::interval_function::constant;
    use crate::services::occurrence_oracle::CronOracle;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct FakeStore {
        queued: AsyncMutex<Vec<ScheduledTask>>,
        saved: AsyncMutex<Vec<ScheduledTask>>,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn get_and_lock_next_available(
            &self,
            n: usize,
            _worker_id: &str,
        ) -> SchedulerResult<Vec<ScheduledTask>> {
            let mut queued = self.queued.lock().await;
            let drained = queued.drain(..queued.len().min(n)).collect();
            Ok(drained)
        }

        async fn save(&self, task: &mut ScheduledTask) -> SchedulerResult<()> {
            if task.id.is_none() {
                task.id = Some(uuid::Uuid::new_v4());
            }
            self.saved.lock().await.push(task.clone());
            Ok(())
        }

        async fn delete(&self, _task: &ScheduledTask) -> SchedulerResult<()> {
            Ok(())
        }
    }

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn perform(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct SleepyHandler;

    #[async_trait]
    impl Handler for SleepyHandler {
        async fn perform(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(5)).await;
            true
        }
    }

    struct StubResolver {
        calls: Arc<AtomicUsize>,
    }

    impl TypeResolver for StubResolver {
        fn find_type_by_name(&self, qualified_name: &str) -> Option<(Box<dyn Handler>, HandlerHooks)> {
            match qualified_name {
                "demo.counter" => Some((
                    Box::new(CountingHandler {
                        calls: Arc::clone(&self.calls),
                    }),
                    HandlerHooks::default(),
                )),
                "demo.sleepy" => Some((Box::new(SleepyHandler), HandlerHooks::default())),
                _ => None,
            }
        }
    }

    fn poller_for(store: Arc<FakeStore>, calls: Arc<AtomicUsize>) -> Poller {
        let resolver = Arc::new(StubResolver { calls });
        let registry = Arc::new(HandlerRegistry::new(resolver));
        let executor = Arc::new(Executor::new(
            registry,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(CronOracle),
            constant(Duration::from_millis(1)),
        ));
        let pool = Arc::new(PriorityWorkerPool::new(4));
        Poller::new(
            store as Arc<dyn Store>,
            pool,
            executor,
            PollerConfig {
                sleep_interval: Duration::from_millis(10),
                read_ahead: 10,
                worker_id: "test-worker".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn tick_dispatches_every_claimed_task() {
        let store = Arc::new(FakeStore::default());
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let mut queued = store.queued.lock().await;
            for _ in 0..3 {
                queued.push(ScheduledTask::new(HandlerReference::new("demo", "counter"), Utc::now()));
            }
        }

        let poller = poller_for(Arc::clone(&store), Arc::clone(&calls));
        let claimed = poller.tick(CancellationToken::new()).await.unwrap();

        assert_eq!(claimed, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_store_produces_a_no_op_tick() {
        let store = Arc::new(FakeStore::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = poller_for(store, calls);

        let claimed = poller.tick(CancellationToken::new()).await.unwrap();
        assert_eq!(claimed, 0);
    }

    #[tokio::test]
    async fn deadline_cancels_an_overrunning_task_without_blocking_the_rest() {
        let store = Arc::new(FakeStore::default());
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let mut queued = store.queued.lock().await;
            let mut slow = ScheduledTask::new(HandlerReference::new("demo", "sleepy"), Utc::now());
            slow.maximum_runtime = Some(Duration::from_millis(20));
            queued.push(slow);
            queued.push(ScheduledTask::new(HandlerReference::new("demo", "counter"), Utc::now()));
        }

        let poller = poller_for(Arc::clone(&store), Arc::clone(&calls));
        let start = std::time::Instant::now();
        let claimed = poller.tick(CancellationToken::new()).await.unwrap();

        assert_eq!(claimed, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_ticks_once_per_sleep_interval() {
        let store = Arc::new(FakeStore::default());
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let mut queued = store.queued.lock().await;
            for _ in 0..3 {
                queued.push(ScheduledTask::new(HandlerReference::new("demo", "counter"), Utc::now()));
            }
        }

        let poller = poller_for(Arc::clone(&store), Arc::clone(&calls));
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { poller.run(run_cancel).await });

        // The three queued tasks only surface on the loop's first sleep-then-tick
        // cycle; advancing virtual time past one sleep_interval should be enough
        // to drain them without waiting in real wall-clock time.
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cancel.cancel();
        let _ = handle.await;
    }
}
