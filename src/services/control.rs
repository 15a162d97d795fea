//! Lifecycle control: start the poll loop, stop it gracefully (invoking
//! `Halt?` on whatever is mid-attempt), and propagate cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::errors::SchedulerResult;
use crate::domain::ports::Store;
use crate::services::executor::Executor;
use crate::services::poller::{Poller, PollerConfig};
use crate::services::worker_pool::PriorityWorkerPool;

/// The subset of `SchedulerConfig` (see `infrastructure::config`) that
/// `Control` needs to bring the engine up.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// Pool size `N` shared across every priority queue.
    pub concurrency: usize,
    /// Poller tick period.
    pub sleep_interval: Duration,
    /// Batch size for each poller fetch.
    pub read_ahead: usize,
    /// Recorded as `locked_by` for rows this process claims.
    pub worker_id: String,
}

/// Top-level engine handle: owns the worker pool and poller lifecycle and
/// the root cancellation token every in-flight attempt derives from.
pub struct Control {
    store: Arc<dyn Store>,
    executor: Arc<Executor>,
    settings: ControlSettings,
    pool: OnceCell<Arc<PriorityWorkerPool>>,
    poller: OnceCell<Arc<Poller>>,
    poller_handle: Mutex<Option<JoinHandle<()>>>,
    root_cancel: CancellationToken,
}

impl Control {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, executor: Arc<Executor>, settings: ControlSettings) -> Self {
        Self {
            store,
            executor,
            settings,
            pool: OnceCell::new(),
            poller: OnceCell::new(),
            poller_handle: Mutex::new(None),
            root_cancel: CancellationToken::new(),
        }
    }

    /// A child of the root cancellation token, for callers (e.g. the CLI's
    /// `run` command) that want to unwind alongside `Stop`/`Dispose`.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.root_cancel.child_token()
    }

    async fn poller(&self) -> Arc<Poller> {
        let pool = self
            .pool
            .get_or_init(|| async { Arc::new(PriorityWorkerPool::new(self.settings.concurrency.max(1))) })
            .await;
        Arc::clone(
            self.poller
                .get_or_init(|| async {
                    Arc::new(Poller::new(
                        Arc::clone(&self.store),
                        Arc::clone(pool),
                        Arc::clone(&self.executor),
                        PollerConfig {
                            sleep_interval: self.settings.sleep_interval,
                            read_ahead: self.settings.read_ahead,
                            worker_id: self.settings.worker_id.clone(),
                        },
                    ))
                })
                .await,
        )
    }

    /// Lazily instantiate the pool and begin poll cycles. If `immediate`,
    /// run one tick synchronously before returning so a caller observes at
    /// least one claim-and-dispatch pass before `start` resolves.
    #[instrument(skip(self))]
    pub async fn start(&self, immediate: bool) -> SchedulerResult<()> {
        let poller = self.poller().await;

        if immediate {
            poller.tick(self.root_cancel.child_token()).await?;
        }

        let cancel = self.root_cancel.child_token();
        let handle = tokio::spawn(async move { poller.run(cancel).await });
        *self.poller_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Invoke `Halt(immediate)` on every handler currently occupying a
    /// worker slot, clear that pending set, cancel the root token, stop
    /// the poller, and wait for outstanding work to unwind.
    #[instrument(skip(self))]
    pub async fn stop(&self, immediate: bool) {
        let pending = self.executor.pending_handlers();
        let holders: Vec<_> = pending.read().await.values().cloned().collect();
        let halts = holders
            .iter()
            .filter_map(|resolved| resolved.hooks.halt.as_ref().map(|hook| hook.halt(immediate)));
        futures::future::join_all(halts).await;
        pending.write().await.clear();

        self.root_cancel.cancel();
        if let Some(handle) = self.poller_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Equivalent to `Stop(immediate=true)` plus release of internal maps,
    /// so a disposed `Control` holds no handler references behind it.
    pub async fn dispose(&self) {
        self.stop(true).await;
        self.executor.pending_handlers().write().await.clear();
    }
}
