//! Priority-partitioned worker pool.
//!
//! One FIFO queue per distinct priority value, each drained by its own
//! dedicated task; a single semaphore caps total concurrency across every
//! queue so that busy priorities cannot starve quiet ones beyond the
//! configured parallelism.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tracing::instrument;

/// A boxed unit of work submitted to the pool.
pub type BoxedUnit = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueuedUnit {
    unit: BoxedUnit,
    completion: oneshot::Sender<()>,
}

/// Maintains one FIFO queue per priority value, bounded overall by a
/// shared concurrency permit pool.
pub struct PriorityWorkerPool {
    semaphore: Arc<Semaphore>,
    queues: Mutex<HashMap<i64, mpsc::UnboundedSender<QueuedUnit>>>,
}

impl PriorityWorkerPool {
    /// Create a pool admitting up to `concurrency` units at a time across
    /// all priority queues.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue `unit` onto the FIFO for `priority`, lazily creating that
    /// queue's drain loop on first use. Returns a receiver that resolves
    /// once the unit has run; the caller is responsible for racing it
    /// against any per-task deadline and cancelling `unit`'s own token on
    /// timeout — the pool enforces no deadline itself.
    #[instrument(skip(self, unit))]
    pub async fn submit(&self, priority: i64, unit: BoxedUnit) -> oneshot::Receiver<()> {
        let sender = self.sender_for(priority).await;
        let (completion_tx, completion_rx) = oneshot::channel();
        // The receiving drain loop may have exited only if the pool itself
        // is being torn down; a dropped completion sender then resolves
        // the caller's receiver with a (harmless) RecvError.
        let _ = sender.send(QueuedUnit {
            unit,
            completion: completion_tx,
        });
        completion_rx
    }

    async fn sender_for(&self, priority: i64) -> mpsc::UnboundedSender<QueuedUnit> {
        let mut queues = self.queues.lock().await;
        if let Some(sender) = queues.get(&priority) {
            return sender.clone();
        }

        let (sender, mut receiver) = mpsc::unbounded_channel::<QueuedUnit>();
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("pool semaphore is never closed while queues are live");
                item.unit.await;
                drop(permit);
                let _ = item.completion.send(());
            }
        });

        queues.insert(priority, sender.clone());
        sender
    }
}
