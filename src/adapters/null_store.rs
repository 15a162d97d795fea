//! A `Store` that persists nothing, for the `DelayTasks=false` submission
//! path: the executor it backs still runs every attempt, hook, and
//! recurrence-cloning rule, but every write becomes a no-op so the row
//! never touches durable storage.

use async_trait::async_trait;

use crate::domain::errors::SchedulerResult;
use crate::domain::models::ScheduledTask;
use crate::domain::ports::Store;

#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl Store for NullStore {
    async fn get_and_lock_next_available(
        &self,
        _n: usize,
        _worker_id: &str,
    ) -> SchedulerResult<Vec<ScheduledTask>> {
        Ok(Vec::new())
    }

    async fn save(&self, _task: &mut ScheduledTask) -> SchedulerResult<()> {
        Ok(())
    }

    async fn delete(&self, _task: &ScheduledTask) -> SchedulerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::HandlerReference;
    use chrono::Utc;

    #[tokio::test]
    async fn save_and_delete_are_no_ops() {
        let store = NullStore;
        let mut task = ScheduledTask::new(HandlerReference::new("demo", "noop"), Utc::now());
        store.save(&mut task).await.unwrap();
        assert!(task.id.is_none());
        store.delete(&task).await.unwrap();
    }

    #[tokio::test]
    async fn claim_never_returns_work() {
        let store = NullStore;
        let claimed = store.get_and_lock_next_available(10, "worker").await.unwrap();
        assert!(claimed.is_empty());
    }
}
