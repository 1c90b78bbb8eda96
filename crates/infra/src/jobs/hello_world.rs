//! Bundled `hello_world` job: proves the runner is alive.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::info;

use super::retry::RetryController;
use super::runner::{JobHandler, JobRunner, handler_fn};
use super::store::JobStoreError;
use super::types::Schedule;

pub const HELLO_WORLD: &str = "hello_world";

pub const HELLO_WORLD_EVERY: Duration = Duration::from_secs(60);

pub fn handler() -> JobHandler {
    handler_fn(|job| async move {
        info!(job_id = %job.id, "Hello, World!");
        Ok::<(), anyhow::Error>(())
    })
}

/// Define the job behind the retry controller, run it once now and keep one
/// recurring instance on the schedule, first due one interval from now.
pub fn register(runner: &JobRunner, retry: &Arc<RetryController>) -> Result<(), JobStoreError> {
    runner.define(HELLO_WORLD, retry.wrap(handler()));
    runner.schedule(HELLO_WORLD, json!({}), Schedule::now())?;
    runner.schedule_unique(HELLO_WORLD, json!({}), Schedule::Every(HELLO_WORLD_EVERY))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::after;
    use crate::jobs::{InMemoryDeadLetterStore, InMemoryJobStore, JobStore, RetryPolicy, RunnerConfig};

    #[tokio::test]
    async fn registers_one_immediate_and_one_recurring_instance() {
        let store = Arc::new(InMemoryJobStore::new());
        let runner = JobRunner::new(store.clone(), RunnerConfig::default());
        let retry = Arc::new(RetryController::new(
            store.clone(),
            Arc::new(InMemoryDeadLetterStore::new()),
            RetryPolicy::default(),
        ));

        register(&runner, &retry).unwrap();
        register(&runner, &retry).unwrap();

        let jobs = store.list().unwrap();
        let recurring = jobs.iter().filter(|j| j.repeat == Some(HELLO_WORLD_EVERY)).count();
        let one_shot = jobs.iter().filter(|j| j.repeat.is_none()).count();
        assert_eq!(recurring, 1);
        assert_eq!(one_shot, 2);

        // Only the one-shot instances are due on the first tick.
        assert_eq!(runner.run_due_once().await, 2);
        let remaining: Vec<_> = store.list().unwrap().into_iter().filter(|j| j.is_active()).collect();
        assert_eq!(remaining.len(), 1);
        let recurring = &remaining[0];
        assert_eq!(recurring.repeat, Some(HELLO_WORLD_EVERY));
        assert!(recurring.last_run_at.is_none());
        assert_eq!(recurring.next_run_at, Some(after(recurring.created_at, HELLO_WORLD_EVERY)));
    }
}
