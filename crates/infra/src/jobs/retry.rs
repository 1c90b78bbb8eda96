//! Retry and dead-letter handling around job execution.
//!
//! A failed attempt is either rescheduled with exponential backoff or, once
//! the retry budget is spent, archived as a dead letter and removed from the
//! schedule. In both cases the original error is handed back to the runner so
//! its own bookkeeping (fail count, failure timestamp) still runs.
//!
//! The dead-letter write is best-effort: a failing archive is logged and the
//! job is removed regardless.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tracing::{error, info, warn};

use gatehouse_core::DeadLetterId;

use super::runner::{JobHandler, catch_panic};
use super::store::{DeadLetterStore, JobStore, JobStoreError};
use super::types::{DeadLetterRecord, Job, RetryPolicy, after};

const UNKNOWN_ERROR: &str = "Unknown error";

/// What the controller did with a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Rescheduled {
        delay: Duration,
        next_run_at: DateTime<Utc>,
    },
    DeadLettered {
        /// Whether the archive accepted the record.
        written: bool,
    },
}

pub struct RetryController {
    store: Arc<dyn JobStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(
        store: Arc<dyn JobStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            dead_letters,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `body` for `job`. On failure, reschedule or dead-letter the job,
    /// then return the original error. A panicking body counts as a failure.
    pub async fn handle_job_execution<F, Fut>(&self, job: &Job, body: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let result = catch_panic(async move { body().await }).await;
        if let Err(err) = &result {
            match self.on_failure(job, &err.to_string(), Utc::now()) {
                Ok(_) => {}
                Err(e) => {
                    error!(job = %job.name, job_id = %job.id, error = %e, "failed to handle job failure");
                }
            }
        }
        result
    }

    /// Decide the fate of a failed attempt. `job` is the snapshot taken at
    /// claim time, so `job.fail_count` excludes the current failure.
    pub fn on_failure(
        &self,
        job: &Job,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, JobStoreError> {
        let fail_count = job.fail_count;

        if self.policy.is_exhausted(fail_count) {
            let written = self.write_dead_letter(job, error, now);
            if !self.store.remove(job.id)? {
                warn!(job = %job.name, job_id = %job.id, "dead-lettered job was already gone");
            }
            info!(
                job = %job.name,
                job_id = %job.id,
                attempts = fail_count.saturating_add(1),
                "job moved to dead-letter queue"
            );
            return Ok(FailureOutcome::DeadLettered { written });
        }

        let delay = self.policy.delay_for(fail_count);
        let next_run_at = after(now, delay);
        self.store.reschedule(job.id, next_run_at)?;
        info!(
            job = %job.name,
            job_id = %job.id,
            attempt = fail_count.saturating_add(1),
            delay_ms = delay.as_millis() as u64,
            "job rescheduled after failure"
        );
        Ok(FailureOutcome::Rescheduled { delay, next_run_at })
    }

    fn write_dead_letter(&self, job: &Job, error: &str, now: DateTime<Utc>) -> bool {
        let error = Some(error)
            .filter(|e| !e.is_empty())
            .or(job.fail_reason.as_deref().filter(|e| !e.is_empty()))
            .unwrap_or(UNKNOWN_ERROR)
            .to_string();

        let record = DeadLetterRecord {
            id: DeadLetterId::new(),
            job_id: job.id,
            job_name: job.name.clone(),
            job_data: job.payload.clone(),
            failed_at: now,
            fail_count: job.fail_count.saturating_add(1),
            error,
        };

        match self.dead_letters.record(record) {
            Ok(()) => true,
            Err(e) => {
                error!(job = %job.name, job_id = %job.id, error = %e, "failed to write dead letter");
                false
            }
        }
    }

    /// Decorate `handler` with retry and dead-letter handling.
    pub fn wrap(self: &Arc<Self>, handler: JobHandler) -> JobHandler {
        let controller = self.clone();
        Arc::new(move |job: Job| {
            let controller = controller.clone();
            let handler = handler.clone();
            async move {
                let snapshot = job.clone();
                controller
                    .handle_job_execution(&snapshot, move || handler(job))
                    .await
            }
            .boxed()
        })
    }
}
