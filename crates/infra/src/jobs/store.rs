//! Job storage implementations.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use gatehouse_core::{DomainError, JobId};

use super::types::{DeadLetterRecord, Job, JobStats, after};

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<JobStoreError> for DomainError {
    fn from(value: JobStoreError) -> Self {
        match value {
            JobStoreError::NotFound(id) => DomainError::not_found(format!("Job {id} not found.")),
            other => DomainError::internal(other.to_string()),
        }
    }
}

/// Persistence for the active job schedule.
///
/// Every method is a single atomic step; the runner and the retry controller
/// never read-modify-write a job outside the store.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// An active job with the same name, payload and repeat interval.
    fn find_active(
        &self,
        name: &str,
        payload: &serde_json::Value,
        repeat: Option<Duration>,
    ) -> Result<Option<Job>, JobStoreError>;

    /// Lock the earliest claimable job whose name is in `names`.
    ///
    /// The returned snapshot is taken before the claim mutates the record, so
    /// `fail_count` is the count prior to this attempt. The stored record gets
    /// `locked_at = now`, `last_run_at = now` and its next run computed: cleared
    /// for one-shot jobs, `now + repeat` for repeating ones.
    fn claim_next(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        names: &[String],
    ) -> Result<Option<Job>, JobStoreError>;

    /// Set the next run of a job. Does not touch the lock or the fail count.
    fn reschedule(&self, id: JobId, at: DateTime<Utc>) -> Result<(), JobStoreError>;

    /// Close a successful attempt. No-op when the job was removed meanwhile.
    fn record_success(&self, id: JobId, now: DateTime<Utc>) -> Result<(), JobStoreError>;

    /// Close a failed attempt: bump the fail count and store the reason. Does
    /// not touch the next run. No-op when the job was removed meanwhile.
    fn record_failure(
        &self,
        id: JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), JobStoreError>;

    /// Returns whether a job was removed.
    fn remove(&self, id: JobId) -> Result<bool, JobStoreError>;

    fn list(&self) -> Result<Vec<Job>, JobStoreError>;
}

/// Append-only archive of jobs that exhausted their retry budget.
pub trait DeadLetterStore: Send + Sync {
    fn record(&self, entry: DeadLetterRecord) -> Result<(), JobStoreError>;

    /// Newest first.
    fn list(&self, limit: usize) -> Result<Vec<DeadLetterRecord>, JobStoreError>;

    fn count(&self) -> Result<usize, JobStoreError>;
}

/// Summarise the schedule and the archive.
pub fn job_stats(
    jobs: &dyn JobStore,
    dead_letters: &dyn DeadLetterStore,
) -> Result<JobStats, JobStoreError> {
    let mut stats = JobStats {
        dead_lettered: dead_letters.count()?,
        ..JobStats::default()
    };
    for job in jobs.list()? {
        if job.locked_at.is_some() {
            stats.running += 1;
        } else if job.next_run_at.is_some() {
            stats.scheduled += 1;
        } else if job.last_finished_at.is_some() {
            stats.completed += 1;
        }
        if job.fail_count > 0 {
            stats.failing += 1;
        }
    }
    Ok(stats)
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".into())
}

/// In-memory job store for tests/dev. Keeps insertion order for tie-breaks.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<Vec<Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Job>>, JobStoreError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Job>>, JobStoreError> {
        self.jobs.write().map_err(|_| poisoned())
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.write()?;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.push(job);
        Ok(id)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read()?.iter().find(|j| j.id == id).cloned())
    }

    fn find_active(
        &self,
        name: &str,
        payload: &serde_json::Value,
        repeat: Option<Duration>,
    ) -> Result<Option<Job>, JobStoreError> {
        Ok(self
            .read()?
            .iter()
            .find(|j| j.is_active() && j.name == name && &j.payload == payload && j.repeat == repeat)
            .cloned())
    }

    fn claim_next(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        names: &[String],
    ) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.write()?;

        // Oldest due first; stale locks sort by the time they were taken.
        let due_at = |j: &Job| j.locked_at.or(j.next_run_at);
        let Some(job) = jobs
            .iter_mut()
            .filter(|j| names.iter().any(|n| n == &j.name))
            .filter(|j| j.is_claimable(now, lock_lifetime))
            .min_by_key(|j| due_at(j))
        else {
            return Ok(None);
        };

        let snapshot = job.clone();
        job.locked_at = Some(now);
        job.last_run_at = Some(now);
        job.next_run_at = job.repeat.map(|interval| after(now, interval));
        job.updated_at = now;
        Ok(Some(snapshot))
    }

    fn reschedule(&self, id: JobId, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(JobStoreError::NotFound(id))?;
        job.next_run_at = Some(at);
        job.updated_at = Utc::now();
        Ok(())
    }

    fn record_success(&self, id: JobId, now: DateTime<Utc>) -> Result<(), JobStoreError> {
        let mut jobs = self.write()?;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.locked_at = None;
            job.last_finished_at = Some(now);
            job.fail_count = 0;
            job.fail_reason = None;
            job.updated_at = now;
        }
        Ok(())
    }

    fn record_failure(
        &self,
        id: JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.write()?;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.locked_at = None;
            job.last_finished_at = Some(now);
            job.fail_count = job.fail_count.saturating_add(1);
            job.fail_reason = Some(reason.to_string());
            job.failed_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    fn remove(&self, id: JobId) -> Result<bool, JobStoreError> {
        let mut jobs = self.write()?;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok(jobs.len() != before)
    }

    fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        Ok(self.read()?.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    entries: RwLock<Vec<DeadLetterRecord>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeadLetterStore for InMemoryDeadLetterStore {
    fn record(&self, entry: DeadLetterRecord) -> Result<(), JobStoreError> {
        self.entries.write().map_err(|_| poisoned())?.push(entry);
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<DeadLetterRecord>, JobStoreError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }

    fn count(&self) -> Result<usize, JobStoreError> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }
}
