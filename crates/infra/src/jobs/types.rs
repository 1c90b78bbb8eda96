//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DeadLetterId, JobId};

/// `now + delay`, saturating at the largest representable instant.
pub(crate) fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// When a job should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Run once, at the given instant.
    At(DateTime<Utc>),
    /// Run every interval, first one interval from now, then one interval
    /// after each claim.
    Every(Duration),
}

impl Schedule {
    pub fn now() -> Self {
        Self::At(Utc::now())
    }

    pub fn after_delay(delay: Duration) -> Self {
        Self::At(after(Utc::now(), delay))
    }
}

/// A scheduled job instance as persisted by a [`JobStore`](super::JobStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub payload: serde_json::Value,
    /// Repeat interval; `None` for one-shot jobs.
    #[serde(with = "opt_millis")]
    pub repeat: Option<Duration>,
    /// `None` once a one-shot job has been claimed and not rescheduled.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Set while an attempt holds the job.
    pub locked_at: Option<DateTime<Utc>>,
    pub fail_count: u32,
    pub fail_reason: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, payload: serde_json::Value, schedule: Schedule) -> Self {
        let now = Utc::now();
        let (repeat, next_run_at) = match schedule {
            Schedule::At(at) => (None, at),
            Schedule::Every(interval) => (Some(interval), after(now, interval)),
        };
        Self {
            id: JobId::new(),
            name: name.into(),
            payload,
            repeat,
            next_run_at: Some(next_run_at),
            locked_at: None,
            fail_count: 0,
            fail_reason: None,
            failed_at: None,
            last_run_at: None,
            last_finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Still on the schedule: either waiting for a run or currently running.
    pub fn is_active(&self) -> bool {
        self.next_run_at.is_some() || self.locked_at.is_some()
    }

    /// Claimable at `now`: due and unlocked, or holding a lock older than
    /// `lock_lifetime`.
    pub fn is_claimable(&self, now: DateTime<Utc>, lock_lifetime: Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => after(locked_at, lock_lifetime) <= now,
            None => self.next_run_at.is_some_and(|at| at <= now),
        }
    }
}

/// Bounded exponential backoff.
///
/// A job that has already failed `f` times and fails again is retried after
/// `base_delay * 2^f`, unless `f + 1 >= max_attempts`, in which case it is
/// dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on a single delay. `None` leaves growth uncapped.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay before the next attempt, given the fail count recorded before the
    /// failing attempt.
    pub fn delay_for(&self, fail_count: u32) -> Duration {
        let factor = 1u32.checked_shl(fail_count).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    pub fn is_exhausted(&self, fail_count: u32) -> bool {
        fail_count.saturating_add(1) >= self.max_attempts
    }
}

/// Archived record of a job that exhausted its retry budget. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub id: DeadLetterId,
    pub job_id: JobId,
    pub job_name: String,
    pub job_data: serde_json::Value,
    pub failed_at: DateTime<Utc>,
    pub fail_count: u32,
    pub error: String,
}

/// Per-attempt lifecycle notifications published by the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: JobId,
        name: String,
    },
    Completed {
        job_id: JobId,
        name: String,
    },
    Failed {
        job_id: JobId,
        name: String,
        fail_count: u32,
        error: String,
    },
}

/// Counts over the active schedule plus the dead-letter archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub scheduled: usize,
    pub running: usize,
    pub completed: usize,
    pub failing: usize,
    pub dead_lettered: usize,
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_policy_delays_double_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<u128> = (0..4).map(|f| policy.delay_for(f).as_millis()).collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000]);
    }

    #[test]
    fn fifth_failure_exhausts_default_policy() {
        let policy = RetryPolicy::default();
        assert!((0..4).all(|f| !policy.is_exhausted(f)));
        assert!(policy.is_exhausted(4));
        assert!(policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn cap_bounds_each_delay() {
        let policy = RetryPolicy::default().with_max_delay(Duration::from_secs(3));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[test]
    fn one_shot_job_is_claimable_only_once_due() {
        let now = Utc::now();
        let job = Job::new("x", serde_json::json!({}), Schedule::At(after(now, Duration::from_secs(5))));
        assert!(!job.is_claimable(now, Duration::from_secs(10)));
        assert!(job.is_claimable(after(now, Duration::from_secs(5)), Duration::from_secs(10)));
    }

    #[test]
    fn stale_lock_makes_job_claimable_again() {
        let now = Utc::now();
        let mut job = Job::new("x", serde_json::json!({}), Schedule::At(now));
        job.locked_at = Some(now);
        job.next_run_at = None;

        let lifetime = Duration::from_secs(10);
        assert!(!job.is_claimable(after(now, Duration::from_secs(9)), lifetime));
        assert!(job.is_claimable(after(now, Duration::from_secs(10)), lifetime));
    }

    #[test]
    fn repeating_job_first_runs_one_interval_out() {
        let every = Duration::from_secs(60);
        let job = Job::new("tick", serde_json::json!(null), Schedule::Every(every));

        assert_eq!(job.next_run_at, Some(after(job.created_at, every)));
        assert!(!job.is_claimable(job.created_at, Duration::from_secs(10)));
        assert!(job.is_claimable(after(job.created_at, every), Duration::from_secs(10)));
    }

    #[test]
    fn repeat_interval_serializes_as_millis() {
        let job = Job::new("tick", serde_json::json!(null), Schedule::Every(Duration::from_secs(60)));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["repeat"], 60_000);

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back.repeat, Some(Duration::from_secs(60)));
    }

    proptest! {
        #[test]
        fn uncapped_delay_doubles_until_saturation(base_ms in 1u64..5_000, f in 0u32..20) {
            let policy = RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(base_ms),
                max_delay: None,
            };
            prop_assert_eq!(policy.delay_for(f + 1), policy.delay_for(f) * 2);
        }

        #[test]
        fn delays_never_decrease(f in 0u32..200, cap_ms in 1u64..100_000) {
            let policy = RetryPolicy::default().with_max_delay(Duration::from_millis(cap_ms));
            prop_assert!(policy.delay_for(f + 1) >= policy.delay_for(f));
            prop_assert!(policy.delay_for(f) <= Duration::from_millis(cap_ms));
        }
    }
}
