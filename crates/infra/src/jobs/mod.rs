//! Background job system with retry, backoff, and dead-letter handling.
//!
//! ## Components
//!
//! - `JobRunner`: polls a `JobStore`, runs defined handlers, publishes `JobEvent`s
//! - `RetryController`: decorates handlers with exponential backoff and the
//!   terminal move to the `DeadLetterStore`
//! - `hello_world`: bundled recurring job

pub mod hello_world;
pub mod retry;
pub mod runner;
pub mod store;
pub mod types;

pub use retry::{FailureOutcome, RetryController};
pub use runner::{JobHandler, JobRunner, RunnerConfig, RunnerHandle, handler_fn};
pub use store::{
    DeadLetterStore, InMemoryDeadLetterStore, InMemoryJobStore, JobStore, JobStoreError, job_stats,
};
pub use types::{DeadLetterRecord, Job, JobEvent, JobStats, RetryPolicy, Schedule};
