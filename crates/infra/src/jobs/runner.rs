//! Polling job runner.
//!
//! On each tick the runner claims due jobs from the store and executes them on
//! the tokio runtime, bounded by a global limit and a per-definition limit.
//! Every attempt publishes `Started` and then `Completed` or `Failed` on a
//! broadcast channel, and its outcome is written back through the store's
//! bookkeeping methods.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use gatehouse_core::JobId;

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobEvent, Schedule};

/// Async job body. Failures are reported through the returned error.
pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Box an async closure as a [`JobHandler`].
pub fn handler_fn<F, Fut>(f: F) -> JobHandler
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |job| f(job).boxed())
}

/// Run a job body, turning a panic into an ordinary failure.
pub(crate) async fn catch_panic<Fut>(body: Fut) -> anyhow::Result<()>
where
    Fut: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("job panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Job runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often to poll for due jobs
    pub process_every: Duration,
    /// Maximum concurrent attempts across all definitions
    pub max_concurrency: usize,
    /// Concurrent attempts per definition unless overridden in `define_with_concurrency`
    pub default_concurrency: usize,
    /// How long a claimed job stays locked before another tick may reclaim it
    pub lock_lifetime: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            process_every: Duration::from_secs(30),
            max_concurrency: 20,
            default_concurrency: 5,
            lock_lifetime: Duration::from_millis(10_000),
        }
    }
}

struct Definition {
    handler: JobHandler,
    permits: Arc<Semaphore>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    config: RunnerConfig,
    definitions: RwLock<HashMap<String, Arc<Definition>>>,
    global: Arc<Semaphore>,
    events: broadcast::Sender<JobEvent>,
}

/// Background job runner. Cheap to clone; clones share definitions and limits.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>, config: RunnerConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let global = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                definitions: RwLock::new(HashMap::new()),
                global,
                events,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Register (or replace) the handler for `name`.
    pub fn define(&self, name: impl Into<String>, handler: JobHandler) {
        let concurrency = self.inner.config.default_concurrency;
        self.define_with_concurrency(name, concurrency, handler);
    }

    pub fn define_with_concurrency(
        &self,
        name: impl Into<String>,
        concurrency: usize,
        handler: JobHandler,
    ) {
        let name = name.into();
        let definition = Arc::new(Definition {
            handler,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        });
        match self.inner.definitions.write() {
            Ok(mut defs) => {
                defs.insert(name.clone(), definition);
                debug!(job = %name, concurrency, "job defined");
            }
            Err(_) => error!(job = %name, "job definitions lock poisoned; definition dropped"),
        }
    }

    pub fn schedule(
        &self,
        name: impl Into<String>,
        payload: serde_json::Value,
        schedule: Schedule,
    ) -> Result<JobId, JobStoreError> {
        let job = Job::new(name, payload, schedule);
        debug!(job = %job.name, job_id = %job.id, "job scheduled");
        self.inner.store.insert(job)
    }

    /// Schedule unless an active job with the same name, payload and repeat
    /// interval already exists; returns the id of whichever job is active.
    pub fn schedule_unique(
        &self,
        name: impl Into<String>,
        payload: serde_json::Value,
        schedule: Schedule,
    ) -> Result<JobId, JobStoreError> {
        let name = name.into();
        let repeat = match schedule {
            Schedule::Every(interval) => Some(interval),
            Schedule::At(_) => None,
        };
        if let Some(existing) = self.inner.store.find_active(&name, &payload, repeat)? {
            debug!(job = %name, job_id = %existing.id, "unique job already scheduled");
            return Ok(existing.id);
        }
        self.schedule(name, payload, schedule)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Claim and run every job that is due now (within the concurrency limits),
    /// waiting for all of them to finish. Returns the number of attempts run.
    pub async fn run_due_once(&self) -> usize {
        let mut tasks = JoinSet::new();
        let started = self.dispatch(&mut tasks);
        while tasks.join_next().await.is_some() {}
        started
    }

    /// Spawn the polling loop. The first tick runs immediately.
    pub fn start(&self) -> RunnerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let runner = self.clone();

        let join = tokio::spawn(async move {
            let every = runner.inner.config.process_every;
            info!(process_every_ms = every.as_millis() as u64, "job runner started");

            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut tasks = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        runner.dispatch(&mut tasks);
                    }
                    Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = res {
                            error!(error = %e, "job task panicked");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            let in_flight = tasks.len();
            if in_flight > 0 {
                info!(in_flight, "job runner draining in-flight attempts");
            }
            while tasks.join_next().await.is_some() {}
            info!("job runner stopped");
        });

        RunnerHandle {
            shutdown,
            join: Some(join),
        }
    }

    fn dispatch(&self, tasks: &mut JoinSet<()>) -> usize {
        let mut started = 0;
        loop {
            let Ok(global) = self.inner.global.clone().try_acquire_owned() else {
                break;
            };

            let eligible = self.eligible_definitions();
            if eligible.is_empty() {
                break;
            }
            let names: Vec<String> = eligible.keys().cloned().collect();

            let job = match self.inner.store.claim_next(Utc::now(), self.inner.config.lock_lifetime, &names) {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "failed to claim job");
                    break;
                }
            };

            let Some(definition) = eligible.get(&job.name).cloned() else {
                break;
            };
            let Ok(local) = definition.permits.clone().try_acquire_owned() else {
                warn!(job = %job.name, job_id = %job.id, "definition at capacity after claim");
                break;
            };

            tasks.spawn(run_attempt(
                self.inner.clone(),
                definition.handler.clone(),
                job,
                (global, local),
            ));
            started += 1;
        }
        started
    }

    fn eligible_definitions(&self) -> HashMap<String, Arc<Definition>> {
        match self.inner.definitions.read() {
            Ok(defs) => defs
                .iter()
                .filter(|(_, d)| d.permits.available_permits() > 0)
                .map(|(name, d)| (name.clone(), d.clone()))
                .collect(),
            Err(_) => {
                error!("job definitions lock poisoned");
                HashMap::new()
            }
        }
    }
}

async fn run_attempt(
    inner: Arc<Inner>,
    handler: JobHandler,
    job: Job,
    _permits: (OwnedSemaphorePermit, OwnedSemaphorePermit),
) {
    let job_id = job.id;
    let name = job.name.clone();
    let prior_failures = job.fail_count;

    info!(job = %name, %job_id, "job started");
    let _ = inner.events.send(JobEvent::Started {
        job_id,
        name: name.clone(),
    });

    let outcome = catch_panic(async move { handler(job).await }).await;
    let now = Utc::now();

    match outcome {
        Ok(()) => {
            if let Err(e) = inner.store.record_success(job_id, now) {
                error!(job = %name, %job_id, error = %e, "failed to record job success");
            }
            info!(job = %name, %job_id, "job completed");
            let _ = inner.events.send(JobEvent::Completed { job_id, name });
        }
        Err(err) => {
            let reason = err.to_string();
            if let Err(e) = inner.store.record_failure(job_id, &reason, now) {
                error!(job = %name, %job_id, error = %e, "failed to record job failure");
            }
            let fail_count = prior_failures.saturating_add(1);
            warn!(job = %name, %job_id, fail_count, error = %reason, "job failed");
            let _ = inner.events.send(JobEvent::Failed {
                job_id,
                name,
                fail_count,
                error: reason,
            });
        }
    }
}

/// Handle to a started runner.
#[derive(Debug)]
pub struct RunnerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Stop polling and wait for in-flight attempts to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "job runner task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::jobs::store::InMemoryJobStore;

    fn runner() -> (Arc<InMemoryJobStore>, JobRunner) {
        let store = Arc::new(InMemoryJobStore::new());
        let runner = JobRunner::new(store.clone(), RunnerConfig::default());
        (store, runner)
    }

    fn counting(counter: Arc<AtomicUsize>) -> JobHandler {
        handler_fn(move |_job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        })
    }

    #[tokio::test]
    async fn due_one_shot_job_runs_once() {
        let (store, runner) = runner();
        let runs = Arc::new(AtomicUsize::new(0));
        runner.define("greet", counting(runs.clone()));
        let id = runner.schedule("greet", json!({}), Schedule::now()).unwrap();

        assert_eq!(runner.run_due_once().await, 1);
        assert_eq!(runner.run_due_once().await, 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let job = store.get(id).unwrap().unwrap();
        assert!(!job.is_active());
        assert!(job.last_finished_at.is_some());
    }

    #[tokio::test]
    async fn future_and_undefined_jobs_are_left_alone() {
        let (_, runner) = runner();
        let runs = Arc::new(AtomicUsize::new(0));
        runner.define("greet", counting(runs.clone()));
        runner
            .schedule("greet", json!({}), Schedule::after_delay(Duration::from_secs(60)))
            .unwrap();
        runner.schedule("unknown", json!({}), Schedule::now()).unwrap();

        assert_eq!(runner.run_due_once().await, 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_is_recorded_and_published() {
        let (store, runner) = runner();
        runner.define("boom", handler_fn(|_job| async { Err::<(), _>(anyhow::anyhow!("kaput")) }));
        let id = runner.schedule("boom", json!({}), Schedule::now()).unwrap();
        let mut events = runner.subscribe();

        runner.run_due_once().await;

        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.fail_count, 1);
        assert_eq!(job.fail_reason.as_deref(), Some("kaput"));
        assert!(job.locked_at.is_none());

        assert_eq!(
            events.recv().await.unwrap(),
            JobEvent::Started {
                job_id: id,
                name: "boom".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            JobEvent::Failed {
                job_id: id,
                name: "boom".into(),
                fail_count: 1,
                error: "kaput".into()
            }
        );
    }

    #[tokio::test]
    async fn panicking_handler_is_recorded_as_a_failure() {
        let (store, runner) = runner();
        runner.define(
            "explodes",
            handler_fn(|_job| async {
                let parsed: Option<u32> = None;
                parsed.expect("payload had no count");
                Ok::<(), anyhow::Error>(())
            }),
        );
        let id = runner.schedule("explodes", json!({}), Schedule::now()).unwrap();
        let mut events = runner.subscribe();

        assert_eq!(runner.run_due_once().await, 1);

        let job = store.get(id).unwrap().unwrap();
        assert_eq!(job.fail_count, 1);
        assert_eq!(job.fail_reason.as_deref(), Some("job panicked: payload had no count"));
        assert!(job.locked_at.is_none());

        events.recv().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            JobEvent::Failed { fail_count: 1, .. }
        ));
        assert_eq!(runner.run_due_once().await, 0);
    }

    #[tokio::test]
    async fn schedule_unique_skips_duplicates() {
        let (store, runner) = runner();
        let every = Schedule::Every(Duration::from_secs(60));
        let a = runner.schedule_unique("tick", json!({}), every).unwrap();
        let b = runner.schedule_unique("tick", json!({}), every).unwrap();
        let c = runner.schedule_unique("tick", json!({}), Schedule::now()).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn per_definition_concurrency_is_enforced() {
        let (_, runner) = runner();
        let runs = Arc::new(AtomicUsize::new(0));
        runner.define_with_concurrency("slow", 2, counting(runs.clone()));
        for i in 0..5 {
            runner.schedule("slow", json!({ "i": i }), Schedule::now()).unwrap();
        }

        assert_eq!(runner.run_due_once().await, 2);
        assert_eq!(runner.run_due_once().await, 2);
        assert_eq!(runner.run_due_once().await, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn global_concurrency_is_enforced() {
        let store = Arc::new(InMemoryJobStore::new());
        let config = RunnerConfig {
            max_concurrency: 3,
            ..RunnerConfig::default()
        };
        let runner = JobRunner::new(store, config);
        let runs = Arc::new(AtomicUsize::new(0));
        runner.define("a", counting(runs.clone()));
        runner.define("b", counting(runs.clone()));
        for i in 0..3 {
            runner.schedule("a", json!(i), Schedule::now()).unwrap();
            runner.schedule("b", json!(i), Schedule::now()).unwrap();
        }

        assert_eq!(runner.run_due_once().await, 3);
        assert_eq!(runner.run_due_once().await, 3);
        assert_eq!(runs.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn started_runner_processes_and_stops_gracefully() {
        let store = Arc::new(InMemoryJobStore::new());
        let config = RunnerConfig {
            process_every: Duration::from_millis(20),
            ..RunnerConfig::default()
        };
        let runner = JobRunner::new(store, config);
        runner.define(
            "slow",
            handler_fn(|_job| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), anyhow::Error>(())
            }),
        );
        let mut events = runner.subscribe();
        let id = runner.schedule("slow", json!({}), Schedule::now()).unwrap();

        let handle = runner.start();
        let started = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            started,
            JobEvent::Started {
                job_id: id,
                name: "slow".into()
            }
        );

        // Stopping mid-attempt waits for it to complete.
        handle.stop().await;
        assert_eq!(
            events.try_recv().unwrap(),
            JobEvent::Completed {
                job_id: id,
                name: "slow".into()
            }
        );
    }
}
