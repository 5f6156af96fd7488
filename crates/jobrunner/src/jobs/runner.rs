//! One durable queue of a single job type, executing one job at a time.
//!
//! The in-memory list is the source of truth while the process runs; every
//! mutation (add, prune, reschedule, removal) is written through to the store
//! before the next job starts. "Running" is never persisted: after a crash the
//! record is simply pending again.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::RunnerError;
use crate::jobs::model::{AddJobCheck, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::registry::persisted_job_from_record;
use crate::jobs::services::JobServices;
use crate::jobs::store::JobQueueStore;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Attempts per store write before the write is reported as failed.
    pub persist_max_attempts: u32,
    pub persist_retry_delay: Duration,
    /// How long shutdown waits for an in-flight run before abandoning it.
    pub shutdown_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            persist_max_attempts: 5,
            persist_retry_delay: Duration::from_millis(200),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    Idle,
    Scheduled,
    Running,
}

impl RunnerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Scheduled => "scheduled",
            RunnerState::Running => "running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddJobResult {
    Added,
    Skipped(AddJobCheck),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Added {
        identifier: String,
    },
    Started {
        identifier: String,
        current_retry: u32,
        at_ms: i64,
    },
    Rescheduled {
        identifier: String,
        current_retry: u32,
        next_attempt_timestamp: i64,
    },
    Finished {
        identifier: String,
        result: RunJobResult,
        current_retry: u32,
    },
    Dropped {
        identifier: String,
        reason: String,
    },
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue_name: String,
    pub job_type: JobType,
    pub state: RunnerState,
    pub pending: usize,
    pub current_job: Option<String>,
    pub next_attempt_timestamp: Option<i64>,
}

struct QueueState {
    /// Sorted by `next_attempt_timestamp`, insertion order on ties. Includes the running job.
    jobs: Vec<JobRecord>,
    current: Option<String>,
    dirty: bool,
    stopping: bool,
}

impl QueueState {
    fn pending(&self) -> Vec<JobRecord> {
        self.jobs
            .iter()
            .filter(|r| Some(&r.identifier) != self.current.as_ref())
            .cloned()
            .collect()
    }

    fn next_due(&self) -> Option<(String, i64)> {
        self.jobs
            .iter()
            .filter(|r| Some(&r.identifier) != self.current.as_ref())
            .min_by_key(|r| r.next_attempt_timestamp)
            .map(|r| (r.identifier.clone(), r.next_attempt_timestamp))
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.jobs.iter().position(|r| r.identifier == identifier)
    }
}

fn sort_schedule(jobs: &mut [JobRecord]) {
    jobs.sort_by_key(|r| r.next_attempt_timestamp);
}

fn lock_std<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct RunnerInner {
    job_type: JobType,
    queue_name: String,
    store: Arc<dyn JobQueueStore>,
    services: Arc<JobServices>,
    clock: Arc<dyn Clock>,
    cfg: RunnerConfig,
    state: Mutex<QueueState>,
    wake: Notify,
    events: broadcast::Sender<RunnerEvent>,
    in_flight: StdMutex<Option<AbortHandle>>,
    scheduler: StdMutex<Option<JoinHandle<()>>>,
}

/// Handle to a running queue. Cheap to clone.
#[derive(Clone)]
pub struct PersistedJobRunner {
    inner: Arc<RunnerInner>,
}

impl PersistedJobRunner {
    /// Load the queue from the store and start scheduling it.
    ///
    /// Records that cannot be rebuilt, or that belong to another job type, are
    /// dropped and the cleaned list is written back. A store that cannot be
    /// read is an error: the queue refuses to start rather than overwrite it.
    pub async fn start(
        job_type: JobType,
        store: Arc<dyn JobQueueStore>,
        services: Arc<JobServices>,
        cfg: RunnerConfig,
    ) -> Result<Self, RunnerError> {
        let queue_name = job_type.queue_name();
        let loaded = store
            .load_queue(&queue_name)
            .await
            .map_err(|source| RunnerError::Load {
                queue: queue_name.clone(),
                source,
            })?;

        let loaded_count = loaded.len();
        let mut jobs = Vec::with_capacity(loaded_count);
        for record in loaded {
            match persisted_job_from_record(&record, &services) {
                Some(job) if job.job_type() == job_type => jobs.push(record),
                Some(job) => warn!(
                    queue = %queue_name,
                    identifier = %record.identifier,
                    job_type = %job.job_type(),
                    "dropping record of another job type"
                ),
                None => {}
            }
        }
        sort_schedule(&mut jobs);
        let dropped = loaded_count - jobs.len();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(RunnerInner {
            job_type,
            queue_name,
            store,
            clock: services.clock.clone(),
            services,
            cfg,
            state: Mutex::new(QueueState {
                jobs,
                current: None,
                dirty: false,
                stopping: false,
            }),
            wake: Notify::new(),
            events,
            in_flight: StdMutex::new(None),
            scheduler: StdMutex::new(None),
        });

        {
            let mut state = inner.state.lock().await;
            if dropped > 0 {
                warn!(queue = %inner.queue_name, dropped, "dropped unusable records while loading");
                inner.persist(&mut state).await?;
            }
            info!(queue = %inner.queue_name, pending = state.jobs.len(), "queue loaded");
        }

        let handle = tokio::spawn(scheduler_loop(inner.clone()));
        *lock_std(&inner.scheduler) = Some(handle);
        Ok(Self { inner })
    }

    /// Insert a job, after its own dedup veto and superseded-job pruning.
    ///
    /// Returns once the new list is durable. If it cannot be persisted the
    /// insertion is rolled back and the error returned.
    pub async fn add_job(&self, job: Box<dyn PersistedJob>) -> Result<AddJobResult, RunnerError> {
        let inner = &self.inner;
        if job.job_type() != inner.job_type {
            return Err(RunnerError::WrongJobType {
                expected: inner.job_type.to_string(),
                got: job.job_type().to_string(),
            });
        }
        let record = job.serialize_job();

        let mut state = inner.state.lock().await;
        if state.stopping {
            return Err(RunnerError::Stopped(inner.queue_name.clone()));
        }
        if state.position(&record.identifier).is_some() {
            debug!(queue = %inner.queue_name, identifier = %record.identifier, "job already queued");
            return Ok(AddJobResult::Skipped(AddJobCheck::SkipSameJobPresent));
        }

        let pending = state.pending();
        let check = job.add_job_check(&pending);
        if check != AddJobCheck::Accept {
            debug!(
                queue = %inner.queue_name,
                identifier = %record.identifier,
                queue_key = %record.queue_key,
                "job skipped, same job present"
            );
            return Ok(AddJobResult::Skipped(check));
        }

        let superseded: Vec<String> = job
            .non_running_jobs_to_remove(&pending)
            .into_iter()
            .map(|r| r.identifier)
            .collect();

        let previous = state.jobs.clone();
        let was_dirty = state.dirty;
        let current = state.current.clone();
        state.jobs.retain(|r| {
            Some(&r.identifier) == current.as_ref() || !superseded.contains(&r.identifier)
        });
        let removed = previous.len() - state.jobs.len();
        state.jobs.push(record.clone());
        sort_schedule(&mut state.jobs);

        if let Err(err) = inner.persist(&mut state).await {
            error!(queue = %inner.queue_name, identifier = %record.identifier, error = %err, "could not persist new job");
            state.jobs = previous;
            state.dirty = was_dirty;
            return Err(err);
        }
        drop(state);

        info!(
            queue = %inner.queue_name,
            identifier = %record.identifier,
            next_attempt_timestamp = record.next_attempt_timestamp,
            superseded = removed,
            "job added"
        );
        inner.emit(RunnerEvent::Added {
            identifier: record.identifier,
        });
        inner.wake.notify_one();
        Ok(AddJobResult::Added)
    }

    /// Records in schedule order, including the running one.
    pub async fn pending_jobs(&self) -> Vec<JobRecord> {
        self.inner.state.lock().await.jobs.clone()
    }

    pub async fn current_job_identifier(&self) -> Option<String> {
        self.inner.state.lock().await.current.clone()
    }

    pub async fn state(&self) -> RunnerState {
        let state = self.inner.state.lock().await;
        state_of(&state)
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock().await;
        QueueSnapshot {
            queue_name: self.inner.queue_name.clone(),
            job_type: self.inner.job_type,
            state: state_of(&state),
            pending: state.jobs.len(),
            current_job: state.current.clone(),
            next_attempt_timestamp: state.next_due().map(|(_, at)| at),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.inner.queue_name
    }

    pub fn job_type(&self) -> JobType {
        self.inner.job_type
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.inner.events.subscribe()
    }

    /// Stop scheduling, let the in-flight run finish (its outcome is
    /// persisted) and return. A run still going after the shutdown grace is
    /// abandoned; its record stays as last persisted.
    pub async fn stop_and_wait_current_job(&self) {
        let inner = &self.inner;
        inner.state.lock().await.stopping = true;
        inner.wake.notify_one();

        let handle = lock_std(&inner.scheduler).take();
        let Some(mut handle) = handle else {
            return;
        };
        if tokio::time::timeout(inner.cfg.shutdown_grace, &mut handle)
            .await
            .is_err()
        {
            warn!(
                queue = %inner.queue_name,
                grace_ms = inner.cfg.shutdown_grace.as_millis() as u64,
                "in-flight job did not finish in time, abandoning it"
            );
            handle.abort();
            if let Some(task) = lock_std(&inner.in_flight).take() {
                task.abort();
            }
        }
        info!(queue = %inner.queue_name, "queue stopped");
    }
}

fn state_of(state: &QueueState) -> RunnerState {
    if state.current.is_some() {
        RunnerState::Running
    } else if !state.stopping && !state.jobs.is_empty() {
        RunnerState::Scheduled
    } else {
        RunnerState::Idle
    }
}

impl RunnerInner {
    fn emit(&self, event: RunnerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Write the whole list, retrying a bounded number of times. On final
    /// failure the queue is marked dirty so the loop writes it before running anything else.
    async fn persist(&self, state: &mut QueueState) -> Result<(), RunnerError> {
        let max_attempts = self.cfg.persist_max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.save_queue(&self.queue_name, &state.jobs).await {
                Ok(()) => {
                    state.dirty = false;
                    return Ok(());
                }
                Err(err) if attempt < max_attempts => {
                    warn!(queue = %self.queue_name, attempt, error = %err, "persisting queue failed, retrying");
                    tokio::time::sleep(self.cfg.persist_retry_delay).await;
                }
                Err(source) => {
                    state.dirty = true;
                    return Err(RunnerError::Persist {
                        queue: self.queue_name.clone(),
                        source,
                    });
                }
            }
        }
    }

    async fn run_one(&self, identifier: String) {
        let record = {
            let mut state = self.state.lock().await;
            if state.stopping {
                return;
            }
            let Some(pos) = state.position(&identifier) else {
                return;
            };
            state.current = Some(identifier.clone());
            state.jobs[pos].clone()
        };

        let Some(job) = persisted_job_from_record(&record, &self.services) else {
            self.drop_record(&identifier, "job body could not be rebuilt").await;
            return;
        };

        let timeout = job.job_timeout();
        let current_retry = record.current_retry;
        debug!(queue = %self.queue_name, %identifier, current_retry, "running job");
        self.emit(RunnerEvent::Started {
            identifier: identifier.clone(),
            current_retry,
            at_ms: self.clock.now_ms(),
        });

        let task = tokio::spawn(async move { job.run().await });
        *lock_std(&self.in_flight) = Some(task.abort_handle());

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                error!(queue = %self.queue_name, %identifier, "job panicked");
                RunJobResult::RetryJobIfPossible
            }
            Ok(Err(_)) => {
                warn!(queue = %self.queue_name, %identifier, "job run was cancelled");
                RunJobResult::RetryJobIfPossible
            }
            Err(_) => {
                warn!(
                    queue = %self.queue_name,
                    %identifier,
                    timeout_ms = timeout.as_millis() as u64,
                    "job timed out"
                );
                if let Some(task) = lock_std(&self.in_flight).take() {
                    task.abort();
                }
                RunJobResult::RetryJobIfPossible
            }
        };
        lock_std(&self.in_flight).take();

        self.complete(&identifier, result).await;
    }

    async fn complete(&self, identifier: &str, result: RunJobResult) {
        let mut state = self.state.lock().await;
        state.current = None;
        let Some(pos) = state.position(identifier) else {
            warn!(queue = %self.queue_name, identifier, "finished job is no longer queued");
            return;
        };

        let event = match result {
            RunJobResult::Success => {
                let rec = state.jobs.remove(pos);
                info!(
                    queue = %self.queue_name,
                    identifier,
                    result = result.as_str(),
                    current_retry = rec.current_retry,
                    "job succeeded"
                );
                RunnerEvent::Finished {
                    identifier: rec.identifier,
                    result,
                    current_retry: rec.current_retry,
                }
            }
            RunJobResult::PermanentFailure => {
                let rec = state.jobs.remove(pos);
                error!(
                    queue = %self.queue_name,
                    identifier,
                    result = result.as_str(),
                    current_retry = rec.current_retry,
                    "job failed permanently"
                );
                RunnerEvent::Finished {
                    identifier: rec.identifier,
                    result,
                    current_retry: rec.current_retry,
                }
            }
            RunJobResult::RetryJobIfPossible => {
                let attempts = state.jobs[pos].current_retry.saturating_add(1);
                if attempts >= state.jobs[pos].max_attempts {
                    let rec = state.jobs.remove(pos);
                    error!(
                        queue = %self.queue_name,
                        identifier,
                        result = RunJobResult::PermanentFailure.as_str(),
                        max_attempts = rec.max_attempts,
                        "job out of attempts, giving up"
                    );
                    RunnerEvent::Finished {
                        identifier: rec.identifier,
                        result: RunJobResult::PermanentFailure,
                        current_retry: attempts,
                    }
                } else {
                    let now = self.clock.now_ms();
                    let rec = &mut state.jobs[pos];
                    rec.current_retry = attempts;
                    rec.next_attempt_timestamp = now.saturating_add(rec.delay_between_retries.max(0));
                    let next_attempt_timestamp = rec.next_attempt_timestamp;
                    warn!(
                        queue = %self.queue_name,
                        identifier,
                        current_retry = attempts,
                        next_attempt_timestamp,
                        "job will be retried"
                    );
                    sort_schedule(&mut state.jobs);
                    RunnerEvent::Rescheduled {
                        identifier: identifier.to_string(),
                        current_retry: attempts,
                        next_attempt_timestamp,
                    }
                }
            }
        };

        if let Err(err) = self.persist(&mut state).await {
            error!(queue = %self.queue_name, error = %err, "job outcome not persisted yet");
        }
        drop(state);
        self.emit(event);
    }

    async fn drop_record(&self, identifier: &str, reason: &str) {
        let mut state = self.state.lock().await;
        state.current = None;
        if let Some(pos) = state.position(identifier) {
            state.jobs.remove(pos);
        }
        error!(queue = %self.queue_name, identifier, reason, "dropping job");
        if let Err(err) = self.persist(&mut state).await {
            error!(queue = %self.queue_name, error = %err, "queue not persisted after drop");
        }
        drop(state);
        self.emit(RunnerEvent::Dropped {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        });
    }
}

async fn scheduler_loop(inner: Arc<RunnerInner>) {
    loop {
        let next = {
            let mut state = inner.state.lock().await;
            if state.stopping {
                break;
            }
            if state.dirty {
                if let Err(err) = inner.persist(&mut state).await {
                    error!(queue = %inner.queue_name, error = %err, "queue still not durable, holding jobs back");
                    drop(state);
                    tokio::time::sleep(inner.cfg.persist_retry_delay).await;
                    continue;
                }
            }
            state.next_due()
        };

        match next {
            None => inner.wake.notified().await,
            Some((identifier, at)) => {
                let now = inner.clock.now_ms();
                if at > now {
                    let wait = Duration::from_millis((at - now) as u64);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = inner.wake.notified() => {}
                    }
                } else {
                    inner.run_one(identifier).await;
                }
            }
        }
    }
    debug!(queue = %inner.queue_name, "scheduler stopped");
}
