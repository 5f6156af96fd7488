#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jobrunner::jobs::{
    JobQueueStore, JobServices, JobType, MemoryQueueStore, PersistedJobRunner, RunnerConfig,
    RunnerEvent,
};
use jobrunner::Clock;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const T0: i64 = 1_700_000_000_000;

/// Wall clock that follows tokio's (pausable) time, starting at `base_ms`.
pub struct TokioClock {
    origin: Instant,
    base_ms: i64,
}

impl TokioClock {
    pub fn new(base_ms: i64) -> Self {
        Self {
            origin: Instant::now(),
            base_ms,
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        self.base_ms + self.origin.elapsed().as_millis() as i64
    }
}

pub fn services() -> Arc<JobServices> {
    Arc::new(services_with(|_| {}))
}

pub fn services_with(customize: impl FnOnce(&mut JobServices)) -> JobServices {
    let mut services = JobServices {
        clock: Arc::new(TokioClock::new(T0)),
        ..JobServices::unconfigured()
    };
    customize(&mut services);
    services
}

pub fn cfg() -> RunnerConfig {
    RunnerConfig {
        persist_max_attempts: 3,
        persist_retry_delay: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(5),
    }
}

pub async fn start_runner(
    job_type: JobType,
    store: &Arc<MemoryQueueStore>,
    services: &Arc<JobServices>,
) -> PersistedJobRunner {
    let store: Arc<dyn JobQueueStore> = store.clone();
    PersistedJobRunner::start(job_type, store, services.clone(), cfg())
        .await
        .expect("runner start")
}

/// Collect events until one matches `done` (inclusive).
pub async fn events_until(
    rx: &mut broadcast::Receiver<RunnerEvent>,
    mut done: impl FnMut(&RunnerEvent) -> bool,
) -> Vec<RunnerEvent> {
    let mut seen = Vec::new();
    within(Duration::from_secs(3600), async {
        loop {
            let event = rx.recv().await.expect("runner event");
            let stop = done(&event);
            seen.push(event);
            if stop {
                break;
            }
        }
    })
    .await;
    seen
}

pub fn is_finished(event: &RunnerEvent) -> bool {
    matches!(event, RunnerEvent::Finished { .. })
}

pub async fn within<F: Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut).await.expect("timed out waiting")
}
