mod common;

use std::sync::Arc;

use common::{events_until, is_finished, services, start_runner, T0};
use jobrunner::jobs::bodies::{FakeOutcome, FakeSleepForJob, FakeSleepPayload};
use jobrunner::jobs::{JobType, MemoryQueueStore, PersistedJob, RunJobResult, RunnerEvent};

#[tokio::test(start_paused = true)]
async fn retryable_job_runs_max_attempts_times_with_constant_backoff() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();

    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(0, FakeOutcome::Retry), T0)
        .with_retry_policy(3, 10_000);
    let id = job.identifier().to_string();
    runner.add_job(Box::new(job)).await.unwrap();

    let events = events_until(&mut rx, is_finished).await;

    let starts: Vec<(u32, i64)> = events
        .iter()
        .filter_map(|e| match e {
            RunnerEvent::Started {
                current_retry,
                at_ms,
                ..
            } => Some((*current_retry, *at_ms - T0)),
            _ => None,
        })
        .collect();
    assert_eq!(starts.len(), 3, "events: {events:?}");
    for (i, (retry, offset)) in starts.iter().enumerate() {
        assert_eq!(*retry, i as u32);
        let expected = 10_000 * i as i64;
        assert!((offset - expected).abs() <= 5, "attempt {i} started at +{offset}ms");
    }

    assert_eq!(
        events.last(),
        Some(&RunnerEvent::Finished {
            identifier: id.clone(),
            result: RunJobResult::PermanentFailure,
            current_retry: 3,
        })
    );

    // add, two reschedules, removal
    let saves = store.saves_for(&JobType::FakeSleepFor.queue_name());
    assert_eq!(saves.len(), 4);
    assert_eq!(saves[0][0].current_retry, 0);
    assert_eq!(saves[1][0].current_retry, 1);
    assert_eq!(saves[2][0].current_retry, 2);
    assert!(saves[1][0].next_attempt_timestamp >= T0 + 10_000);
    assert!(saves[3].is_empty());
    assert!(runner.pending_jobs().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_removed_without_retry() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();

    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(10, FakeOutcome::Permanent), T0);
    runner.add_job(Box::new(job)).await.unwrap();

    let events = events_until(&mut rx, is_finished).await;
    let starts = events
        .iter()
        .filter(|e| matches!(e, RunnerEvent::Started { .. }))
        .count();
    assert_eq!(starts, 1);
    assert!(matches!(
        events.last(),
        Some(RunnerEvent::Finished {
            result: RunJobResult::PermanentFailure,
            current_retry: 0,
            ..
        })
    ));
    assert!(runner.pending_jobs().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_is_persisted_with_incremented_counter() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();

    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(0, FakeOutcome::Retry), T0)
        .with_retry_policy(5, 1_000);
    runner.add_job(Box::new(job)).await.unwrap();

    let events = events_until(&mut rx, |e| matches!(e, RunnerEvent::Rescheduled { .. })).await;
    assert!(matches!(
        events.last(),
        Some(RunnerEvent::Rescheduled { current_retry: 1, .. })
    ));
    let pending = runner.pending_jobs().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].current_retry, 1);
    assert!(pending[0].next_attempt_timestamp >= T0 + 1_000);
}
