mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{events_until, is_finished, services, start_runner, T0};
use jobrunner::jobs::bodies::{FakeOutcome, FakeSleepForJob, FakeSleepPayload};
use jobrunner::jobs::{AddJobResult, JobType, MemoryQueueStore, RunJobResult, RunnerEvent, RunnerState};
use jobrunner::RunnerError;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn timed_out_run_counts_as_retryable_failure() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();

    let payload = FakeSleepPayload::sleeping(0, FakeOutcome::Hang).with_timeout_ms(1_000);
    let job = FakeSleepForJob::new(services.clone(), payload, T0).with_retry_policy(2, 500);
    runner.add_job(Box::new(job)).await.unwrap();

    let events = events_until(&mut rx, is_finished).await;
    let rescheduled: Vec<i64> = events
        .iter()
        .filter_map(|e| match e {
            RunnerEvent::Rescheduled {
                next_attempt_timestamp,
                ..
            } => Some(next_attempt_timestamp - T0),
            _ => None,
        })
        .collect();
    assert_eq!(rescheduled.len(), 1);
    assert!((rescheduled[0] - 1_500).abs() <= 5, "rescheduled at +{}", rescheduled[0]);
    assert!(matches!(
        events.last(),
        Some(RunnerEvent::Finished {
            result: RunJobResult::PermanentFailure,
            current_retry: 2,
            ..
        })
    ));

    let runs = services.fake_journal.runs();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.exited.is_none()));
    assert_eq!(runner.state().await, RunnerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn panicking_job_is_retried_and_the_queue_keeps_working() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();

    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(0, FakeOutcome::Panic), T0)
        .with_retry_policy(2, 100);
    runner.add_job(Box::new(job)).await.unwrap();

    let events = events_until(&mut rx, is_finished).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, RunnerEvent::Rescheduled { current_retry: 1, .. })));
    assert!(matches!(
        events.last(),
        Some(RunnerEvent::Finished {
            result: RunJobResult::PermanentFailure,
            ..
        })
    ));

    let ok = FakeSleepForJob::new(
        services.clone(),
        FakeSleepPayload::sleeping(10, FakeOutcome::Success),
        services.clock.now_ms(),
    );
    runner.add_job(Box::new(ok)).await.unwrap();
    let events = events_until(&mut rx, is_finished).await;
    assert!(matches!(
        events.last(),
        Some(RunnerEvent::Finished {
            result: RunJobResult::Success,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn add_is_rolled_back_when_it_cannot_be_persisted() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;

    store.fail_next_saves(3);
    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(0, FakeOutcome::Success), T0 + 60_000);
    let err = runner.add_job(Box::new(job)).await.unwrap_err();
    assert!(matches!(err, RunnerError::Persist { .. }));
    assert!(runner.pending_jobs().await.is_empty());
    assert_eq!(runner.state().await, RunnerState::Idle);

    // two failures are absorbed by the retries
    store.fail_next_saves(2);
    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(0, FakeOutcome::Success), T0 + 60_000);
    assert_eq!(runner.add_job(Box::new(job)).await.unwrap(), AddJobResult::Added);
    assert_eq!(store.saves_for(&JobType::FakeSleepFor.queue_name()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unpersisted_outcome_is_written_before_the_next_job() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();
    let queue = JobType::FakeSleepFor.queue_name();

    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(0, FakeOutcome::Success), T0 + 1_000);
    runner.add_job(Box::new(job)).await.unwrap();
    store.fail_next_saves(3);

    events_until(&mut rx, is_finished).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.raw(&queue).as_deref(), Some("[]"));
    let saves = store.saves_for(&queue);
    assert_eq!(saves.len(), 2);
    assert!(saves[1].is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_the_in_flight_job() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();

    let job = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(2_000, FakeOutcome::Success), T0);
    runner.add_job(Box::new(job)).await.unwrap();
    events_until(&mut rx, |e| matches!(e, RunnerEvent::Started { .. })).await;

    runner.stop_and_wait_current_job().await;

    let runs = services.fake_journal.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].exited.is_some());
    assert_eq!(store.raw(&JobType::FakeSleepFor.queue_name()).as_deref(), Some("[]"));

    let late = FakeSleepForJob::new(services.clone(), FakeSleepPayload::sleeping(0, FakeOutcome::Success), T0);
    assert!(matches!(
        runner.add_job(Box::new(late)).await,
        Err(RunnerError::Stopped(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn stop_abandons_a_run_past_the_grace_and_keeps_its_record() {
    let store = Arc::new(MemoryQueueStore::new());
    let services = services();
    let runner = start_runner(JobType::FakeSleepFor, &store, &services).await;
    let mut rx = runner.subscribe();

    let payload = FakeSleepPayload::sleeping(0, FakeOutcome::Hang).with_timeout_ms(60_000);
    let job = FakeSleepForJob::new(services.clone(), payload, T0);
    runner.add_job(Box::new(job)).await.unwrap();
    events_until(&mut rx, |e| matches!(e, RunnerEvent::Started { .. })).await;

    let before = Instant::now();
    runner.stop_and_wait_current_job().await;
    let waited = before.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6), "waited {waited:?}");

    let saves = store.saves_for(&JobType::FakeSleepFor.queue_name());
    let last = saves.last().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].current_retry, 0);

    // the next process picks it up again as pending
    let restarted = start_runner(JobType::FakeSleepFor, &store, &services).await;
    assert_eq!(restarted.pending_jobs().await, *last);
    restarted.stop_and_wait_current_job().await;
}
