//! Jobs that only sleep and report a chosen outcome. Used to exercise the
//! runners (and by `jobctl seed-fake`).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::jobs::bodies::parse_payload;
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::services::JobServices;

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 3,
    delay_between_retries_ms: 3_000,
    timeout_ms: 10_000,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FakeOutcome {
    #[default]
    Success,
    Retry,
    Permanent,
    Panic,
    /// Never returns.
    Hang,
}

fn default_timeout_ms() -> u64 {
    DEFAULTS.timeout_ms
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeSleepPayload {
    pub sleep_duration_ms: u64,
    #[serde(default)]
    pub outcome: FakeOutcome,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub label: String,
}

impl FakeSleepPayload {
    pub fn sleeping(sleep_duration_ms: u64, outcome: FakeOutcome) -> Self {
        Self {
            sleep_duration_ms,
            outcome,
            timeout_ms: DEFAULTS.timeout_ms,
            label: String::new(),
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn to_record(&self, job_type: JobType, next_attempt_timestamp: i64) -> JobRecord {
        let payload = serde_json::to_value(self).unwrap_or_default();
        JobRecord::fresh(job_type, "", payload, &DEFAULTS, next_attempt_timestamp)
    }
}

/// One observed run of a fake job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeRun {
    pub identifier: String,
    pub label: String,
    pub attempt: u32,
    pub entered: Instant,
    /// `None` while running, or if the run was cut short.
    pub exited: Option<Instant>,
}

/// Entry/exit log of fake job runs, in start order.
#[derive(Debug, Default)]
pub struct FakeJobJournal {
    runs: Mutex<Vec<FakeRun>>,
}

impl FakeJobJournal {
    fn lock(&self) -> MutexGuard<'_, Vec<FakeRun>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, record: &JobRecord, label: &str) -> usize {
        let mut runs = self.lock();
        runs.push(FakeRun {
            identifier: record.identifier.clone(),
            label: label.to_string(),
            attempt: record.current_retry,
            entered: Instant::now(),
            exited: None,
        });
        runs.len() - 1
    }

    fn exit(&self, index: usize) {
        if let Some(run) = self.lock().get_mut(index) {
            run.exited = Some(Instant::now());
        }
    }

    pub fn runs(&self) -> Vec<FakeRun> {
        self.lock().clone()
    }

    pub fn runs_of(&self, label: &str) -> Vec<FakeRun> {
        self.lock().iter().filter(|r| r.label == label).cloned().collect()
    }
}

async fn run_fake(services: &JobServices, record: &JobRecord, payload: &FakeSleepPayload) -> RunJobResult {
    let journal = &services.fake_journal;
    let index = journal.enter(record, &payload.label);
    debug!(
        identifier = %record.identifier,
        label = %payload.label,
        sleep_ms = payload.sleep_duration_ms,
        "fake job sleeping"
    );
    tokio::time::sleep(Duration::from_millis(payload.sleep_duration_ms)).await;

    let result = match payload.outcome {
        FakeOutcome::Success => RunJobResult::Success,
        FakeOutcome::Retry => RunJobResult::RetryJobIfPossible,
        FakeOutcome::Permanent => RunJobResult::PermanentFailure,
        FakeOutcome::Panic => panic!("fake job {} asked to panic", record.identifier),
        FakeOutcome::Hang => std::future::pending().await,
    };
    journal.exit(index);
    result
}

/// Singleton fake job: a second one is skipped while one is pending.
pub struct FakeSleepForJob {
    record: JobRecord,
    payload: FakeSleepPayload,
    services: Arc<JobServices>,
}

impl FakeSleepForJob {
    pub fn new(services: Arc<JobServices>, payload: FakeSleepPayload, next_attempt_timestamp: i64) -> Self {
        let record = payload.to_record(JobType::FakeSleepFor, next_attempt_timestamp);
        Self {
            record,
            payload,
            services,
        }
    }

    pub fn from_record(record: JobRecord, services: Arc<JobServices>) -> Result<Self, serde_json::Error> {
        let payload = parse_payload(&record)?;
        Ok(Self {
            record,
            payload,
            services,
        })
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, delay_between_retries_ms: i64) -> Self {
        self.record.max_attempts = max_attempts.max(1);
        self.record.delay_between_retries = delay_between_retries_ms;
        self
    }
}

#[async_trait]
impl PersistedJob for FakeSleepForJob {
    fn job_type(&self) -> JobType {
        JobType::FakeSleepFor
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        run_fake(&self.services, &self.record, &self.payload).await
    }

    fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.payload.timeout_ms)
    }

    fn add_job_check(&self, pending: &[JobRecord]) -> AddJobCheck {
        self.add_job_check_same_type_present(pending)
    }
}

/// Fake job that can be queued many times; a longer one supersedes shorter pending ones.
pub struct FakeSleepForMultiJob {
    record: JobRecord,
    payload: FakeSleepPayload,
    services: Arc<JobServices>,
}

impl FakeSleepForMultiJob {
    pub fn new(services: Arc<JobServices>, payload: FakeSleepPayload, next_attempt_timestamp: i64) -> Self {
        let record = payload.to_record(JobType::FakeSleepForMulti, next_attempt_timestamp);
        Self {
            record,
            payload,
            services,
        }
    }

    pub fn from_record(record: JobRecord, services: Arc<JobServices>) -> Result<Self, serde_json::Error> {
        let payload = parse_payload(&record)?;
        Ok(Self {
            record,
            payload,
            services,
        })
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, delay_between_retries_ms: i64) -> Self {
        self.record.max_attempts = max_attempts.max(1);
        self.record.delay_between_retries = delay_between_retries_ms;
        self
    }

    /// Record for seeding a queue directly through the store.
    pub fn seed_record(payload: &FakeSleepPayload, next_attempt_timestamp: i64) -> JobRecord {
        payload.to_record(JobType::FakeSleepForMulti, next_attempt_timestamp)
    }
}

#[async_trait]
impl PersistedJob for FakeSleepForMultiJob {
    fn job_type(&self) -> JobType {
        JobType::FakeSleepForMulti
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        run_fake(&self.services, &self.record, &self.payload).await
    }

    fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.payload.timeout_ms)
    }

    fn non_running_jobs_to_remove(&self, pending: &[JobRecord]) -> Vec<JobRecord> {
        let tag = self.job_type().as_str();
        pending
            .iter()
            .filter(|r| r.job_type == tag && r.identifier != self.record.identifier)
            .filter(|r| {
                parse_payload::<FakeSleepPayload>(r)
                    .map(|p| p.sleep_duration_ms < self.payload.sleep_duration_ms)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_defaults_when_fields_are_missing() {
        let p: FakeSleepPayload = serde_json::from_value(serde_json::json!({ "sleepDurationMs": 5 })).unwrap();
        assert_eq!(p.outcome, FakeOutcome::Success);
        assert_eq!(p.timeout_ms, DEFAULTS.timeout_ms);
    }

    #[test]
    fn multi_job_supersedes_shorter_pending_jobs() {
        let services = Arc::new(JobServices::unconfigured());
        let short = FakeSleepForMultiJob::new(services.clone(), FakeSleepPayload::sleeping(10, FakeOutcome::Success), 0);
        let long = FakeSleepForMultiJob::new(services.clone(), FakeSleepPayload::sleeping(500, FakeOutcome::Success), 0);
        let pending = vec![short.persisted().clone(), long.persisted().clone()];

        let mid = FakeSleepForMultiJob::new(services, FakeSleepPayload::sleeping(100, FakeOutcome::Success), 0);
        assert_eq!(mid.non_running_jobs_to_remove(&pending), vec![short.persisted().clone()]);
    }
}
