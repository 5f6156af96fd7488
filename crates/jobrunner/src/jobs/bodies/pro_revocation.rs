use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::RunnerError;
use crate::jobs::bodies::timeout_of;
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::runner::AddJobResult;
use crate::jobs::runners::RunnerRegistry;
use crate::jobs::services::JobServices;

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 2,
    delay_between_retries_ms: 15_000,
    timeout_ms: 20_000,
};

pub const DEFAULT_MIN_INTERVAL_MS: i64 = 15 * 60 * 1000;

/// How far ahead of now a queued refresh is scheduled.
pub const QUEUE_DELAY_MS: i64 = 20_000;

/// When the revocation list was last refreshed successfully.
#[derive(Debug)]
pub struct RevocationRunState {
    last_success_ms: AtomicI64,
    min_interval_ms: i64,
}

impl RevocationRunState {
    pub fn new(min_interval_ms: i64) -> Self {
        Self {
            last_success_ms: AtomicI64::new(0),
            min_interval_ms,
        }
    }

    pub fn last_success_ms(&self) -> i64 {
        self.last_success_ms.load(Ordering::Relaxed)
    }

    pub fn mark_success(&self, now_ms: i64) {
        self.last_success_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        let last = self.last_success_ms();
        last == 0 || now_ms - last > self.min_interval_ms
    }
}

impl Default for RevocationRunState {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL_MS)
    }
}

/// Refreshes the locally cached list of revoked pro proofs.
pub struct UpdateProRevocationListJob {
    record: JobRecord,
    services: Arc<JobServices>,
}

impl UpdateProRevocationListJob {
    pub fn new(services: Arc<JobServices>, next_attempt_timestamp: i64) -> Self {
        let record = JobRecord::fresh(
            JobType::UpdateProRevocationList,
            "",
            json!({}),
            &DEFAULTS,
            next_attempt_timestamp,
        );
        Self { record, services }
    }

    pub fn from_record(record: JobRecord, services: Arc<JobServices>) -> Result<Self, serde_json::Error> {
        Ok(Self { record, services })
    }

    /// Add a refresh unless the last successful one is recent enough.
    /// `Ok(None)` means it was too soon.
    pub async fn queue_new_job_if_needed(
        runners: &RunnerRegistry,
    ) -> Result<Option<AddJobResult>, RunnerError> {
        let now = runners.now_ms();
        let runs = &runners.services().revocation_runs;
        if !runs.is_due(now) {
            debug!(
                last_success_ms = runs.last_success_ms(),
                "pro revocation list refreshed recently, not queueing"
            );
            return Ok(None);
        }
        let job = Self::new(runners.services().clone(), now + QUEUE_DELAY_MS);
        runners.pro_revocation.add_job(Box::new(job)).await.map(Some)
    }
}

#[async_trait]
impl PersistedJob for UpdateProRevocationListJob {
    fn job_type(&self) -> JobType {
        JobType::UpdateProRevocationList
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let pro = &self.services.pro_revocation;
        if !pro.enabled().await {
            debug!("pro is disabled, skipping revocation refresh");
            return RunJobResult::Success;
        }

        let ticket = pro.current_ticket().await;
        let list = match pro.fetch_revocations(ticket).await {
            Ok(list) => list,
            Err(err) => {
                warn!(ticket, error = %err, "fetching pro revocations failed");
                return RunJobResult::RetryJobIfPossible;
            }
        };

        let now = self.services.clock.now_ms();
        if list.ticket <= ticket {
            debug!(ticket, "pro revocation list already up to date");
            self.services.revocation_runs.mark_success(now);
            return RunJobResult::Success;
        }

        let (new_ticket, items) = (list.ticket, list.items.len());
        if let Err(err) = pro.store_revocations(list).await {
            warn!(error = %err, "storing pro revocations failed");
            return RunJobResult::RetryJobIfPossible;
        }
        info!(ticket = new_ticket, items, "pro revocation list updated");
        self.services.revocation_runs.mark_success(now);
        RunJobResult::Success
    }

    fn job_timeout(&self) -> Duration {
        timeout_of(&DEFAULTS)
    }

    fn add_job_check(&self, pending: &[JobRecord]) -> AddJobCheck {
        self.add_job_check_same_type_present(pending)
    }
}
