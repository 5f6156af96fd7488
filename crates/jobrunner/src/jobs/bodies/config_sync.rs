//! Pushing config changes to the swarm: our own config, and per group.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::jobs::bodies::{parse_payload, result_from_error, timeout_of};
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::runner::AddJobResult;
use crate::jobs::runners::RunnerRegistry;
use crate::jobs::services::JobServices;

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 3,
    delay_between_retries_ms: 15_000,
    timeout_ms: 20_000,
};

/// Changes made in quick succession collapse into the one pending sync.
pub const SYNC_DEBOUNCE_MS: i64 = 1_000;

pub struct UserSyncJob {
    record: JobRecord,
    services: Arc<JobServices>,
}

impl UserSyncJob {
    pub fn new(services: Arc<JobServices>, next_attempt_timestamp: i64) -> Self {
        let record = JobRecord::fresh(
            JobType::UserSync,
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

    pub async fn queue_new_job_if_needed(runners: &RunnerRegistry) -> Result<AddJobResult, RunnerError> {
        let job = Self::new(runners.services().clone(), runners.now_ms() + SYNC_DEBOUNCE_MS);
        runners.user_sync.add_job(Box::new(job)).await
    }
}

#[async_trait]
impl PersistedJob for UserSyncJob {
    fn job_type(&self) -> JobType {
        JobType::UserSync
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        match self.services.config_sync.push_user_config().await {
            Ok(stored) => {
                debug!(stored, "user config pushed");
                RunJobResult::Success
            }
            Err(err) => {
                warn!(error = %err, "user config push failed");
                result_from_error(&err)
            }
        }
    }

    fn job_timeout(&self) -> Duration {
        timeout_of(&DEFAULTS)
    }

    fn add_job_check(&self, pending: &[JobRecord]) -> AddJobCheck {
        self.add_job_check_same_type_present(pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSyncPayload {
    pub group_pk: String,
}

pub struct GroupSyncJob {
    record: JobRecord,
    payload: GroupSyncPayload,
    services: Arc<JobServices>,
}

impl GroupSyncJob {
    pub fn new(services: Arc<JobServices>, group_pk: &str, next_attempt_timestamp: i64) -> Self {
        let record = JobRecord::fresh(
            JobType::GroupSync,
            group_pk,
            json!({ "groupPk": group_pk }),
            &DEFAULTS,
            next_attempt_timestamp,
        );
        Self {
            record,
            payload: GroupSyncPayload {
                group_pk: group_pk.to_string(),
            },
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

    pub async fn queue_new_job_if_needed(
        runners: &RunnerRegistry,
        group_pk: &str,
    ) -> Result<AddJobResult, RunnerError> {
        let job = Self::new(
            runners.services().clone(),
            group_pk,
            runners.now_ms() + SYNC_DEBOUNCE_MS,
        );
        runners.group_sync.add_job(Box::new(job)).await
    }
}

#[async_trait]
impl PersistedJob for GroupSyncJob {
    fn job_type(&self) -> JobType {
        JobType::GroupSync
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let group_pk = self.payload.group_pk.as_str();
        if group_pk.is_empty() {
            return RunJobResult::PermanentFailure;
        }
        match self.services.config_sync.push_group_config(group_pk).await {
            Ok(stored) => {
                debug!(group_pk, stored, "group config pushed");
                RunJobResult::Success
            }
            Err(err) => {
                warn!(group_pk, error = %err, "group config push failed");
                result_from_error(&err)
            }
        }
    }

    fn job_timeout(&self) -> Duration {
        timeout_of(&DEFAULTS)
    }

    fn add_job_check(&self, pending: &[JobRecord]) -> AddJobCheck {
        self.add_job_check_same_queue_key_present(pending)
    }
}
