use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::jobs::bodies::{parse_payload, result_from_error, timeout_of};
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::services::JobServices;

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 3,
    delay_between_retries_ms: 10_000,
    timeout_ms: 30_000,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInvitePayload {
    pub group_pk: String,
    pub member: String,
}

pub struct GroupInviteJob {
    record: JobRecord,
    payload: GroupInvitePayload,
    services: Arc<JobServices>,
}

impl GroupInviteJob {
    pub fn new(
        services: Arc<JobServices>,
        group_pk: &str,
        member: &str,
        next_attempt_timestamp: i64,
    ) -> Self {
        let record = JobRecord::fresh(
            JobType::GroupInvite,
            format!("{group_pk}:{member}"),
            json!({ "groupPk": group_pk, "member": member }),
            &DEFAULTS,
            next_attempt_timestamp,
        );
        Self {
            record,
            payload: GroupInvitePayload {
                group_pk: group_pk.to_string(),
                member: member.to_string(),
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
}

#[async_trait]
impl PersistedJob for GroupInviteJob {
    fn job_type(&self) -> JobType {
        JobType::GroupInvite
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let GroupInvitePayload { group_pk, member } = &self.payload;
        if group_pk.is_empty() || member.is_empty() {
            return RunJobResult::PermanentFailure;
        }
        match self.services.groups.send_invite(group_pk, member).await {
            Ok(()) => {
                info!(%group_pk, %member, "group invite sent");
                RunJobResult::Success
            }
            Err(err) => {
                warn!(%group_pk, %member, error = %err, "group invite failed");
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPendingRemovalPayload {
    pub group_pk: String,
}

/// Removes members flagged for removal from a group we administer.
pub struct GroupPendingRemovalJob {
    record: JobRecord,
    payload: GroupPendingRemovalPayload,
    services: Arc<JobServices>,
}

impl GroupPendingRemovalJob {
    pub fn new(services: Arc<JobServices>, group_pk: &str, next_attempt_timestamp: i64) -> Self {
        let record = JobRecord::fresh(
            JobType::GroupPendingRemoval,
            group_pk,
            json!({ "groupPk": group_pk }),
            &DEFAULTS,
            next_attempt_timestamp,
        );
        Self {
            record,
            payload: GroupPendingRemovalPayload {
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
}

#[async_trait]
impl PersistedJob for GroupPendingRemovalJob {
    fn job_type(&self) -> JobType {
        JobType::GroupPendingRemoval
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let group_pk = self.payload.group_pk.as_str();
        if group_pk.is_empty() {
            return RunJobResult::PermanentFailure;
        }
        match self.services.groups.process_pending_removals(group_pk).await {
            Ok(removed) => {
                info!(group_pk, removed, "pending removals processed");
                RunJobResult::Success
            }
            Err(err) => {
                warn!(group_pk, error = %err, "processing pending removals failed");
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
