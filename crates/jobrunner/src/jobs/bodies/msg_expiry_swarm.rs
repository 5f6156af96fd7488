//! Keeping disappearing-message expiries in step with the swarm.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::jobs::bodies::{parse_payload, result_from_error, timeout_of};
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::services::JobServices;

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 3,
    delay_between_retries_ms: 2_000,
    timeout_ms: 30_000,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgExpiryPayload {
    pub conversation_id: String,
    pub message_hashes: Vec<String>,
}

impl MsgExpiryPayload {
    fn to_record(&self, job_type: JobType, next_attempt_timestamp: i64) -> JobRecord {
        let payload = serde_json::json!({
            "conversationId": self.conversation_id,
            "messageHashes": self.message_hashes,
        });
        JobRecord::fresh(
            job_type,
            self.conversation_id.clone(),
            payload,
            &DEFAULTS,
            next_attempt_timestamp,
        )
    }

    /// True if every hash of `self` is also in `other`.
    fn is_covered_by(&self, other: &MsgExpiryPayload) -> bool {
        let theirs: HashSet<&str> = other.message_hashes.iter().map(String::as_str).collect();
        self.message_hashes.iter().all(|h| theirs.contains(h.as_str()))
    }
}

/// Pending records of `job_type` for the same conversation, with their payloads.
fn same_conversation<'a>(
    job_type: JobType,
    conversation_id: &'a str,
    pending: &'a [JobRecord],
) -> impl Iterator<Item = (&'a JobRecord, MsgExpiryPayload)> + 'a {
    pending
        .iter()
        .filter(move |r| r.job_type == job_type.as_str() && r.queue_key == conversation_id)
        .filter_map(|r| parse_payload::<MsgExpiryPayload>(r).ok().map(|p| (r, p)))
}

/// Asks the swarm how long some messages still live and applies it locally.
pub struct FetchMsgExpirySwarmJob {
    record: JobRecord,
    payload: MsgExpiryPayload,
    services: Arc<JobServices>,
}

impl FetchMsgExpirySwarmJob {
    pub fn new(
        services: Arc<JobServices>,
        conversation_id: &str,
        message_hashes: Vec<String>,
        next_attempt_timestamp: i64,
    ) -> Self {
        let payload = MsgExpiryPayload {
            conversation_id: conversation_id.to_string(),
            message_hashes,
        };
        let record = payload.to_record(JobType::FetchMsgExpirySwarm, next_attempt_timestamp);
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
}

#[async_trait]
impl PersistedJob for FetchMsgExpirySwarmJob {
    fn job_type(&self) -> JobType {
        JobType::FetchMsgExpirySwarm
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let p = &self.payload;
        if p.message_hashes.is_empty() {
            return RunJobResult::Success;
        }
        match self
            .services
            .swarm_expiry
            .fetch_expiries(&p.conversation_id, &p.message_hashes)
            .await
        {
            Ok(updated) => {
                debug!(conversation_id = %p.conversation_id, updated, "expiries fetched");
                RunJobResult::Success
            }
            Err(err) => {
                warn!(conversation_id = %p.conversation_id, error = %err, "fetching expiries failed");
                result_from_error(&err)
            }
        }
    }

    fn job_timeout(&self) -> Duration {
        timeout_of(&DEFAULTS)
    }

    /// Skip when a pending fetch for the conversation already asks for every hash.
    fn add_job_check(&self, pending: &[JobRecord]) -> AddJobCheck {
        let covered = same_conversation(self.job_type(), &self.payload.conversation_id, pending)
            .any(|(_, other)| self.payload.is_covered_by(&other));
        if covered {
            AddJobCheck::SkipSameJobPresent
        } else {
            AddJobCheck::Accept
        }
    }
}

/// Pushes the expiry we computed locally for some messages to the swarm.
pub struct UpdateMsgExpirySwarmJob {
    record: JobRecord,
    payload: MsgExpiryPayload,
    services: Arc<JobServices>,
}

impl UpdateMsgExpirySwarmJob {
    pub fn new(
        services: Arc<JobServices>,
        conversation_id: &str,
        message_hashes: Vec<String>,
        next_attempt_timestamp: i64,
    ) -> Self {
        let payload = MsgExpiryPayload {
            conversation_id: conversation_id.to_string(),
            message_hashes,
        };
        let record = payload.to_record(JobType::UpdateMsgExpirySwarm, next_attempt_timestamp);
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
}

#[async_trait]
impl PersistedJob for UpdateMsgExpirySwarmJob {
    fn job_type(&self) -> JobType {
        JobType::UpdateMsgExpirySwarm
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let p = &self.payload;
        if p.message_hashes.is_empty() {
            return RunJobResult::Success;
        }
        match self
            .services
            .swarm_expiry
            .update_expiries(&p.conversation_id, &p.message_hashes)
            .await
        {
            Ok(updated) => {
                debug!(conversation_id = %p.conversation_id, updated, "expiries pushed");
                RunJobResult::Success
            }
            Err(err) => {
                warn!(conversation_id = %p.conversation_id, error = %err, "pushing expiries failed");
                result_from_error(&err)
            }
        }
    }

    fn job_timeout(&self) -> Duration {
        timeout_of(&DEFAULTS)
    }

    /// An update covering every hash of an older pending update replaces it.
    fn non_running_jobs_to_remove(&self, pending: &[JobRecord]) -> Vec<JobRecord> {
        same_conversation(self.job_type(), &self.payload.conversation_id, pending)
            .filter(|(r, other)| r.identifier != self.record.identifier && other.is_covered_by(&self.payload))
            .map(|(r, _)| r.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn update_supersedes_only_covered_jobs_of_the_same_conversation() {
        let services = Arc::new(JobServices::unconfigured());
        let older = UpdateMsgExpirySwarmJob::new(services.clone(), "c1", hashes(&["a"]), 0);
        let wider = UpdateMsgExpirySwarmJob::new(services.clone(), "c1", hashes(&["a", "z"]), 0);
        let other_conv = UpdateMsgExpirySwarmJob::new(services.clone(), "c2", hashes(&["a"]), 0);
        let pending = vec![
            older.persisted().clone(),
            wider.persisted().clone(),
            other_conv.persisted().clone(),
        ];

        let new = UpdateMsgExpirySwarmJob::new(services, "c1", hashes(&["a", "b"]), 0);
        let removed = new.non_running_jobs_to_remove(&pending);
        assert_eq!(removed, vec![older.persisted().clone()]);
    }

    #[test]
    fn fetch_is_skipped_when_already_covered() {
        let services = Arc::new(JobServices::unconfigured());
        let pending =
            vec![FetchMsgExpirySwarmJob::new(services.clone(), "c1", hashes(&["a", "b"]), 0).persisted().clone()];

        let subset = FetchMsgExpirySwarmJob::new(services.clone(), "c1", hashes(&["b"]), 0);
        assert_eq!(subset.add_job_check(&pending), AddJobCheck::SkipSameJobPresent);

        let more = FetchMsgExpirySwarmJob::new(services, "c1", hashes(&["b", "c"]), 0);
        assert_eq!(more.add_job_check(&pending), AddJobCheck::Accept);
    }
}
