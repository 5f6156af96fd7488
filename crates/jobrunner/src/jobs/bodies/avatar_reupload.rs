use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::jobs::bodies::avatar_download::AvatarJobPayload;
use crate::jobs::bodies::{parse_payload, result_from_error, timeout_of};
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::services::JobServices;

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 3,
    delay_between_retries_ms: 10_000,
    timeout_ms: 10_000,
};

/// Uploads our own avatar again before the file server expires it.
pub struct AvatarReuploadJob {
    record: JobRecord,
    payload: AvatarJobPayload,
    services: Arc<JobServices>,
}

impl AvatarReuploadJob {
    pub fn new(services: Arc<JobServices>, conversation_id: &str, next_attempt_timestamp: i64) -> Self {
        let record = JobRecord::fresh(
            JobType::AvatarReupload,
            conversation_id,
            json!({ "conversationId": conversation_id }),
            &DEFAULTS,
            next_attempt_timestamp,
        );
        Self {
            record,
            payload: AvatarJobPayload {
                conversation_id: conversation_id.to_string(),
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
impl PersistedJob for AvatarReuploadJob {
    fn job_type(&self) -> JobType {
        JobType::AvatarReupload
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let conversation_id = self.payload.conversation_id.as_str();
        let avatars = &self.services.avatars;

        let Some(conversation) = avatars.conversation_avatar(conversation_id).await else {
            warn!(conversation_id, "avatar reupload: conversation not found");
            return RunJobResult::PermanentFailure;
        };
        if !conversation.is_me {
            warn!(conversation_id, "avatar reupload: only our own avatar can be reuploaded");
            return RunJobResult::PermanentFailure;
        }
        let Some(local_path) = conversation.local_path else {
            info!(conversation_id, "avatar reupload: no avatar set, nothing to do");
            return RunJobResult::Success;
        };

        let decrypted = match avatars.read_local(&local_path).await {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                warn!(conversation_id, "avatar reupload: local avatar is empty");
                return RunJobResult::PermanentFailure;
            }
            Err(err) => {
                warn!(conversation_id, error = %err, "avatar reupload: cannot read local avatar");
                return result_from_error(&err);
            }
        };

        let pointer = match avatars.upload_avatar(decrypted.clone()).await {
            Ok(pointer) => pointer,
            Err(err) => {
                warn!(conversation_id, error = %err, "avatar reupload: upload failed");
                return result_from_error(&err);
            }
        };

        match avatars.store_avatar(conversation_id, &pointer, decrypted).await {
            Ok(()) => {
                info!(conversation_id, "avatar reupload: done");
                RunJobResult::Success
            }
            Err(err) => result_from_error(&err),
        }
    }

    fn job_timeout(&self) -> Duration {
        timeout_of(&DEFAULTS)
    }

    fn add_job_check(&self, pending: &[JobRecord]) -> AddJobCheck {
        self.add_job_check_same_queue_key_present(pending)
    }
}
