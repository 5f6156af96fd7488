use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, ServiceError};
use crate::jobs::bodies::{parse_payload, result_from_error, timeout_of};
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::runner::AddJobResult;
use crate::jobs::runners::RunnerRegistry;
use crate::jobs::services::{AvatarPointer, ConversationAvatar, ConversationKind, JobServices};

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 3,
    delay_between_retries_ms: 10_000,
    timeout_ms: 10_000,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarJobPayload {
    pub conversation_id: String,
}

/// Downloads, decrypts and stores the avatar a conversation points to.
pub struct AvatarDownloadJob {
    record: JobRecord,
    payload: AvatarJobPayload,
    services: Arc<JobServices>,
}

impl AvatarDownloadJob {
    pub fn new(services: Arc<JobServices>, conversation_id: &str, next_attempt_timestamp: i64) -> Self {
        let record = JobRecord::fresh(
            JobType::AvatarDownload,
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

    /// True when the conversation has a complete avatar pointer worth fetching.
    pub async fn should_add(services: &JobServices, conversation_id: &str) -> bool {
        match services.avatars.conversation_avatar(conversation_id).await {
            None => {
                warn!(conversation_id, "avatar download: conversation not found");
                false
            }
            Some(conversation) => {
                is_supported(&conversation) && complete_pointer(conversation.pointer).is_some()
            }
        }
    }

    /// Queue a download for `conversation_id` if one makes sense right now.
    /// `Ok(None)` means the checks decided there was nothing to do.
    pub async fn enqueue_if_needed(
        runners: &RunnerRegistry,
        conversation_id: &str,
    ) -> Result<Option<AddJobResult>, RunnerError> {
        if !Self::should_add(runners.services(), conversation_id).await {
            return Ok(None);
        }
        let job = Self::new(runners.services().clone(), conversation_id, runners.now_ms());
        runners.avatar_download.add_job(Box::new(job)).await.map(Some)
    }
}

pub(crate) fn is_supported(conversation: &ConversationAvatar) -> bool {
    matches!(conversation.kind, ConversationKind::Private | ConversationKind::GroupV2)
}

pub(crate) fn complete_pointer(pointer: Option<AvatarPointer>) -> Option<AvatarPointer> {
    pointer.filter(|p| !p.url.is_empty() && !p.profile_key.is_empty())
}

#[async_trait]
impl PersistedJob for AvatarDownloadJob {
    fn job_type(&self) -> JobType {
        JobType::AvatarDownload
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let conversation_id = self.payload.conversation_id.as_str();
        if conversation_id.is_empty() {
            return RunJobResult::PermanentFailure;
        }
        let avatars = &self.services.avatars;

        let Some(conversation) = avatars.conversation_avatar(conversation_id).await else {
            warn!(conversation_id, "avatar download: conversation not found");
            return RunJobResult::PermanentFailure;
        };
        if !is_supported(&conversation) {
            warn!(conversation_id, "avatar download: unsupported conversation type");
            return RunJobResult::PermanentFailure;
        }
        let Some(pointer) = complete_pointer(conversation.pointer) else {
            debug!(conversation_id, "avatar download: no avatar pointer, nothing to do");
            return RunJobResult::Success;
        };

        let downloaded = match avatars.download(&pointer.url).await {
            Ok(data) => data,
            Err(err) => {
                warn!(conversation_id, error = %err, "avatar download failed");
                return result_from_error(&err);
            }
        };
        if downloaded.is_empty() {
            debug!(conversation_id, "avatar download: empty response");
            return RunJobResult::RetryJobIfPossible;
        }

        let decrypted = match avatars.decrypt(&downloaded, &pointer.profile_key).await {
            Ok(data) => data,
            Err(ServiceError::Invalid(reason)) => {
                info!(conversation_id, %reason, "avatar download: cannot decrypt with the provided key");
                return RunJobResult::PermanentFailure;
            }
            Err(err) => {
                warn!(conversation_id, error = %err, "avatar download: decryption failed");
                return RunJobResult::RetryJobIfPossible;
            }
        };
        if decrypted.is_empty() {
            warn!(conversation_id, "avatar download: decrypted avatar is empty");
            return RunJobResult::RetryJobIfPossible;
        }

        match avatars.store_avatar(conversation_id, &pointer, decrypted).await {
            Ok(()) => {
                debug!(conversation_id, "avatar download: stored");
                RunJobResult::Success
            }
            Err(err) => {
                warn!(conversation_id, error = %err, "avatar download: could not store avatar");
                RunJobResult::RetryJobIfPossible
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
