use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::RunnerError;
use crate::jobs::bodies::avatar_download::{complete_pointer, AvatarJobPayload};
use crate::jobs::bodies::{parse_payload, timeout_of};
use crate::jobs::model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::runner::AddJobResult;
use crate::jobs::runners::RunnerRegistry;
use crate::jobs::services::{ConversationAvatar, ConversationKind, JobServices};

pub const DEFAULTS: JobDefaults = JobDefaults {
    max_attempts: 3,
    delay_between_retries_ms: 10_000,
    timeout_ms: 10_000,
};

/// Re-processes a locally stored avatar so it gains the derived files
/// (static fallback) newer versions expect.
pub struct AvatarMigrateJob {
    record: JobRecord,
    payload: AvatarJobPayload,
    services: Arc<JobServices>,
}

impl AvatarMigrateJob {
    pub fn new(services: Arc<JobServices>, conversation_id: &str, next_attempt_timestamp: i64) -> Self {
        let record = JobRecord::fresh(
            JobType::AvatarMigrate,
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

    fn needs_migration(conversation: &ConversationAvatar) -> bool {
        conversation.kind == ConversationKind::Private
            && conversation.local_path.is_some()
            && conversation.fallback_path.is_none()
    }

    /// Queue a migration for every conversation that still needs one.
    /// Returns how many jobs were actually added.
    pub async fn schedule_all(runners: &RunnerRegistry) -> Result<usize, RunnerError> {
        let services = runners.services();
        let mut added = 0;
        for conversation_id in services.avatars.conversation_ids().await {
            let Some(conversation) = services.avatars.conversation_avatar(&conversation_id).await else {
                continue;
            };
            if !Self::needs_migration(&conversation) {
                continue;
            }
            let job = Self::new(services.clone(), &conversation_id, runners.now_ms());
            if runners.avatar_migrate.add_job(Box::new(job)).await? == AddJobResult::Added {
                added += 1;
            }
        }
        info!(added, "avatar migrate: scheduled");
        Ok(added)
    }

    async fn reset(&self, conversation_id: &str) {
        if let Err(err) = self.services.avatars.reset_avatar(conversation_id).await {
            warn!(conversation_id, error = %err, "avatar migrate: reset failed");
        }
    }
}

#[async_trait]
impl PersistedJob for AvatarMigrateJob {
    fn job_type(&self) -> JobType {
        JobType::AvatarMigrate
    }

    fn persisted(&self) -> &JobRecord {
        &self.record
    }

    async fn run(&self) -> RunJobResult {
        let conversation_id = self.payload.conversation_id.as_str();
        let avatars = &self.services.avatars;

        let Some(conversation) = avatars.conversation_avatar(conversation_id).await else {
            debug!(conversation_id, "avatar migrate: conversation gone");
            return RunJobResult::Success;
        };
        if conversation.kind != ConversationKind::Private {
            return RunJobResult::Success;
        }
        let (Some(pointer), Some(local_path)) =
            (complete_pointer(conversation.pointer), conversation.local_path)
        else {
            debug!(conversation_id, "avatar migrate: nothing stored locally");
            return RunJobResult::Success;
        };

        let decrypted = match avatars.read_local(&local_path).await {
            Ok(data) => data,
            Err(err) => {
                warn!(conversation_id, error = %err, "avatar migrate: cannot read local avatar");
                self.reset(conversation_id).await;
                return RunJobResult::RetryJobIfPossible;
            }
        };
        if decrypted.is_empty() {
            info!(conversation_id, "avatar migrate: local avatar is empty, resetting");
            self.reset(conversation_id).await;
            return RunJobResult::Success;
        }

        match avatars.store_avatar(conversation_id, &pointer, decrypted).await {
            Ok(()) => RunJobResult::Success,
            Err(err) => {
                warn!(conversation_id, error = %err, "avatar migrate: processing failed");
                self.reset(conversation_id).await;
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
