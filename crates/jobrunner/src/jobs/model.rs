use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Persisted form of one job. This is what the store holds, one list per queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Stable tag mapping the record back to its job body (see [`JobType`]).
    #[serde(default)]
    pub job_type: String,
    /// Unique per job, kept across retries.
    pub identifier: String,
    /// Domain key used for deduplication (conversation id, group key, ...).
    #[serde(default)]
    pub queue_key: String,
    /// Epoch ms at which the job becomes eligible to run.
    pub next_attempt_timestamp: i64,
    /// Constant backoff in ms added after a retryable failure.
    pub delay_between_retries: i64,
    pub max_attempts: u32,
    /// Failed attempts so far.
    #[serde(default)]
    pub current_retry: u32,
    #[serde(default)]
    pub payload: Value,
}

impl JobRecord {
    /// Fresh record for application-created jobs: new identifier, zero retries.
    pub fn fresh(
        job_type: JobType,
        queue_key: impl Into<String>,
        payload: Value,
        defaults: &JobDefaults,
        next_attempt_timestamp: i64,
    ) -> Self {
        Self {
            job_type: job_type.as_str().to_string(),
            identifier: Uuid::new_v4().to_string(),
            queue_key: queue_key.into(),
            next_attempt_timestamp,
            delay_between_retries: defaults.delay_between_retries_ms,
            max_attempts: defaults.max_attempts.max(1),
            current_retry: 0,
            payload,
        }
    }
}

/// Retry/timeout defaults a job type applies to fresh records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDefaults {
    pub max_attempts: u32,
    pub delay_between_retries_ms: i64,
    pub timeout_ms: u64,
}

/// The closed set of job types. Each one gets its own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobType {
    UserSync,
    GroupSync,
    AvatarDownload,
    AvatarReupload,
    AvatarMigrate,
    FetchMsgExpirySwarm,
    UpdateMsgExpirySwarm,
    GroupInvite,
    GroupPendingRemoval,
    UpdateProRevocationList,
    FakeSleepFor,
    FakeSleepForMulti,
}

impl JobType {
    pub const ALL: [JobType; 12] = [
        JobType::UserSync,
        JobType::GroupSync,
        JobType::AvatarDownload,
        JobType::AvatarReupload,
        JobType::AvatarMigrate,
        JobType::FetchMsgExpirySwarm,
        JobType::UpdateMsgExpirySwarm,
        JobType::GroupInvite,
        JobType::GroupPendingRemoval,
        JobType::UpdateProRevocationList,
        JobType::FakeSleepFor,
        JobType::FakeSleepForMulti,
    ];

    /// Persisted discriminant. Never change an existing value.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::UserSync => "UserSyncJobType",
            JobType::GroupSync => "GroupSyncJobType",
            JobType::AvatarDownload => "AvatarDownloadJobType",
            JobType::AvatarReupload => "AvatarReuploadJobType",
            JobType::AvatarMigrate => "AvatarMigrateJobType",
            JobType::FetchMsgExpirySwarm => "FetchMsgExpirySwarmJobType",
            JobType::UpdateMsgExpirySwarm => "UpdateMsgExpirySwarmJobType",
            JobType::GroupInvite => "GroupInviteJobType",
            JobType::GroupPendingRemoval => "GroupPendingRemovalJobType",
            JobType::UpdateProRevocationList => "UpdateProRevocationListJobType",
            JobType::FakeSleepFor => "FakeSleepForJobType",
            JobType::FakeSleepForMulti => "FakeSleepForJobMultiType",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        JobType::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Name of the persisted list backing this type's queue.
    pub fn queue_name(&self) -> String {
        format!("jobRunner-{}", self.as_str())
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `run()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunJobResult {
    Success,
    PermanentFailure,
    RetryJobIfPossible,
}

impl RunJobResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunJobResult::Success => "success",
            RunJobResult::PermanentFailure => "permanent_failure",
            RunJobResult::RetryJobIfPossible => "retry_job_if_possible",
        }
    }
}

/// Decision taken by a job body before it is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddJobCheck {
    Accept,
    SkipSameJobPresent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_tags_round_trip() {
        for t in JobType::ALL {
            assert_eq!(JobType::from_tag(t.as_str()), Some(t));
        }
        assert_eq!(JobType::from_tag(""), None);
        assert_eq!(JobType::from_tag("avatarDownloadJobType"), None);
    }

    #[test]
    fn record_uses_camel_case_and_tolerates_missing_optional_fields() {
        let raw = serde_json::json!({
            "identifier": "abc",
            "nextAttemptTimestamp": 10,
            "delayBetweenRetries": 5,
            "maxAttempts": 3
        });
        let record: JobRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.job_type, "");
        assert_eq!(record.current_retry, 0);
        assert_eq!(record.payload, Value::Null);

        let back = serde_json::to_value(&record).unwrap();
        assert!(back.get("nextAttemptTimestamp").is_some());
        assert!(back.get("queueKey").is_some());
    }

    #[test]
    fn fresh_record_clamps_max_attempts() {
        let defaults = JobDefaults {
            max_attempts: 0,
            delay_between_retries_ms: 1000,
            timeout_ms: 1000,
        };
        let record = JobRecord::fresh(JobType::UserSync, "k", Value::Null, &defaults, 42);
        assert_eq!(record.max_attempts, 1);
        assert_eq!(record.job_type, "UserSyncJobType");
        assert_eq!(record.next_attempt_timestamp, 42);
        assert!(!record.identifier.is_empty());
    }

    #[test]
    fn run_result_labels_match_their_serialized_form() {
        for result in [
            RunJobResult::Success,
            RunJobResult::PermanentFailure,
            RunJobResult::RetryJobIfPossible,
        ] {
            assert_eq!(serde_json::to_value(result).unwrap(), result.as_str());
        }
    }
}
