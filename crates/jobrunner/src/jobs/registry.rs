//! Maps persisted records back to their job bodies.

use std::sync::Arc;

use tracing::warn;

use crate::jobs::bodies::{
    AvatarDownloadJob, AvatarMigrateJob, AvatarReuploadJob, FakeSleepForJob, FakeSleepForMultiJob,
    FetchMsgExpirySwarmJob, GroupInviteJob, GroupPendingRemovalJob, GroupSyncJob,
    UpdateMsgExpirySwarmJob, UpdateProRevocationListJob, UserSyncJob,
};
use crate::jobs::model::{JobRecord, JobType};
use crate::jobs::persisted::PersistedJob;
use crate::jobs::services::JobServices;

fn boxed<J: PersistedJob>(job: J) -> Box<dyn PersistedJob> {
    Box::new(job)
}

/// Rebuild the job body for a persisted record.
///
/// `None` (with a warning) when the record has no type tag, an unknown one,
/// or a payload its body cannot read. Callers drop such records.
pub fn persisted_job_from_record(
    record: &JobRecord,
    services: &Arc<JobServices>,
) -> Option<Box<dyn PersistedJob>> {
    if record.job_type.trim().is_empty() {
        warn!(identifier = %record.identifier, "persisted job has no jobType");
        return None;
    }
    let Some(job_type) = JobType::from_tag(&record.job_type) else {
        warn!(
            identifier = %record.identifier,
            job_type = %record.job_type,
            "unknown persisted job type"
        );
        return None;
    };

    let rec = record.clone();
    let services = services.clone();
    let built = match job_type {
        JobType::UserSync => UserSyncJob::from_record(rec, services).map(boxed),
        JobType::GroupSync => GroupSyncJob::from_record(rec, services).map(boxed),
        JobType::AvatarDownload => AvatarDownloadJob::from_record(rec, services).map(boxed),
        JobType::AvatarReupload => AvatarReuploadJob::from_record(rec, services).map(boxed),
        JobType::AvatarMigrate => AvatarMigrateJob::from_record(rec, services).map(boxed),
        JobType::FetchMsgExpirySwarm => FetchMsgExpirySwarmJob::from_record(rec, services).map(boxed),
        JobType::UpdateMsgExpirySwarm => UpdateMsgExpirySwarmJob::from_record(rec, services).map(boxed),
        JobType::GroupInvite => GroupInviteJob::from_record(rec, services).map(boxed),
        JobType::GroupPendingRemoval => GroupPendingRemovalJob::from_record(rec, services).map(boxed),
        JobType::UpdateProRevocationList => {
            UpdateProRevocationListJob::from_record(rec, services).map(boxed)
        }
        JobType::FakeSleepFor => FakeSleepForJob::from_record(rec, services).map(boxed),
        JobType::FakeSleepForMulti => FakeSleepForMultiJob::from_record(rec, services).map(boxed),
    };

    match built {
        Ok(job) => Some(job),
        Err(err) => {
            warn!(
                identifier = %record.identifier,
                job_type = %record.job_type,
                error = %err,
                "persisted job payload is unreadable"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(job_type: &str, payload: serde_json::Value) -> JobRecord {
        JobRecord {
            job_type: job_type.to_string(),
            identifier: "id-1".to_string(),
            queue_key: "k".to_string(),
            next_attempt_timestamp: 100,
            delay_between_retries: 10,
            max_attempts: 3,
            current_retry: 1,
            payload,
        }
    }

    #[test]
    fn rebuilds_known_types_and_preserves_the_record() {
        let services = Arc::new(JobServices::unconfigured());
        let rec = record("AvatarDownloadJobType", json!({ "conversationId": "c1" }));
        let job = persisted_job_from_record(&rec, &services).unwrap();
        assert_eq!(job.job_type(), JobType::AvatarDownload);
        assert_eq!(job.serialize_job(), rec);
    }

    #[test]
    fn rejects_missing_unknown_and_malformed_records() {
        let services = Arc::new(JobServices::unconfigured());
        assert!(persisted_job_from_record(&record("", json!({})), &services).is_none());
        assert!(persisted_job_from_record(&record("NopeJobType", json!({})), &services).is_none());
        assert!(persisted_job_from_record(&record("GroupSyncJobType", json!({ "x": 1 })), &services).is_none());
    }
}
