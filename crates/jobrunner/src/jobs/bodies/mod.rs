//! Concrete job bodies, one module per family of job types.

pub mod avatar_download;
pub mod avatar_migrate;
pub mod avatar_reupload;
pub mod config_sync;
pub mod fake_sleep;
pub mod group_membership;
pub mod msg_expiry_swarm;
pub mod pro_revocation;

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::ServiceError;
use crate::jobs::model::{JobDefaults, JobRecord, RunJobResult};

pub use avatar_download::AvatarDownloadJob;
pub use avatar_migrate::AvatarMigrateJob;
pub use avatar_reupload::AvatarReuploadJob;
pub use config_sync::{GroupSyncJob, UserSyncJob};
pub use fake_sleep::{FakeOutcome, FakeSleepForJob, FakeSleepForMultiJob, FakeSleepPayload};
pub use group_membership::{GroupInviteJob, GroupPendingRemovalJob};
pub use msg_expiry_swarm::{FetchMsgExpirySwarmJob, UpdateMsgExpirySwarmJob};
pub use pro_revocation::UpdateProRevocationListJob;

pub(crate) fn parse_payload<T: DeserializeOwned>(record: &JobRecord) -> Result<T, serde_json::Error> {
    serde_json::from_value(record.payload.clone())
}

/// Collaborator failures that can never succeed end the job, the rest retry.
pub(crate) fn result_from_error(err: &ServiceError) -> RunJobResult {
    if err.is_permanent() {
        RunJobResult::PermanentFailure
    } else {
        RunJobResult::RetryJobIfPossible
    }
}

pub(crate) fn timeout_of(defaults: &JobDefaults) -> Duration {
    Duration::from_millis(defaults.timeout_ms)
}
