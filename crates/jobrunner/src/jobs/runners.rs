use std::sync::Arc;

use futures::future::join_all;
use tracing::info;

use crate::error::RunnerError;
use crate::jobs::model::JobType;
use crate::jobs::persisted::PersistedJob;
use crate::jobs::runner::{AddJobResult, PersistedJobRunner, RunnerConfig};
use crate::jobs::services::JobServices;
use crate::jobs::store::JobQueueStore;

/// One runner per job type, built once at startup and passed around by reference.
#[derive(Clone)]
pub struct RunnerRegistry {
    pub user_sync: PersistedJobRunner,
    pub group_sync: PersistedJobRunner,
    pub avatar_download: PersistedJobRunner,
    pub avatar_reupload: PersistedJobRunner,
    pub avatar_migrate: PersistedJobRunner,
    pub fetch_msg_expiry_swarm: PersistedJobRunner,
    pub update_msg_expiry_swarm: PersistedJobRunner,
    pub group_invite: PersistedJobRunner,
    pub group_pending_removal: PersistedJobRunner,
    pub pro_revocation: PersistedJobRunner,
    pub fake_sleep_for: PersistedJobRunner,
    pub fake_sleep_for_multi: PersistedJobRunner,
    services: Arc<JobServices>,
}

impl RunnerRegistry {
    /// Load and start every queue. Fails if any queue cannot be loaded.
    pub async fn start(
        store: Arc<dyn JobQueueStore>,
        services: Arc<JobServices>,
        cfg: RunnerConfig,
    ) -> Result<Self, RunnerError> {
        let start = |job_type: JobType| {
            PersistedJobRunner::start(job_type, store.clone(), services.clone(), cfg.clone())
        };

        let registry = Self {
            user_sync: start(JobType::UserSync).await?,
            group_sync: start(JobType::GroupSync).await?,
            avatar_download: start(JobType::AvatarDownload).await?,
            avatar_reupload: start(JobType::AvatarReupload).await?,
            avatar_migrate: start(JobType::AvatarMigrate).await?,
            fetch_msg_expiry_swarm: start(JobType::FetchMsgExpirySwarm).await?,
            update_msg_expiry_swarm: start(JobType::UpdateMsgExpirySwarm).await?,
            group_invite: start(JobType::GroupInvite).await?,
            group_pending_removal: start(JobType::GroupPendingRemoval).await?,
            pro_revocation: start(JobType::UpdateProRevocationList).await?,
            fake_sleep_for: start(JobType::FakeSleepFor).await?,
            fake_sleep_for_multi: start(JobType::FakeSleepForMulti).await?,
            services,
        };
        info!(queues = JobType::ALL.len(), "job runners started");
        Ok(registry)
    }

    pub fn runner(&self, job_type: JobType) -> &PersistedJobRunner {
        match job_type {
            JobType::UserSync => &self.user_sync,
            JobType::GroupSync => &self.group_sync,
            JobType::AvatarDownload => &self.avatar_download,
            JobType::AvatarReupload => &self.avatar_reupload,
            JobType::AvatarMigrate => &self.avatar_migrate,
            JobType::FetchMsgExpirySwarm => &self.fetch_msg_expiry_swarm,
            JobType::UpdateMsgExpirySwarm => &self.update_msg_expiry_swarm,
            JobType::GroupInvite => &self.group_invite,
            JobType::GroupPendingRemoval => &self.group_pending_removal,
            JobType::UpdateProRevocationList => &self.pro_revocation,
            JobType::FakeSleepFor => &self.fake_sleep_for,
            JobType::FakeSleepForMulti => &self.fake_sleep_for_multi,
        }
    }

    pub fn by_queue_name(&self, queue_name: &str) -> Option<&PersistedJobRunner> {
        JobType::ALL
            .into_iter()
            .find(|t| t.queue_name() == queue_name)
            .map(|t| self.runner(t))
    }

    /// Route a job to the queue of its type.
    pub async fn add_job(&self, job: Box<dyn PersistedJob>) -> Result<AddJobResult, RunnerError> {
        self.runner(job.job_type()).add_job(job).await
    }

    pub fn all(&self) -> Vec<&PersistedJobRunner> {
        JobType::ALL.into_iter().map(|t| self.runner(t)).collect()
    }

    pub fn services(&self) -> &Arc<JobServices> {
        &self.services
    }

    pub fn now_ms(&self) -> i64 {
        self.services.clock.now_ms()
    }

    /// Stop every queue, waiting for in-flight runs up to each queue's grace.
    pub async fn shutdown(&self) {
        join_all(self.all().into_iter().map(|r| r.stop_and_wait_current_job())).await;
        info!("job runners stopped");
    }
}
