use std::time::Duration;

use async_trait::async_trait;

use crate::jobs::model::{AddJobCheck, JobRecord, JobType, RunJobResult};

/// Contract every job body implements.
///
/// `run` reports expected failures through [`RunJobResult`]; it should never
/// panic for them. A panic is still caught by the runner and treated as a
/// retryable failure. A run can be cut short (timeout, shutdown, crash) and
/// started again from scratch, so side effects must be idempotent.
#[async_trait]
pub trait PersistedJob: Send + Sync + 'static {
    fn job_type(&self) -> JobType;

    fn persisted(&self) -> &JobRecord;

    async fn run(&self) -> RunJobResult;

    /// Canonical persisted form. Must not have side effects.
    fn serialize_job(&self) -> JobRecord {
        self.persisted().clone()
    }

    /// Wall-clock budget of a single `run()`.
    fn job_timeout(&self) -> Duration;

    /// Veto the insertion of this job given the pending (non-running) records of its queue.
    fn add_job_check(&self, _pending: &[JobRecord]) -> AddJobCheck {
        AddJobCheck::Accept
    }

    /// Pending (non-running) records superseded by this job.
    fn non_running_jobs_to_remove(&self, _pending: &[JobRecord]) -> Vec<JobRecord> {
        Vec::new()
    }

    fn identifier(&self) -> &str {
        &self.persisted().identifier
    }

    fn add_job_check_same_type_present(&self, pending: &[JobRecord]) -> AddJobCheck {
        let tag = self.job_type().as_str();
        if pending.iter().any(|r| r.job_type == tag) {
            AddJobCheck::SkipSameJobPresent
        } else {
            AddJobCheck::Accept
        }
    }

    fn add_job_check_same_queue_key_present(&self, pending: &[JobRecord]) -> AddJobCheck {
        let key = &self.persisted().queue_key;
        if pending.iter().any(|r| &r.queue_key == key) {
            AddJobCheck::SkipSameJobPresent
        } else {
            AddJobCheck::Accept
        }
    }
}
