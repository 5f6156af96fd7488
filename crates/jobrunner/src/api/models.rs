use serde::Serialize;

use crate::jobs::model::JobRecord;
use crate::jobs::runner::QueueSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub queue_name: String,
    pub job_type: String,
    pub state: String,
    pub pending: usize,
    pub current_job: Option<String>,
    pub next_attempt_timestamp: Option<i64>,
}

impl From<QueueSnapshot> for QueueSummary {
    fn from(s: QueueSnapshot) -> Self {
        Self {
            queue_name: s.queue_name,
            job_type: s.job_type.as_str().to_string(),
            state: s.state.as_str().to_string(),
            pending: s.pending,
            current_job: s.current_job,
            next_attempt_timestamp: s.next_attempt_timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListQueuesResponse {
    pub items: Vec<QueueSummary>,
}

#[derive(Debug, Serialize)]
pub struct QueueJobsResponse {
    pub queue: QueueSummary,
    pub items: Vec<JobRecord>,
}
