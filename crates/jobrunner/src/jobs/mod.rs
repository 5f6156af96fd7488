pub mod bodies;
pub mod model;
pub mod persisted;
pub mod registry;
pub mod repo;
pub mod runner;
pub mod runners;
pub mod services;
pub mod store;

pub use model::{AddJobCheck, JobDefaults, JobRecord, JobType, RunJobResult};
pub use persisted::PersistedJob;
pub use registry::persisted_job_from_record;
pub use repo::SqliteQueueStore;
pub use runner::{AddJobResult, PersistedJobRunner, QueueSnapshot, RunnerConfig, RunnerEvent, RunnerState};
pub use runners::RunnerRegistry;
pub use services::JobServices;
pub use store::{JobQueueStore, MemoryQueueStore};
