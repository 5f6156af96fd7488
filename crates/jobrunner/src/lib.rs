pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod telemetry;

pub use clock::{Clock, SystemClock};
pub use error::{RunnerError, ServiceError, StoreError};
