use chrono::Utc;

/// Source of wall-clock time in epoch milliseconds.
///
/// Runners read time only through this trait and wait with tokio timers, so a
/// clock anchored to tokio's (pausable) time keeps both views consistent.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
