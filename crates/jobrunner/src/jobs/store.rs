use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::jobs::model::JobRecord;

/// Durable home of each queue's pending list.
///
/// `load_queue` returns an empty list when nothing was persisted for `queue_name`.
/// `save_queue` replaces the whole list.
#[async_trait]
pub trait JobQueueStore: Send + Sync {
    async fn load_queue(&self, queue_name: &str) -> Result<Vec<JobRecord>, StoreError>;

    async fn save_queue(&self, queue_name: &str, records: &[JobRecord]) -> Result<(), StoreError>;
}

/// Decode a persisted JSON array, skipping entries that are not job records.
pub fn decode_records(queue_name: &str, raw: &str) -> Result<Vec<JobRecord>, StoreError> {
    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(other) => {
            return Err(StoreError::Corrupt {
                queue: queue_name.to_string(),
                reason: format!("expected a JSON array, found {}", json_kind(&other)),
            })
        }
        Err(e) => {
            return Err(StoreError::Corrupt {
                queue: queue_name.to_string(),
                reason: e.to_string(),
            })
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<JobRecord>(entry) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                queue = queue_name,
                index,
                error = %e,
                "skipping malformed persisted job record"
            ),
        }
    }
    Ok(records)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// In-process store. Keeps a history of every successful save and can be told
/// to fail upcoming saves.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    queues: HashMap<String, String>,
    saves: Vec<(String, Vec<JobRecord>)>,
    failing_saves: usize,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a queue with raw JSON, as if an earlier process had written it.
    pub fn insert_raw(&self, queue_name: &str, raw: impl Into<String>) {
        let mut inner = self.lock();
        inner.queues.insert(queue_name.to_string(), raw.into());
    }

    pub fn raw(&self, queue_name: &str) -> Option<String> {
        self.lock().queues.get(queue_name).cloned()
    }

    /// Make the next `n` calls to `save_queue` fail.
    pub fn fail_next_saves(&self, n: usize) {
        self.lock().failing_saves = n;
    }

    /// Lists written for `queue_name`, oldest first.
    pub fn saves_for(&self, queue_name: &str) -> Vec<Vec<JobRecord>> {
        self.lock()
            .saves
            .iter()
            .filter(|(q, _)| q == queue_name)
            .map(|(_, records)| records.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock only means a test panicked mid-save; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobQueueStore for MemoryQueueStore {
    async fn load_queue(&self, queue_name: &str) -> Result<Vec<JobRecord>, StoreError> {
        let raw = self.lock().queues.get(queue_name).cloned();
        match raw {
            Some(raw) => decode_records(queue_name, &raw),
            None => Ok(Vec::new()),
        }
    }

    async fn save_queue(&self, queue_name: &str, records: &[JobRecord]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.failing_saves > 0 {
            inner.failing_saves -= 1;
            return Err(StoreError::Unavailable(format!(
                "injected save failure for {queue_name}"
            )));
        }
        let raw = serde_json::to_string(records)?;
        inner.queues.insert(queue_name.to_string(), raw);
        inner.saves.push((queue_name.to_string(), records.to_vec()));
        Ok(())
    }
}
