use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::jobs::model::JobRecord;
use crate::jobs::store::{decode_records, JobQueueStore};

/// SQLite-backed store: one row per queue holding the whole list as a JSON array.
#[derive(Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn queue_names(&self) -> Result<Vec<String>, StoreError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT queue_name
            FROM job_queues
            ORDER BY queue_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    /// Drop a persisted queue. Only safe while no runner owns it.
    pub async fn clear_queue(&self, queue_name: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM job_queues WHERE queue_name = ?1")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl JobQueueStore for SqliteQueueStore {
    async fn load_queue(&self, queue_name: &str) -> Result<Vec<JobRecord>, StoreError> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT records_json FROM job_queues WHERE queue_name = ?1",
        )
        .bind(queue_name)
        .fetch_optional(&self.pool)
        .await?;

        match raw {
            Some(raw) => decode_records(queue_name, &raw),
            None => Ok(Vec::new()),
        }
    }

    async fn save_queue(&self, queue_name: &str, records: &[JobRecord]) -> Result<(), StoreError> {
        let records_json = serde_json::to_string(records)?;

        sqlx::query(
            r#"
            INSERT INTO job_queues (queue_name, records_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (queue_name) DO UPDATE
            SET records_json = excluded.records_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(queue_name)
        .bind(records_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
