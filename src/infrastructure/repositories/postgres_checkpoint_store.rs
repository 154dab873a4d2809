#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use sqlx::{PgPool, Row};

#[cfg(feature = "postgres")]
use crate::domain::entities::Checkpoint;
#[cfg(feature = "postgres")]
use crate::domain::repositories::CheckpointStore;
#[cfg(feature = "postgres")]
use crate::domain::value_objects::{Partition, StreamId};
#[cfg(feature = "postgres")]
use crate::error::{CoreError, Result};

/// Postgres-backed `CheckpointStore` over the `subscriptions` table,
/// whose `version` column holds the tracked `stream_id` (see
/// DESIGN.md).
#[cfg(feature = "postgres")]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn find(&self, subscription_id: &str, partition: &Partition, stream_id: &StreamId) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT last_processed_position, updated_at FROM subscriptions
             WHERE subscription_id = $1 AND partition = $2 AND version = $3",
        )
        .bind(subscription_id)
        .bind(partition.as_str())
        .bind(stream_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(Checkpoint::reconstruct(
            subscription_id.to_string(),
            partition.clone(),
            stream_id.clone(),
            row.try_get::<i64, _>("last_processed_position").map_err(|e| CoreError::StorageError(e.to_string()))? as u64,
            row.try_get("updated_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
        )))
    }

    async fn create(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (subscription_id, partition, version, last_processed_position, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (subscription_id, partition, version) DO NOTHING",
        )
        .bind(checkpoint.subscription_id())
        .bind(checkpoint.partition().as_str())
        .bind(checkpoint.stream_id().as_str())
        .bind(checkpoint.last_processed_position() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            "UPDATE subscriptions SET last_processed_position = $1, updated_at = now()
             WHERE subscription_id = $2 AND partition = $3 AND version = $4",
        )
        .bind(checkpoint.last_processed_position() as i64)
        .bind(checkpoint.subscription_id())
        .bind(checkpoint.partition().as_str())
        .bind(checkpoint.stream_id().as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }
}
