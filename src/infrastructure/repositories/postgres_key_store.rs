#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use sqlx::{PgPool, Row};

#[cfg(feature = "postgres")]
use crate::domain::entities::{EncryptionKey, KeyMaterial};
#[cfg(feature = "postgres")]
use crate::domain::repositories::KeyStore;
#[cfg(feature = "postgres")]
use crate::domain::value_objects::{KeyId, Partition};
#[cfg(feature = "postgres")]
use crate::error::{CoreError, Result};

/// Postgres-backed `KeyStore`. Grounded on the teacher's raw-SQL query
/// style in `postgres_event_stream_repository.rs`, applied to the
/// `encryption_keys` table named in §6 (extended with a `retired_at`
/// column per the `retired_at`/`destroyed_at` split — see DESIGN.md).
#[cfg(feature = "postgres")]
pub struct PostgresKeyStore {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
fn row_to_key(row: &sqlx::postgres::PgRow) -> Result<EncryptionKey> {
    let key_id: String = row.try_get("key_id").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let key_id = KeyId::try_from(key_id)?;
    let material: Vec<u8> = row.try_get("key_material").map_err(|e| CoreError::StorageError(e.to_string()))?;
    Ok(EncryptionKey::reconstruct(
        key_id,
        KeyMaterial::new(material),
        row.try_get::<i32, _>("key_version").map_err(|e| CoreError::StorageError(e.to_string()))? as u32,
        row.try_get("is_active").map_err(|e| CoreError::StorageError(e.to_string()))?,
        row.try_get("retired_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
        row.try_get("destroyed_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
        row.try_get("created_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
        row.try_get("updated_at").map_err(|e| CoreError::StorageError(e.to_string()))?,
    ))
}

#[cfg(feature = "postgres")]
#[async_trait]
impl KeyStore for PostgresKeyStore {
    async fn find_active(&self, partition: &Partition, key_ref: &str) -> Result<Option<EncryptionKey>> {
        let prefix = format!("{}%", KeyId::prefix(partition.as_str(), key_ref));
        let row = sqlx::query(
            "SELECT key_id, key_material, key_version, is_active, retired_at, destroyed_at, created_at, updated_at
             FROM encryption_keys
             WHERE partition = $1 AND key_id LIKE $2 AND is_active AND destroyed_at IS NULL
             ORDER BY key_version DESC LIMIT 1",
        )
        .bind(partition.as_str())
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        row.as_ref().map(row_to_key).transpose()
    }

    async fn find_latest(&self, partition: &Partition, key_ref: &str) -> Result<Option<EncryptionKey>> {
        let prefix = format!("{}%", KeyId::prefix(partition.as_str(), key_ref));
        let row = sqlx::query(
            "SELECT key_id, key_material, key_version, is_active, retired_at, destroyed_at, created_at, updated_at
             FROM encryption_keys
             WHERE partition = $1 AND key_id LIKE $2
             ORDER BY key_version DESC LIMIT 1",
        )
        .bind(partition.as_str())
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        row.as_ref().map(row_to_key).transpose()
    }

    async fn find_by_id(&self, partition: &Partition, key_id: &KeyId) -> Result<Option<EncryptionKey>> {
        let row = sqlx::query(
            "SELECT key_id, key_material, key_version, is_active, retired_at, destroyed_at, created_at, updated_at
             FROM encryption_keys WHERE partition = $1 AND key_id = $2",
        )
        .bind(partition.as_str())
        .bind(key_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        row.as_ref().map(row_to_key).transpose()
    }

    async fn insert(&self, key: &EncryptionKey) -> Result<()> {
        sqlx::query(
            "INSERT INTO encryption_keys
                (key_id, partition, key_material, key_version, is_active, retired_at, destroyed_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())",
        )
        .bind(key.key_id().to_string())
        .bind(key.key_id().partition())
        .bind(key.key_material().as_bytes())
        .bind(key.key_version() as i32)
        .bind(key.is_active())
        .bind(key.retired_at())
        .bind(key.destroyed_at())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::KeyManagementFailed(format!("key insert conflict: {}", e)))?;
        Ok(())
    }

    async fn update(&self, key: &EncryptionKey) -> Result<()> {
        sqlx::query(
            "UPDATE encryption_keys SET is_active = $1, retired_at = $2, destroyed_at = $3, updated_at = now()
             WHERE partition = $4 AND key_id = $5",
        )
        .bind(key.is_active())
        .bind(key.retired_at())
        .bind(key.destroyed_at())
        .bind(key.key_id().partition())
        .bind(key.key_id().to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn retire_all(&self, partition: &Partition, key_ref: &str) -> Result<()> {
        let prefix = format!("{}%", KeyId::prefix(partition.as_str(), key_ref));
        sqlx::query(
            "UPDATE encryption_keys SET is_active = false, retired_at = now(), updated_at = now()
             WHERE partition = $1 AND key_id LIKE $2 AND is_active",
        )
        .bind(partition.as_str())
        .bind(prefix)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn destroy_partition(&self, partition: &Partition) -> Result<()> {
        sqlx::query(
            "UPDATE encryption_keys SET destroyed_at = now(), updated_at = now()
             WHERE partition = $1 AND destroyed_at IS NULL",
        )
        .bind(partition.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }
}
