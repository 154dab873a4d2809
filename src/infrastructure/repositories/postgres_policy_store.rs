#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use sqlx::{PgPool, Row};

#[cfg(feature = "postgres")]
use crate::crypto::Algorithm;
#[cfg(feature = "postgres")]
use crate::domain::entities::{EncryptionPolicy, KeyScope};
#[cfg(feature = "postgres")]
use crate::domain::repositories::PolicyStore;
#[cfg(feature = "postgres")]
use crate::domain::value_objects::Partition;
#[cfg(feature = "postgres")]
use crate::error::{CoreError, Result};

#[cfg(feature = "postgres")]
pub struct PostgresPolicyStore {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
fn row_to_policy(row: &sqlx::postgres::PgRow, partition: Partition) -> Result<EncryptionPolicy> {
    let key_scope: String = row.try_get("key_scope").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let key_scope = match key_scope.as_str() {
        "stream" => KeyScope::Stream,
        "type" => KeyScope::Type,
        "partition" => KeyScope::Partition,
        other => return Err(CoreError::InvalidDataFormat(format!("unknown key_scope: {}", other))),
    };
    let algorithm: String = row.try_get("encryption_algorithm").map_err(|e| CoreError::StorageError(e.to_string()))?;
    let algorithm: Algorithm = algorithm.parse()?;

    Ok(EncryptionPolicy::new(
        row.try_get("policy_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
        partition,
        row.try_get("stream_type_class").map_err(|e| CoreError::StorageError(e.to_string()))?,
        key_scope,
        algorithm,
        row.try_get::<Option<i32>, _>("key_rotation_interval_days")
            .map_err(|e| CoreError::StorageError(e.to_string()))?
            .map(|v| v as u32),
    ))
}

#[cfg(feature = "postgres")]
#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    async fn find(&self, partition: &Partition, stream_type_class: &str) -> Result<Option<EncryptionPolicy>> {
        let row = sqlx::query(
            "SELECT policy_id, stream_type_class, key_scope, encryption_algorithm, key_rotation_interval_days
             FROM encryption_policies WHERE partition = $1 AND stream_type_class = $2",
        )
        .bind(partition.as_str())
        .bind(stream_type_class)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        row.as_ref().map(|r| row_to_policy(r, partition.clone())).transpose()
    }

    async fn upsert(&self, policy: &EncryptionPolicy) -> Result<()> {
        sqlx::query(
            "INSERT INTO encryption_policies
                (policy_id, partition, stream_type_class, key_scope, encryption_algorithm, key_rotation_interval_days)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (partition, stream_type_class) DO UPDATE SET
                key_scope = EXCLUDED.key_scope,
                encryption_algorithm = EXCLUDED.encryption_algorithm,
                key_rotation_interval_days = EXCLUDED.key_rotation_interval_days",
        )
        .bind(policy.policy_id())
        .bind(policy.partition().as_str())
        .bind(policy.stream_type_class())
        .bind(match policy.key_scope() {
            KeyScope::Stream => "stream",
            KeyScope::Type => "type",
            KeyScope::Partition => "partition",
        })
        .bind(policy.encryption_algorithm().as_str())
        .bind(policy.key_rotation_interval_days().map(|v| v as i32))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, partition: &Partition) -> Result<Vec<EncryptionPolicy>> {
        let rows = sqlx::query(
            "SELECT policy_id, stream_type_class, key_scope, encryption_algorithm, key_rotation_interval_days
             FROM encryption_policies WHERE partition = $1",
        )
        .bind(partition.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        rows.iter().map(|r| row_to_policy(r, partition.clone())).collect()
    }
}
