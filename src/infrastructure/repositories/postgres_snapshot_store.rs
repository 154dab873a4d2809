/// Postgres-backed `SnapshotStore`. Per §9's design note the engine is
/// schema-generic: each projection's `table_name` is created by the
/// caller's own migration ahead of time, with whatever primary-key
/// columns `extract_keys` produces plus a `snapshot jsonb`,
/// `stream_id text`, `last_stream_position bigint`, and
/// `last_global_position bigint` column, and any `map_to_columns`
/// outputs as `jsonb`. This adapter builds the `SELECT … FOR UPDATE` and
/// the conflict-aware `UPSERT` at runtime from the key/column maps it is
/// handed, rather than assuming a fixed shape at compile time — the
/// "accept `{table_name, row, primary_key_cols, denormalized_cols}` and
/// produce parameterized statements" strategy the design note calls for.
#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use sqlx::{PgPool, Row as _};
#[cfg(feature = "postgres")]
use std::collections::BTreeMap;

#[cfg(feature = "postgres")]
use crate::domain::repositories::{SnapshotStore, SnapshotUpdate};
#[cfg(feature = "postgres")]
use crate::error::{CoreError, Result};

#[cfg(feature = "postgres")]
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn apply_if_newer(
        &self,
        table_name: &str,
        keys: &BTreeMap<String, serde_json::Value>,
        stream_id: &str,
        stream_position: u64,
        global_position: i64,
        compute: Box<dyn FnOnce(Option<serde_json::Value>) -> Result<SnapshotUpdate> + Send>,
    ) -> Result<bool> {
        validate_identifier(table_name)?;
        for col in keys.keys() {
            validate_identifier(col)?;
        }

        let mut tx = self.pool.begin().await.map_err(|e| CoreError::StorageError(e.to_string()))?;

        let key_cols: Vec<&String> = keys.keys().collect();
        let where_clause = key_cols
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", c, i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");

        let select_sql = format!(
            "SELECT last_stream_position, snapshot FROM {} WHERE {} FOR UPDATE",
            table_name, where_clause
        );
        let mut select_query = sqlx::query(&select_sql);
        for col in &key_cols {
            select_query = select_query.bind(keys[*col].clone());
        }
        let existing = select_query
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

        if let Some(row) = &existing {
            let last: i64 = row.try_get("last_stream_position").map_err(|e| CoreError::StorageError(e.to_string()))?;
            if stream_position as i64 <= last {
                tx.commit().await.map_err(|e| CoreError::StorageError(e.to_string()))?;
                return Ok(false);
            }
        }

        let current_snapshot: Option<serde_json::Value> = existing
            .as_ref()
            .map(|row| row.try_get::<serde_json::Value, _>("snapshot"))
            .transpose()
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

        let update = compute(current_snapshot)?;

        let mut columns: Vec<String> = key_cols.iter().map(|c| c.to_string()).collect();
        columns.extend(["snapshot".to_string(), "stream_id".to_string(), "last_stream_position".to_string(), "last_global_position".to_string()]);
        for col in update.columns.keys() {
            validate_identifier(col)?;
            columns.push(col.clone());
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
        let update_set = columns
            .iter()
            .filter(|c| !key_cols.contains(c))
            .map(|c| format!("{} = EXCLUDED.{}", c, c))
            .collect::<Vec<_>>()
            .join(", ");
        let conflict_cols = key_cols.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");

        let upsert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            table_name,
            columns.join(", "),
            placeholders.join(", "),
            conflict_cols,
            update_set,
        );

        let mut upsert_query = sqlx::query(&upsert_sql);
        for col in &key_cols {
            upsert_query = upsert_query.bind(keys[*col].clone());
        }
        upsert_query = upsert_query
            .bind(update.snapshot)
            .bind(stream_id)
            .bind(stream_position as i64)
            .bind(global_position);
        for col in update.columns.values() {
            upsert_query = upsert_query.bind(col.clone());
        }
        upsert_query.execute(&mut *tx).await.map_err(|e| CoreError::StorageError(e.to_string()))?;

        tx.commit().await.map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(true)
    }

    async fn apply_if_newer_centralized(
        &self,
        readmodel_table_name: &str,
        stream_id: &str,
        stream_position: u64,
        global_position: i64,
        compute: Box<dyn FnOnce(Option<serde_json::Value>) -> Result<SnapshotUpdate> + Send>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| CoreError::StorageError(e.to_string()))?;

        let existing = sqlx::query(
            "SELECT last_stream_position, snapshot FROM snapshots WHERE readmodel_table_name = $1 AND stream_id = $2 FOR UPDATE",
        )
        .bind(readmodel_table_name)
        .bind(stream_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        if let Some(row) = &existing {
            let last: i64 = row.try_get("last_stream_position").map_err(|e| CoreError::StorageError(e.to_string()))?;
            if stream_position as i64 <= last {
                tx.commit().await.map_err(|e| CoreError::StorageError(e.to_string()))?;
                return Ok(false);
            }
        }

        let current_snapshot: Option<serde_json::Value> = existing
            .as_ref()
            .map(|row| row.try_get::<serde_json::Value, _>("snapshot"))
            .transpose()
            .map_err(|e| CoreError::StorageError(e.to_string()))?;

        let update = compute(current_snapshot)?;

        sqlx::query(
            "INSERT INTO snapshots (readmodel_table_name, stream_id, last_stream_position, last_global_position, snapshot)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (readmodel_table_name, stream_id) DO UPDATE SET
                last_stream_position = EXCLUDED.last_stream_position,
                last_global_position = EXCLUDED.last_global_position,
                snapshot = EXCLUDED.snapshot",
        )
        .bind(readmodel_table_name)
        .bind(stream_id)
        .bind(stream_position as i64)
        .bind(global_position)
        .bind(update.snapshot)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::StorageError(e.to_string()))?;

        tx.commit().await.map_err(|e| CoreError::StorageError(e.to_string()))?;
        Ok(true)
    }
}

/// Table and column names are interpolated into SQL text (Postgres has no
/// parameter placeholders for identifiers), so reject anything that
/// isn't a plain identifier before it reaches a query string.
#[cfg(feature = "postgres")]
fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidInput(format!("unsafe identifier in snapshot store: {}", name)))
    }
}
