/// PostgreSQL-backed event log.
///
/// Grounded on the teacher's `PostgresEventStreamRepository`: a
/// transaction per public call, a `FOR UPDATE` row lock on the stream
/// row, and a conditional `UPDATE … WHERE stream_position = $1` as the
/// concurrency anchor, generalized from the teacher's single
/// `current_version` column to the partition-scoped, optimistic-version
/// contract of §4.1.

#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use sqlx::{PgConnection, PgPool, Row, Transaction, Postgres};
#[cfg(feature = "postgres")]
use std::sync::Arc;
#[cfg(feature = "postgres")]
use tokio::sync::Mutex;

#[cfg(feature = "postgres")]
use crate::domain::entities::{validate_expected_version, ExpectedVersion, Message, NewMessage};
#[cfg(feature = "postgres")]
use crate::domain::repositories::{AppendResult, EventLog, ReadStreamOptions, ReadStreamResult, SessionCallback};
#[cfg(feature = "postgres")]
use crate::domain::value_objects::{MessageType, Partition, StreamId};
#[cfg(feature = "postgres")]
use crate::error::{CoreError, Result};

#[cfg(feature = "postgres")]
pub struct PostgresEventLog {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(format!("migration failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl EventLog for PostgresEventLog {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        stream_type: &str,
        expected_version: ExpectedVersion,
        messages: Vec<NewMessage>,
    ) -> Result<AppendResult> {
        let mut tx = self.pool.begin().await?;
        let result = do_append(&mut tx, stream_id, partition, stream_type, expected_version, messages).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        options: ReadStreamOptions,
    ) -> Result<ReadStreamResult> {
        let mut conn = self.pool.acquire().await?;
        do_read(&mut conn, stream_id, partition, options).await
    }

    async fn with_session<'a>(&'a self, callback: SessionCallback<'a>) -> Result<()> {
        let tx = self.pool.begin().await?;
        let session = Arc::new(PostgresSessionEventLog {
            tx: Arc::new(Mutex::new(Some(tx))),
        });
        let result = callback(session.clone()).await;
        let mut guard = session.tx.lock().await;
        if let Some(tx) = guard.take() {
            match &result {
                Ok(()) => tx.commit().await?,
                Err(_) => tx.rollback().await?,
            }
        }
        result
    }
}

/// The session-scoped log handed to `with_session` callbacks. Shares one
/// transaction with whatever other work the caller does through it;
/// nested `with_session` calls recursively wrap the same transaction
/// rather than opening a new one.
#[cfg(feature = "postgres")]
struct PostgresSessionEventLog {
    tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

#[cfg(feature = "postgres")]
#[async_trait]
impl EventLog for PostgresSessionEventLog {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        stream_type: &str,
        expected_version: ExpectedVersion,
        messages: Vec<NewMessage>,
    ) -> Result<AppendResult> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(|| CoreError::StorageError("session already closed".to_string()))?;
        do_append(tx, stream_id, partition, stream_type, expected_version, messages).await
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        options: ReadStreamOptions,
    ) -> Result<ReadStreamResult> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(|| CoreError::StorageError("session already closed".to_string()))?;
        do_read(tx, stream_id, partition, options).await
    }

    async fn with_session<'a>(&'a self, callback: SessionCallback<'a>) -> Result<()> {
        let nested = Arc::new(PostgresSessionEventLog { tx: self.tx.clone() });
        callback(nested).await
    }
}

#[cfg(feature = "postgres")]
async fn do_append(
    tx: &mut Transaction<'_, Postgres>,
    stream_id: &StreamId,
    partition: &Partition,
    stream_type: &str,
    expected_version: ExpectedVersion,
    messages: Vec<NewMessage>,
) -> Result<AppendResult> {
    if messages.is_empty() {
        return Err(CoreError::EmptyBatch);
    }

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT stream_position FROM streams WHERE stream_id = $1 AND partition = $2 AND NOT is_archived FOR UPDATE",
    )
    .bind(stream_id.as_str())
    .bind(partition.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| CoreError::StorageError(format!("failed to lock stream row: {}", e)))?;

    validate_expected_version(existing.map(|v| v as u64), &expected_version)?;

    let created_new_stream = existing.is_none();
    let base_position: u64 = if let Some(pos) = existing {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE streams SET stream_position = stream_position + $1, updated_at = now()
             WHERE stream_id = $2 AND partition = $3 AND stream_position = $4
             RETURNING stream_position - $1",
        )
        .bind(messages.len() as i64)
        .bind(stream_id.as_str())
        .bind(partition.as_str())
        .bind(pos)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| CoreError::StorageError(format!("failed to advance stream position: {}", e)))?;

        updated.ok_or_else(|| CoreError::VersionMismatch {
            expected: pos.to_string(),
            actual: None,
        })? as u64
    } else {
        sqlx::query(
            "INSERT INTO streams (stream_id, partition, stream_type, stream_position, is_archived)
             VALUES ($1, $2, $3, $4, false)",
        )
        .bind(stream_id.as_str())
        .bind(partition.as_str())
        .bind(stream_type)
        .bind(messages.len() as i64)
        .execute(&mut **tx)
        .await
        .map_err(|e| CoreError::StorageError(format!("failed to create stream: {}", e)))?;
        0
    };

    let message_count = messages.len() as u64;
    let mut last_global_position: i64 = 0;
    for (i, msg) in messages.into_iter().enumerate() {
        let position = base_position + (i as u64) + 1;
        let global_position: i64 = sqlx::query_scalar(
            "INSERT INTO messages
                (stream_id, partition, stream_position, message_id, message_type, message_kind,
                 message_schema_version, message_data, message_metadata, is_archived, created)
             VALUES ($1, $2, $3, gen_random_uuid(), $4, 'E', 1, $5, $6, false, now())
             RETURNING global_position",
        )
        .bind(stream_id.as_str())
        .bind(partition.as_str())
        .bind(position as i64)
        .bind(msg.message_type.as_str())
        .bind(&msg.message_data)
        .bind(&msg.message_metadata)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| CoreError::StorageError(format!("failed to insert message: {}", e)))?;

        last_global_position = global_position;
    }

    Ok(AppendResult {
        next_version: base_position + message_count,
        last_global_position,
        created_new_stream,
    })
}

#[cfg(feature = "postgres")]
async fn do_read(
    conn: &mut PgConnection,
    stream_id: &StreamId,
    partition: &Partition,
    options: ReadStreamOptions,
) -> Result<ReadStreamResult> {
    let current_version: Option<i64> = sqlx::query_scalar(
        "SELECT stream_position FROM streams WHERE stream_id = $1 AND partition = $2",
    )
    .bind(stream_id.as_str())
    .bind(partition.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| CoreError::StorageError(format!("failed to read stream metadata: {}", e)))?;

    let stream_exists = current_version.is_some();
    let current_version = current_version.unwrap_or(0) as u64;

    let from = options.from.unwrap_or(1) as i64;
    let to = options.to.map(|v| v as i64).unwrap_or(i64::MAX);
    let limit = options.max_count.map(|v| v as i64).unwrap_or(i64::MAX);

    let rows = sqlx::query(
        "SELECT message_id, stream_position, global_position, message_type, message_kind,
                message_schema_version, message_data, message_metadata, is_archived, created
         FROM messages
         WHERE stream_id = $1 AND partition = $2 AND stream_position >= $3 AND stream_position < $4
         ORDER BY stream_position ASC
         LIMIT $5",
    )
    .bind(stream_id.as_str())
    .bind(partition.as_str())
    .bind(from)
    .bind(to)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| CoreError::StorageError(format!("failed to read messages: {}", e)))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let message_type: String = row.try_get("message_type")
            .map_err(|e| CoreError::StorageError(e.to_string()))?;
        out.push(Message::reconstruct(
            row.try_get("message_id").map_err(|e| CoreError::StorageError(e.to_string()))?,
            stream_id.clone(),
            partition.clone(),
            row.try_get::<i64, _>("stream_position").map_err(|e| CoreError::StorageError(e.to_string()))? as u64,
            row.try_get("global_position").map_err(|e| CoreError::StorageError(e.to_string()))?,
            MessageType::new_unchecked(message_type),
            row.try_get("message_kind").map_err(|e| CoreError::StorageError(e.to_string()))?,
            row.try_get::<i32, _>("message_schema_version").map_err(|e| CoreError::StorageError(e.to_string()))? as u32,
            row.try_get("message_data").map_err(|e| CoreError::StorageError(e.to_string()))?,
            row.try_get("message_metadata").map_err(|e| CoreError::StorageError(e.to_string()))?,
            row.try_get("is_archived").map_err(|e| CoreError::StorageError(e.to_string()))?,
            row.try_get("created").map_err(|e| CoreError::StorageError(e.to_string()))?,
        ));
    }

    Ok(ReadStreamResult { messages: out, current_version, stream_exists })
}
