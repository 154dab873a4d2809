use crate::domain::value_objects::{Partition, StreamId};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain Entity: Checkpoint
///
/// Durable record of how far one subscription has progressed through one
/// stream. Identified by `(subscription_id, partition, stream_id)`; the
/// persisted `subscriptions` table stores `stream_id` under its `version`
/// column (see DESIGN.md for why that column holds a stream id rather
/// than a numeric version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    subscription_id: String,
    partition: Partition,
    stream_id: StreamId,
    last_processed_position: u64,
    updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(subscription_id: String, partition: Partition, stream_id: StreamId) -> Self {
        Self {
            subscription_id,
            partition,
            stream_id,
            last_processed_position: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn reconstruct(
        subscription_id: String,
        partition: Partition,
        stream_id: StreamId,
        last_processed_position: u64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subscription_id,
            partition,
            stream_id,
            last_processed_position,
            updated_at,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn last_processed_position(&self) -> u64 {
        self.last_processed_position
    }

    /// Advance the checkpoint. Refuses to move backward: checkpoints only
    /// ever track forward progress.
    pub fn advance_to(&mut self, position: u64) -> Result<()> {
        if position < self.last_processed_position {
            return Err(CoreError::InvalidInput(format!(
                "checkpoint cannot move backward: {} -> {}",
                self.last_processed_position, position
            )));
        }
        self.last_processed_position = position;
        self.updated_at = Utc::now();
        Ok(())
    }
}
