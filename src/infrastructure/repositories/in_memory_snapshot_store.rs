use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::domain::repositories::{SnapshotStore, SnapshotUpdate};
use crate::error::Result;

struct Row {
    stream_id: String,
    last_stream_position: u64,
    last_global_position: i64,
    snapshot: serde_json::Value,
    columns: BTreeMap<String, serde_json::Value>,
}

/// In-memory `SnapshotStore`. No direct teacher analogue for the
/// lock-compare-upsert shape (the teacher has no projection layer at
/// all); the single `parking_lot::RwLock` held for the whole critical
/// section is the in-process stand-in for the `SELECT … FOR UPDATE` row
/// lock §4.5 specifies, following the same "hold the lock through the
/// compute step" discipline the Postgres implementation uses a
/// transaction for.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    rows: RwLock<HashMap<String, Row>>,
    centralized: RwLock<HashMap<String, Row>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self { rows: RwLock::new(HashMap::new()), centralized: RwLock::new(HashMap::new()) }
    }

    fn compose_key(table_name: &str, keys: &BTreeMap<String, serde_json::Value>) -> String {
        let mut key = table_name.to_string();
        for (k, v) in keys {
            key.push('|');
            key.push_str(k);
            key.push('=');
            key.push_str(&v.to_string());
        }
        key
    }

    #[cfg(test)]
    pub fn get_snapshot(&self, table_name: &str, keys: &BTreeMap<String, serde_json::Value>) -> Option<serde_json::Value> {
        self.rows.read().get(&Self::compose_key(table_name, keys)).map(|r| r.snapshot.clone())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn apply_if_newer(
        &self,
        table_name: &str,
        keys: &BTreeMap<String, serde_json::Value>,
        stream_id: &str,
        stream_position: u64,
        global_position: i64,
        compute: Box<dyn FnOnce(Option<serde_json::Value>) -> Result<SnapshotUpdate> + Send>,
    ) -> Result<bool> {
        let composite = Self::compose_key(table_name, keys);
        let mut rows = self.rows.write();

        if let Some(existing) = rows.get(&composite) {
            if stream_position <= existing.last_stream_position {
                return Ok(false);
            }
        }

        let current_snapshot = rows.get(&composite).map(|r| r.snapshot.clone());
        let update = compute(current_snapshot)?;
        rows.insert(composite, Row {
            stream_id: stream_id.to_string(),
            last_stream_position: stream_position,
            last_global_position: global_position,
            snapshot: update.snapshot,
            columns: update.columns,
        });
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
        let composite = format!("{}|{}", readmodel_table_name, stream_id);
        let mut rows = self.centralized.write();

        if let Some(existing) = rows.get(&composite) {
            if stream_position <= existing.last_stream_position {
                return Ok(false);
            }
        }

        let current_snapshot = rows.get(&composite).map(|r| r.snapshot.clone());
        let update = compute(current_snapshot)?;
        rows.insert(composite, Row {
            stream_id: stream_id.to_string(),
            last_stream_position: stream_position,
            last_global_position: global_position,
            snapshot: update.snapshot,
            columns: update.columns,
        });
        Ok(true)
    }
}
