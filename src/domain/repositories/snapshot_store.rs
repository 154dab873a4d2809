use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;

/// What a projection's `evolve`/`map_to_columns` produced for one event,
/// ready to be written back.
#[derive(Debug, Clone, Default)]
pub struct SnapshotUpdate {
    pub snapshot: serde_json::Value,
    pub columns: BTreeMap<String, serde_json::Value>,
}

/// Storage adapter for the Snapshot Projection Engine (§4.5), generalized
/// per §9's design note: the engine stays schema-generic and hands the
/// adapter opaque column maps; the adapter is responsible for turning
/// those into parameterized `UPSERT`s against whatever table shape the
/// caller configured.
///
/// `apply_if_newer*` perform the engine's entire per-event algorithm —
/// lock, compare `stream_position`, compute, upsert — as one atomic
/// unit, so the row-lock/idempotent-skip invariant lives in exactly one
/// place rather than being reconstructed by every caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Keyed by an arbitrary, projection-supplied key map
    /// (`extract_keys`'s output). Returns `true` if the row was written,
    /// `false` if this was an idempotent skip because `stream_position`
    /// was not newer than the stored `last_stream_position`.
    async fn apply_if_newer(
        &self,
        table_name: &str,
        keys: &BTreeMap<String, serde_json::Value>,
        stream_id: &str,
        stream_position: u64,
        global_position: i64,
        compute: Box<dyn FnOnce(Option<serde_json::Value>) -> Result<SnapshotUpdate> + Send>,
    ) -> Result<bool>;

    /// Centralized-snapshot variant (§4.5's "Variant"), keyed by the
    /// single deterministic `stream_id` the caller has already computed
    /// via `construct_stream_id`.
    async fn apply_if_newer_centralized(
        &self,
        readmodel_table_name: &str,
        stream_id: &str,
        stream_position: u64,
        global_position: i64,
        compute: Box<dyn FnOnce(Option<serde_json::Value>) -> Result<SnapshotUpdate> + Send>,
    ) -> Result<bool>;
}
