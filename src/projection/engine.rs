/// Snapshot Projection Engine (§4.5): generic over one projection's
/// `extract_keys`/`evolve`/`initial_state`/`map_to_columns` functions,
/// delegating the lock/compare/upsert algorithm entirely to the injected
/// `SnapshotStore` so this type stays storage-agnostic.
///
/// No direct teacher analogue (the teacher has no projection layer); the
/// closure-parameterized-over-state shape follows the same "engine holds
/// behavior, adapter holds storage" split the teacher uses between
/// `EventStreamRepository` (storage) and its callers (behavior).
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::entities::Message;
use crate::domain::repositories::{SnapshotStore, SnapshotUpdate};
use crate::domain::value_objects::Partition;
use crate::error::{CoreError, Result};

pub type ExtractKeysFn = dyn Fn(&Message, &Partition) -> BTreeMap<String, serde_json::Value> + Send + Sync;
pub type EvolveFn = dyn Fn(serde_json::Value, &Message) -> serde_json::Value + Send + Sync;
pub type InitialStateFn = dyn Fn() -> serde_json::Value + Send + Sync;
pub type MapToColumnsFn = dyn Fn(&serde_json::Value) -> BTreeMap<String, serde_json::Value> + Send + Sync;

/// One projection's configuration, held behind `Arc` so it can be shared
/// between the keyed-row engine and a centralized-snapshot engine without
/// re-deriving the same closures.
pub struct ProjectionSpec {
    pub table_name: String,
    pub extract_keys: Box<ExtractKeysFn>,
    pub evolve: Box<EvolveFn>,
    pub initial_state: Box<InitialStateFn>,
    pub map_to_columns: Option<Box<MapToColumnsFn>>,
}

struct ProjectionEngineInner {
    spec: ProjectionSpec,
    store: Arc<dyn SnapshotStore>,
    /// The key set `extract_keys` returned on its first call, cached and
    /// checked against every later call per §4.5's invariant.
    expected_keys: Mutex<Option<Vec<String>>>,
}

impl ProjectionEngineInner {
    pub fn new(spec: ProjectionSpec, store: Arc<dyn SnapshotStore>) -> Self {
        Self { spec, store, expected_keys: Mutex::new(None) }
    }

    fn check_key_set(&self, keys: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        let actual: Vec<String> = keys.keys().cloned().collect();
        let mut cached = self.expected_keys.lock();
        match cached.as_ref() {
            None => {
                *cached = Some(actual);
                Ok(())
            }
            Some(expected) if expected == &actual => Ok(()),
            Some(expected) => Err(CoreError::InconsistentKeys { expected: expected.clone(), actual }),
        }
    }

}

/// The engine is always used behind an `Arc` so `compute` closures handed
/// to the store can be `'static` without borrowing a stack frame.
pub struct ProjectionEngine(Arc<ProjectionEngineInner>);

impl ProjectionEngine {
    pub fn new(spec: ProjectionSpec, store: Arc<dyn SnapshotStore>) -> Self {
        Self(Arc::new(ProjectionEngineInner::new(spec, store)))
    }

    fn make_compute(
        engine: Arc<ProjectionEngineInner>,
        event: Message,
    ) -> Box<dyn FnOnce(Option<serde_json::Value>) -> Result<SnapshotUpdate> + Send> {
        Box::new(move |current_snapshot: Option<serde_json::Value>| {
            let state = current_snapshot.unwrap_or_else(|| (engine.spec.initial_state)());
            let new_state = (engine.spec.evolve)(state, &event);
            let columns = engine
                .spec
                .map_to_columns
                .as_ref()
                .map(|f| f(&new_state))
                .unwrap_or_default();
            Ok(SnapshotUpdate { snapshot: new_state, columns })
        })
    }

    /// Apply one event through the keyed-row variant: `{table_name}` rows
    /// keyed by `extract_keys`'s output.
    pub async fn apply(&self, event: &Message, partition: &Partition) -> Result<bool> {
        let keys = (self.0.spec.extract_keys)(event, partition);
        self.0.check_key_set(&keys)?;

        let compute = Self::make_compute(self.0.clone(), event.clone());
        self.0
            .store
            .apply_if_newer(
                &self.0.spec.table_name,
                &keys,
                event.stream_id().as_str(),
                event.stream_position(),
                event.global_position(),
                compute,
            )
            .await
    }

    /// Apply one event through the centralized-snapshot variant, keyed by
    /// the deterministic stream id `construct_stream_id` derives from
    /// `extract_keys`'s output.
    pub async fn apply_centralized(&self, readmodel_table_name: &str, event: &Message, partition: &Partition) -> Result<bool> {
        let keys = (self.0.spec.extract_keys)(event, partition);
        self.0.check_key_set(&keys)?;
        let stream_id = construct_stream_id(&keys);

        let compute = Self::make_compute(self.0.clone(), event.clone());
        self.0
            .store
            .apply_if_newer_centralized(
                readmodel_table_name,
                &stream_id,
                event.stream_position(),
                event.global_position(),
                compute,
            )
            .await
    }
}

/// Deterministic, key-order-invariant stream id for the centralized
/// variant: `BTreeMap` already yields keys sorted, so the only remaining
/// requirement is percent-encoding `:`, `|`, and `%` themselves so a key
/// or value containing a delimiter can never be confused with the
/// delimiter.
pub fn construct_stream_id(keys: &BTreeMap<String, serde_json::Value>) -> String {
    keys.iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}:{}", percent_encode(k), percent_encode(&value))
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{MessageType, StreamId};
    use crate::infrastructure::repositories::InMemorySnapshotStore;
    use serde_json::json;

    fn partition() -> Partition {
        Partition::new("acme".to_string()).unwrap()
    }

    fn event(n: u64, sku: &str) -> Message {
        Message::new(
            StreamId::new("cart-1".to_string()).unwrap(),
            partition(),
            n,
            n as i64,
            MessageType::new("item.added".to_string()).unwrap(),
            json!({"sku": sku}),
            None,
        )
        .unwrap()
    }

    fn engine() -> ProjectionEngine {
        ProjectionEngine::new(
            ProjectionSpec {
                table_name: "carts".to_string(),
                extract_keys: Box::new(|event, _partition| {
                    let mut m = BTreeMap::new();
                    m.insert("cart_id".to_string(), json!(event.stream_id().as_str()));
                    m
                }),
                evolve: Box::new(|state, event| {
                    let mut items = state.get("items").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                    items.push(event.message_data().get("sku").cloned().unwrap_or(json!(null)));
                    json!({"items": items})
                }),
                initial_state: Box::new(|| json!({"items": []})),
                map_to_columns: Some(Box::new(|state| {
                    let mut cols = BTreeMap::new();
                    cols.insert("item_count".to_string(), json!(state.get("items").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0)));
                    cols
                })),
            },
            Arc::new(InMemorySnapshotStore::new()),
        )
    }

    #[tokio::test]
    async fn applies_events_in_order() {
        let engine = engine();
        assert!(engine.apply(&event(1, "A"), &partition()).await.unwrap());
        assert!(engine.apply(&event(2, "B"), &partition()).await.unwrap());
    }

    #[tokio::test]
    async fn skips_stale_position_idempotently() {
        let engine = engine();
        engine.apply(&event(2, "B"), &partition()).await.unwrap();
        let applied = engine.apply(&event(1, "A"), &partition()).await.unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn diverging_key_set_is_rejected() {
        let engine = ProjectionEngine::new(
            ProjectionSpec {
                table_name: "carts".to_string(),
                extract_keys: Box::new(|event, _partition| {
                    let mut m = BTreeMap::new();
                    if event.stream_position() == 1 {
                        m.insert("cart_id".to_string(), json!("c1"));
                    } else {
                        m.insert("region".to_string(), json!("us"));
                    }
                    m
                }),
                evolve: Box::new(|state, _event| state),
                initial_state: Box::new(|| json!({})),
                map_to_columns: None,
            },
            Arc::new(InMemorySnapshotStore::new()),
        );
        engine.apply(&event(1, "A"), &partition()).await.unwrap();
        let result = engine.apply(&event(2, "B"), &partition()).await;
        assert!(matches!(result, Err(CoreError::InconsistentKeys { .. })));
    }

    #[test]
    fn construct_stream_id_is_sorted_and_encoded() {
        let mut keys = BTreeMap::new();
        keys.insert("b".to_string(), json!("x|y"));
        keys.insert("a".to_string(), json!("1"));
        assert_eq!(construct_stream_id(&keys), "a:1|b:x%7Cy");
    }
}
