pub mod in_memory_event_log;
pub mod in_memory_key_store;
pub mod in_memory_policy_store;
pub mod in_memory_checkpoint_store;
pub mod in_memory_snapshot_store;

#[cfg(feature = "postgres")]
pub mod postgres_event_log;
#[cfg(feature = "postgres")]
pub mod postgres_key_store;
#[cfg(feature = "postgres")]
pub mod postgres_policy_store;
#[cfg(feature = "postgres")]
pub mod postgres_checkpoint_store;
#[cfg(feature = "postgres")]
pub mod postgres_snapshot_store;

pub use in_memory_event_log::InMemoryEventLog;
pub use in_memory_key_store::InMemoryKeyStore;
pub use in_memory_policy_store::InMemoryPolicyStore;
pub use in_memory_checkpoint_store::InMemoryCheckpointStore;
pub use in_memory_snapshot_store::InMemorySnapshotStore;

#[cfg(feature = "postgres")]
pub use postgres_event_log::PostgresEventLog;
#[cfg(feature = "postgres")]
pub use postgres_key_store::PostgresKeyStore;
#[cfg(feature = "postgres")]
pub use postgres_policy_store::PostgresPolicyStore;
#[cfg(feature = "postgres")]
pub use postgres_checkpoint_store::PostgresCheckpointStore;
#[cfg(feature = "postgres")]
pub use postgres_snapshot_store::PostgresSnapshotStore;
