pub mod event_log;
pub mod key_store;
pub mod policy_store;
pub mod checkpoint_store;
pub mod snapshot_store;

pub use event_log::{aggregate_stream, AppendResult, EventLog, ReadStreamOptions, ReadStreamResult, SessionCallback};
pub use key_store::KeyStore;
pub use policy_store::PolicyStore;
pub use checkpoint_store::CheckpointStore;
pub use snapshot_store::{SnapshotStore, SnapshotUpdate};
