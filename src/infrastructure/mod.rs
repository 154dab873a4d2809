// Infrastructure layer - concrete implementations
// This contains:
// - repositories/ (in-memory adapters for tests, Postgres adapters behind
//   the `postgres` feature — both implement the domain::repositories
//   traits: EventLog, KeyStore, PolicyStore, CheckpointStore, SnapshotStore)

pub mod repositories;
