//! Append-only, per-tenant event log with envelope-level crypto-shredding
//! and exactly-once snapshot projections.

pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod keys;
pub mod policy;
pub mod projection;

pub use config::CoreConfig;
pub use error::{CoreError, Result};

pub use domain::entities;
pub use domain::repositories;
pub use domain::value_objects;

pub use crypto::EnvelopeEventLog;
pub use keys::KeyManager;
pub use policy::PolicyResolver;
pub use projection::{Consumer, ProjectionEngine, ProjectionRunner};
