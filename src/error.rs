/// Core error taxonomy.
///
/// Every variant corresponds to a failure kind the append/read/projection
/// paths are required to surface distinctly; infrastructure failures
/// (Postgres, JSON) are folded into `StorageError`/`SerializationError` at
/// the repository boundary rather than leaking driver-specific types
/// upward. There is no `IntoResponse` impl here: the crate has no HTTP
/// surface.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("version mismatch on stream: expected {expected}, actual {actual:?}")]
    VersionMismatch {
        expected: String,
        actual: Option<u64>,
    },

    #[error("append batch was empty")]
    EmptyBatch,

    #[error("policy resolution failed: {0}")]
    PolicyResolutionFailed(String),

    #[error("key management failed: {0}")]
    KeyManagementFailed(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key is destroyed: {0}")]
    KeyDestroyed(String),

    #[error("crypto operation failed: {0}")]
    CryptoOperationFailed(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid data format: {0}")]
    InvalidDataFormat(String),

    #[error("projection key set is inconsistent: expected {expected:?}, actual {actual:?}")]
    InconsistentKeys {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

// Alias kept for the infrastructure modules, matching the domain-layer
// convenience alias the teacher used for its own error type.
pub use CoreError as Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::StorageError(err.to_string())
    }
}
