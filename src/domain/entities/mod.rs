pub mod message;
pub mod stream;
pub mod checkpoint;
pub mod encryption_key;
pub mod encryption_policy;

pub use message::{Message, NewMessage};
pub use stream::{ExpectedVersion, Stream, validate_expected_version};
pub use checkpoint::Checkpoint;
pub use encryption_key::{EncryptionKey, KeyMaterial};
pub use encryption_policy::{EncryptionPolicy, KeyScope};
