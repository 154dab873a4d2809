/// Value Objects
///
/// Immutable, self-validating domain primitives compared by value rather
/// than identity.

pub mod partition;
pub mod stream_id;
pub mod message_type;
pub mod key_id;

pub use partition::Partition;
pub use stream_id::StreamId;
pub use message_type::MessageType;
pub use key_id::KeyId;
