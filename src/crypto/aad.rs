/// Additional Authenticated Data construction for the envelope crypto
/// store. No direct teacher analogue — AAD binding is new to this
/// domain — but the default formula and its rationale are taken verbatim
/// from the specification: `stream_type`/`event_type` are recorded in
/// envelope metadata but deliberately left out of the default AAD so a
/// caller can reconstruct a richer binding later without breaking
/// existing envelopes.
use crate::domain::value_objects::{MessageType, Partition, StreamId};

/// Context available when building AAD for one event.
pub struct AadContext<'a> {
    pub partition: &'a Partition,
    pub stream_id: &'a StreamId,
    pub stream_type: &'a str,
    pub event_type: &'a MessageType,
}

/// `UTF-8("{partition}:{stream_id}")` — the reference AAD. Does not fold
/// in `stream_type`/`event_type`; see the type's doc comment.
pub fn build_aad(ctx: &AadContext<'_>) -> Vec<u8> {
    format!("{}:{}", ctx.partition, ctx.stream_id).into_bytes()
}
