pub mod consumer;
pub mod engine;
pub mod runner;

pub use consumer::{Consumer, PollResult};
pub use engine::{construct_stream_id, ExtractKeysFn, ProjectionEngine, ProjectionSpec};
pub use runner::{HandlerRegistry, ProjectEventsResult, ProjectionHandler, ProjectionRunner};
