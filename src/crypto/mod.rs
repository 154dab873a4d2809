pub mod aad;
pub mod cipher;
pub mod envelope;

pub use aad::{build_aad, AadContext};
pub use cipher::Algorithm;
pub use envelope::EnvelopeEventLog;
