//! Server-Sent-Events line protocol support.

mod decoder;

pub use decoder::{EventIter, ServerSentEvent, SseDecoder};
