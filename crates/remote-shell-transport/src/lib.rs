//! Channel transports for the remote shell protocol.
//!
//! Provides:
//! - `MessageSink` / `MessageSource` - the channel capability
//! - In-memory duplex channel (tests, embedding)
//! - Newline-delimited JSON over any byte stream (feature: tcp adds TCP helpers)

pub mod channel;
pub mod json_lines;
pub mod memory;

pub use channel::{MessageSink, MessageSource, TransportError};
pub use json_lines::{JsonLinesSink, JsonLinesSource, json_lines};
pub use memory::{Endpoint, MemorySink, MemorySource, duplex};
