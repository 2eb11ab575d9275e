//! Companion chat - client for a mental-health companion's conversation stream
//!
//! Consumes the companion's streamed replies, assembles them into a message
//! log, tracks the conversation phase, and coordinates clearing the
//! conversation without racing an in-flight send.

pub mod api;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod store;
pub mod view;
