//! Data carried through the streaming pipeline
//!
//! - `message`: chat messages and their append-only content buffers
//! - `payload`: one decoded event-stream line, as sent by the answer service
//! - `content`: renderable parts derived from a message buffer
pub mod content;
pub mod message;
pub mod payload;
