//! RESP2 (Redis Serialization Protocol) framing.
//!
//! - [`codec`] - Encoder and streaming decoder
//! - [`error`] - Crate-wide error type
//! - [`frame`] - Frame types

pub mod codec;
/// Error types.
pub mod error;
pub mod frame;
