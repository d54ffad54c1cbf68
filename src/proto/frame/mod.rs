//! RESP frame types.

/// Frame type definitions.
pub mod types;

pub use types::Frame;
