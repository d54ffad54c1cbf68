//! RESP encoder and decoder.

/// Incremental RESP decoder.
pub mod decoder;
/// RESP encoder.
pub mod encoder;

pub use decoder::Decoder;
pub use encoder::Encoder;
