//! Error types for the protocol layer.
//!
//! Each crate in Huddle defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in the shape of a frame, not in
//! networking or room management.

use crate::ErrorCode;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning an event into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into an event).
    ///
    /// Common causes: malformed JSON, an unknown `eventType`, a missing
    /// required field, or a field of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}

impl ProtocolError {
    /// The wire error code reported to the client for this error.
    ///
    /// Every protocol-level failure is the client's fault from the server's
    /// point of view, so they all map to [`ErrorCode::InvalidRequest`].
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidRequest
    }
}
