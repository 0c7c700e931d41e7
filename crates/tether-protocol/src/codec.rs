//! Codec for decoding Tether envelopes.
//!
//! Envelopes travel as UTF-8 JSON text, one object per WebSocket message. There is
//! no framing beyond the transport's own message boundaries.

use serde_json::Value;
use thiserror::Error;

use crate::envelope::{Envelope, Kind};

/// Default maximum envelope size (64 KiB).
pub const MAX_ENVELOPE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur while decoding an envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds the configured size limit.
    #[error("Envelope size {size} exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Binary message was not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Payload is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object.
    #[error("Envelope is not a JSON object")]
    NotAnObject,

    /// No `kind`, `command` or `type` field.
    #[error("Envelope has no kind")]
    MissingKind,

    /// A field required by the envelope kind is missing or empty.
    #[error("Missing {field} for {kind} envelope")]
    MissingField { kind: String, field: &'static str },

    /// A routing field has the wrong JSON type.
    #[error("Invalid value for field {0}")]
    InvalidField(&'static str),
}

impl ProtocolError {
    pub(crate) fn missing(kind: &Kind, field: &'static str) -> Self {
        ProtocolError::MissingField {
            kind: kind.to_string(),
            field,
        }
    }
}

/// Decode an envelope from text.
///
/// # Errors
///
/// Returns an error if the text is not a JSON object or lacks the fields its
/// kind requires.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(object) => Envelope::from_object(&object),
        _ => Err(ProtocolError::NotAnObject),
    }
}

/// Convert a binary message into envelope text.
///
/// # Errors
///
/// Returns an error if the data is not valid UTF-8.
pub fn text_from_binary(data: Vec<u8>) -> Result<String, ProtocolError> {
    Ok(String::from_utf8(data)?)
}

/// Size-limited envelope decoder.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_size: usize,
}

impl EnvelopeCodec {
    /// Create a codec with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_size(MAX_ENVELOPE_SIZE)
    }

    /// Create a codec with a custom size limit.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Get the size limit in bytes.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Decode an envelope, rejecting oversized text before parsing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is too large or cannot be decoded.
    pub fn decode(&self, text: &str) -> Result<Envelope, ProtocolError> {
        if text.len() > self.max_size {
            return Err(ProtocolError::TooLarge {
                size: text.len(),
                max: self.max_size,
            });
        }
        decode(text)
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}
