//! Stream Codec
//!
//! Decodes AISStream frames. The service delivers JSON objects, usually
//! as binary frames carrying UTF-8 text, sometimes as text frames; both
//! are accepted. Anything that is not a JSON object is rejected.

use crate::domain::vessel::InboundFrame;

/// Maximum number of characters of a rejected payload kept for diagnostics.
pub const SAMPLE_LEN: usize = 120;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame was not valid UTF-8.
    #[error("invalid UTF-8 in binary frame: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Valid JSON, but not an object.
    #[error("expected JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// JSON codec for the AISStream feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(CodecError::NotAnObject(json_kind(&value)));
        }
        Ok(InboundFrame::from_payload(value))
    }

    /// Decode a binary frame holding UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or not a JSON object.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<InboundFrame, CodecError> {
        self.decode(std::str::from_utf8(bytes)?)
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

/// Truncated, lossy view of a payload for log fields.
#[must_use]
pub fn sample(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(SAMPLE_LEN).collect()
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
