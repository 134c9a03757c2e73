//! Wire format for relayed signals: UTF-8 JSON text frames.
//!
//! The server never interprets payloads beyond checking that a frame is a
//! JSON object; SDP offers/answers, ICE candidates and anything else pass
//! through opaquely.

use serde_json::Value;
use thiserror::Error;

/// Why an inbound text frame was rejected.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// A parsed signaling payload. Invariant: the inner value is a JSON object.
///
/// The `type` key is conventional (offer/answer/ice) but not required; a
/// message without one is still relayed and merely logs as "unknown".
#[derive(Debug, Clone)]
pub struct SignalMessage(Value);

impl SignalMessage {
    /// Parse an inbound text frame. Anything that is not a JSON object is
    /// rejected; the caller logs the error and keeps the connection open.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ParseError::NotAnObject);
        }
        Ok(Self(value))
    }

    /// Message kind for log lines; a missing or non-string `type` key reads
    /// as "unknown".
    pub fn kind(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or("unknown")
    }

    /// Re-serialize for the wire. Key order and whitespace may differ from
    /// the inbound frame; content is otherwise unchanged.
    pub fn to_text(&self) -> String {
        self.0.to_string()
    }
}
