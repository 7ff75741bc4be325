//! Canonical mail content encoding.
//!
//! A [`Message`] is encoded as compact JSON with a fixed field order:
//!
//! ```text
//! {"subject":"..","body":"..","from":"a@zamail.com","to":"b@zamail.com","timestamp":1700000000000}
//! ```
//!
//! The same bytes feed both the digest and the obfuscator, so the encoding
//! must be deterministic: field order comes from the struct declaration and
//! serde_json emits no insignificant whitespace.

use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::identifier::Identifier;

/// Error types for content encoding/decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed content: {0}")]
    MalformedContent(String),
    #[error("subject is {len} characters, limit is {max}")]
    SubjectTooLong { len: usize, max: usize },
    #[error("body is {len} characters, limit is {max}")]
    BodyTooLong { len: usize, max: usize },
    #[error("encoded message is {len} characters, limit is {max}")]
    ContentTooLarge { len: usize, max: usize },
}

/// Plaintext mail content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub subject: String,
    pub body: String,
    #[serde(rename = "from")]
    pub sender: Identifier,
    #[serde(rename = "to")]
    pub recipient: Identifier,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl Message {
    pub fn new(
        sender: Identifier,
        recipient: Identifier,
        subject: impl Into<String>,
        body: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            sender,
            recipient,
            timestamp,
        }
    }

    /// Check subject and body lengths
    pub fn validate(&self, limits: &Limits) -> Result<(), CodecError> {
        let len = self.subject.chars().count();
        if len > limits.subject_max {
            return Err(CodecError::SubjectTooLong { len, max: limits.subject_max });
        }
        let len = self.body.chars().count();
        if len > limits.body_max {
            return Err(CodecError::BodyTooLong { len, max: limits.body_max });
        }
        Ok(())
    }
}

/// Encode with the standard limits
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    encode_with_limits(message, &Limits::STANDARD)
}

/// Encode a message into its canonical bytes
pub fn encode_with_limits(message: &Message, limits: &Limits) -> Result<Vec<u8>, CodecError> {
    message.validate(limits)?;

    let encoded = serde_json::to_string(message)
        .map_err(|e| CodecError::MalformedContent(e.to_string()))?;

    let len = encoded.chars().count();
    if len > limits.message_max {
        return Err(CodecError::ContentTooLarge { len, max: limits.message_max });
    }

    Ok(encoded.into_bytes())
}

/// Decode canonical bytes back into a message
///
/// Fails with [`CodecError::MalformedContent`] on invalid UTF-8, invalid
/// JSON, missing or unknown fields, and identifiers that do not validate.
/// Deobfuscating with the wrong key lands here.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedContent(e.to_string()))
}
