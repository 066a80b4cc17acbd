//! JSON codec for chat message frames.
//!
//! The functions in this module have no I/O side effects and hold no state,
//! so they are safe to call from any concurrent context.
//!
//! ```text
//! inbound:   frame bytes ──decode()──▶ Message
//! outbound:  Message ──encode() / encode_text()──▶ frame bytes / text
//! ```
//!
//! Decoding only checks *shape*: well-formed JSON with the required fields.
//! Content rules (non-empty, maximum length) live in [`crate::validate`].

use thiserror::Error;

use crate::message::Message;

/// Errors that can occur while decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame carried no bytes at all.
    #[error("empty frame")]
    EmptyFrame,

    /// The bytes were not valid JSON, not UTF-8, or lacked a required field
    /// (`senderID`, `content`).
    #[error("malformed message payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one frame into a [`Message`].
///
/// Unknown JSON fields are ignored.
///
/// # Errors
///
/// Returns [`CodecError::EmptyFrame`] for a zero-length frame and
/// [`CodecError::Malformed`] for anything that is not a JSON object with
/// string `senderID` and `content` fields.
///
/// # Examples
///
/// ```rust
/// use campfire_core::decode;
///
/// let msg = decode(br#"{"senderID":"u1","content":"hi","extra":true}"#).unwrap();
/// assert_eq!(msg.sender_id(), "u1");
/// assert_eq!(msg.receiver_id(), "");
/// ```
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Encodes a [`Message`] into JSON bytes.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if serialisation fails, which cannot
/// happen for a `Message` built through the public API but is surfaced
/// rather than hidden.
pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(msg)?)
}

/// Encodes a [`Message`] into a JSON string, ready for a WebSocket text frame.
///
/// # Errors
///
/// Same as [`encode`].
pub fn encode_text(msg: &Message) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
