//! Content rules a message must satisfy before it is broadcast.
//!
//! Validation is separate from decoding: a frame can be perfectly good JSON
//! and still be rejected here (for example an empty `content` string).

use thiserror::Error;

use crate::message::Message;

/// Default maximum length of `content`, in Unicode scalar values.
pub const MAX_CONTENT_LEN: usize = 1000;

/// Reasons a decoded message is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("sender ID cannot be empty")]
    EmptySenderId,

    #[error("message content cannot be empty")]
    EmptyContent,

    /// `len` is the content length in characters.
    #[error("message content is too long: {len} > {max} characters")]
    ContentTooLong { len: usize, max: usize },
}

/// Validates `msg` against the default limit, [`MAX_CONTENT_LEN`].
///
/// # Errors
///
/// See [`validate_with_max`].
pub fn validate(msg: &Message) -> Result<(), ValidationError> {
    validate_with_max(msg, MAX_CONTENT_LEN)
}

/// Validates `msg` against a caller-supplied content limit.
///
/// Length is counted in `char`s so that a 1000-character message written in a
/// non-Latin script is treated the same as a 1000-character ASCII one.
///
/// # Errors
///
/// - [`ValidationError::EmptySenderId`] if `senderID` is empty.
/// - [`ValidationError::EmptyContent`] if `content` is empty.
/// - [`ValidationError::ContentTooLong`] if `content` exceeds `max`.
pub fn validate_with_max(msg: &Message, max: usize) -> Result<(), ValidationError> {
    if msg.sender_id().is_empty() {
        return Err(ValidationError::EmptySenderId);
    }
    if msg.content().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = msg.content().chars().count();
    if len > max {
        return Err(ValidationError::ContentTooLong { len, max });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_message_is_accepted() {
        assert_eq!(validate(&Message::new("u1", "", "hi")), Ok(()));
    }

    #[test]
    fn test_empty_sender_is_rejected() {
        assert_eq!(
            validate(&Message::new("", "", "hi")),
            Err(ValidationError::EmptySenderId)
        );
    }

    #[test]
    fn test_empty_content_is_rejected() {
        assert_eq!(
            validate(&Message::new("u1", "", "")),
            Err(ValidationError::EmptyContent)
        );
    }

    #[test]
    fn test_empty_sender_is_reported_before_empty_content() {
        assert_eq!(
            validate(&Message::new("", "", "")),
            Err(ValidationError::EmptySenderId)
        );
    }

    #[test]
    fn test_content_at_limit_is_accepted() {
        let content = "a".repeat(MAX_CONTENT_LEN);
        assert_eq!(validate(&Message::new("u1", "", content)), Ok(()));
    }

    #[test]
    fn test_content_over_limit_is_rejected() {
        let content = "a".repeat(MAX_CONTENT_LEN + 1);
        assert_eq!(
            validate(&Message::new("u1", "", content)),
            Err(ValidationError::ContentTooLong {
                len: MAX_CONTENT_LEN + 1,
                max: MAX_CONTENT_LEN
            })
        );
    }

    #[test]
    fn test_multibyte_content_is_counted_in_characters() {
        // 1000 characters, 4000 bytes.
        let content = "🔥".repeat(MAX_CONTENT_LEN);
        assert_eq!(validate(&Message::new("u1", "", content)), Ok(()));
    }

    #[test]
    fn test_custom_limit_is_honoured() {
        let msg = Message::new("u1", "", "hello");
        assert_eq!(validate_with_max(&msg, 5), Ok(()));
        assert_eq!(
            validate_with_max(&msg, 4),
            Err(ValidationError::ContentTooLong { len: 5, max: 4 })
        );
    }

    #[test]
    fn test_receiver_is_not_required() {
        // Broadcast-only: an empty receiver tag is perfectly valid.
        assert!(validate(&Message::new("u1", "", "hi")).is_ok());
    }
}
