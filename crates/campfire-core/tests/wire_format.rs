//! Integration tests for the campfire-core wire format.
//!
//! These tests drive the public API the way the hub does: decode an inbound
//! frame, stamp it, validate it, and encode it for fan-out.  They also pin
//! the exact JSON shape browsers rely on.

use campfire_core::{decode, encode, validate, validate_with_max, Message, ValidationError};
use chrono::{TimeZone, Utc};

/// Decodes what was encoded and asserts nothing changed.
fn roundtrip(msg: &Message) -> Message {
    let bytes = encode(msg).expect("encode must succeed");
    decode(&bytes).expect("decode must succeed")
}

#[test]
fn test_inbound_frame_pipeline_produces_valid_stamped_message() {
    // Arrange: a browser frame without id or timestamp.
    let frame = br#"{"senderID":"u1","receiverID":"all","content":"hi"}"#;
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    // Act
    let msg = decode(frame).unwrap().stamped(now).with_id(1);

    // Assert
    assert_eq!(validate(&msg), Ok(()));
    assert_eq!(msg.created_at(), Some(now));

    let json: serde_json::Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": 1,
            "senderID": "u1",
            "receiverID": "all",
            "content": "hi",
            "createdAt": "2024-05-01T12:00:00Z",
        })
    );
}

#[test]
fn test_roundtrip_preserves_valid_messages() {
    let ts = Utc.with_ymd_and_hms(2030, 12, 31, 23, 59, 59).unwrap();
    let cases = [
        Message::new("u1", "", "hi").with_created_at(ts),
        Message::new("u1", "u2", "a".repeat(1000)).with_id(u64::MAX),
        Message::new("ünïcode", "", "line\nbreak \"quoted\" \\ slash"),
    ];

    for original in &cases {
        assert_eq!(validate(original), Ok(()));
        assert_eq!(&roundtrip(original), original);
    }
}

#[test]
fn test_valid_json_with_empty_content_decodes_but_fails_validation() {
    let msg = decode(br#"{"senderID":"u1","content":""}"#).unwrap();
    assert_eq!(validate(&msg), Err(ValidationError::EmptyContent));
}

#[test]
fn test_oversized_content_fails_configured_limit() {
    let content = "x".repeat(11);
    let frame = format!(r#"{{"senderID":"u1","content":"{content}"}}"#);

    let msg = decode(frame.as_bytes()).unwrap();

    assert_eq!(
        validate_with_max(&msg, 10),
        Err(ValidationError::ContentTooLong { len: 11, max: 10 })
    );
}

#[test]
fn test_frames_missing_required_fields_never_decode() {
    for frame in [
        &br#"{}"#[..],
        br#"{"receiverID":"u2","content":"hi"}"#,
        br#"{"senderID":"u1","receiverID":"u2"}"#,
        br#"[1,2,3]"#,
        br#""just a string""#,
    ] {
        assert!(decode(frame).is_err(), "frame {:?} must not decode", frame);
    }
}
