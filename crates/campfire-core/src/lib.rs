//! # campfire-core
//!
//! Shared library for the Campfire real-time hub containing the chat message
//! model, the JSON wire codec, and the validation rules every inbound message
//! must pass before it is broadcast.
//!
//! It has zero dependencies on async runtimes, sockets, or the hub itself, so
//! every function here can be called from any task or thread without
//! synchronisation.
//!
//! # Architecture overview (for beginners)
//!
//! Campfire is a broadcast chat room: every connected browser holds a
//! WebSocket to the hub, and every message one browser sends is fanned out to
//! all the others.  This crate is the shared vocabulary of that exchange:
//!
//! - **`message`** – The immutable [`Message`] value (sender, receiver tag,
//!   content, timestamp) and its JSON field names.
//!
//! - **`codec`** – Turning raw frame bytes into a [`Message`] and back.
//!   Malformed JSON or missing required fields are reported as
//!   [`CodecError`] so the caller can drop the frame.
//!
//! - **`validate`** – The content rules: a non-empty sender, non-empty content,
//!   and a maximum content length.
//!
//! - **`sequence`** – A lock-free counter the hub uses to stamp message ids.

pub mod codec;
pub mod message;
pub mod sequence;
pub mod validate;

// Re-export the most-used items at the crate root so callers can write
// `campfire_core::Message` instead of `campfire_core::message::Message`.
pub use codec::{decode, encode, CodecError};
pub use message::Message;
pub use sequence::SequenceCounter;
pub use validate::{validate, validate_with_max, ValidationError, MAX_CONTENT_LEN};
