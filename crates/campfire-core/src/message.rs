//! The chat message exchanged between peers.
//!
//! # Wire representation
//!
//! A [`Message`] travels as a JSON object.  Field names follow the browser
//! client's camel-case convention rather than Rust's snake case:
//!
//! ```json
//! {"id":7,"senderID":"u1","receiverID":"","content":"hi","createdAt":"2024-05-01T12:00:00Z"}
//! ```
//!
//! Only `senderID` and `content` are required when decoding.  `receiverID`
//! defaults to the empty string, `id` defaults to 0 (meaning "not yet
//! assigned"), and `createdAt` may be omitted, `null`, an RFC 3339 string, or
//! a number of seconds since the Unix epoch.
//!
//! # Immutability
//!
//! All fields are private.  Once a message has been built, the only way to
//! "change" it is one of the consuming `with_*` methods, which return a new
//! value.  Whoever currently owns a `Message` owns it exclusively; the hub
//! shares the *encoded bytes* between recipients, never the value itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message.
///
/// # Examples
///
/// ```rust
/// use campfire_core::Message;
///
/// let msg = Message::new("u1", "", "hello");
/// assert_eq!(msg.sender_id(), "u1");
/// assert!(msg.created_at().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Hub-assigned sequence id.  `0` means the hub has not stamped it yet.
    #[serde(default)]
    id: u64,

    /// Identity of the author.
    #[serde(rename = "senderID")]
    sender_id: String,

    /// Addressee tag.  Carried end-to-end but never used for routing: every
    /// message is broadcast to all members.
    #[serde(rename = "receiverID", default)]
    receiver_id: String,

    /// The message body.
    content: String,

    /// When the hub accepted the message.
    #[serde(
        rename = "createdAt",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    created_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Builds a message with no id and no timestamp.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            created_at: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns `true` when `createdAt` is absent or holds a "zero" value.
    ///
    /// Two zero values are recognised: the Unix epoch itself, and
    /// `0001-01-01T00:00:00Z`, which is what clients written in languages
    /// with a zero-valued time type send when the field was never set.
    pub fn is_timestamp_unset(&self) -> bool {
        match self.created_at {
            None => true,
            Some(ts) => ts == epoch() || ts == zero_time(),
        }
    }

    /// Returns a copy with the given id.
    pub fn with_id(self, id: u64) -> Self {
        Self { id, ..self }
    }

    /// Returns a copy with the given sender identity.
    pub fn with_sender_id(self, sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            ..self
        }
    }

    /// Returns a copy with `createdAt` set to `ts`, replacing any previous value.
    pub fn with_created_at(self, ts: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(ts),
            ..self
        }
    }

    /// Returns a copy whose timestamp is `now` if (and only if) the current
    /// timestamp is unset.  See [`Message::is_timestamp_unset`].
    pub fn stamped(self, now: DateTime<Utc>) -> Self {
        if self.is_timestamp_unset() {
            self.with_created_at(now)
        } else {
            self
        }
    }
}

/// `1970-01-01T00:00:00Z` exactly; any sub-second offset is a real instant.
fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap_or_default()
}

/// `0001-01-01T00:00:00Z`.
fn zero_time() -> DateTime<Utc> {
    // -62135596800 is the Unix timestamp of 0001-01-01T00:00:00Z, which is
    // always in chrono's supported range.
    DateTime::from_timestamp(-62_135_596_800, 0).unwrap_or_default()
}

/// Serde helpers for the `createdAt` field.
mod timestamp {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// RFC 3339 only has room for four-digit years; anything outside this
    /// range could not be written back in a form we can read.
    const YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

    /// Accepted JSON shapes for a timestamp.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Rfc3339(String),
        EpochSeconds(i64),
        EpochFractional(f64),
    }

    pub(super) fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            // `AutoSi` keeps every sub-second digit the value carries, so a
            // decoded timestamp compares equal to the one that was encoded.
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
        let ts = match raw {
            None => return Ok(None),
            Some(RawTimestamp::Rfc3339(text)) => DateTime::parse_from_rfc3339(&text)
                .map_err(|e| D::Error::custom(format!("invalid createdAt '{text}': {e}")))?
                .with_timezone(&Utc),
            Some(RawTimestamp::EpochSeconds(secs)) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| D::Error::custom(format!("createdAt out of range: {secs}")))?,
            Some(RawTimestamp::EpochFractional(secs)) => {
                if !secs.is_finite() {
                    return Err(D::Error::custom("createdAt must be a finite number"));
                }
                let whole = secs.floor();
                let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
                DateTime::from_timestamp(whole as i64, nanos)
                    .ok_or_else(|| D::Error::custom(format!("createdAt out of range: {secs}")))?
            }
        };
        if !YEARS.contains(&ts.year()) {
            return Err(D::Error::custom(format!(
                "createdAt {ts} is outside years 0000-9999"
            )));
        }
        Ok(Some(ts))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
