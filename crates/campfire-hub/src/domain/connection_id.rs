//! Opaque handle for one live connection.

use std::fmt;

use uuid::Uuid;

/// Identifies one registered connection.
///
/// Handles are allocated by [`Hub::register`](crate::application::Hub::register)
/// and are only meaningful to the hub that issued them.  Once the hub has
/// processed the handle's removal it is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh random handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first 8 hex digits are plenty to tell connections apart in logs.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}
