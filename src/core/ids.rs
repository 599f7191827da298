//! Player and Session Identifiers
//!
//! Short random identifiers. Player IDs are internal and only need to be
//! unlikely to collide; session IDs are read aloud and typed by hand, so
//! their alphabet leaves out characters that look alike.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Alphabet for player IDs.
pub const PLAYER_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Alphabet for session IDs (no `0`, `O`, `1`, `I`).
pub const SESSION_ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated player ID.
pub const PLAYER_ID_LEN: usize = 9;

/// Length of a generated session ID.
pub const SESSION_ID_LEN: usize = 6;

/// Unique player identifier, assigned when the socket is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Generate a fresh random ID.
    pub fn generate() -> Self {
        Self(random_string(PLAYER_ID_ALPHABET, PLAYER_ID_LEN))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shareable six-character session code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random code.
    ///
    /// No uniqueness check happens here; the registry retries on collision.
    pub fn generate() -> Self {
        Self(random_string(SESSION_ID_ALPHABET, SESSION_ID_LEN))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}
