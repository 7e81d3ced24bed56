//! Requester identities
//!
//! Peers address the agent as `local@domain/resource`. The same logical peer
//! can send from several resources (phone, laptop, ...), so the resource
//! suffix is stripped before an identity is ever used as a key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized requester address (`local@domain`, never `.../resource`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Normalize a raw address. Returns `None` if nothing is left after
    /// trimming whitespace and dropping the resource suffix.
    pub fn parse(raw: &str) -> Option<Self> {
        let bare = raw.trim();
        let bare = match bare.find('/') {
            Some(idx) => &bare[..idx],
            None => bare,
        };
        let bare = bare.trim();
        if bare.is_empty() {
            None
        } else {
            Some(Self(bare.to_string()))
        }
    }

    /// Build an identity from its parts, e.g. `("camera_agent", "localhost")`.
    pub fn from_parts(local: &str, domain: &str) -> Option<Self> {
        Self::parse(&format!("{}@{}", local.trim(), domain.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("invalid identity: {:?}", raw))
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}
