//! Message envelope exchanged with peers
//!
//! Every message carries an optional performative (its intent) and a text
//! body. Photos travel as base64 text in an `inform`; everything else is
//! human-readable. Serialization on the wire uses MessagePack via rmp-serde.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::Identity;

/// A string wrapper that redacts its contents in Debug output.
///
/// Use for credentials that must not end up in logs.
/// Serializes/deserializes transparently as a plain string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedactedString(pub String);

impl RedactedString {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"***\"")
    }
}

impl From<String> for RedactedString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RedactedString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Maximum encoded message size (8 MB, room for a base64 still)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Intent tag carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performative {
    /// Photo request
    Request,
    /// Photo delivery
    Inform,
    /// Ban command; body names the target
    Ban,
    /// Ban acknowledgement
    Confirm,
    /// Cancellation notice
    Info,
    /// Rejected command
    Failure,
    /// Anything else a peer might send
    #[serde(untagged)]
    Other(String),
}

impl Performative {
    pub fn as_str(&self) -> &str {
        match self {
            Performative::Request => "request",
            Performative::Inform => "inform",
            Performative::Ban => "ban",
            Performative::Confirm => "confirm",
            Performative::Info => "info",
            Performative::Failure => "failure",
            Performative::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message as seen on the wire: raw addresses, optional tag, body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender address, possibly with a resource suffix
    pub from: String,
    /// Recipient address
    pub to: String,
    #[serde(default)]
    pub performative: Option<Performative>,
    #[serde(default)]
    pub body: String,
}

/// A message received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Raw sender address as delivered by the transport
    pub sender: String,
    pub performative: Option<Performative>,
    pub body: String,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, performative: Option<Performative>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            performative,
            body: body.into(),
        }
    }

    /// Sender with the resource suffix removed.
    pub fn sender_identity(&self) -> Option<Identity> {
        Identity::parse(&self.sender)
    }

    pub fn is_ban(&self) -> bool {
        self.performative == Some(Performative::Ban)
    }
}

impl From<Envelope> for InboundMessage {
    fn from(env: Envelope) -> Self {
        Self {
            sender: env.from,
            performative: env.performative,
            body: env.body,
        }
    }
}

/// A message the agent sends to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: Identity,
    pub performative: Performative,
    pub body: String,
}

impl OutboundMessage {
    /// Photo delivery (`inform`, base64 body).
    pub fn photo(to: Identity, encoded: String) -> Self {
        Self {
            to,
            performative: Performative::Inform,
            body: encoded,
        }
    }

    /// Cancellation notice (`info`).
    pub fn cancelled(to: Identity, reason: impl Into<String>) -> Self {
        Self {
            to,
            performative: Performative::Info,
            body: reason.into(),
        }
    }

    /// Ban acknowledgement (`confirm`).
    pub fn ban_confirmed(to: Identity, target: &Identity) -> Self {
        Self {
            to,
            performative: Performative::Confirm,
            body: format!("Agent {} has been banned", target),
        }
    }

    /// Rejected command (`failure`).
    pub fn failure(to: Identity, reason: impl Into<String>) -> Self {
        Self {
            to,
            performative: Performative::Failure,
            body: reason.into(),
        }
    }

    /// Wrap for the wire.
    pub fn into_envelope(self, from: &Identity) -> Envelope {
        Envelope {
            from: from.to_string(),
            to: self.to.into(),
            performative: Some(self.performative),
            body: self.body,
        }
    }
}

/// Frames exchanged with the message server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireFrame {
    /// First frame from the agent
    Login {
        identity: Identity,
        password: RedactedString,
    },
    /// Server's answer to `Login`
    LoginAck {
        accepted: bool,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Routed message, either direction
    Message(Envelope),
}
