//! JSON wire protocol for the relay link.
//!
//! Frames are UTF-8 text, one JSON object per WebSocket message:
//! ```text
//! {"type":"hello","role":"producer"}      role announcement, once per connect
//! {"type":"midi_like","payload":{…}}      application event envelope
//! {"type":…}                              anything else: liveness only
//! ```
//! The relay forwards frames verbatim; all interpretation happens on the
//! receiving client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Participant role, fixed when a client is built.
///
/// Producers may publish application events; consumers only receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Producer,
    #[default]
    Consumer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Producer => write!(f, "producer"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

/// Top-level wire frame.
///
/// Unrecognized frame types decode into [`Frame::Other`] so that future
/// frame kinds still count as traffic without breaking older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Role announcement, sent once immediately after the transport opens.
    Hello { role: Role },
    /// Application event envelope; only producers send these.
    MidiLike { payload: Value },
    /// Any other well-formed frame. Accepted for liveness, never surfaced.
    #[serde(untagged)]
    Other(Value),
}

impl Frame {
    /// Build a role announcement.
    pub fn hello(role: Role) -> Self {
        Self::Hello { role }
    }

    /// Wrap an opaque event payload in the application envelope.
    pub fn event(payload: Value) -> Self {
        Self::MidiLike { payload }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Parse a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Malformed(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "Malformed frame: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
