//! Wire formats for the chat and prediction channels.
//!
//! Chat frames come in two shapes. The structured one is a JSON
//! [`ChatEnvelope`] tagged by `kind`. The deployed server still emits the
//! older colon-delimited text:
//!
//! ```text
//! status:<peerId>:<online|offline>     presence update
//! <senderTag>:<message text>           chat line ("yo" marks our own echo)
//! ```
//!
//! [`decode_chat`] accepts both. Chat lines are split on the first colon only,
//! so message text may itself contain colons.
//!
//! The prediction channel always speaks JSON tagged by `type`
//! ([`StreamEnvelope`]).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::presence::{PresenceState, StatusSignal};
use crate::session::UserId;
use crate::view::Side;

/// Sender tag the server uses when echoing our own message back to us.
pub const SELF_MARKER: &str = "yo";

/// Leading field of a colon-delimited presence frame.
pub const STATUS_TAG: &str = "status";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEnvelope {
    Chat { sender_id: UserId, payload: String },
    Status { sender_id: UserId, payload: PresenceState },
}

/// How outgoing chat text is framed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Raw text, as the current server expects.
    #[default]
    Legacy,
    /// A JSON [`ChatEnvelope::Chat`].
    Tagged,
}

/// A chat line received on a live channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiveMessage {
    pub sender_tag: String,
    pub text: String,
}

impl LiveMessage {
    pub fn side(&self, local: UserId) -> Side {
        if self.sender_tag == SELF_MARKER || self.sender_tag == local.to_string() {
            Side::Sent
        } else {
            Side::Received
        }
    }
}

/// A decoded inbound chat frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChatEvent {
    Message(LiveMessage),
    Status(StatusSignal),
}

pub fn decode_chat(raw: &str) -> ChatEvent {
    match parse_envelope(raw) {
        Some(envelope) => envelope.into(),
        None => decode_legacy(raw),
    }
}

fn decode_legacy(raw: &str) -> ChatEvent {
    if let Some(rest) = raw.strip_prefix(STATUS_TAG).and_then(|r| r.strip_prefix(':')) {
        let mut fields = rest.split(':');
        let peer = fields.next().and_then(|p| p.trim().parse::<i64>().ok());
        if let Some(peer) = peer {
            let state = PresenceState::from_wire(fields.next().unwrap_or_default());
            return ChatEvent::Status(StatusSignal {
                peer_id: UserId(peer),
                state,
            });
        }
    }

    match raw.split_once(':') {
        Some((tag, text)) => decode_relayed(tag, text),
        None => ChatEvent::Message(LiveMessage {
            sender_tag: String::new(),
            text: raw.to_string(),
        }),
    }
}

/// The relay prefixes whatever it received with `yo` or the sender id, so a
/// tagged envelope arrives as the text of a legacy line. The relay's tag wins
/// over the envelope's `sender_id` for the chat case.
fn decode_relayed(tag: &str, text: &str) -> ChatEvent {
    match parse_envelope(text) {
        Some(ChatEnvelope::Chat { payload, .. }) => ChatEvent::Message(LiveMessage {
            sender_tag: tag.to_string(),
            text: payload,
        }),
        Some(status @ ChatEnvelope::Status { .. }) => status.into(),
        None => ChatEvent::Message(LiveMessage {
            sender_tag: tag.to_string(),
            text: text.to_string(),
        }),
    }
}

fn parse_envelope(raw: &str) -> Option<ChatEnvelope> {
    if !raw.trim_start().starts_with('{') {
        return None;
    }
    match serde_json::from_str::<ChatEnvelope>(raw) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            debug!("chat frame looks like JSON but is not an envelope: {}", e);
            None
        }
    }
}

/// Display text of a stored message body. Bodies written by a client using
/// [`WireFormat::Tagged`] are persisted as the envelope JSON.
pub fn stored_text(content: &str) -> String {
    match parse_envelope(content) {
        Some(ChatEnvelope::Chat { payload, .. }) => payload,
        _ => content.to_string(),
    }
}

impl From<ChatEnvelope> for ChatEvent {
    fn from(envelope: ChatEnvelope) -> Self {
        match envelope {
            ChatEnvelope::Chat { sender_id, payload } => ChatEvent::Message(LiveMessage {
                sender_tag: sender_id.to_string(),
                text: payload,
            }),
            ChatEnvelope::Status { sender_id, payload } => ChatEvent::Status(StatusSignal {
                peer_id: sender_id,
                state: payload,
            }),
        }
    }
}

pub fn encode_chat(text: &str, local: UserId, format: WireFormat) -> Result<String> {
    match format {
        WireFormat::Legacy => Ok(text.to_string()),
        WireFormat::Tagged => serde_json::to_string(&ChatEnvelope::Chat {
            sender_id: local,
            payload: text.to_string(),
        })
        .map_err(|e| LinkError::Encode(e.to_string())),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEnvelope {
    Frame { data: String },
    Prediction { emotion: String, confidence: f64 },
}

impl StreamEnvelope {
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                debug!("ignoring stream payload: {}", e);
                None
            }
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LinkError::Encode(e.to_string()))
    }
}
