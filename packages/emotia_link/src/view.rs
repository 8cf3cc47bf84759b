//! Rendering seam between the chat flow and whatever draws it.

use crate::presence::PresenceState;

/// Which side of the conversation a message is drawn on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Side {
    Sent,
    Received,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RenderedMessage {
    pub side: Side,
    pub text: String,
    pub time: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Display target for one conversation pane.
pub trait ConversationView: Send {
    /// Wipe the pane for a new peer: messages, notices and presence.
    fn clear(&mut self);
    fn set_peer(&mut self, title: &str);
    fn append(&mut self, message: RenderedMessage);
    fn set_presence(&mut self, state: PresenceState);
    fn set_connection(&mut self, status: ConnectionStatus);
    /// Passive, human-readable notice (errors, empty states).
    fn notice(&mut self, text: &str);
}

/// Local wall-clock `HH:MM`, used for live messages which carry no server time.
pub fn live_timestamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

/// In-memory view that records everything it is told.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    pub peer: Option<String>,
    pub messages: Vec<RenderedMessage>,
    pub presence: Option<PresenceState>,
    pub connection: Option<ConnectionStatus>,
    pub notices: Vec<String>,
}

impl ConversationView for Transcript {
    fn clear(&mut self) {
        self.messages.clear();
        self.notices.clear();
        self.presence = None;
    }

    fn set_peer(&mut self, title: &str) {
        self.peer = Some(title.to_string());
    }

    fn append(&mut self, message: RenderedMessage) {
        self.messages.push(message);
    }

    fn set_presence(&mut self, state: PresenceState) {
        self.presence = Some(state);
    }

    fn set_connection(&mut self, status: ConnectionStatus) {
        self.connection = Some(status);
    }

    fn notice(&mut self, text: &str) {
        self.notices.push(text.to_string());
    }
}
