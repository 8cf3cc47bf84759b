use serde::{Deserialize, Serialize};

use crate::session::UserId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

impl PresenceState {
    /// Anything other than `"online"` reads as offline.
    pub fn from_wire(value: &str) -> Self {
        if value == "online" {
            Self::Online
        } else {
            Self::Offline
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Ephemeral presence update for a peer. Never persisted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusSignal {
    pub peer_id: UserId,
    pub state: PresenceState,
}

/// Holds the single presence value currently on display.
///
/// Each signal overwrites the previous one; nothing is queued.
#[derive(Debug, Default)]
pub struct PresenceBoard {
    current: Option<StatusSignal>,
}

impl PresenceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, signal: StatusSignal) -> PresenceState {
        self.current = Some(signal);
        signal.state
    }

    pub fn current(&self) -> Option<StatusSignal> {
        self.current
    }

    pub fn label(&self) -> &'static str {
        self.current.map(|s| s.state.label()).unwrap_or("unknown")
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
