//! Session context shared by every component of a view.

use serde::{Deserialize, Serialize};

/// Backend user identifier.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addressing of a chat channel: who we are and who we talk to.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct PeerPair {
    pub local: UserId,
    pub remote: UserId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Psychologist,
    Patient,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Psychologist => "psychologist",
            Self::Patient => "patient",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is logged in and where the backend lives.
///
/// Built once by the front end and handed to components behind an `Arc`.
#[derive(Clone, Debug)]
pub struct SessionContext {
    base_url: String,
    pub user_id: UserId,
    pub token: Option<String>,
    pub role: Option<Role>,
}

impl SessionContext {
    pub fn new(base_url: impl Into<String>, user_id: UserId) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.contains("://") {
            base_url
        } else {
            format!("http://{base_url}")
        };
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
            token: None,
            role: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket origin matching the HTTP one (`https` → `wss`).
    pub fn ws_base(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        }
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn chat_url(&self, peer: PeerPair) -> String {
        format!("{}/ws/chat/{}/{}", self.ws_base(), peer.local, peer.remote)
    }

    pub fn predict_url(&self, session_id: &str) -> String {
        format!("{}/ws/predict/{}", self.ws_base(), session_id)
    }

    pub fn peer(&self, remote: UserId) -> PeerPair {
        PeerPair {
            local: self.user_id,
            remote,
        }
    }
}
