//! Persisted messages for a conversation, fetched once per channel open.

use serde::Deserialize;
use tracing::warn;

use crate::api::ApiClient;
use crate::error::Result;
use crate::protocol::stored_text;
use crate::session::{PeerPair, UserId};
use crate::view::{RenderedMessage, Side};

/// A stored chat message as returned by `/chat/history`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Message {
    pub sender_id: UserId,
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    pub content: String,
    /// Preformatted by the server (`HH:MM`), rendered verbatim.
    pub sent_at: String,
}

impl Message {
    pub fn render(&self, local: UserId) -> RenderedMessage {
        RenderedMessage {
            side: if self.sender_id == local {
                Side::Sent
            } else {
                Side::Received
            },
            text: stored_text(&self.content),
            time: self.sent_at.clone(),
        }
    }
}

#[derive(Clone)]
pub struct HistoryLoader {
    api: ApiClient,
}

impl HistoryLoader {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch the conversation in server order.
    ///
    /// Transport and HTTP failures are errors. A body that is not a JSON
    /// array is logged and treated as an empty history.
    pub async fn load(&self, peer: PeerPair) -> Result<Vec<Message>> {
        let body = self
            .api
            .get_text(&format!("/chat/history/{}/{}", peer.local, peer.remote))
            .await?;
        Ok(parse_history(&body))
    }
}

/// Keep the well-formed entries of a history body, in order.
pub fn parse_history(body: &str) -> Vec<Message> {
    let entries = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(entries)) => entries,
        Ok(other) => {
            warn!("history response is not a list: {}", other);
            return Vec::new();
        }
        Err(e) => {
            warn!("history response is not JSON: {}", e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Message>(entry) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!("skipping malformed history entry: {}", e);
                None
            }
        })
        .collect()
}
