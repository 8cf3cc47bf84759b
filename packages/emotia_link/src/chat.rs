//! One conversation pane: history first, then the live channel.
//!
//! Selecting a peer bumps a conversation generation, closes the current
//! channel and starts the history fetch in the background. When the fetch
//! completes, its result is rendered only if its generation is still current;
//! a late response for a peer the user already left is dropped. The live
//! channel is opened after history has been rendered, so persisted messages
//! always sit above live ones.
//!
//! Driving loop:
//!
//! ```ignore
//! loop {
//!     let step = chat.next_step().await; // cancel-safe, fine inside select!
//!     chat.apply(step).await;
//! }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, AssignedPsychologist};
use crate::connection::{ChannelEvent, ChannelEventKind, ChannelState, ChannelTarget, ConnectionManager};
use crate::error::Result;
use crate::history::{HistoryLoader, Message};
use crate::presence::PresenceBoard;
use crate::protocol::{ChatEvent, WireFormat, decode_chat, encode_chat};
use crate::session::{SessionContext, UserId};
use crate::view::{ConnectionStatus, ConversationView, RenderedMessage, live_timestamp};

pub const NO_ASSIGNED_PSYCHOLOGIST: &str = "You have no assigned psychologist.";

/// Result of a background history fetch.
#[derive(Debug)]
pub struct HistoryLoaded {
    pub generation: u64,
    pub remote: UserId,
    pub result: Result<Vec<Message>>,
}

/// Something the session has to react to.
#[derive(Debug)]
pub enum Step {
    History(HistoryLoaded),
    Channel(ChannelEvent),
}

pub struct ChatSession<V: ConversationView> {
    session: Arc<SessionContext>,
    api: ApiClient,
    history: HistoryLoader,
    connection: ConnectionManager,
    presence: PresenceBoard,
    view: V,
    wire: WireFormat,
    remote: Option<UserId>,
    generation: u64,
    history_tx: mpsc::UnboundedSender<HistoryLoaded>,
    history_rx: mpsc::UnboundedReceiver<HistoryLoaded>,
}

impl<V: ConversationView> ChatSession<V> {
    pub fn new(session: Arc<SessionContext>, view: V, wire: WireFormat) -> Self {
        let api = ApiClient::new(session.clone());
        let (history_tx, history_rx) = mpsc::unbounded_channel();
        Self {
            history: HistoryLoader::new(api.clone()),
            connection: ConnectionManager::new(session.clone()),
            api,
            session,
            presence: PresenceBoard::new(),
            view,
            wire,
            remote: None,
            generation: 0,
            history_tx,
            history_rx,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn presence(&self) -> &PresenceBoard {
        &self.presence
    }

    pub fn remote(&self) -> Option<UserId> {
        self.remote
    }

    pub fn channel_state(&self) -> ChannelState {
        self.connection.state()
    }

    /// Switch the pane to `remote`.
    ///
    /// The previous channel is closed before anything else happens. History
    /// is fetched in the background; see [`ChatSession::next_step`].
    pub async fn select_peer(&mut self, remote: UserId, title: &str) {
        self.generation += 1;
        let generation = self.generation;
        info!(%remote, generation, "opening conversation");

        self.connection.close().await;
        self.remote = Some(remote);
        self.presence.reset();
        self.view.clear();
        self.view.set_peer(title);
        self.view.set_connection(ConnectionStatus::Connecting);

        let loader = self.history.clone();
        let peer = self.session.peer(remote);
        let tx = self.history_tx.clone();
        tokio::spawn(async move {
            let result = loader.load(peer).await;
            let _ = tx.send(HistoryLoaded {
                generation,
                remote,
                result,
            });
        });
    }

    /// Patient flow: open the conversation with the assigned psychologist.
    pub async fn open_assigned(&mut self) -> Result<Option<AssignedPsychologist>> {
        match self.api.assigned_psychologist(self.session.user_id).await {
            Ok(Some(assigned)) => {
                self.select_peer(assigned.psychologist_id, &assigned.psychologist_name)
                    .await;
                Ok(Some(assigned))
            }
            Ok(None) => {
                self.view.clear();
                self.view.notice(NO_ASSIGNED_PSYCHOLOGIST);
                Ok(None)
            }
            Err(e) => {
                warn!("failed to load assigned psychologist: {}", e);
                self.view.notice(&e.notice());
                Err(e)
            }
        }
    }

    /// Wait for the next history result or channel event. Cancel-safe.
    pub async fn next_step(&mut self) -> Step {
        tokio::select! {
            Some(loaded) = self.history_rx.recv() => Step::History(loaded),
            event = self.connection.next_event() => Step::Channel(event),
        }
    }

    pub async fn apply(&mut self, step: Step) {
        match step {
            Step::History(loaded) => self.on_history(loaded).await,
            Step::Channel(event) => self.on_channel(event),
        }
    }

    async fn on_history(&mut self, loaded: HistoryLoaded) {
        if loaded.generation != self.generation || self.remote != Some(loaded.remote) {
            debug!(
                stale = loaded.generation,
                current = self.generation,
                "discarding history for a conversation no longer shown"
            );
            return;
        }

        match loaded.result {
            Ok(messages) => {
                let local = self.session.user_id;
                debug!(count = messages.len(), "rendering history");
                for message in &messages {
                    self.view.append(message.render(local));
                }
            }
            Err(e) => {
                warn!("history load failed: {}", e);
                self.view.notice(&e.notice());
            }
        }

        let target = ChannelTarget::Chat(self.session.peer(loaded.remote));
        match self.connection.open(target).await {
            Ok(_) => self.view.set_connection(ConnectionStatus::Connected),
            Err(_) => self.view.set_connection(ConnectionStatus::Disconnected),
        }
    }

    fn on_channel(&mut self, event: ChannelEvent) {
        match event.kind {
            ChannelEventKind::Text(raw) => match decode_chat(&raw) {
                ChatEvent::Status(signal) => {
                    if Some(signal.peer_id) != self.remote {
                        debug!(peer = %signal.peer_id, "ignoring presence for another user");
                        return;
                    }
                    let state = self.presence.apply(signal);
                    self.view.set_presence(state);
                }
                ChatEvent::Message(message) => {
                    if self.is_outsider(&message.sender_tag) {
                        debug!(tag = %message.sender_tag, "ignoring message from another conversation");
                        return;
                    }
                    let side = message.side(self.session.user_id);
                    self.view.append(RenderedMessage {
                        side,
                        text: message.text,
                        time: live_timestamp(),
                    });
                }
            },
            ChannelEventKind::Closed => self.view.set_connection(ConnectionStatus::Disconnected),
        }
    }

    /// A numeric sender tag that is neither us nor the open peer. The relay
    /// keys sockets by user only, so another conversation can leak in here.
    fn is_outsider(&self, tag: &str) -> bool {
        match tag.parse::<i64>() {
            Ok(id) => UserId(id) != self.session.user_id && Some(UserId(id)) != self.remote,
            Err(_) => false,
        }
    }

    /// Send a chat line. Blank input or no open channel is a no-op.
    pub async fn send(&mut self, text: &str) -> Result<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let payload = encode_chat(text, self.session.user_id, self.wire)?;
        match self.connection.send(&payload).await {
            Ok(sent) => Ok(sent),
            Err(e) => {
                self.view.set_connection(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    /// Tear the pane down and hand the view back.
    pub async fn shutdown(mut self) -> V {
        self.connection.close().await;
        self.view
    }
}
