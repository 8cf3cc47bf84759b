//! Single live WebSocket channel per view.
//!
//! The manager owns at most one open channel. Opening a new target closes the
//! current one first. Every open (and every close) starts a new generation;
//! the reader task stamps each event with the generation it was spawned for,
//! and [`ConnectionManager::next_event`] drops anything that is not from the
//! current one, so a replaced channel can never deliver into the new
//! conversation.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};
use crate::session::{PeerPair, SessionContext};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type Generation = u64;

/// Upper bound on the close handshake when tearing a channel down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// What a channel is addressed to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChannelTarget {
    Chat(PeerPair),
    Predict(String),
}

impl ChannelTarget {
    pub fn url(&self, session: &SessionContext) -> String {
        match self {
            Self::Chat(peer) => session.chat_url(*peer),
            Self::Predict(session_id) => session.predict_url(session_id),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelState {
    Unopened,
    Open,
    Closed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChannelEventKind {
    Text(String),
    /// The server hung up or the socket failed.
    Closed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelEvent {
    pub generation: Generation,
    pub kind: ChannelEventKind,
}

struct Channel {
    target: ChannelTarget,
    writer: SplitSink<WsStream, WsFrame>,
    reader: JoinHandle<()>,
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct ConnectionManager {
    session: Arc<SessionContext>,
    state: ChannelState,
    channel: Option<Channel>,
    generation: Generation,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    event_rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl ConnectionManager {
    pub fn new(session: Arc<SessionContext>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            session,
            state: ChannelState::Unopened,
            channel: None,
            generation: 0,
            event_tx,
            event_rx,
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn target(&self) -> Option<&ChannelTarget> {
        self.channel.as_ref().map(|c| &c.target)
    }

    pub fn is_writable(&self) -> bool {
        self.state == ChannelState::Open && self.channel.is_some()
    }

    /// Close whatever is open, then connect to `target`.
    ///
    /// On failure the manager is left `Closed`; there is no retry.
    pub async fn open(&mut self, target: ChannelTarget) -> Result<Generation> {
        self.close().await;
        self.generation += 1;
        let generation = self.generation;

        let url = target.url(&self.session);
        debug!(%url, generation, "opening channel");

        let stream = match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(%url, "channel connect failed: {}", e);
                self.state = ChannelState::Closed;
                return Err(LinkError::from_tungstenite(e));
            }
        };

        let (writer, reader) = stream.split();
        let reader = tokio::spawn(forward_frames(reader, generation, self.event_tx.clone()));
        self.channel = Some(Channel {
            target,
            writer,
            reader,
        });
        self.state = ChannelState::Open;
        Ok(generation)
    }

    /// Transmit raw text on the open channel.
    ///
    /// Returns `Ok(false)` without doing anything when `text` is empty or no
    /// channel is open. There is no acknowledgment.
    pub async fn send(&mut self, text: &str) -> Result<bool> {
        if text.is_empty() || self.state != ChannelState::Open {
            return Ok(false);
        }
        let Some(channel) = self.channel.as_mut() else {
            return Ok(false);
        };

        if let Err(e) = channel
            .writer
            .send(WsFrame::Text(text.to_owned().into()))
            .await
        {
            warn!(generation = self.generation, "channel write failed: {}", e);
            self.channel = None;
            self.state = ChannelState::Closed;
            return Err(LinkError::from_tungstenite(e));
        }
        Ok(true)
    }

    /// Release the channel. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            debug!(generation = self.generation, "closing channel");
            channel.reader.abort();
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
                let _ = channel.writer.send(WsFrame::Close(None)).await;
                let _ = channel.writer.close().await;
            })
            .await;
        }
        if self.state != ChannelState::Unopened {
            self.state = ChannelState::Closed;
        }
        // Anything still queued from the old reader is now stale.
        self.generation += 1;
    }

    /// Wait for the next event of the current channel.
    ///
    /// Cancel-safe. Pends forever while nothing is open.
    pub async fn next_event(&mut self) -> ChannelEvent {
        loop {
            let Some(event) = self.event_rx.recv().await else {
                return std::future::pending().await;
            };
            if event.generation != self.generation {
                trace!(
                    stale = event.generation,
                    current = self.generation,
                    "dropping event from replaced channel"
                );
                continue;
            }
            if event.kind == ChannelEventKind::Closed {
                debug!(generation = self.generation, "channel closed");
                self.channel = None;
                self.state = ChannelState::Closed;
            }
            return event;
        }
    }
}

async fn forward_frames(
    mut reader: SplitStream<WsStream>,
    generation: Generation,
    tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(WsFrame::Text(text)) => {
                let event = ChannelEvent {
                    generation,
                    kind: ChannelEventKind::Text(text.as_str().to_owned()),
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            Ok(WsFrame::Close(frame)) => {
                debug!(generation, ?frame, "server closed channel");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(generation, "channel read failed: {}", e);
                break;
            }
        }
    }
    let _ = tx.send(ChannelEvent {
        generation,
        kind: ChannelEventKind::Closed,
    });
}
