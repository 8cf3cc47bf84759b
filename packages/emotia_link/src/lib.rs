//! EMOTIA Link - client core for the clinic's real-time channels
//!
//! This crate owns everything a front end needs to talk to the EMOTIA backend
//! beyond plain request/response calls:
//!
//! - [`ConnectionManager`]: at most one live WebSocket channel at a time,
//!   generation-tagged so events from a replaced channel never leak into the
//!   current one.
//! - [`protocol`]: the `kind`-tagged chat envelope plus a decoder for the
//!   colon-delimited frames the deployed server still emits.
//! - [`PresenceBoard`]: last-write-wins online/offline display state.
//! - [`HistoryLoader`]: one-shot fetch of persisted messages per conversation.
//! - [`ChatSession`]: history-then-live conversation flow with stale-response
//!   discarding on peer switch.
//! - [`RoomSession`]: fixed-interval frame capture and best-effort emission
//!   with prediction display.
//!
//! It has no terminal or UI knowledge; rendering goes through the
//! [`ConversationView`] and [`PredictionDisplay`] traits.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use emotia_link::{ChatSession, SessionContext, Transcript, UserId, WireFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), emotia_link::LinkError> {
//!     let session = Arc::new(SessionContext::new("http://127.0.0.1:8000", UserId(1)));
//!     let mut chat = ChatSession::new(session, Transcript::default(), WireFormat::Legacy);
//!
//!     chat.select_peer(UserId(2), "Dr. Rivera").await;
//!     loop {
//!         let step = chat.next_step().await;
//!         chat.apply(step).await;
//!     }
//! }
//! ```

pub mod api;
pub mod capture;
pub mod chat;
pub mod connection;
mod error;
pub mod history;
pub mod presence;
pub mod protocol;
pub mod session;
#[cfg(test)]
mod test_helpers;
pub mod view;

pub use api::{ApiClient, AssignedPsychologist, Contact, LoginResponse};
pub use capture::{
    CaptureLoop, CaptureStats, FrameEncoder, FrameSource, ImageDirSource, Prediction,
    PredictionDisplay, PredictionLabel, RoomSession,
};
pub use chat::{ChatSession, HistoryLoaded, Step};
pub use connection::{
    ChannelEvent, ChannelEventKind, ChannelState, ChannelTarget, ConnectionManager, Generation,
};
pub use error::{LinkError, Result};
pub use history::{HistoryLoader, Message};
pub use presence::{PresenceBoard, PresenceState, StatusSignal};
pub use protocol::{ChatEnvelope, ChatEvent, LiveMessage, StreamEnvelope, WireFormat};
pub use session::{PeerPair, Role, SessionContext, UserId};
pub use view::{ConnectionStatus, ConversationView, RenderedMessage, Side, Transcript};
