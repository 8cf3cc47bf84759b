use anyhow::{Context, Result};
use emotia_link::{
    ApiClient, ChatSession, ConnectionStatus, ConversationView, PresenceState, RenderedMessage,
    Role, SessionContext, Side, UserId,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::config::EmotiaConfig;

/// Draws the conversation as plain lines.
pub struct TerminalView<W: Write + Send> {
    out: W,
    peer: String,
}

impl TerminalView<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            peer: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> ConversationView for TerminalView<W> {
    fn clear(&mut self) {
        self.line("");
    }

    fn set_peer(&mut self, title: &str) {
        self.peer = title.to_string();
        self.line(&format!("── {title} ──"));
    }

    fn append(&mut self, message: RenderedMessage) {
        let who = match message.side {
            Side::Sent => "you",
            Side::Received => self.peer.as_str(),
        };
        let line = format!("[{}] {}: {}", message.time, who, message.text);
        self.line(&line);
    }

    fn set_presence(&mut self, state: PresenceState) {
        let line = format!("* {} is {}", self.peer, state.label());
        self.line(&line);
    }

    fn set_connection(&mut self, status: ConnectionStatus) {
        let text = match status {
            ConnectionStatus::Connecting => "[emotia: connecting]",
            ConnectionStatus::Connected => "[emotia: connected]",
            ConnectionStatus::Disconnected => "[emotia: disconnected]",
        };
        self.line(text);
    }

    fn notice(&mut self, text: &str) {
        self.line(&format!("! {text}"));
    }
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Switch(UserId),
    Quit,
    Invalid(&'static str),
    Blank,
}

/// `None` is end of input.
pub fn parse_input(line: Option<&str>) -> Input {
    let Some(line) = line else {
        return Input::Quit;
    };
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    if line == "/quit" {
        return Input::Quit;
    }
    if let Some(arg) = line.strip_prefix("/peer") {
        return match arg.trim().parse::<i64>() {
            Ok(id) if arg.starts_with(' ') => Input::Switch(UserId(id)),
            _ => Input::Invalid("usage: /peer <id>"),
        };
    }
    if line.starts_with('/') {
        return Input::Invalid("commands: /peer <id>, /quit");
    }
    Input::Send(line.to_string())
}

/// Chat in the terminal. Without `peer`, opens the assigned psychologist.
pub async fn chat_command(config: &EmotiaConfig, peer: Option<i64>) -> Result<()> {
    let session = config.session()?;
    let mut chat = ChatSession::new(session.clone(), TerminalView::stdout(), config.wire_format());

    match peer {
        Some(id) => {
            let title = peer_title(&session, UserId(id)).await;
            chat.select_peer(UserId(id), &title).await;
        }
        None => {
            let assigned = chat
                .open_assigned()
                .await
                .context("Failed to resolve assigned psychologist")?;
            if assigned.is_none() {
                return Ok(());
            }
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            step = chat.next_step() => chat.apply(step).await,
            line = lines.next_line() => {
                let line = line.context("Failed to read stdin")?;
                match parse_input(line.as_deref()) {
                    Input::Quit => break,
                    Input::Blank => {}
                    Input::Invalid(usage) => chat.view_mut().notice(usage),
                    Input::Switch(id) => {
                        let title = peer_title(&session, id).await;
                        chat.select_peer(id, &title).await;
                    }
                    Input::Send(text) => match chat.send(&text).await {
                        Ok(true) => {}
                        Ok(false) => chat.view_mut().notice("Not connected; message not sent."),
                        Err(e) => {
                            warn!("send failed: {}", e);
                            chat.view_mut().notice(&e.notice());
                        }
                    },
                }
            }
        }
    }

    chat.shutdown().await;
    Ok(())
}

/// Display name for a peer: the patient's username when a psychologist
/// picks from their contacts, else a generic label.
async fn peer_title(session: &std::sync::Arc<SessionContext>, peer: UserId) -> String {
    if session.role == Some(Role::Psychologist) {
        let api = ApiClient::new(session.clone());
        match api.contacts(session.user_id).await {
            Ok(contacts) => {
                if let Some(contact) = contacts.into_iter().find(|c| c.id == peer) {
                    return contact.username;
                }
            }
            Err(e) => debug!("contact lookup failed: {}", e),
        }
    }
    format!("user {peer}")
}
