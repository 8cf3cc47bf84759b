//! In-process stand-in for the clinic backend: chat REST lookups, history,
//! and the chat relay socket with its `status:` / `yo:` framing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use emotia_link::{ChatSession, ConversationView, SessionContext, UserId};

#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub sender: i64,
    pub receiver: i64,
    pub content: String,
    pub sent_at: String,
}

#[derive(Default)]
pub struct Backend {
    next_conn: AtomicU64,
    /// user id -> (connection id, outbound queue)
    active: Mutex<HashMap<i64, (u64, mpsc::UnboundedSender<String>)>>,
    pub open_sockets: AtomicUsize,
    pub messages: Mutex<Vec<StoredMessage>>,
    /// patient id -> (psychologist id, name)
    pub assigned: Mutex<HashMap<i64, (i64, String)>>,
    /// Artificial latency of `/chat/history/{_}/{remote}`, keyed by remote.
    pub history_delay: Mutex<HashMap<i64, Duration>>,
}

impl Backend {
    pub fn seed(&self, sender: i64, receiver: i64, content: &str, sent_at: &str) {
        self.messages.lock().unwrap().push(StoredMessage {
            sender,
            receiver,
            content: content.to_string(),
            sent_at: sent_at.to_string(),
        });
    }

    pub fn assign(&self, patient: i64, psychologist: i64, name: &str) {
        self.assigned
            .lock()
            .unwrap()
            .insert(patient, (psychologist, name.to_string()));
    }

    pub fn delay_history(&self, remote: i64, delay: Duration) {
        self.history_delay.lock().unwrap().insert(remote, delay);
    }

    pub fn stored(&self) -> Vec<StoredMessage> {
        self.messages.lock().unwrap().clone()
    }

    fn notify(&self, user: i64, text: String) {
        if let Some((_, tx)) = self.active.lock().unwrap().get(&user) {
            let _ = tx.send(text);
        }
    }
}

pub async fn spawn_backend(backend: Arc<Backend>) -> (String, tokio::sync::oneshot::Sender<()>) {
    let app = Router::new()
        .route("/chat/history/{user}/{receiver}", get(history))
        .route("/chat/assigned/{patient}", get(assigned))
        .route("/ws/chat/{user}/{receiver}", get(chat_ws))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    (format!("http://127.0.0.1:{port}"), tx)
}

async fn history(
    State(backend): State<Arc<Backend>>,
    Path((user, receiver)): Path<(i64, i64)>,
) -> Json<serde_json::Value> {
    let delay = backend.history_delay.lock().unwrap().get(&receiver).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let entries: Vec<_> = backend
        .stored()
        .into_iter()
        .filter(|m| {
            (m.sender == user && m.receiver == receiver)
                || (m.sender == receiver && m.receiver == user)
        })
        .map(|m| {
            json!({
                "sender_id": m.sender,
                "receiver_id": m.receiver,
                "content": m.content,
                "sent_at": m.sent_at,
            })
        })
        .collect();
    Json(serde_json::Value::Array(entries))
}

async fn assigned(
    State(backend): State<Arc<Backend>>,
    Path(patient): Path<i64>,
) -> impl IntoResponse {
    match backend.assigned.lock().unwrap().get(&patient) {
        Some((id, name)) => (
            StatusCode::OK,
            Json(json!({
                "psychologist_id": id,
                "psychologist_name": name,
                "psychologist_email": format!("{}@clinic.test", name.to_lowercase()),
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "This patient has no assigned psychologist"})),
        ),
    }
}

async fn chat_ws(
    ws: WebSocketUpgrade,
    State(backend): State<Arc<Backend>>,
    Path((user, receiver)): Path<(i64, i64)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay(socket, user, receiver, backend))
}

async fn relay(socket: WebSocket, user: i64, receiver: i64, backend: Arc<Backend>) {
    let conn = backend.next_conn.fetch_add(1, Ordering::SeqCst);
    backend.open_sockets.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    backend
        .active
        .lock()
        .unwrap()
        .insert(user, (conn, tx.clone()));
    backend.notify(receiver, format!("status:{user}:online"));

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            WsMessage::Text(text) => {
                let text = text.as_str().to_owned();
                backend.seed(user, receiver, &text, "12:00");
                backend.notify(receiver, format!("{user}:{text}"));
                let _ = tx.send(format!("yo:{text}"));
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut active = backend.active.lock().unwrap();
        if active.get(&user).is_some_and(|(id, _)| *id == conn) {
            active.remove(&user);
        }
    }
    backend.notify(receiver, format!("status:{user}:offline"));
    backend.open_sockets.fetch_sub(1, Ordering::SeqCst);
    writer.abort();
}

pub fn session(base_url: &str, user: i64) -> Arc<SessionContext> {
    Arc::new(SessionContext::new(base_url, UserId(user)).with_token("integration-token"))
}

/// Run the session until `done` holds. Panics after three seconds.
pub async fn drive_until<V: ConversationView>(
    chat: &mut ChatSession<V>,
    mut done: impl FnMut(&ChatSession<V>) -> bool,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !done(chat) {
        let step = tokio::time::timeout_at(deadline, chat.next_step())
            .await
            .expect("condition not reached in time");
        chat.apply(step).await;
    }
}

/// Run the session for `period`, applying whatever arrives.
pub async fn drive_for<V: ConversationView>(chat: &mut ChatSession<V>, period: Duration) {
    let deadline = tokio::time::Instant::now() + period;
    while let Ok(step) = tokio::time::timeout_at(deadline, chat.next_step()).await {
        chat.apply(step).await;
    }
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
