use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::Path;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::routing::get;

use crate::session::{SessionContext, UserId};

/// Serve `app` on an ephemeral loopback port.
///
/// Returns the base URL and a shutdown handle; dropping the handle also
/// stops the server.
pub async fn spawn_server(app: Router) -> (String, tokio::sync::oneshot::Sender<()>) {
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

pub fn session_for(base_url: &str, user: i64) -> Arc<SessionContext> {
    Arc::new(SessionContext::new(base_url, UserId(user)).with_token("test-token"))
}

/// Observations made by [`chat_router`].
#[derive(Default)]
pub struct ChatProbe {
    /// Sockets currently connected.
    pub active: AtomicUsize,
    /// Total sockets ever accepted.
    pub accepted: AtomicUsize,
    /// Every text frame received, prefixed with the remote id of its socket.
    pub received: Mutex<Vec<String>>,
}

impl ChatProbe {
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

/// A chat socket endpoint that greets with `"{remote}:hello"`, echoes each
/// text frame back as `"yo:<text>"`, and hangs up on `"__close__"`.
pub fn chat_router(probe: Arc<ChatProbe>) -> Router {
    Router::new().route(
        "/ws/chat/{local}/{remote}",
        get(
            move |ws: WebSocketUpgrade, Path((_local, remote)): Path<(i64, i64)>| {
                let probe = probe.clone();
                async move { ws.on_upgrade(move |socket| chat_socket(socket, remote, probe)) }
            },
        ),
    )
}

async fn chat_socket(mut socket: WebSocket, remote: i64, probe: Arc<ChatProbe>) {
    probe.accepted.fetch_add(1, Ordering::SeqCst);
    probe.active.fetch_add(1, Ordering::SeqCst);

    let greeting = format!("{remote}:hello");
    if socket.send(WsMessage::Text(greeting.into())).await.is_ok() {
        while let Some(Ok(msg)) = socket.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    let text = text.as_str().to_owned();
                    probe
                        .received
                        .lock()
                        .unwrap()
                        .push(format!("{remote}>{text}"));
                    if text == "__close__" {
                        break;
                    }
                    let echo = format!("yo:{text}");
                    if socket.send(WsMessage::Text(echo.into())).await.is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    }

    probe.active.fetch_sub(1, Ordering::SeqCst);
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    cond()
}

/// Observations made by [`predict_router`].
#[derive(Default)]
pub struct PredictProbe {
    pub frames: AtomicUsize,
    /// Frames that were not a `{"type":"frame"}` JPEG data URL.
    pub bad_frames: AtomicUsize,
    pub rooms: Mutex<Vec<String>>,
}

impl PredictProbe {
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.lock().unwrap().clone()
    }
}

/// A prediction endpoint that answers every frame with a fixed prediction.
pub fn predict_router(probe: Arc<PredictProbe>) -> Router {
    Router::new().route(
        "/ws/predict/{room}",
        get(
            move |ws: WebSocketUpgrade, Path(room): Path<String>| {
                let probe = probe.clone();
                async move { ws.on_upgrade(move |socket| predict_socket(socket, room, probe)) }
            },
        ),
    )
}

async fn predict_socket(mut socket: WebSocket, room: String, probe: Arc<PredictProbe>) {
    probe.rooms.lock().unwrap().push(room);

    while let Some(Ok(msg)) = socket.recv().await {
        let WsMessage::Text(text) = msg else {
            continue;
        };
        let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap_or_default();
        let is_frame = frame["type"] == "frame"
            && frame["data"]
                .as_str()
                .is_some_and(|d| d.starts_with("data:image/jpeg;base64,"));
        if !is_frame {
            probe.bad_frames.fetch_add(1, Ordering::SeqCst);
            continue;
        }
        probe.frames.fetch_add(1, Ordering::SeqCst);

        let reply = r#"{"type":"prediction","emotion":"happy","confidence":0.875}"#;
        if socket.send(WsMessage::Text(reply.into())).await.is_err() {
            break;
        }
    }
}
