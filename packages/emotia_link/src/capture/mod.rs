//! Room streaming: sample a local frame source on a fixed interval and push
//! it to the prediction channel, showing whatever prediction came back last.
//!
//! Emission is best-effort. A frame sampled while the channel is not
//! writable is dropped on the spot; nothing is queued, retried or replayed.
//! A stale preview frame has no value to the predictor.

mod encoder;
mod source;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::connection::{ChannelEvent, ChannelEventKind, ChannelTarget, ConnectionManager};
use crate::error::{LinkError, Result};
use crate::protocol::StreamEnvelope;
use crate::session::SessionContext;

pub use encoder::{DEFAULT_HEIGHT, DEFAULT_QUALITY, DEFAULT_WIDTH, FrameEncoder};
pub use source::{FrameSource, ImageDirSource};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(800);

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub emotion: String,
    /// Model confidence in `0.0..=1.0`.
    pub confidence: f64,
}

impl Prediction {
    pub fn label(&self) -> String {
        format!(
            "Emotion: {} | Confidence: {:.1}%",
            self.emotion,
            self.confidence * 100.0
        )
    }
}

/// Where predictions are shown.
pub trait PredictionDisplay: Send {
    fn show(&mut self, prediction: &Prediction);
}

/// Keeps only the most recent prediction.
#[derive(Clone, Debug, Default)]
pub struct PredictionLabel {
    text: Option<String>,
    updates: usize,
}

impl PredictionLabel {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl PredictionDisplay for PredictionLabel {
    fn show(&mut self, prediction: &Prediction) {
        self.text = Some(prediction.label());
        self.updates += 1;
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CaptureStats {
    pub sent: u64,
    /// Ticks that found the channel not writable.
    pub dropped: u64,
    /// Ticks whose sample, encode or send failed.
    pub failed: u64,
}

/// One tick of the capture/emit cycle.
pub struct CaptureLoop<S> {
    /// Lent to the blocking pool for each sample. `None` only after a sample
    /// panicked.
    source: Option<S>,
    encoder: FrameEncoder,
    stats: CaptureStats,
}

impl<S: FrameSource + 'static> CaptureLoop<S> {
    pub fn new(source: S, encoder: FrameEncoder) -> Self {
        Self {
            source: Some(source),
            encoder,
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub async fn tick(&mut self, channel: &mut ConnectionManager) {
        if !channel.is_writable() {
            trace!("channel not writable, dropping frame");
            self.stats.dropped += 1;
            return;
        }

        let data = match self.sample().await {
            Ok(data) => data,
            Err(e) => {
                warn!("frame capture failed: {}", e);
                self.stats.failed += 1;
                return;
            }
        };

        let payload = match (StreamEnvelope::Frame { data }).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("frame envelope failed: {}", e);
                self.stats.failed += 1;
                return;
            }
        };

        match channel.send(&payload).await {
            Ok(true) => self.stats.sent += 1,
            Ok(false) => self.stats.dropped += 1,
            Err(e) => {
                warn!("frame send failed: {}", e);
                self.stats.failed += 1;
            }
        }
    }

    /// Read and encode one frame on the blocking pool.
    async fn sample(&mut self) -> Result<String> {
        let Some(mut source) = self.source.take() else {
            return Err(LinkError::CaptureUnavailable("frame source lost".into()));
        };
        let encoder = self.encoder;
        let (source, data) = tokio::task::spawn_blocking(move || {
            let data = source.next_frame().and_then(|frame| encoder.encode(&frame));
            (source, data)
        })
        .await
        .map_err(|e| LinkError::Encode(format!("capture task failed: {e}")))?;
        self.source = Some(source);
        data
    }
}

/// A prediction room: one channel, one capture loop, one display.
pub struct RoomSession<S, D> {
    connection: ConnectionManager,
    capture: CaptureLoop<S>,
    display: D,
    room: String,
    interval: Duration,
}

impl<S: FrameSource + 'static, D: PredictionDisplay> RoomSession<S, D> {
    pub fn new(
        session: Arc<SessionContext>,
        room: impl Into<String>,
        source: S,
        encoder: FrameEncoder,
        display: D,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(session),
            capture: CaptureLoop::new(source, encoder),
            display,
            room: room.into(),
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Stream until `shutdown` resolves, then close the channel.
    ///
    /// A channel that cannot be opened is not an error: capture keeps
    /// ticking and every frame is dropped.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> CaptureStats {
        let target = ChannelTarget::Predict(self.room.clone());
        if let Err(e) = self.connection.open(target).await {
            warn!(room = %self.room, "prediction channel unavailable, frames will be dropped: {}", e);
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.capture.tick(&mut self.connection).await,
                event = self.connection.next_event() => self.on_event(event),
            }
        }

        self.connection.close().await;
        let stats = self.capture.stats();
        info!(
            sent = stats.sent,
            dropped = stats.dropped,
            failed = stats.failed,
            "room closed"
        );
        stats
    }

    fn on_event(&mut self, event: ChannelEvent) {
        match event.kind {
            ChannelEventKind::Text(raw) => match StreamEnvelope::decode(&raw) {
                Some(StreamEnvelope::Prediction {
                    emotion,
                    confidence,
                }) => {
                    debug!(%emotion, confidence, "prediction");
                    self.display.show(&Prediction {
                        emotion,
                        confidence,
                    });
                }
                Some(StreamEnvelope::Frame { .. }) | None => {}
            },
            ChannelEventKind::Closed => {
                warn!(room = %self.room, "prediction channel closed, frames will be dropped");
            }
        }
    }
}
