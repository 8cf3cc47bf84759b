use anyhow::{Context, Result};
use emotia_link::{ImageDirSource, Prediction, PredictionDisplay, PredictionLabel, RoomSession};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::config::EmotiaConfig;

/// Prints each prediction as it replaces the previous one.
pub struct TerminalLabel<W: Write + Send> {
    out: W,
    label: PredictionLabel,
}

impl<W: Write + Send> TerminalLabel<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            label: PredictionLabel::default(),
        }
    }

    pub fn label(&self) -> &PredictionLabel {
        &self.label
    }
}

impl<W: Write + Send> PredictionDisplay for TerminalLabel<W> {
    fn show(&mut self, prediction: &Prediction) {
        self.label.show(prediction);
        if let Some(text) = self.label.text() {
            let _ = writeln!(self.out, "{text}");
            let _ = self.out.flush();
        }
    }
}

/// Stream frames from `frames` to the prediction room until Ctrl-C.
pub async fn room_command(
    config: &EmotiaConfig,
    frames: &Path,
    room: &str,
    interval_ms: Option<u64>,
) -> Result<()> {
    let capture = config.capture()?;
    let interval = match interval_ms {
        Some(0) => anyhow::bail!("--interval-ms must be greater than zero"),
        Some(ms) => Duration::from_millis(ms),
        None => capture.interval,
    };

    let source = ImageDirSource::acquire(frames)
        .with_context(|| format!("Failed to open frame source {}", frames.display()))?;

    let session = config.session_or_anonymous();
    let mut room_session = RoomSession::new(
        session,
        room,
        source,
        capture.encoder,
        TerminalLabel::new(std::io::stdout()),
    )
    .with_interval(interval);

    eprintln!(
        "[emotia: streaming {} to room {} every {} ms, Ctrl-C to stop]",
        frames.display(),
        room,
        interval.as_millis()
    );

    let stats = room_session
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    eprintln!(
        "[emotia: room closed, {} frames sent, {} dropped, {} failed]",
        stats.sent, stats.dropped, stats.failed
    );
    Ok(())
}
