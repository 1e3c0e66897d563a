//! Relay of an upstream NDJSON body as server-sent event frames.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a relay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream body exhausted
    Completed { frames: usize },
    /// Downstream receiver dropped (client went away)
    ClientDisconnected { frames: usize },
    /// Upstream read error
    UpstreamFailed { frames: usize },
    /// No upstream data within the idle timeout
    UpstreamStalled { frames: usize },
    /// Server force-closed the stream on shutdown
    Cancelled { frames: usize },
}

impl RelayOutcome {
    pub fn frames(&self) -> usize {
        match *self {
            Self::Completed { frames }
            | Self::ClientDisconnected { frames }
            | Self::UpstreamFailed { frames }
            | Self::UpstreamStalled { frames }
            | Self::Cancelled { frames } => frames,
        }
    }
}

/// Splits a chunked byte stream into `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line (newline included)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            lines.push(self.buffer.drain(..=newline_pos).collect());
        }
        if !self.buffer.is_empty() {
            debug!("Partial line in buffer ({} bytes), waiting for more data", self.buffer.len());
        }
        lines
    }

    /// Release the trailing unterminated line, if any
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Wrap one upstream line as an event frame. Blank lines yield `None`.
pub fn frame(line: &[u8]) -> Option<Bytes> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(trimmed.len() + 8);
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(trimmed);
    out.extend_from_slice(b"\n\n");
    Some(Bytes::from(out))
}

/// Forward `upstream` to `tx` one frame per non-blank line.
///
/// Returns as soon as the receiver is dropped, the upstream errors, the
/// upstream is silent for `idle_timeout`, or `cancel` fires. Dropping
/// `upstream` on return releases the upstream connection. Failures end the
/// stream silently; a line buffered before a read error is still sent.
pub async fn relay_stream<S, E>(
    mut upstream: S,
    tx: FrameSender,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut framer = LineFramer::new();
    let mut frames = 0;
    let mut total_bytes = 0;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                warn!("Client disconnected after {} frames", frames);
                return RelayOutcome::ClientDisconnected { frames };
            }
            _ = cancel.cancelled() => {
                warn!("Server shutting down, closing stream after {} frames", frames);
                return RelayOutcome::Cancelled { frames };
            }
            next = tokio::time::timeout(idle_timeout, upstream.next()) => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                warn!("⚠️  Upstream stream error after {} frames: {}", frames, e);
                frames += flush_partial(&mut framer, &tx).await.unwrap_or(0);
                return RelayOutcome::UpstreamFailed { frames };
            }
            Ok(None) => break,
            Err(_) => {
                warn!("Upstream idle for {:?}, ending stream after {} frames", idle_timeout, frames);
                return RelayOutcome::UpstreamStalled { frames };
            }
        };

        total_bytes += chunk.len();
        for line in framer.push(&chunk) {
            let Some(event) = frame(&line) else {
                continue;
            };
            let sent = tokio::select! {
                sent = tx.send(Ok(event)) => sent.is_ok(),
                _ = cancel.cancelled() => return RelayOutcome::Cancelled { frames },
            };
            if !sent {
                warn!("Client disconnected after {} frames", frames);
                return RelayOutcome::ClientDisconnected { frames };
            }
            frames += 1;
        }
    }

    match flush_partial(&mut framer, &tx).await {
        Ok(sent) => frames += sent,
        Err(_) => return RelayOutcome::ClientDisconnected { frames },
    }

    info!("✅ Stream completed: {} frames, {} upstream bytes", frames, total_bytes);
    RelayOutcome::Completed { frames }
}

type FrameSender = mpsc::Sender<Result<Bytes, std::io::Error>>;

/// Send the unterminated trailing line, if non-blank. Returns frames sent.
async fn flush_partial(
    framer: &mut LineFramer,
    tx: &FrameSender,
) -> Result<usize, mpsc::error::SendError<Result<Bytes, std::io::Error>>> {
    match framer.finish().as_deref().and_then(frame) {
        Some(event) => tx.send(Ok(event)).await.map(|()| 1),
        None => Ok(0),
    }
}
