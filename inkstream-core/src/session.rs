//! Per-viewer streaming session.
//!
//! One session per HTTP connection: subscribe to the input bus, then tick
//! at the capture cadence — read a frame, encode it against the session's
//! own baseline, write the wire bytes, flush. Capture is gated on user
//! activity: any input event marks the user active, two quiet seconds mark
//! them idle, and an idle session skips its ticks entirely (an e-ink screen
//! that nobody is drawing on does not change).
//!
//! Encoder state is per-session, so every viewer starts with a full frame
//! at connect time and frames are emitted strictly in capture order.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::StreamError;
use crate::bus::{EventBus, Subscription};
use crate::encoder::{DEFAULT_THRESHOLD, DeltaEncoder};
use crate::pool::BufferPool;

// ── FrameSource ──────────────────────────────────────────────────

/// Where sessions get their pixels. The production implementation is
/// [`FramebufferReader`](crate::capture::FramebufferReader); tests drive
/// sessions with synthetic sources.
pub trait FrameSource: Send + Sync {
    /// Bytes in one frame.
    fn frame_size(&self) -> usize;

    /// Copy the current frame into `buf` (`frame_size` bytes).
    fn read_frame(&self, buf: &mut [u8]) -> Result<(), StreamError>;
}

// ── SessionConfig ────────────────────────────────────────────────

/// Timing and encoding knobs for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Capture cadence.
    pub tick: Duration,
    /// Quiet time after which capture pauses.
    pub idle_timeout: Duration,
    /// Change ratio above which full frames are emitted.
    pub threshold: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(2),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

// ── StreamSession ────────────────────────────────────────────────

/// The capture → encode → write loop for one viewer.
pub struct StreamSession<S: ?Sized> {
    source: Arc<S>,
    bus: Arc<EventBus>,
    pool: Arc<BufferPool>,
    encoder: DeltaEncoder,
    config: SessionConfig,
}

impl<S: FrameSource + ?Sized> StreamSession<S> {
    pub fn new(
        source: Arc<S>,
        bus: Arc<EventBus>,
        pool: Arc<BufferPool>,
        config: SessionConfig,
    ) -> Result<Self, StreamError> {
        let encoder = DeltaEncoder::with_threshold(config.threshold)?;
        Ok(Self {
            source,
            bus,
            pool,
            encoder,
            config,
        })
    }

    /// Run until `cancel` fires or an I/O error ends the session. The bus
    /// subscription is released on every exit path.
    pub async fn run<W>(mut self, writer: &mut W, cancel: CancellationToken) -> Result<(), StreamError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut events = self.bus.subscribe(None);
        let result = self.pump(writer, &cancel, &mut events).await;
        self.bus.unsubscribe(events.token());
        result
    }

    async fn pump<W>(
        &mut self,
        writer: &mut W,
        cancel: &CancellationToken,
        events: &mut Subscription,
    ) -> Result<(), StreamError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut ticks = tokio::time::interval(self.config.tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let idle = tokio::time::sleep(self.config.idle_timeout);
        tokio::pin!(idle);

        // Start out writing so a viewer sees the screen before touching it.
        let mut writing = true;
        let mut events_open = true;
        let mut wire: Vec<u8> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),

                event = events.recv(), if events_open => match event {
                    // Any input at all counts as activity.
                    Some(_) => {
                        writing = true;
                        idle.as_mut()
                            .reset(tokio::time::Instant::now() + self.config.idle_timeout);
                    }
                    None => events_open = false,
                },

                _ = &mut idle => {
                    if writing {
                        debug!("no input for {:?}; pausing capture", self.config.idle_timeout);
                    }
                    writing = false;
                    // Re-arm; the completed sleep would otherwise spin.
                    idle.as_mut()
                        .reset(tokio::time::Instant::now() + self.config.idle_timeout);
                }

                _ = ticks.tick() => {
                    if !writing {
                        continue;
                    }
                    let mut frame = self.pool.get();
                    self.source.read_frame(&mut frame)?;

                    wire.clear();
                    self.encoder.encode(&frame, &mut wire)?;
                    writer.write_all(&wire).await.map_err(StreamError::Write)?;
                    writer.flush().await.map_err(StreamError::Write)?;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
