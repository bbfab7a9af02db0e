//! Kernel input device scanner.
//!
//! Opens the pen and touch event devices and runs one blocking reader per
//! device on the blocking pool. Each reader parses fixed-width kernel input
//! records, tags them with their source, and publishes them to the
//! [`EventBus`](crate::bus::EventBus). Devices are opened non-blocking so a
//! cancelled reader notices shutdown within one poll interval instead of
//! hanging on a quiet device.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::StreamError;
use crate::bus::EventBus;

// ── Kernel constants ─────────────────────────────────────────────

/// Synchronization event.
pub const EV_SYN: u16 = 0x00;
/// Key / button event.
pub const EV_KEY: u16 = 0x01;
/// Absolute axis event.
pub const EV_ABS: u16 = 0x03;
/// Multitouch X position, the axis the gesture detector consumes.
pub const TOUCH_X_AXIS: u16 = 0x35;

/// Poll interval while a non-blocking read has no data.
const READ_POLL: Duration = Duration::from_millis(10);

// ── Event types ──────────────────────────────────────────────────

/// Which physical digitizer produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum EventSource {
    Pen,
    Touch,
}

/// One kernel input event, tagged with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct InputEvent {
    pub source: EventSource,
    /// Kernel event type (`EV_SYN`, `EV_KEY`, `EV_ABS`, …).
    pub event_type: u16,
    /// Kernel event code (axis or button number).
    pub code: u16,
    pub value: i32,
    /// Monotonic timestamp in microseconds, from the kernel record.
    pub timestamp_us: u64,
}

// ── Record parsing ───────────────────────────────────────────────

/// The packed on-disk layout of one input record on a 64-bit kernel:
/// `{sec: i64, usec: i64, type: u16, code: u16, value: i32}`, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRecord {
    pub sec: i64,
    pub usec: i64,
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl InputRecord {
    /// Size of one record on the wire.
    pub const SIZE: usize = 24;

    /// Parse a record from its packed form.
    pub fn parse(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            sec: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
            usec: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            event_type: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
            code: u16::from_le_bytes(buf[18..20].try_into().unwrap()),
            value: i32::from_le_bytes(buf[20..24].try_into().unwrap()),
        }
    }

    /// Tag the record with its producing device.
    pub fn into_event(self, source: EventSource) -> InputEvent {
        InputEvent {
            source,
            event_type: self.event_type,
            code: self.code,
            value: self.value,
            timestamp_us: (self.sec.max(0) as u64) * 1_000_000 + self.usec.max(0) as u64,
        }
    }
}

// ── ScannerConfig ────────────────────────────────────────────────

/// Device paths for the two digitizers.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub pen_device: PathBuf,
    pub touch_device: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            pen_device: PathBuf::from("/dev/input/event1"),
            touch_device: PathBuf::from("/dev/input/event2"),
        }
    }
}

// ── InputScanner ─────────────────────────────────────────────────

/// Owns the two reader tasks and their shutdown token.
pub struct InputScanner {
    cancel: CancellationToken,
    readers: Vec<JoinHandle<()>>,
}

impl InputScanner {
    /// Open both devices and start their readers. Fails if either device
    /// cannot be opened (fatal at startup; there is no point streaming a
    /// tablet whose input cannot be observed).
    pub fn start(bus: Arc<EventBus>, config: &ScannerConfig) -> Result<Self, StreamError> {
        let pen = open_event_device(&config.pen_device)?;
        let touch = open_event_device(&config.touch_device)?;

        let cancel = CancellationToken::new();
        let readers = vec![
            spawn_reader(pen, EventSource::Pen, Arc::clone(&bus), cancel.clone()),
            spawn_reader(touch, EventSource::Touch, bus, cancel.clone()),
        ];
        Ok(Self { cancel, readers })
    }

    /// Signal both readers to stop. Idempotent; the device files close when
    /// the readers exit.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stop the readers and wait for them to exit.
    pub async fn join(self) {
        self.cancel.cancel();
        for reader in self.readers {
            let _ = reader.await;
        }
    }
}

fn spawn_reader(
    mut device: File,
    source: EventSource,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut record = [0u8; InputRecord::SIZE];
        let mut filled = 0usize;

        while !cancel.is_cancelled() {
            match device.read(&mut record[filled..]) {
                Ok(0) => {
                    // Device went away (e.g. unplugged); nothing to retry.
                    warn!(?source, "input device closed");
                    break;
                }
                Ok(n) => {
                    filled += n;
                    if filled == InputRecord::SIZE {
                        filled = 0;
                        let event = InputRecord::parse(&record).into_event(source);
                        bus.publish(event);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(READ_POLL);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(?source, "input read failed: {e}");
                    break;
                }
            }
        }
        debug!(?source, "input reader stopped");
    })
}

// ── Device open (platform gate) ──────────────────────────────────

#[cfg(unix)]
fn open_event_device(path: &Path) -> Result<File, StreamError> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(StreamError::InputDevice)
}

#[cfg(not(unix))]
fn open_event_device(_path: &Path) -> Result<File, StreamError> {
    Err(StreamError::InputDevice(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "kernel input devices are only available on unix",
    )))
}

// ── Tests ────────────────────────────────────────────────────────
