//! Domain-specific error types for the streaming core.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! No panics on invalid input — every error is typed, and the policy for
//! each variant (fatal at startup, terminate session, fall back) is decided
//! by the caller, not here.

use std::io;

use thiserror::Error;

/// The canonical error type for the streaming core.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Startup errors ───────────────────────────────────────────
    /// The firmware version file could not be read or parsed.
    #[error("firmware version unreadable: {0}")]
    Firmware(String),

    /// The display-server process is not running.
    #[error("display server not found ({0})")]
    ProcessNotFound(String),

    /// The display-server memory map did not contain the expected region.
    #[error("memory map parse failed: {0}")]
    MemoryMapParse(String),

    /// A zstd context could not be constructed.
    #[error("compressor init failed: {0}")]
    CompressInit(#[source] io::Error),

    /// An input device file could not be opened.
    #[error("input device error: {0}")]
    InputDevice(#[source] io::Error),

    // ── Session errors ───────────────────────────────────────────
    /// A positional read of the framebuffer failed mid-stream.
    #[error("framebuffer read failed: {0}")]
    FramebufferRead(#[source] io::Error),

    /// Writing an encoded frame to the sink failed.
    #[error("stream write failed: {0}")]
    Write(#[source] io::Error),

    /// zstd compression of a full frame failed.
    #[error("compression failed: {0}")]
    Compress(#[source] io::Error),

    // ── Wire errors ──────────────────────────────────────────────
    /// A payload exceeds the 24-bit length field.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A received frame carried a deprecated or unknown type byte.
    #[error("unsupported frame type: {0:#04x}")]
    UnsupportedFrameType(u8),

    /// A received frame was truncated or structurally invalid.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    // ── Admission errors ─────────────────────────────────────────
    /// All streaming slots are taken.
    #[error("all streaming slots busy")]
    Busy,
}

impl StreamError {
    /// Whether this error should abort process startup rather than just
    /// the operation that produced it.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            StreamError::ProcessNotFound(_)
                | StreamError::MemoryMapParse(_)
                | StreamError::CompressInit(_)
        )
    }
}
