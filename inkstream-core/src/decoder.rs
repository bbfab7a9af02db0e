//! Wire-frame decoder: reconstructs the screen on the viewer side.
//!
//! Maintains a persistent mirror buffer and applies incoming wire frames to
//! it: full frames replace the mirror, delta frames patch runs at offsets
//! relative to the end of the previous run. Deprecated frame types (0x00
//! uncompressed, 0x02 gzip) and unknown types are rejected.
//!
//! Used by desktop viewers and by the round-trip tests; browser clients
//! implement the same algorithm in the page.

use crate::StreamError;
use crate::wire::{self, FrameHeader, PIXEL_BYTES};

// ── Displayer ────────────────────────────────────────────────────

/// Destination for reconstructed frames.
///
/// The desktop variant renders into an image stream, the test harness
/// collects frames for inspection; the decoder accepts any implementation.
pub trait Displayer {
    fn display(&mut self, frame: &[u8]) -> Result<(), StreamError>;
}

// ── FrameDecoder ─────────────────────────────────────────────────

/// Stateful decoder holding the viewer's mirror buffer.
pub struct FrameDecoder {
    mirror: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { mirror: Vec::new() }
    }

    /// Apply one complete wire frame (`[header:4][payload]`) to the mirror
    /// and return the reconstructed frame.
    pub fn apply(&mut self, frame: &[u8]) -> Result<&[u8], StreamError> {
        let header = FrameHeader::decode(frame)?;
        let payload = &frame[FrameHeader::SIZE..];
        if payload.len() != header.payload_len {
            return Err(StreamError::Malformed("payload length mismatch"));
        }

        match header.kind {
            wire::FRAME_DELTA => self.apply_delta(payload)?,
            wire::FRAME_FULL_ZSTD => {
                self.mirror = zstd::decode_all(payload).map_err(StreamError::Compress)?;
            }
            other => return Err(StreamError::UnsupportedFrameType(other)),
        }
        Ok(&self.mirror)
    }

    /// Apply a wire frame and hand the reconstruction to `displayer`.
    pub fn present<D: Displayer>(
        &mut self,
        frame: &[u8],
        displayer: &mut D,
    ) -> Result<(), StreamError> {
        self.apply(frame)?;
        displayer.display(&self.mirror)
    }

    /// Current mirror contents (empty before the first full frame).
    pub fn mirror(&self) -> &[u8] {
        &self.mirror
    }

    // ── Internal ─────────────────────────────────────────────────

    fn apply_delta(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        if payload.is_empty() {
            // Identical frame: nothing to patch.
            return Ok(());
        }
        if self.mirror.is_empty() {
            return Err(StreamError::Malformed("delta before any full frame"));
        }

        let mut cursor = 0usize; // end of the previous run, absolute
        let mut pos = 0usize;
        while pos < payload.len() {
            let run = wire::decode_run_header(&payload[pos..])?;
            let data_len = run.pixel_count * PIXEL_BYTES;
            let data_start = pos + run.header_len;
            let data_end = data_start + data_len;
            if data_end > payload.len() {
                return Err(StreamError::Malformed("run data truncated"));
            }

            let start = cursor + run.relative_offset;
            let end = start + data_len;
            if end > self.mirror.len() {
                return Err(StreamError::Malformed("run past end of frame"));
            }

            self.mirror[start..end].copy_from_slice(&payload[data_start..data_end]);
            cursor = end;
            pos = data_end;
        }
        Ok(())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
