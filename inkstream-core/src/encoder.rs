//! Stateful delta encoder: full frames in, wire frames out.
//!
//! The encoder remembers the previous frame and, for each new one, emits
//! the cheapest wire representation a client can apply over its mirror
//! buffer:
//!
//! - **Unchanged** (64-bit content hash matches): a bare 4-byte delta
//!   header, zero runs.
//! - **Sparse change**: a delta frame whose runs borrow the changed bytes
//!   straight out of the current frame (no copy).
//! - **Dense change** (ratio above the threshold, or a delta that would not
//!   be smaller): the whole frame, zstd-compressed at the fastest level.
//!
//! One encoder instance per stream; it is single-writer and must not be
//! shared between tasks without external synchronization. All scratch
//! buffers are reused across calls, so a steady stream performs no
//! per-frame allocation.

use std::io::Write;

use xxhash_rust::xxh64::xxh64;

use crate::StreamError;
use crate::delta::{self, Span};
use crate::wire::{self, FrameHeader};

/// Change ratio above which a full frame is cheaper than a delta.
pub const DEFAULT_THRESHOLD: f64 = 0.30;

/// zstd level for full-frame compression; speed matters more than ratio
/// at 5 frames per second per viewer.
const ZSTD_LEVEL: i32 = 1;

// ── DeltaEncoder ─────────────────────────────────────────────────

/// Stateful frame-to-wire encoder.
pub struct DeltaEncoder {
    /// Last frame observed; grown lazily to the frame size.
    previous: Vec<u8>,
    has_previous: bool,
    /// xxh64 of `previous`, used to skip the byte diff entirely when a
    /// frame repeats.
    previous_hash: u64,
    /// Scratch: differing spans of the in-flight comparison.
    spans: Vec<Span>,
    /// Scratch: zstd output for full-frame emission.
    compressed: Vec<u8>,
    compressor: zstd::bulk::Compressor<'static>,
    /// Change ratio in (0, 1] above which a full frame is emitted.
    threshold: f64,
}

impl DeltaEncoder {
    /// Create an encoder with the default change-ratio threshold.
    pub fn new() -> Result<Self, StreamError> {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// Create an encoder with an explicit change-ratio threshold.
    pub fn with_threshold(threshold: f64) -> Result<Self, StreamError> {
        let compressor =
            zstd::bulk::Compressor::new(ZSTD_LEVEL).map_err(StreamError::CompressInit)?;
        Ok(Self {
            previous: Vec::new(),
            has_previous: false,
            previous_hash: 0,
            spans: Vec::new(),
            compressed: Vec::new(),
            compressor,
            threshold,
        })
    }

    /// Encode `current` against the previous frame, writing one complete
    /// wire frame to `sink`. Returns the number of bytes written.
    ///
    /// `current` is only borrowed for the duration of this call; the
    /// encoder keeps its own copy for the next comparison.
    pub fn encode<W: Write>(&mut self, current: &[u8], sink: &mut W) -> Result<usize, StreamError> {
        // Empty input never panics: it degrades to an empty delta.
        if current.is_empty() {
            return self.emit_empty_delta(sink);
        }

        let hash = xxh64(current, 0);

        // First frame, or the device profile changed under us.
        if !self.has_previous || self.previous.len() != current.len() {
            self.remember(current, hash);
            return self.emit_full(current, sink);
        }

        // Identical frame: 4-byte header, no payload, no diff work.
        if hash == self.previous_hash {
            return self.emit_empty_delta(sink);
        }

        delta::scan_spans(&self.previous, current, &mut self.spans);

        let changed = delta::changed_bytes(&self.spans);
        if changed == 0 {
            self.previous_hash = hash;
            return self.emit_empty_delta(sink);
        }

        let change_ratio = changed as f64 / current.len() as f64;
        let delta_size = delta::delta_wire_size(&self.spans);

        self.remember(current, hash);
        if change_ratio > self.threshold || delta_size >= current.len() {
            self.emit_full(current, sink)
        } else {
            self.emit_delta(current, delta_size, sink)
        }
    }

    /// Forget the previous frame so the next [`encode`](Self::encode)
    /// emits a full frame.
    pub fn reset(&mut self) {
        self.has_previous = false;
    }

    /// Drop internal buffers. Idle sessions call this to give memory back;
    /// the next frame re-grows them and is emitted in full.
    pub fn release(&mut self) {
        self.has_previous = false;
        self.previous = Vec::new();
        self.spans = Vec::new();
        self.compressed = Vec::new();
    }

    /// Change-ratio threshold in use.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Copy `current` into `previous` and record its hash. Runs before
    /// emission so the post-frame invariant `previous == current` holds on
    /// every emitting path.
    fn remember(&mut self, current: &[u8], hash: u64) {
        if self.previous.len() == current.len() {
            self.previous.copy_from_slice(current);
        } else {
            self.previous.clear();
            self.previous.extend_from_slice(current);
        }
        self.has_previous = true;
        self.previous_hash = hash;
    }

    fn emit_empty_delta<W: Write>(&mut self, sink: &mut W) -> Result<usize, StreamError> {
        let header = FrameHeader::new(wire::FRAME_DELTA, 0)?;
        sink.write_all(&header.encode()).map_err(StreamError::Write)?;
        Ok(FrameHeader::SIZE)
    }

    fn emit_full<W: Write>(&mut self, current: &[u8], sink: &mut W) -> Result<usize, StreamError> {
        self.compressed.clear();
        self.compressed
            .reserve(zstd::zstd_safe::compress_bound(current.len()));
        self.compressor
            .compress_to_buffer(current, &mut self.compressed)
            .map_err(StreamError::Compress)?;

        let header = FrameHeader::new(wire::FRAME_FULL_ZSTD, self.compressed.len())?;
        sink.write_all(&header.encode()).map_err(StreamError::Write)?;
        sink.write_all(&self.compressed).map_err(StreamError::Write)?;
        Ok(FrameHeader::SIZE + self.compressed.len())
    }

    fn emit_delta<W: Write>(
        &mut self,
        current: &[u8],
        delta_size: usize,
        sink: &mut W,
    ) -> Result<usize, StreamError> {
        let header = FrameHeader::new(wire::FRAME_DELTA, delta_size)?;
        sink.write_all(&header.encode()).map_err(StreamError::Write)?;

        delta::for_each_run(&self.spans, |rel, start, len| {
            let (buf, hdr_len) = wire::encode_run_header(len / wire::PIXEL_BYTES, rel);
            sink.write_all(&buf[..hdr_len]).map_err(StreamError::Write)?;
            sink.write_all(&current[start..start + len])
                .map_err(StreamError::Write)
        })?;

        Ok(FrameHeader::SIZE + delta_size)
    }
}

// ── Tests ────────────────────────────────────────────────────────
