//! Wire frame format shared by encoder and decoder.
//!
//! Every frame on the wire is `[header:4][payload:N]` with header
//! `[type:u8][len:u24 LE]`. Two frame types are emitted:
//!
//! - **Delta** (`0x01`): a concatenation of change runs.
//! - **Full** (`0x03`): the entire frame, zstd-compressed.
//!
//! Types `0x00` (uncompressed full) and `0x02` (gzip full) remain reserved
//! in the protocol namespace for old firmware clients but are neither
//! emitted nor accepted here.
//!
//! ## Change runs
//!
//! A run patches `pixel_count` 4-byte pixels at an offset relative to the
//! end of the previous run (frame start for the first run):
//!
//! ```text
//! short  (offset ≤ 65535, count ≤ 127):
//!     [pixel_count:u8][relative_offset:u16 LE][data…]
//! long:
//!     [0x80 | (pixel_count >> 8):u8][pixel_count & 0xFF:u8]
//!     [relative_offset:u24 LE][data…]
//! ```
//!
//! All multi-byte integers are little-endian.

use crate::StreamError;

// ── Frame types ──────────────────────────────────────────────────

/// Reserved: deprecated uncompressed full frame.
pub const FRAME_RESERVED: u8 = 0x00;
/// Delta frame carrying zero or more change runs.
pub const FRAME_DELTA: u8 = 0x01;
/// Legacy gzip-compressed full frame (old firmware only).
pub const FRAME_FULL_GZIP: u8 = 0x02;
/// zstd-compressed full frame.
pub const FRAME_FULL_ZSTD: u8 = 0x03;

/// Largest payload representable in the 24-bit length field.
pub const MAX_PAYLOAD: usize = 0xFF_FFFF;

/// Bytes in one pixel as counted by run headers.
pub const PIXEL_BYTES: usize = 4;

/// Largest pixel count a short run header can carry.
pub const MAX_SHORT_PIXELS: usize = 0x7F;
/// Largest relative offset a short run header can carry.
pub const MAX_SHORT_OFFSET: usize = 0xFFFF;
/// Largest pixel count any run header can carry (15-bit field).
pub const MAX_RUN_PIXELS: usize = 0x7FFF;
/// Largest relative offset a long run header can carry.
pub const MAX_RUN_OFFSET: usize = 0xFF_FFFF;

// ── FrameHeader ──────────────────────────────────────────────────

/// The 4-byte `[type, len:u24 LE]` frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: u8,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 4;

    /// Build a header, rejecting payloads the 24-bit field cannot carry.
    pub fn new(kind: u8, payload_len: usize) -> Result<Self, StreamError> {
        if payload_len > MAX_PAYLOAD {
            return Err(StreamError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self { kind, payload_len })
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let len = self.payload_len as u32;
        [
            self.kind,
            (len & 0xFF) as u8,
            ((len >> 8) & 0xFF) as u8,
            ((len >> 16) & 0xFF) as u8,
        ]
    }

    /// Deserialize from the first four bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < Self::SIZE {
            return Err(StreamError::Malformed("header shorter than 4 bytes"));
        }
        let payload_len =
            data[1] as usize | (data[2] as usize) << 8 | (data[3] as usize) << 16;
        Ok(Self {
            kind: data[0],
            payload_len,
        })
    }
}

// ── Run headers ──────────────────────────────────────────────────

/// Wire size of a run header for the given shape.
pub const fn run_header_len(pixel_count: usize, relative_offset: usize) -> usize {
    if pixel_count <= MAX_SHORT_PIXELS && relative_offset <= MAX_SHORT_OFFSET {
        3
    } else {
        5
    }
}

/// Encode a run header into a fixed buffer; returns the buffer and the
/// number of valid bytes.
///
/// Callers must pre-chunk runs so `pixel_count ≤ `[`MAX_RUN_PIXELS`] and
/// `relative_offset ≤ `[`MAX_RUN_OFFSET`].
pub fn encode_run_header(pixel_count: usize, relative_offset: usize) -> ([u8; 5], usize) {
    debug_assert!(pixel_count >= 1 && pixel_count <= MAX_RUN_PIXELS);
    debug_assert!(relative_offset <= MAX_RUN_OFFSET);

    if run_header_len(pixel_count, relative_offset) == 3 {
        let mut buf = [0u8; 5];
        buf[0] = pixel_count as u8;
        buf[1] = (relative_offset & 0xFF) as u8;
        buf[2] = ((relative_offset >> 8) & 0xFF) as u8;
        (buf, 3)
    } else {
        let mut buf = [0u8; 5];
        buf[0] = 0x80 | ((pixel_count >> 8) & 0x7F) as u8;
        buf[1] = (pixel_count & 0xFF) as u8;
        buf[2] = (relative_offset & 0xFF) as u8;
        buf[3] = ((relative_offset >> 8) & 0xFF) as u8;
        buf[4] = ((relative_offset >> 16) & 0xFF) as u8;
        (buf, 5)
    }
}

/// A run header parsed off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHeader {
    pub pixel_count: usize,
    pub relative_offset: usize,
    /// Header bytes consumed (3 or 5).
    pub header_len: usize,
}

/// Decode one run header from the front of `data`.
pub fn decode_run_header(data: &[u8]) -> Result<RunHeader, StreamError> {
    let first = *data.first().ok_or(StreamError::Malformed("empty run"))?;
    let header = if first & 0x80 != 0 {
        if data.len() < 5 {
            return Err(StreamError::Malformed("truncated long run header"));
        }
        RunHeader {
            pixel_count: ((first & 0x7F) as usize) << 8 | data[1] as usize,
            relative_offset: data[2] as usize
                | (data[3] as usize) << 8
                | (data[4] as usize) << 16,
            header_len: 5,
        }
    } else {
        if data.len() < 3 {
            return Err(StreamError::Malformed("truncated short run header"));
        }
        RunHeader {
            pixel_count: first as usize,
            relative_offset: data[1] as usize | (data[2] as usize) << 8,
            header_len: 3,
        }
    };
    if header.pixel_count == 0 {
        return Err(StreamError::Malformed("zero-length run"));
    }
    Ok(header)
}

// ── Tests ────────────────────────────────────────────────────────
