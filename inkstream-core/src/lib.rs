//! # inkstream-core
//!
//! Frame capture and delta-streaming core for mirroring an e-ink tablet's
//! screen to remote viewers.
//!
//! ## Architecture
//!
//! ```text
//! TABLET                                            VIEWER
//! ┌──────────────────────────────┐                 ┌───────────────────┐
//! │ FramebufferReader            │                 │ FrameDecoder      │
//! │   (/proc/<pid>/mem)          │                 │   (mirror buffer) │
//! │   ↓                          │   HTTP chunked  │   ↓               │
//! │ DeltaEncoder ── wire frames ─┼───────────────► │ Displayer         │
//! │   ↑ tick / idle              │                 └───────────────────┘
//! │ StreamSession ◄── EventBus ◄─┼── InputScanner (pen / touch devices)
//! └──────────────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module     | Purpose                                               |
//! |------------|-------------------------------------------------------|
//! | `profile`  | Per-model, per-firmware framebuffer geometry          |
//! | `capture`  | Locating and reading the display server's pixel memory |
//! | `delta`    | Byte-level change detection between frames            |
//! | `wire`     | Frame / run wire encodings shared by both directions  |
//! | `encoder`  | Stateful frame → wire-frame encoder (delta or zstd)   |
//! | `decoder`  | Wire-frame → mirror-buffer reconstruction             |
//! | `bus`      | Bounded, non-blocking input event fan-out             |
//! | `input`    | Kernel input device readers feeding the bus           |
//! | `gesture`  | Swipe detection over touch X-axis events              |
//! | `session`  | Per-viewer capture loop with activity gating          |
//! | `throttle` | Admission control for concurrent sessions             |
//! | `pool`     | Reusable frame-buffer freelist                        |
//! | `error`    | `StreamError` — typed, `thiserror`-based hierarchy    |

pub mod bus;
pub mod capture;
pub mod decoder;
pub mod delta;
pub mod encoder;
pub mod error;
pub mod gesture;
pub mod input;
pub mod pool;
pub mod profile;
pub mod session;
pub mod throttle;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bus::{EventBus, EventFilter, SUBSCRIBER_CAPACITY, SubscriberToken, Subscription};
pub use capture::{FramebufferReader, find_display_server};
pub use decoder::{Displayer, FrameDecoder};
pub use encoder::{DEFAULT_THRESHOLD, DeltaEncoder};
pub use error::StreamError;
pub use gesture::{SwipeDetector, SwipeDirection};
pub use input::{EventSource, InputEvent, InputRecord, InputScanner, ScannerConfig};
pub use pool::{BufferPool, PooledBuf};
pub use profile::{DeviceModel, DeviceProfile, FirmwareVersion};
pub use session::{FrameSource, SessionConfig, StreamSession};
pub use throttle::{ThrottleGate, ThrottlePermit};
