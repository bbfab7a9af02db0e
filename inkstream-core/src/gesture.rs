//! Horizontal swipe detection over touch X-axis events.
//!
//! A swipe is a monotonic-enough horizontal drag: at least
//! [`SWIPE_DISTANCE`] units of X displacement accumulated within
//! [`SWIPE_WINDOW_US`], with no single step larger than [`MAX_STEP`]
//! (bigger jumps are a finger landing somewhere else, not a drag).

use std::fmt;

use crate::input::{EV_ABS, InputEvent, TOUCH_X_AXIS};

/// Minimum X displacement for a swipe.
pub const SWIPE_DISTANCE: i32 = 250;
/// Detection window in microseconds.
pub const SWIPE_WINDOW_US: u64 = 800_000;
/// Largest step between consecutive events that still counts as a drag.
pub const MAX_STEP: i32 = 25;

// ── SwipeDirection ───────────────────────────────────────────────

/// Completed swipe, formatted exactly as the gesture channel emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwipeDirection::Left => f.write_str("Swipe Left"),
            SwipeDirection::Right => f.write_str("Swipe Right"),
        }
    }
}

// ── SwipeDetector ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Tracking {
    start_us: u64,
    start_value: i32,
    last_value: i32,
}

/// Stateful detector; feed it the touch event stream and it yields at most
/// one direction per completed swipe.
#[derive(Debug, Default)]
pub struct SwipeDetector {
    tracking: Option<Tracking>,
}

impl SwipeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one event; returns a direction when a swipe completes.
    /// Non-X-axis events are ignored.
    pub fn feed(&mut self, event: &InputEvent) -> Option<SwipeDirection> {
        if event.event_type != EV_ABS || event.code != TOUCH_X_AXIS {
            return None;
        }

        let Some(track) = self.tracking else {
            self.seed(event);
            return None;
        };

        // A jump means a new touch, not a continuation of the drag.
        if (event.value - track.last_value).abs() > MAX_STEP {
            self.seed(event);
            return None;
        }

        // The window is measured from the seeding event.
        if event.timestamp_us.saturating_sub(track.start_us) > SWIPE_WINDOW_US {
            self.seed(event);
            return None;
        }

        let displacement = event.value - track.start_value;
        if displacement.abs() >= SWIPE_DISTANCE {
            self.tracking = None;
            return Some(if displacement > 0 {
                SwipeDirection::Right
            } else {
                SwipeDirection::Left
            });
        }

        if let Some(track) = &mut self.tracking {
            track.last_value = event.value;
        }
        None
    }

    fn seed(&mut self, event: &InputEvent) {
        self.tracking = Some(Tracking {
            start_us: event.timestamp_us,
            start_value: event.value,
            last_value: event.value,
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────
