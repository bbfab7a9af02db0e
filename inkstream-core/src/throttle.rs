//! Admission control for streaming sessions.
//!
//! Reading a foreign process's memory ten times a second is cheap once,
//! expensive times N; the gate bounds how many viewers may be inside or
//! queued at once, and only ever lets one of them stream at a time. This is
//! the only process-wide mutable state the core exposes, kept behind one
//! object with its condition variable.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::StreamError;

// ── ThrottleGate ─────────────────────────────────────────────────

/// Counting gate with a hard admission ceiling.
///
/// A caller arriving while `limit` sessions are already inside or queued is
/// refused outright ([`StreamError::Busy`], mapped to HTTP 429). An admitted
/// caller waits on the condition variable until no session holds the gate,
/// then streams exclusively. With the default limit of 1 this is "one
/// writer, no queue"; larger limits queue latecomers instead of failing
/// them, up to the ceiling.
pub struct ThrottleGate {
    state: Mutex<GateState>,
    released: Condvar,
    limit: usize,
}

#[derive(Debug, Default)]
struct GateState {
    /// Sessions currently past the gate (0 or 1).
    holding: usize,
    /// Sessions past the ceiling check: holders plus queued waiters.
    admitted: usize,
}

impl ThrottleGate {
    /// Create a gate admitting at most `limit` concurrent sessions
    /// (holding or queued).
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState::default()),
            released: Condvar::new(),
            limit: limit.max(1),
        })
    }

    /// Acquire the gate, blocking the calling thread while earlier holders
    /// drain. Call from the blocking pool, not from an async task.
    pub fn acquire(self: &Arc<Self>) -> Result<ThrottlePermit, StreamError> {
        let mut state = self.lock_state();
        if state.admitted >= self.limit {
            return Err(StreamError::Busy);
        }
        state.admitted += 1;
        while state.holding != 0 {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.holding += 1;
        Ok(ThrottlePermit {
            gate: Arc::clone(self),
        })
    }

    /// Sessions currently holding the gate (0 or 1).
    pub fn holding(&self) -> usize {
        self.lock_state().holding
    }

    /// Sessions inside or queued.
    pub fn admitted(&self) -> usize {
        self.lock_state().admitted
    }

    /// Configured ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── ThrottlePermit ───────────────────────────────────────────────

/// RAII slot holder; releases and wakes waiters on drop.
pub struct ThrottlePermit {
    gate: Arc<ThrottleGate>,
}

impl Drop for ThrottlePermit {
    fn drop(&mut self) {
        let mut state = self.gate.lock_state();
        state.holding -= 1;
        state.admitted -= 1;
        self.gate.released.notify_all();
    }
}

// ── Tests ────────────────────────────────────────────────────────
