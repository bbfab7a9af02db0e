//! Reusable frame-buffer pool.
//!
//! Streaming sessions borrow a raw read buffer on every tick; allocating
//! ~10 MB five times a second would thrash the allocator, so buffers are
//! recycled through a small freelist. Borrowed buffers return to the pool
//! on drop, so every session exit path gives its buffer back.

use std::sync::{Arc, Mutex, PoisonError};

/// Idle buffers kept around; beyond this, returned buffers are freed.
const MAX_IDLE: usize = 4;

// ── BufferPool ───────────────────────────────────────────────────

/// Freelist of equally-sized byte buffers.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buf_size: usize,
}

impl BufferPool {
    /// Create a pool handing out buffers of `buf_size` bytes.
    pub fn new(buf_size: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            buf_size,
        })
    }

    /// Size of the buffers this pool manages.
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Borrow a zero-initialized buffer, reusing a returned one if any.
    pub fn get(self: &Arc<Self>) -> PooledBuf {
        let reused = self.lock_free().pop();
        let buf = reused.unwrap_or_else(|| vec![0u8; self.buf_size]);
        PooledBuf {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Buffers currently sitting idle in the pool.
    pub fn idle(&self) -> usize {
        self.lock_free().len()
    }

    fn put(&self, buf: Vec<u8>) {
        let mut free = self.lock_free();
        if free.len() < MAX_IDLE && buf.len() == self.buf_size {
            free.push(buf);
        }
    }

    fn lock_free(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── PooledBuf ────────────────────────────────────────────────────

/// A borrowed buffer; returns itself to the pool on drop.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl std::ops::Deref for PooledBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}

// ── Tests ────────────────────────────────────────────────────────
