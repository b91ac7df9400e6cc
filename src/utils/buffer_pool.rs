//! # Buffer Pool
//!
//! Object pool for packet scratch buffers to reduce allocation overhead in
//! high-throughput sessions.
//!
//! Every frame written rents one buffer sized to the connection's maximum
//! packet size, and every payload decoded rents a scratch buffer, so pooling
//! eliminates allocator contention on the per-message hot path.
//!
//! Two process-wide pools exist: a general pool for ordinary packet sizes and
//! a large-object pool for connections configured with packet sizes at or
//! above [`crate::config::LARGE_BUFFER_THRESHOLD`]. Pool selection happens in
//! [`crate::config::ConnectionOptions::packet_buffer_pool`].
//!
//! ## Usage
//! ```rust
//! use netsession::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(100, 4096); // 100 buffers, retain up to 4096 bytes
//! let mut buffer = pool.acquire(1024);
//! // Use buffer...
//! // Buffer automatically returned to pool on drop
//! ```

use std::sync::{Arc, Mutex, OnceLock};

/// Retain limit for the general shared pool.
const GENERAL_RETAIN_LIMIT: usize = 1024 * 1024;

/// Retain limit for the shared large-object pool.
const LARGE_RETAIN_LIMIT: usize = 64 * 1024 * 1024;

/// A pooled buffer that returns itself to the pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
    retain_limit: usize,
}

impl PooledBuffer {
    /// Get the underlying buffer, consuming this wrapper
    pub fn into_inner(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // Return buffer to pool if it's not too large
        if self.buffer.capacity() <= self.retain_limit && self.buffer.capacity() > 0 {
            self.buffer.clear(); // Clear data but keep capacity
            if let Ok(mut pool) = self.pool.lock() {
                pool.push(std::mem::take(&mut self.buffer));
            }
        }
        // Otherwise, let it be deallocated
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

/// Thread-safe buffer pool for packet-sized allocations
pub struct BufferPool {
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
    retain_limit: usize,
}

impl BufferPool {
    /// Create a new buffer pool with the given number of pre-allocated
    /// buffers. Returned buffers with capacity above `retain_limit` are
    /// dropped instead of pooled.
    pub fn new(pool_size: usize, retain_limit: usize) -> Self {
        let pool = Vec::with_capacity(pool_size);

        Self {
            pool: Arc::new(Mutex::new(pool)),
            retain_limit,
        }
    }

    /// The process-wide general pool for ordinary packet sizes.
    pub fn shared() -> &'static BufferPool {
        static SHARED: OnceLock<BufferPool> = OnceLock::new();
        SHARED.get_or_init(|| BufferPool::new(64, GENERAL_RETAIN_LIMIT))
    }

    /// The process-wide pool for large packet buffers (1 MiB and above).
    pub fn shared_large() -> &'static BufferPool {
        static SHARED_LARGE: OnceLock<BufferPool> = OnceLock::new();
        SHARED_LARGE.get_or_init(|| BufferPool::new(8, LARGE_RETAIN_LIMIT))
    }

    /// Acquire a buffer with at least `capacity` bytes available
    /// (or allocate a new one if the pool is empty).
    pub fn acquire(&self, capacity: usize) -> PooledBuffer {
        let mut buffer = if let Ok(mut pool) = self.pool.lock() {
            pool.pop().unwrap_or_default()
        } else {
            Vec::new()
        };

        if buffer.capacity() < capacity {
            buffer.reserve(capacity - buffer.len());
        }

        PooledBuffer {
            buffer,
            pool: self.pool.clone(),
            retain_limit: self.retain_limit,
        }
    }

    /// Get the current number of available buffers in the pool
    pub fn available(&self) -> usize {
        self.pool.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            retain_limit: self.retain_limit,
        }
    }
}
