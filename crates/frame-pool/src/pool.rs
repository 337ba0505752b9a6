//! Frame Pool Implementation

use crate::PoolError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum number of buffers the pool can be split into
pub const MAX_BUFFERS: usize = 4;

/// Per-buffer sizes are rounded down to this many bytes (DMA burst size)
pub const FRAME_ALIGNMENT: usize = 32;

/// Frame pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Total frame memory in bytes
    pub capacity_bytes: usize,
    /// Number of buffers the memory is split into
    pub buffers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 1024 * 1024,
            buffers: 1,
        }
    }
}

/// Fixed-size frame memory with single-writer semantics
pub struct FramePool {
    /// Total frame memory in bytes
    capacity: usize,
    /// Active buffer count
    count: AtomicUsize,
    /// Writer cursor
    next: AtomicUsize,
    /// Consumer markers, one per slot
    in_use: [AtomicBool; MAX_BUFFERS],
    /// Total frames handed out (for statistics)
    total_leased: AtomicUsize,
}

impl FramePool {
    /// Create a pool from configuration
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        if config.buffers == 0 || config.buffers > MAX_BUFFERS {
            return Err(PoolError::InvalidCount(config.buffers));
        }
        info!(
            "Creating frame pool: {} bytes in {} buffer(s)",
            config.capacity_bytes, config.buffers
        );
        Ok(Self {
            capacity: config.capacity_bytes,
            count: AtomicUsize::new(config.buffers),
            next: AtomicUsize::new(0),
            in_use: Default::default(),
            total_leased: AtomicUsize::new(0),
        })
    }

    /// Single-buffer pool of `capacity_bytes`
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            capacity: capacity_bytes,
            count: AtomicUsize::new(1),
            next: AtomicUsize::new(0),
            in_use: Default::default(),
            total_leased: AtomicUsize::new(0),
        }
    }

    /// Total frame memory in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes available to a single frame
    pub fn buffer_size(&self) -> usize {
        let count = self.count.load(Ordering::Acquire).max(1);
        (self.capacity / count) & !(FRAME_ALIGNMENT - 1)
    }

    /// Number of buffers
    pub fn buffer_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Re-split the memory into `count` buffers
    pub fn set_buffer_count(&self, count: usize) -> Result<(), PoolError> {
        if count == 0 || count > MAX_BUFFERS {
            return Err(PoolError::InvalidCount(count));
        }
        if self.in_use.iter().any(|slot| slot.load(Ordering::Acquire)) {
            return Err(PoolError::Busy);
        }
        self.count.store(count, Ordering::Release);
        self.next.store(0, Ordering::Release);
        debug!("Frame pool re-split into {} buffer(s)", count);
        Ok(())
    }

    /// Slot the next capture will be written into
    pub fn next_slot(&self) -> usize {
        self.next.load(Ordering::Acquire) % self.buffer_count().max(1)
    }

    /// Whether a consumer still holds `slot`
    pub fn is_in_use(&self, slot: usize) -> bool {
        self.in_use
            .get(slot)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Whether the next capture target is still held
    pub fn next_in_use(&self) -> bool {
        self.is_in_use(self.next_slot())
    }

    /// Claim the next slot as a capture target
    ///
    /// The write cursor only moves once the lease is committed, so a capture
    /// that fails or is aborted leaves the next frame in the same slot.
    pub fn try_acquire(self: &Arc<Self>) -> Result<FrameLease, PoolError> {
        let slot = self.next_slot();
        if self.in_use[slot].swap(true, Ordering::AcqRel) {
            return Err(PoolError::InUse(slot));
        }
        Ok(FrameLease {
            pool: Arc::clone(self),
            slot,
            committed: false,
        })
    }

    fn commit(&self, slot: usize) {
        self.next.store((slot + 1) % self.buffer_count().max(1), Ordering::Release);
        self.total_leased.fetch_add(1, Ordering::Relaxed);
    }

    /// Total frames handed out (for statistics)
    pub fn total_leased(&self) -> usize {
        self.total_leased.load(Ordering::Relaxed)
    }

    fn release(&self, slot: usize) {
        self.in_use[slot].store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("capacity", &self.capacity)
            .field("buffers", &self.buffer_count())
            .field("buffer_size", &self.buffer_size())
            .finish()
    }
}

/// Consumer hold on one frame buffer; releases the slot on drop
#[derive(Debug)]
pub struct FrameLease {
    pool: Arc<FramePool>,
    slot: usize,
    committed: bool,
}

impl FrameLease {
    /// Slot index held by this lease
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Mark the slot as holding a delivered frame and move the write cursor
    /// past it
    pub fn commit(&mut self) {
        if !self.committed {
            self.committed = true;
            self.pool.commit(self.slot);
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}
