//! Frame Buffer Pool
//!
//! A fixed block of frame memory split into one or more equally sized
//! buffers. The capture pipeline is the only writer; consumers hold a
//! [`FrameLease`] while they read a frame and the slot cannot be re-armed
//! until the lease is dropped.

mod pool;

pub use pool::{FrameLease, FramePool, PoolConfig, FRAME_ALIGNMENT, MAX_BUFFERS};

use thiserror::Error;

/// Frame pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Target buffer is still held by a consumer
    #[error("Frame buffer {0} is still in use")]
    InUse(usize),

    /// Buffer count outside the supported range
    #[error("Invalid buffer count {0} (1..={max})", max = MAX_BUFFERS)]
    InvalidCount(usize),

    /// Buffers cannot be re-split while frames are held
    #[error("Frame pool is busy")]
    Busy,
}
