//! Bus Error Types

use thiserror::Error;

/// Errors raised by the register bus or the sensor control port
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Bus has not been initialized
    #[error("Bus {0} is not initialized")]
    NotInitialized(u32),

    /// No acknowledge from the addressed device
    #[error("No ACK from device at {addr:#04X}")]
    Nack { addr: u8 },

    /// Transaction did not complete in time
    #[error("Bus transaction to {addr:#04X} timed out after {timeout_ms}ms")]
    Timeout { addr: u8, timeout_ms: u64 },

    /// Bus controller could not be brought up
    #[error("Bus init failed: {0}")]
    Init(String),

    /// Sensor clock could not be programmed
    #[error("Clock configuration failed: {0}")]
    Clock(String),
}
