//! Sensor Error Taxonomy
//!
//! Every failure surfaced by the sensor layer maps to one of a closed set of
//! negative status codes. The numeric values are part of the external
//! contract and never change.

use frame_pool::PoolError;
use sensor_bus::BusError;
use thiserror::Error;
use tracing::debug;

/// Status code for success
pub const NO_ERROR: i32 = 0;

/// Sensor layer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(i32)]
pub enum SensorError {
    #[error("Sensor control failed.")]
    CtlFailed = -1,

    #[error("The requested operation is not supported by the image sensor.")]
    CtlUnsupported = -2,

    #[error("Failed to detect the image sensor or the image sensor is detached.")]
    IscUndetected = -3,

    #[error("The detected image sensor is not supported.")]
    IscUnsupported = -4,

    #[error("Failed to initialize the image sensor.")]
    IscInitFailed = -5,

    #[error("Failed to initialize the sensor clock.")]
    TimInitFailed = -6,

    #[error("Failed to initialize the DMA.")]
    DmaInitFailed = -7,

    #[error("Failed to initialize the camera interface.")]
    CsiInitFailed = -8,

    #[error("A low level I/O error has occurred.")]
    IoError = -9,

    #[error("Frame capture has failed.")]
    CaptureFailed = -10,

    #[error("Frame capture has timed out.")]
    CaptureTimeout = -11,

    #[error("Frame size is not supported or is not set.")]
    InvalidFramesize = -12,

    #[error("Pixel format is not supported or is not set.")]
    InvalidPixformat = -13,

    #[error("Window is not supported or is not set.")]
    InvalidWindow = -14,

    #[error("Frame rate is not supported or is not set.")]
    InvalidFramerate = -15,

    #[error("An invalid argument is used.")]
    InvalidArgument = -16,

    #[error("The requested operation is not supported on the current pixel format.")]
    PixformatUnsupported = -17,

    #[error("Frame buffer error.")]
    FramebufferError = -18,

    #[error("Frame buffer overflow, try reducing the frame size.")]
    FramebufferOverflow = -19,

    #[error("JPEG frame buffer overflow.")]
    JpegOverflow = -20,
}

impl SensorError {
    /// Every defined error, in code order
    pub const ALL: [SensorError; 20] = [
        SensorError::CtlFailed,
        SensorError::CtlUnsupported,
        SensorError::IscUndetected,
        SensorError::IscUnsupported,
        SensorError::IscInitFailed,
        SensorError::TimInitFailed,
        SensorError::DmaInitFailed,
        SensorError::CsiInitFailed,
        SensorError::IoError,
        SensorError::CaptureFailed,
        SensorError::CaptureTimeout,
        SensorError::InvalidFramesize,
        SensorError::InvalidPixformat,
        SensorError::InvalidWindow,
        SensorError::InvalidFramerate,
        SensorError::InvalidArgument,
        SensorError::PixformatUnsupported,
        SensorError::FramebufferError,
        SensorError::FramebufferOverflow,
        SensorError::JpegOverflow,
    ];

    /// Negative status code
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Look up an error by status code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|err| err.code() == code)
    }
}

/// Convert a status code to a diagnostic string
pub fn strerror(code: i32) -> String {
    if code == NO_ERROR {
        return "No error.".to_string();
    }
    match SensorError::from_code(code) {
        Some(err) => err.to_string(),
        None => "Unknown error.".to_string(),
    }
}

/// Collapse a `Result` into a status code
pub fn status_code<T>(result: &Result<T, SensorError>) -> i32 {
    match result {
        Ok(_) => NO_ERROR,
        Err(err) => err.code(),
    }
}

impl From<BusError> for SensorError {
    fn from(err: BusError) -> Self {
        debug!("Bus error: {}", err);
        SensorError::IoError
    }
}

impl From<PoolError> for SensorError {
    fn from(err: PoolError) -> Self {
        debug!("Frame pool error: {}", err);
        match err {
            PoolError::InvalidCount(_) => SensorError::InvalidArgument,
            PoolError::InUse(_) | PoolError::Busy => SensorError::FramebufferError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_contiguous() {
        for (i, err) in SensorError::ALL.iter().enumerate() {
            assert_eq!(err.code(), -(i as i32) - 1);
            assert_eq!(SensorError::from_code(err.code()), Some(*err));
        }
        assert_eq!(SensorError::from_code(0), None);
        assert_eq!(SensorError::from_code(-21), None);
    }

    #[test]
    fn test_strerror_total_and_distinct() {
        let mut seen = HashSet::new();
        for code in std::iter::once(NO_ERROR).chain(SensorError::ALL.iter().map(|e| e.code())) {
            let text = strerror(code);
            assert!(!text.is_empty());
            assert_ne!(text, "Unknown error.");
            assert!(seen.insert(text), "duplicate message for {}", code);
        }
        assert_eq!(strerror(-99), "Unknown error.");
    }

    #[test]
    fn test_bus_errors_surface_as_io() {
        let err: SensorError = BusError::Nack { addr: 0x60 }.into();
        assert_eq!(err, SensorError::IoError);
    }

    #[test]
    fn test_pool_errors() {
        assert_eq!(
            SensorError::from(PoolError::InUse(0)),
            SensorError::FramebufferError
        );
        assert_eq!(
            SensorError::from(PoolError::InvalidCount(9)),
            SensorError::InvalidArgument
        );
    }

    #[test]
    fn test_status_code() {
        assert_eq!(status_code::<()>(&Ok(())), 0);
        assert_eq!(status_code::<()>(&Err(SensorError::JpegOverflow)), -20);
    }
}
