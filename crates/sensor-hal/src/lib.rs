//! Camera Sensor HAL Core
//!
//! One stable contract over a family of camera sensors that share a register
//! bus: detection and driver binding, a configuration reconciler that keeps
//! format, frame size and window consistent with frame memory, and a capture
//! orchestrator that turns line events from the capture hardware into frames.
//!
//! - [`SensorSession`]: owned session object, the entry point for everything
//! - [`SensorDriver`]: per-chip capability set, unimplemented operations
//!   report [`SensorError::CtlUnsupported`]
//! - [`CaptureBackend`]: DMA/interface collaborator delivering [`LineEvent`]s
//! - [`sim`]: simulated drivers and backend for tests and demos

pub mod capture;
pub mod config;
pub mod driver;
pub mod error;
pub mod fit;
pub mod frame;
pub mod ioctl;
mod probe;
pub mod profile;
pub mod reconcile;
pub mod record;
pub mod session;
pub mod sim;
pub mod types;

pub use capture::{AbortHandle, BackendError, CaptureBackend, CaptureState, CaptureStats, LineEvent};
pub use config::{FitPolicy, SessionConfig};
pub use driver::{CapturePath, DriverContext, DriverRegistry, DriverResult, SensorDriver};
pub use error::{status_code, strerror, SensorError, NO_ERROR};
pub use frame::Frame;
pub use ioctl::{IoctlArg, IoctlCode, IoctlRequest, IoctlResponse, IOCTL_ABORT};
pub use reconcile::{ConfigChange, ConfigRequest};
pub use record::{CapabilityRecord, Geometry, LogicalState};
pub use session::{FrameCallback, SensorHandle, SensorSession, VsyncCallback};
pub use types::{
    CfaPattern, FrameSize, GainCeiling, HardwareFlags, Orientation, PixFormat, Polarity, RgbGains,
    Rotation, SpecialEffect, Window, YuvOrder,
};
