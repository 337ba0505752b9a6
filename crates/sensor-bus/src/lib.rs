//! Sensor Control Bus
//!
//! Contracts for the two-wire register bus (SCCB/I2C) that camera sensors are
//! programmed over, plus the reset/power-down lines and sensor clock that the
//! probe sequence toggles. A simulated rig is provided for tests and demos.

mod bus;
mod error;
mod sim;
mod speed;

pub use bus::{RegisterBus, SensorPort};
pub use error::BusError;
pub use sim::{SimBus, SimDevice, SimPort, SimRig};
pub use speed::BusSpeed;

/// Default bus transaction timeout
pub const DEFAULT_BUS_TIMEOUT_MS: u64 = 25;
