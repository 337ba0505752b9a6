//! Register Bus and Control Port Contracts

use crate::error::BusError;
use crate::speed::BusSpeed;

/// Two-wire register bus shared by every sensor on the board.
///
/// Registers use 16-bit addresses and 16-bit values; 8-bit parts simply
/// ignore the upper byte. Every transaction is bounded by a timeout and
/// reports [`BusError::Timeout`] rather than blocking forever.
pub trait RegisterBus: Send {
    /// Bring up the bus controller
    fn init(&mut self, bus_id: u32, speed: BusSpeed) -> Result<(), BusError>;

    /// Return the first address in `candidates` that acknowledges
    fn scan(&mut self, candidates: &[u8]) -> Option<u8>;

    /// Read one register
    fn read_reg(&mut self, slv_addr: u8, reg: u16) -> Result<u16, BusError>;

    /// Write one register
    fn write_reg(&mut self, slv_addr: u8, reg: u16, value: u16) -> Result<(), BusError>;
}

/// Reset/power-down GPIOs and the sensor master clock.
pub trait SensorPort: Send {
    /// Drive the reset line (`true` = high)
    fn set_reset(&mut self, high: bool);

    /// Drive the power-down line (`true` = high)
    fn set_powerdown(&mut self, high: bool);

    /// Program the sensor master clock
    fn set_xclk_frequency(&mut self, hz: u32) -> Result<(), BusError>;

    /// Current sensor master clock in Hz (0 when stopped)
    fn xclk_frequency(&self) -> u32;

    /// Block for a settling delay
    fn delay_ms(&mut self, ms: u32);
}
