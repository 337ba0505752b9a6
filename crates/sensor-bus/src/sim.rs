//! Simulated Sensor Rig
//!
//! A register bus and control port backed by an in-memory model of the
//! sensors soldered to the board. Devices only acknowledge while their reset
//! and power-down lines are released, so probe sequences that have to
//! discover line polarity can be exercised without hardware.

use crate::bus::{RegisterBus, SensorPort};
use crate::error::BusError;
use crate::speed::BusSpeed;
use crate::DEFAULT_BUS_TIMEOUT_MS;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// A simulated sensor attached to the bus
#[derive(Debug, Clone)]
pub struct SimDevice {
    /// Register file
    pub registers: HashMap<u16, u16>,
    /// Reset is asserted while the line is high
    pub reset_active_high: bool,
    /// Power-down is asserted while the line is high
    pub powerdown_active_high: bool,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self {
            registers: HashMap::new(),
            reset_active_high: true,
            powerdown_active_high: true,
        }
    }
}

impl SimDevice {
    /// Create a device with active-high reset and power-down lines
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a register value
    pub fn with_register(mut self, reg: u16, value: u16) -> Self {
        self.registers.insert(reg, value);
        self
    }

    /// Hold the device in reset while the line is low
    pub fn with_reset_active_low(mut self) -> Self {
        self.reset_active_high = false;
        self
    }

    /// Power the device down while the line is low
    pub fn with_powerdown_active_low(mut self) -> Self {
        self.powerdown_active_high = false;
        self
    }
}

#[derive(Debug, Default)]
struct RigState {
    devices: HashMap<u8, SimDevice>,
    bus: Option<(u32, BusSpeed)>,
    reset_high: bool,
    powerdown_high: bool,
    xclk_hz: u32,
    clock_broken: bool,
    stalled: HashSet<u8>,
    writes: Vec<(u8, u16, u16)>,
    delay_total_ms: u64,
}

impl RigState {
    fn responds(&self, addr: u8) -> bool {
        self.devices.get(&addr).is_some_and(|dev| {
            let in_reset = self.reset_high == dev.reset_active_high;
            let powered_down = self.powerdown_high == dev.powerdown_active_high;
            !in_reset && !powered_down
        })
    }

    fn check(&self, addr: u8) -> Result<(), BusError> {
        let Some((bus_id, _)) = self.bus else {
            return Err(BusError::NotInitialized(0));
        };
        if self.stalled.contains(&addr) {
            return Err(BusError::Timeout {
                addr,
                timeout_ms: DEFAULT_BUS_TIMEOUT_MS,
            });
        }
        if !self.responds(addr) {
            debug!("Bus {}: no ACK from {:#04X}", bus_id, addr);
            return Err(BusError::Nack { addr });
        }
        Ok(())
    }
}

/// Handle to a simulated board; hands out the bus and port halves
#[derive(Debug, Clone, Default)]
pub struct SimRig {
    state: Arc<Mutex<RigState>>,
}

impl SimRig {
    /// Create an empty rig (no sensor attached)
    pub fn new() -> Self {
        info!("Creating simulated sensor rig");
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a device at a slave address
    pub fn attach(&self, addr: u8, device: SimDevice) -> &Self {
        self.lock().devices.insert(addr, device);
        self
    }

    /// Remove whatever is attached at a slave address
    pub fn detach(&self, addr: u8) {
        self.lock().devices.remove(&addr);
    }

    /// Make every transaction to `addr` time out
    pub fn stall(&self, addr: u8) {
        self.lock().stalled.insert(addr);
    }

    /// Make clock programming fail
    pub fn break_clock(&self) {
        self.lock().clock_broken = true;
    }

    /// Bus half of the rig
    pub fn bus(&self) -> SimBus {
        SimBus { rig: self.clone() }
    }

    /// Control-port half of the rig
    pub fn port(&self) -> SimPort {
        SimPort { rig: self.clone() }
    }

    /// Register writes issued so far as `(addr, reg, value)`
    pub fn writes(&self) -> Vec<(u8, u16, u16)> {
        self.lock().writes.clone()
    }

    /// Current register value of an attached device
    pub fn register(&self, addr: u8, reg: u16) -> Option<u16> {
        self.lock()
            .devices
            .get(&addr)
            .and_then(|dev| dev.registers.get(&reg).copied())
    }

    /// Current `(reset, powerdown)` line levels
    pub fn lines(&self) -> (bool, bool) {
        let state = self.lock();
        (state.reset_high, state.powerdown_high)
    }

    /// Sum of all settling delays requested
    pub fn delay_total_ms(&self) -> u64 {
        self.lock().delay_total_ms
    }
}

/// Simulated register bus
#[derive(Debug, Clone)]
pub struct SimBus {
    rig: SimRig,
}

impl RegisterBus for SimBus {
    fn init(&mut self, bus_id: u32, speed: BusSpeed) -> Result<(), BusError> {
        debug!("Simulated bus {} up at {} Hz", bus_id, speed.hz());
        self.rig.lock().bus = Some((bus_id, speed));
        Ok(())
    }

    fn scan(&mut self, candidates: &[u8]) -> Option<u8> {
        let state = self.rig.lock();
        state.bus?;
        candidates.iter().copied().find(|addr| state.responds(*addr))
    }

    fn read_reg(&mut self, slv_addr: u8, reg: u16) -> Result<u16, BusError> {
        let state = self.rig.lock();
        state.check(slv_addr)?;
        Ok(state
            .devices
            .get(&slv_addr)
            .and_then(|dev| dev.registers.get(&reg).copied())
            .unwrap_or(0))
    }

    fn write_reg(&mut self, slv_addr: u8, reg: u16, value: u16) -> Result<(), BusError> {
        let mut state = self.rig.lock();
        state.check(slv_addr)?;
        if let Some(dev) = state.devices.get_mut(&slv_addr) {
            dev.registers.insert(reg, value);
        }
        state.writes.push((slv_addr, reg, value));
        Ok(())
    }
}

/// Simulated reset/power-down lines and clock
#[derive(Debug, Clone)]
pub struct SimPort {
    rig: SimRig,
}

impl SensorPort for SimPort {
    fn set_reset(&mut self, high: bool) {
        self.rig.lock().reset_high = high;
    }

    fn set_powerdown(&mut self, high: bool) {
        self.rig.lock().powerdown_high = high;
    }

    fn set_xclk_frequency(&mut self, hz: u32) -> Result<(), BusError> {
        let mut state = self.rig.lock();
        if state.clock_broken {
            return Err(BusError::Clock(format!("cannot generate {} Hz", hz)));
        }
        state.xclk_hz = hz;
        Ok(())
    }

    fn xclk_frequency(&self) -> u32 {
        self.rig.lock().xclk_hz
    }

    fn delay_ms(&mut self, ms: u32) {
        self.rig.lock().delay_total_ms += u64::from(ms);
    }
}
