//! Simulation
//!
//! Drivers, capture backend and board wiring that run without hardware. Used
//! by the test suites and by the `sensor-probe` demo.
//!
//! ```no_run
//! use sensor_hal::sim::{simulated_session, SimChip};
//! use sensor_hal::SessionConfig;
//!
//! let (mut session, _harness) = simulated_session(SimChip::ov2640(), SessionConfig::simulation()).unwrap();
//! session.init().unwrap();
//! ```

mod backend;
mod drivers;

pub use backend::{SimBackend, SimBackendControl, SimMode, JPEG_CHUNK};
pub use drivers::{SimCmosDriver, SimMonoDriver, SimThermalDriver, THERMAL_SIZE};

use crate::config::SessionConfig;
use crate::driver::DriverRegistry;
use crate::error::SensorError;
use crate::profile::*;
use crate::session::SensorSession;
use sensor_bus::{SimDevice, SimRig};
use std::sync::{Arc, Mutex};

/// Ordered log of backend and vendor-request activity
#[derive(Debug, Clone, Default)]
pub struct SimJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl SimJournal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Position of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

/// Drivers for the simulated chip families
///
/// Event, PixArt and FrogEye parts are recognized by the profile table but
/// have no simulated driver.
pub fn sim_registry(journal: &SimJournal) -> DriverRegistry {
    let mut registry = DriverRegistry::new();

    let j = journal.clone();
    registry.register(
        &[OV2640_ID, OV5640_ID, OV7670_ID, OV7725_ID, OV9650_ID, GC2145_ID, MT9M114_ID],
        move |chip_id| Box::new(SimCmosDriver::new(chip_id, j.clone())),
    );

    let j = journal.clone();
    registry.register(
        &[LEPTON_ID, LEPTON_1_5, LEPTON_1_6, LEPTON_2_0, LEPTON_2_5, LEPTON_3_0, LEPTON_3_5],
        move |_| Box::new(SimThermalDriver::new(j.clone())),
    );

    let j = journal.clone();
    registry.register(
        &[
            HM01B0_ID,
            HM0360_ID,
            MT9V0X2_ID_V_1,
            MT9V0X2_ID_V_2,
            MT9V0X2_ID,
            MT9V0X2_C_ID,
            MT9V0X4_ID,
            MT9V0X4_C_ID,
        ],
        move |chip_id| Box::new(SimMonoDriver::new(chip_id, j.clone())),
    );

    registry
}

/// A chip to solder onto a simulated board
#[derive(Debug, Clone)]
pub struct SimChip {
    pub addr: u8,
    pub device: SimDevice,
}

impl SimChip {
    /// Chip at `addr` answering `id` at identifier register `reg`
    pub fn at(addr: u8, reg: u16, id: u16) -> Self {
        Self {
            addr,
            device: SimDevice::new().with_register(reg, id),
        }
    }

    /// Chip that cannot be interrogated (identity implied by address)
    pub fn silent(addr: u8) -> Self {
        Self {
            addr,
            device: SimDevice::new(),
        }
    }

    pub fn ov2640() -> Self {
        Self::at(OV2640_SLV_ADDR, OV_CHIP_ID, OV2640_ID as u16)
    }

    pub fn ov5640() -> Self {
        Self::at(OV5640_SLV_ADDR, OV5640_CHIP_ID, OV5640_ID as u16)
    }

    pub fn gc2145() -> Self {
        Self::at(GC2145_SLV_ADDR, GC_CHIP_ID, GC2145_ID as u16)
    }

    pub fn hm01b0() -> Self {
        Self::at(HM0XX0_SLV_ADDR, HIMAX_CHIP_ID, HM01B0_ID as u16)
    }

    pub fn lepton() -> Self {
        Self::silent(LEPTON_SLV_ADDR)
    }

    pub fn frogeye() -> Self {
        Self::silent(FROGEYE2020_SLV_ADDR)
    }

    /// Held in reset while the reset line is low
    pub fn reset_active_low(mut self) -> Self {
        self.device = self.device.with_reset_active_low();
        self
    }

    /// Powered down while the power-down line is low
    pub fn powerdown_active_low(mut self) -> Self {
        self.device = self.device.with_powerdown_active_low();
        self
    }

    pub fn attach(self, rig: &SimRig) {
        rig.attach(self.addr, self.device);
    }
}

/// Test-side handles into a simulated session
#[derive(Debug, Clone)]
pub struct SimHarness {
    pub rig: SimRig,
    pub journal: SimJournal,
    pub control: SimBackendControl,
}

/// Build an unbound session over a simulated board carrying `chip`
pub fn simulated_session(chip: SimChip, config: SessionConfig) -> Result<(SensorSession, SimHarness), SensorError> {
    let rig = SimRig::new();
    chip.attach(&rig);
    simulated_session_on(rig, config)
}

/// Build an unbound session over an already populated board
pub fn simulated_session_on(rig: SimRig, config: SessionConfig) -> Result<(SensorSession, SimHarness), SensorError> {
    let journal = SimJournal::default();
    let control = SimBackendControl::default();
    let backend = SimBackend::new(control.clone(), journal.clone());
    let session = SensorSession::new(rig.bus(), rig.port(), backend, sim_registry(&journal), config)?;
    Ok((
        session,
        SimHarness {
            rig,
            journal,
            control,
        },
    ))
}
