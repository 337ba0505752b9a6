//! Detection and Driver Binding

use crate::driver::DriverContext;
use crate::error::SensorError;
use crate::profile::{self, IdProbe, KNOWN_ADDRESSES};
use crate::session::{SensorSession, LINE_SETTLE_MS};
use crate::types::Polarity;
use sensor_bus::{BusSpeed, RegisterBus};
use tracing::{debug, info, warn};

/// Sensor clock used while probing, before the chip is known
pub const DEFAULT_XCLK_HZ: u32 = 12_000_000;

impl SensorSession {
    /// Power-cycle, scan the bus, identify the chip and bind its driver
    ///
    /// Every call forgets the previous binding and detects from scratch.
    pub fn probe_init(&mut self, bus_id: u32, speed: BusSpeed) -> Result<(), SensorError> {
        self.abort(true);
        if let Some(driver) = self.driver.take() {
            debug!("Dropping previous {} binding", driver.name());
        }
        self.record.clear();

        self.port
            .set_xclk_frequency(DEFAULT_XCLK_HZ)
            .map_err(|err| {
                warn!("Failed to start sensor clock: {}", err);
                SensorError::TimInitFailed
            })?;

        // Power cycle
        self.port.set_powerdown(true);
        self.port.delay_ms(LINE_SETTLE_MS);
        self.port.set_powerdown(false);
        self.port.delay_ms(LINE_SETTLE_MS);

        self.bus.init(bus_id, speed).map_err(|err| {
            warn!("Failed to bring up bus {}: {}", bus_id, err);
            SensorError::IoError
        })?;
        self.port.delay_ms(LINE_SETTLE_MS);

        let slv_addr = self.scan_with_polarity_ladder()?;
        let chip_id = self.read_chip_id(slv_addr)?;
        debug!("Chip id {:#X} at {:#04X}", chip_id, slv_addr);

        let Some(profile) = profile::lookup(chip_id) else {
            warn!("Unrecognized chip id {:#X} at {:#04X}", chip_id, slv_addr);
            return Err(SensorError::IscUndetected);
        };
        let Some(mut driver) = self.registry.create(chip_id) else {
            warn!("No driver registered for {} ({:#X})", profile.name, chip_id);
            return Err(SensorError::IscUnsupported);
        };

        self.port
            .set_xclk_frequency(profile.xclk_hz)
            .map_err(|err| {
                warn!("Failed to program {} Hz clock: {}", profile.xclk_hz, err);
                SensorError::TimInitFailed
            })?;

        // Profile defaults, keeping the polarities the ladder discovered
        let mut flags = profile.flags;
        flags.reset_pol = self.record.flags.reset_pol;
        flags.power_pol = self.record.flags.power_pol;

        let mut ctx = DriverContext::new(self.bus.as_mut(), slv_addr);
        driver.init(&mut ctx, &mut flags).map_err(|err| {
            warn!("{} init failed: {}", profile.name, err);
            SensorError::IscInitFailed
        })?;

        self.record.chip_id = chip_id;
        self.record.slv_addr = slv_addr;
        self.record.flags = flags;
        info!(
            "Bound {} driver to {} (id {:#X}) at {:#04X}",
            driver.name(),
            profile.name,
            chip_id,
            slv_addr
        );
        self.driver = Some(driver);
        Ok(())
    }

    /// Scan the known addresses, discovering reset and power-down polarity
    /// by releasing each line in turn until something answers
    fn scan_with_polarity_ladder(&mut self) -> Result<u8, SensorError> {
        if let Some(addr) = self.bus.scan(&KNOWN_ADDRESSES) {
            return Ok(addr);
        }

        // Held in reset: reset is active low
        self.record.flags.reset_pol = Polarity::ActiveLow;
        self.port.set_reset(true);
        self.port.delay_ms(LINE_SETTLE_MS);
        if let Some(addr) = self.bus.scan(&KNOWN_ADDRESSES) {
            return Ok(addr);
        }

        // Held in power-down: power-down is active low
        self.record.flags.power_pol = Polarity::ActiveLow;
        self.port.set_powerdown(true);
        self.port.delay_ms(LINE_SETTLE_MS);
        if let Some(addr) = self.bus.scan(&KNOWN_ADDRESSES) {
            return Ok(addr);
        }

        // Reset was active high after all
        self.record.flags.reset_pol = Polarity::ActiveHigh;
        self.port.set_reset(false);
        self.port.delay_ms(LINE_SETTLE_MS);
        if let Some(addr) = self.bus.scan(&KNOWN_ADDRESSES) {
            return Ok(addr);
        }

        warn!("No sensor answered on any known address");
        Err(SensorError::IscUndetected)
    }

    /// Identify the chip at `slv_addr`, trying each probe for that address
    /// until one yields a known id
    fn read_chip_id(&mut self, slv_addr: u8) -> Result<u32, SensorError> {
        let probes = profile::id_probes(slv_addr);
        let mut chip_id = 0;
        for probe in probes {
            chip_id = read_id(self.bus.as_mut(), slv_addr, *probe)?;
            if profile::lookup(chip_id).is_some() {
                break;
            }
        }
        Ok(chip_id)
    }
}

fn read_id(bus: &mut dyn RegisterBus, slv_addr: u8, probe: IdProbe) -> Result<u32, SensorError> {
    let id = match probe {
        IdProbe::Byte(reg) => u32::from(bus.read_reg(slv_addr, reg)? & 0xFF),
        IdProbe::Word(reg) => u32::from(bus.read_reg(slv_addr, reg)?),
        IdProbe::Long(reg) => {
            let hi = u32::from(bus.read_reg(slv_addr, reg)?);
            let lo = u32::from(bus.read_reg(slv_addr, reg + 2)?);
            (hi << 16) | lo
        }
        IdProbe::Fixed(id) => id,
    };
    Ok(id)
}
