//! Sensor Driver Contract
//!
//! Every per-chip driver implements [`SensorDriver`]. All capability methods
//! default to [`SensorError::CtlUnsupported`], so a driver only overrides the
//! operations its hardware can actually perform.

use crate::error::SensorError;
use crate::ioctl::{IoctlRequest, IoctlResponse};
use crate::record::Geometry;
use crate::types::{FrameSize, GainCeiling, HardwareFlags, PixFormat, RgbGains, SpecialEffect};
use sensor_bus::RegisterBus;
use std::collections::HashMap;
use std::sync::Arc;

pub type DriverResult<T> = Result<T, SensorError>;

/// Bus access handed to a driver for the duration of one call
pub struct DriverContext<'a> {
    bus: &'a mut dyn RegisterBus,
    slv_addr: u8,
}

impl<'a> DriverContext<'a> {
    pub fn new(bus: &'a mut dyn RegisterBus, slv_addr: u8) -> Self {
        Self { bus, slv_addr }
    }

    /// Address of the bound sensor
    pub fn slv_addr(&self) -> u8 {
        self.slv_addr
    }

    /// Read a register of the bound sensor
    pub fn read(&mut self, reg: u16) -> DriverResult<u16> {
        Ok(self.bus.read_reg(self.slv_addr, reg)?)
    }

    /// Write a register of the bound sensor
    pub fn write(&mut self, reg: u16, value: u16) -> DriverResult<()> {
        Ok(self.bus.write_reg(self.slv_addr, reg, value)?)
    }

    /// Read-modify-write the bits selected by `mask`
    pub fn update(&mut self, reg: u16, mask: u16, value: u16) -> DriverResult<()> {
        let current = self.read(reg)?;
        self.write(reg, (current & !mask) | (value & mask))
    }
}

/// Who produces the pixel data of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePath {
    /// Lines arrive from the capture backend (parallel/CSI interface)
    Stream,
    /// The driver reads frames over its own link
    Driver,
}

/// Per-chip capability set
#[allow(unused_variables)]
pub trait SensorDriver: Send {
    /// Chip family name
    fn name(&self) -> &'static str;

    /// Whether the chip can output `pixformat`
    fn supports_pixformat(&self, pixformat: PixFormat) -> bool {
        false
    }

    /// Whether the chip can output `framesize`
    fn supports_framesize(&self, framesize: FrameSize) -> bool {
        true
    }

    fn capture_path(&self) -> CapturePath {
        CapturePath::Stream
    }

    /// Bring the chip up after binding; may refine the hardware flags
    fn init(&mut self, ctx: &mut DriverContext<'_>, flags: &mut HardwareFlags) -> DriverResult<()> {
        Ok(())
    }

    fn reset(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn sleep(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn read_reg(&mut self, ctx: &mut DriverContext<'_>, reg: u16) -> DriverResult<u16> {
        ctx.read(reg)
    }

    fn write_reg(&mut self, ctx: &mut DriverContext<'_>, reg: u16, value: u16) -> DriverResult<()> {
        ctx.write(reg, value)
    }

    fn set_pixformat(&mut self, ctx: &mut DriverContext<'_>, pixformat: PixFormat) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_framesize(&mut self, ctx: &mut DriverContext<'_>, framesize: FrameSize) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_framerate(&mut self, ctx: &mut DriverContext<'_>, framerate: u32) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_contrast(&mut self, ctx: &mut DriverContext<'_>, level: i32) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_brightness(&mut self, ctx: &mut DriverContext<'_>, level: i32) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_saturation(&mut self, ctx: &mut DriverContext<'_>, level: i32) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_gainceiling(&mut self, ctx: &mut DriverContext<'_>, ceiling: GainCeiling) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_quality(&mut self, ctx: &mut DriverContext<'_>, quality: u8) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_colorbar(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_auto_gain(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        gain_db: Option<f32>,
        gain_db_ceiling: Option<f32>,
    ) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn gain_db(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<f32> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_auto_exposure(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        exposure_us: Option<u32>,
    ) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn exposure_us(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<u32> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_auto_whitebal(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        gains: Option<RgbGains>,
    ) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn rgb_gain_db(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<RgbGains> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_auto_blc(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        regs: Option<&[u16]>,
    ) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn blc_regs(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<Vec<u16>> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_hmirror(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_vflip(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_special_effect(&mut self, ctx: &mut DriverContext<'_>, sde: SpecialEffect) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    fn set_lens_correction(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        radius: u32,
        coef: u32,
    ) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }

    /// Vendor command channel
    fn ioctl(&mut self, ctx: &mut DriverContext<'_>, request: &IoctlRequest) -> DriverResult<IoctlResponse> {
        Err(SensorError::CtlUnsupported)
    }

    /// Read one full frame (frame-size rows at source bytes per pixel) when
    /// the capture path is [`CapturePath::Driver`]
    fn read_frame(
        &mut self,
        ctx: &mut DriverContext<'_>,
        geometry: &Geometry,
        out: &mut Vec<u8>,
    ) -> DriverResult<()> {
        Err(SensorError::CtlUnsupported)
    }
}

/// Normalize a driver failure into what the core reports
///
/// Missing capabilities and bus faults keep their meaning; anything else the
/// driver reports is a failed control.
pub(crate) fn surface(err: SensorError) -> SensorError {
    match err {
        SensorError::CtlUnsupported | SensorError::IoError => err,
        _ => SensorError::CtlFailed,
    }
}

/// Builds a driver for a detected chip id
pub type DriverFactory = Arc<dyn Fn(u32) -> Box<dyn SensorDriver> + Send + Sync>;

/// Drivers available for binding, keyed by chip id
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<u32, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for every id in `chip_ids`
    pub fn register<F>(&mut self, chip_ids: &[u32], factory: F) -> &mut Self
    where
        F: Fn(u32) -> Box<dyn SensorDriver> + Send + Sync + 'static,
    {
        let factory: DriverFactory = Arc::new(factory);
        for id in chip_ids {
            self.factories.insert(*id, Arc::clone(&factory));
        }
        self
    }

    /// Build the driver registered for `chip_id`
    pub fn create(&self, chip_id: u32) -> Option<Box<dyn SensorDriver>> {
        self.factories.get(&chip_id).map(|factory| factory(chip_id))
    }

    pub fn contains(&self, chip_id: u32) -> bool {
        self.factories.contains_key(&chip_id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("DriverRegistry").field("chip_ids", &ids).finish()
    }
}
