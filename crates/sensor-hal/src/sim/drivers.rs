//! Simulated chip drivers
//!
//! Register-level behaviour is reduced to a small register map so tests can
//! observe what each control wrote. Vendor requests are logged to the
//! [`SimJournal`].

use super::SimJournal;
use crate::driver::{CapturePath, DriverContext, DriverResult, SensorDriver};
use crate::error::SensorError;
use crate::ioctl::{IoctlRequest, IoctlResponse};
use crate::profile::{HM01B0_ID, OV2640_ID, OV5640_ID};
use crate::record::Geometry;
use crate::types::{FrameSize, GainCeiling, HardwareFlags, PixFormat, RgbGains, SpecialEffect};
use tracing::debug;

pub const REG_RESET: u16 = 0x0F;
pub const REG_SLEEP: u16 = 0x09;
pub const REG_NIGHT: u16 = 0x0E;
pub const REG_FORMAT: u16 = 0x12;
pub const REG_FRAMESIZE: u16 = 0x13;
pub const REG_FRAMERATE: u16 = 0x14;
pub const REG_CONTRAST: u16 = 0x20;
pub const REG_BRIGHTNESS: u16 = 0x21;
pub const REG_SATURATION: u16 = 0x22;
pub const REG_GAINCEILING: u16 = 0x23;
pub const REG_QUALITY: u16 = 0x24;
pub const REG_COLORBAR: u16 = 0x25;
pub const REG_AGC: u16 = 0x30;
/// Gain in tenths of a dB
pub const REG_GAIN: u16 = 0x31;
pub const REG_AEC: u16 = 0x32;
/// Exposure in units of 10 us
pub const REG_EXPOSURE: u16 = 0x33;
pub const REG_AWB: u16 = 0x34;
/// R, G and B gains in tenths of a dB
pub const REG_RGB_GAIN: u16 = 0x35;
pub const REG_MIRROR: u16 = 0x40;
pub const REG_SDE: u16 = 0x41;
pub const REG_LENC: u16 = 0x42;
pub const REG_BLC: u16 = 0x50;
pub const REG_MD_CTRL: u16 = 0x60;
pub const REG_MD_THRESHOLD: u16 = 0x61;
pub const REG_MD_WINDOW: u16 = 0x62;
pub const REG_OSC: u16 = 0x66;

const MIRROR_H: u16 = 0x01;
const MIRROR_V: u16 = 0x02;

fn format_code(pixformat: PixFormat) -> u16 {
    match pixformat {
        PixFormat::Grayscale => 0,
        PixFormat::Rgb565 => 1,
        PixFormat::Bayer => 2,
        PixFormat::Yuv422 => 3,
        PixFormat::Jpeg => 4,
    }
}

fn framesize_code(framesize: FrameSize) -> u16 {
    FrameSize::ALL
        .iter()
        .position(|s| *s == framesize)
        .map_or(0, |i| i as u16)
}

fn tenths(db: f32) -> u16 {
    (db * 10.0).round().clamp(0.0, f32::from(u16::MAX)) as u16
}

/// Omnivision-style CMOS sensor: every format and control
#[derive(Debug)]
pub struct SimCmosDriver {
    chip_id: u32,
    journal: SimJournal,
    readout: (i32, i32, u32, u32),
    triggered: bool,
    fov_wide: bool,
    night_mode: bool,
}

impl SimCmosDriver {
    pub fn new(chip_id: u32, journal: SimJournal) -> Self {
        Self {
            chip_id,
            journal,
            readout: (0, 0, 0, 0),
            triggered: false,
            fov_wide: false,
            night_mode: false,
        }
    }

    fn max_area(&self) -> u64 {
        match self.chip_id {
            OV5640_ID => FrameSize::Wqxga2.area(),
            OV2640_ID => FrameSize::Uxga.area(),
            _ => FrameSize::Vga.area(),
        }
    }

    fn blc_size(&self) -> u8 {
        if self.chip_id == OV5640_ID {
            8
        } else {
            0
        }
    }
}

impl SensorDriver for SimCmosDriver {
    fn name(&self) -> &'static str {
        match self.chip_id {
            OV2640_ID => "ov2640",
            OV5640_ID => "ov5640",
            _ => "ov-cmos",
        }
    }

    fn supports_pixformat(&self, pixformat: PixFormat) -> bool {
        pixformat != PixFormat::Jpeg || matches!(self.chip_id, OV2640_ID | OV5640_ID)
    }

    fn supports_framesize(&self, framesize: FrameSize) -> bool {
        framesize.area() <= self.max_area()
    }

    fn init(&mut self, ctx: &mut DriverContext<'_>, flags: &mut HardwareFlags) -> DriverResult<()> {
        flags.blc_size = self.blc_size();
        let (w, h) = FrameSize::ALL
            .iter()
            .filter(|s| s.area() <= self.max_area())
            .max_by_key(|s| s.area())
            .map_or((0, 0), |s| s.resolution());
        self.readout = (0, 0, w, h);
        ctx.write(REG_RESET, 1)?;
        debug!("{} initialized, {} BLC registers", self.name(), flags.blc_size);
        Ok(())
    }

    fn reset(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<()> {
        self.triggered = false;
        self.night_mode = false;
        ctx.write(REG_RESET, 1)?;
        ctx.write(REG_MIRROR, 0)
    }

    fn sleep(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        ctx.write(REG_SLEEP, u16::from(enable))
    }

    fn set_pixformat(&mut self, ctx: &mut DriverContext<'_>, pixformat: PixFormat) -> DriverResult<()> {
        ctx.write(REG_FORMAT, format_code(pixformat))
    }

    fn set_framesize(&mut self, ctx: &mut DriverContext<'_>, framesize: FrameSize) -> DriverResult<()> {
        ctx.write(REG_FRAMESIZE, framesize_code(framesize))
    }

    fn set_framerate(&mut self, ctx: &mut DriverContext<'_>, framerate: u32) -> DriverResult<()> {
        ctx.write(REG_FRAMERATE, framerate as u16)
    }

    fn set_contrast(&mut self, ctx: &mut DriverContext<'_>, level: i32) -> DriverResult<()> {
        ctx.write(REG_CONTRAST, (level + 3) as u16)
    }

    fn set_brightness(&mut self, ctx: &mut DriverContext<'_>, level: i32) -> DriverResult<()> {
        ctx.write(REG_BRIGHTNESS, (level + 3) as u16)
    }

    fn set_saturation(&mut self, ctx: &mut DriverContext<'_>, level: i32) -> DriverResult<()> {
        ctx.write(REG_SATURATION, (level + 3) as u16)
    }

    fn set_gainceiling(&mut self, ctx: &mut DriverContext<'_>, ceiling: GainCeiling) -> DriverResult<()> {
        ctx.write(REG_GAINCEILING, ceiling.factor() as u16)
    }

    fn set_quality(&mut self, ctx: &mut DriverContext<'_>, quality: u8) -> DriverResult<()> {
        ctx.write(REG_QUALITY, u16::from(quality))
    }

    fn set_colorbar(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        ctx.write(REG_COLORBAR, u16::from(enable))
    }

    fn set_auto_gain(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        gain_db: Option<f32>,
        gain_db_ceiling: Option<f32>,
    ) -> DriverResult<()> {
        ctx.write(REG_AGC, u16::from(enable))?;
        if let Some(ceiling) = gain_db_ceiling {
            ctx.write(REG_GAINCEILING, tenths(ceiling))?;
        }
        match gain_db {
            Some(db) if !enable => ctx.write(REG_GAIN, tenths(db)),
            _ => Ok(()),
        }
    }

    fn gain_db(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<f32> {
        Ok(f32::from(ctx.read(REG_GAIN)?) / 10.0)
    }

    fn set_auto_exposure(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        exposure_us: Option<u32>,
    ) -> DriverResult<()> {
        ctx.write(REG_AEC, u16::from(enable))?;
        match exposure_us {
            Some(us) if !enable => {
                let units = u16::try_from(us / 10).map_err(|_| SensorError::InvalidArgument)?;
                ctx.write(REG_EXPOSURE, units)
            }
            _ => Ok(()),
        }
    }

    fn exposure_us(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<u32> {
        Ok(u32::from(ctx.read(REG_EXPOSURE)?) * 10)
    }

    fn set_auto_whitebal(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        gains: Option<RgbGains>,
    ) -> DriverResult<()> {
        ctx.write(REG_AWB, u16::from(enable))?;
        if let Some(gains) = gains.filter(|_| !enable) {
            ctx.write(REG_RGB_GAIN, tenths(gains.r_db))?;
            ctx.write(REG_RGB_GAIN + 1, tenths(gains.g_db))?;
            ctx.write(REG_RGB_GAIN + 2, tenths(gains.b_db))?;
        }
        Ok(())
    }

    fn rgb_gain_db(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<RgbGains> {
        Ok(RgbGains {
            r_db: f32::from(ctx.read(REG_RGB_GAIN)?) / 10.0,
            g_db: f32::from(ctx.read(REG_RGB_GAIN + 1)?) / 10.0,
            b_db: f32::from(ctx.read(REG_RGB_GAIN + 2)?) / 10.0,
        })
    }

    fn set_auto_blc(&mut self, ctx: &mut DriverContext<'_>, enable: bool, regs: Option<&[u16]>) -> DriverResult<()> {
        if self.blc_size() == 0 {
            return Err(SensorError::CtlUnsupported);
        }
        if let Some(regs) = regs {
            for (i, value) in regs.iter().enumerate() {
                ctx.write(REG_BLC + 1 + i as u16, *value)?;
            }
        }
        ctx.write(REG_BLC, u16::from(enable))
    }

    fn blc_regs(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<Vec<u16>> {
        if self.blc_size() == 0 {
            return Err(SensorError::CtlUnsupported);
        }
        (0..u16::from(self.blc_size()))
            .map(|i| ctx.read(REG_BLC + 1 + i))
            .collect()
    }

    fn set_hmirror(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        ctx.update(REG_MIRROR, MIRROR_H, if enable { MIRROR_H } else { 0 })
    }

    fn set_vflip(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        ctx.update(REG_MIRROR, MIRROR_V, if enable { MIRROR_V } else { 0 })
    }

    fn set_special_effect(&mut self, ctx: &mut DriverContext<'_>, sde: SpecialEffect) -> DriverResult<()> {
        ctx.write(REG_SDE, u16::from(sde == SpecialEffect::Negative))
    }

    fn set_lens_correction(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        radius: u32,
        coef: u32,
    ) -> DriverResult<()> {
        ctx.write(REG_LENC, u16::from(enable))?;
        ctx.write(REG_LENC + 1, radius.min(0xFFFF) as u16)?;
        ctx.write(REG_LENC + 2, coef.min(0xFFFF) as u16)
    }

    fn ioctl(&mut self, ctx: &mut DriverContext<'_>, request: &IoctlRequest) -> DriverResult<IoctlResponse> {
        self.journal.record(format!("ioctl {:?}", request.code()));
        let response = match *request {
            IoctlRequest::SetReadoutWindow { x, y, w, h } => {
                self.readout = (x, y, w, h);
                IoctlResponse::Done
            }
            IoctlRequest::GetReadoutWindow => {
                let (x, y, w, h) = self.readout;
                IoctlResponse::Window { x, y, w, h }
            }
            IoctlRequest::SetTriggeredMode(enable) => {
                self.triggered = enable;
                IoctlResponse::Done
            }
            IoctlRequest::GetTriggeredMode => IoctlResponse::Flag(self.triggered),
            IoctlRequest::SetFovWide(enable) => {
                self.fov_wide = enable;
                IoctlResponse::Done
            }
            IoctlRequest::GetFovWide => IoctlResponse::Flag(self.fov_wide),
            IoctlRequest::TriggerAutoFocus
            | IoctlRequest::PauseAutoFocus
            | IoctlRequest::ResetAutoFocus
            | IoctlRequest::WaitOnAutoFocus { .. }
                if self.chip_id == OV5640_ID =>
            {
                IoctlResponse::Done
            }
            IoctlRequest::SetNightMode(enable) => {
                self.night_mode = enable;
                ctx.write(REG_NIGHT, u16::from(enable))?;
                IoctlResponse::Done
            }
            IoctlRequest::GetNightMode => IoctlResponse::Flag(self.night_mode),
            IoctlRequest::GetRgbStats => IoctlResponse::RgbStats {
                r: u32::from(ctx.read(REG_RGB_GAIN)?),
                g: u32::from(ctx.read(REG_RGB_GAIN + 1)?),
                b: u32::from(ctx.read(REG_RGB_GAIN + 2)?),
            },
            _ => return Err(SensorError::CtlUnsupported),
        };
        Ok(response)
    }
}

/// Lepton-style thermal core read over its own link
#[derive(Debug)]
pub struct SimThermalDriver {
    journal: SimJournal,
    measurement: (bool, bool),
    range: (f32, f32),
    attributes: Vec<(u16, Vec<u16>)>,
}

/// Thermal core resolution
pub const THERMAL_SIZE: (u32, u32) = (160, 120);

impl SimThermalDriver {
    pub fn new(journal: SimJournal) -> Self {
        Self {
            journal,
            measurement: (false, false),
            range: (-10.0, 140.0),
            attributes: Vec::new(),
        }
    }
}

impl SensorDriver for SimThermalDriver {
    fn name(&self) -> &'static str {
        "lepton"
    }

    fn supports_pixformat(&self, pixformat: PixFormat) -> bool {
        pixformat == PixFormat::Grayscale
    }

    fn supports_framesize(&self, framesize: FrameSize) -> bool {
        let (w, h) = framesize.resolution();
        w <= THERMAL_SIZE.0 && h <= THERMAL_SIZE.1
    }

    fn capture_path(&self) -> CapturePath {
        CapturePath::Driver
    }

    fn reset(&mut self, _ctx: &mut DriverContext<'_>) -> DriverResult<()> {
        self.measurement = (false, false);
        self.attributes.clear();
        Ok(())
    }

    fn set_pixformat(&mut self, _ctx: &mut DriverContext<'_>, _pixformat: PixFormat) -> DriverResult<()> {
        Ok(())
    }

    fn set_framesize(&mut self, _ctx: &mut DriverContext<'_>, _framesize: FrameSize) -> DriverResult<()> {
        Ok(())
    }

    fn ioctl(&mut self, _ctx: &mut DriverContext<'_>, request: &IoctlRequest) -> DriverResult<IoctlResponse> {
        self.journal.record(format!("ioctl {:?}", request.code()));
        let response = match request {
            IoctlRequest::LeptonGetWidth => IoctlResponse::Value(THERMAL_SIZE.0 as i32),
            IoctlRequest::LeptonGetHeight => IoctlResponse::Value(THERMAL_SIZE.1 as i32),
            IoctlRequest::LeptonGetRadiometry => IoctlResponse::Flag(true),
            IoctlRequest::LeptonGetRefresh => IoctlResponse::Value(9),
            IoctlRequest::LeptonGetResolution => IoctlResponse::Value(14),
            IoctlRequest::LeptonRunCommand { .. } => IoctlResponse::Done,
            IoctlRequest::LeptonSetAttribute { command, data } => {
                self.attributes.retain(|(c, _)| c != command);
                self.attributes.push((*command, data.clone()));
                IoctlResponse::Done
            }
            IoctlRequest::LeptonGetAttribute { command, words } => {
                let mut data = self
                    .attributes
                    .iter()
                    .find(|(c, _)| c == command)
                    .map(|(_, data)| data.clone())
                    .unwrap_or_default();
                data.resize(*words, 0);
                IoctlResponse::Words(data)
            }
            IoctlRequest::LeptonGetFpaTemperature => IoctlResponse::Temperature(29.5),
            IoctlRequest::LeptonGetAuxTemperature => IoctlResponse::Temperature(31.0),
            IoctlRequest::LeptonSetMeasurementMode { enabled, high_temp } => {
                self.measurement = (*enabled, *high_temp);
                IoctlResponse::Done
            }
            IoctlRequest::LeptonGetMeasurementMode => IoctlResponse::MeasurementMode {
                enabled: self.measurement.0,
                high_temp: self.measurement.1,
            },
            IoctlRequest::LeptonSetMeasurementRange { min_c, max_c } => {
                self.range = (*min_c, *max_c);
                IoctlResponse::Done
            }
            IoctlRequest::LeptonGetMeasurementRange => IoctlResponse::Range {
                min_c: self.range.0,
                max_c: self.range.1,
            },
            _ => return Err(SensorError::CtlUnsupported),
        };
        Ok(response)
    }

    fn read_frame(
        &mut self,
        _ctx: &mut DriverContext<'_>,
        geometry: &Geometry,
        out: &mut Vec<u8>,
    ) -> DriverResult<()> {
        let (w, h) = geometry.framesize.resolution();
        out.clear();
        out.reserve((w * h) as usize);
        for y in 0..h {
            // Warm band across the middle rows
            let base: u8 = if y >= h / 3 && y < 2 * h / 3 { 200 } else { 40 };
            out.extend((0..w).map(|x| base.wrapping_add((x % 16) as u8)));
        }
        Ok(())
    }
}

/// Himax/OnSemi-style monochrome sensor with motion detection
#[derive(Debug)]
pub struct SimMonoDriver {
    chip_id: u32,
    journal: SimJournal,
}

impl SimMonoDriver {
    pub fn new(chip_id: u32, journal: SimJournal) -> Self {
        Self { chip_id, journal }
    }
}

impl SensorDriver for SimMonoDriver {
    fn name(&self) -> &'static str {
        if self.chip_id == HM01B0_ID {
            "hm01b0"
        } else {
            "mono"
        }
    }

    fn supports_pixformat(&self, pixformat: PixFormat) -> bool {
        matches!(pixformat, PixFormat::Grayscale | PixFormat::Bayer)
    }

    fn supports_framesize(&self, framesize: FrameSize) -> bool {
        framesize.area() <= FrameSize::R320x320.area()
    }

    fn reset(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<()> {
        ctx.write(REG_RESET, 1)?;
        ctx.write(REG_MD_CTRL, 0)
    }

    fn sleep(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        ctx.write(REG_SLEEP, u16::from(enable))
    }

    fn set_pixformat(&mut self, ctx: &mut DriverContext<'_>, pixformat: PixFormat) -> DriverResult<()> {
        ctx.write(REG_FORMAT, format_code(pixformat))
    }

    fn set_framesize(&mut self, ctx: &mut DriverContext<'_>, framesize: FrameSize) -> DriverResult<()> {
        ctx.write(REG_FRAMESIZE, framesize_code(framesize))
    }

    fn set_framerate(&mut self, ctx: &mut DriverContext<'_>, framerate: u32) -> DriverResult<()> {
        ctx.write(REG_FRAMERATE, framerate as u16)
    }

    fn set_auto_exposure(
        &mut self,
        ctx: &mut DriverContext<'_>,
        enable: bool,
        exposure_us: Option<u32>,
    ) -> DriverResult<()> {
        ctx.write(REG_AEC, u16::from(enable))?;
        if let Some(us) = exposure_us.filter(|_| !enable) {
            ctx.write(REG_EXPOSURE, (us / 10).min(0xFFFF) as u16)?;
        }
        Ok(())
    }

    fn exposure_us(&mut self, ctx: &mut DriverContext<'_>) -> DriverResult<u32> {
        Ok(u32::from(ctx.read(REG_EXPOSURE)?) * 10)
    }

    fn set_hmirror(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        ctx.update(REG_MIRROR, MIRROR_H, if enable { MIRROR_H } else { 0 })
    }

    fn set_vflip(&mut self, ctx: &mut DriverContext<'_>, enable: bool) -> DriverResult<()> {
        ctx.update(REG_MIRROR, MIRROR_V, if enable { MIRROR_V } else { 0 })
    }

    fn ioctl(&mut self, ctx: &mut DriverContext<'_>, request: &IoctlRequest) -> DriverResult<IoctlResponse> {
        self.journal.record(format!("ioctl {:?}", request.code()));
        match *request {
            IoctlRequest::HimaxMdEnable(enable) => ctx.update(REG_MD_CTRL, 0x01, u16::from(enable))?,
            IoctlRequest::HimaxMdClear => ctx.update(REG_MD_CTRL, 0x02, 0x02)?,
            IoctlRequest::HimaxMdWindow { x1, y1, x2, y2 } => {
                for (i, v) in [x1, y1, x2, y2].into_iter().enumerate() {
                    ctx.write(REG_MD_WINDOW + i as u16, v.min(0xFFFF) as u16)?;
                }
            }
            IoctlRequest::HimaxMdThreshold(threshold) => {
                ctx.write(REG_MD_THRESHOLD, threshold.min(0xFFFF) as u16)?
            }
            IoctlRequest::HimaxOscEnable(enable) => ctx.write(REG_OSC, u16::from(enable))?,
            _ => return Err(SensorError::CtlUnsupported),
        }
        Ok(IoctlResponse::Done)
    }
}
