//! Configuration Reconciler
//!
//! Setters validate against the bound driver, delegate register programming,
//! update the logical state and raise [`ConfigChange`] flags. Any change to
//! format or frame size re-runs the frame-buffer fitting before the setter
//! returns, so the logical geometry always fits frame memory.

use crate::error::SensorError;
use crate::fit::{self, FitOutcome};
use crate::record::{Geometry, LogicalState};
use crate::session::SensorSession;
use crate::types::{
    FrameSize, GainCeiling, PixFormat, RgbGains, Rotation, SpecialEffect, Window,
};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

bitflags! {
    /// Subsystems that must be reprogrammed after a setting changed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConfigChange: u32 {
        /// Full interface bring-up
        const INIT = 1 << 0;
        const FRAMESIZE = 1 << 1;
        const PIXFORMAT = 1 << 2;
        const WINDOWING = 1 << 3;
    }
}

/// Maximum supported frame rate
pub const MAX_FRAMERATE: u32 = 1000;

/// Contrast, brightness and saturation level range
pub const LEVEL_RANGE: std::ops::RangeInclusive<i32> = -3..=3;

/// JPEG quality range
pub const QUALITY_RANGE: std::ops::RangeInclusive<u8> = 0..=100;

/// Configuration change queued from a context that cannot borrow the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigRequest {
    Pixformat(PixFormat),
    Framesize(FrameSize),
    Framerate(u32),
    Windowing(Window),
    Hmirror(bool),
    Vflip(bool),
    Transpose(bool),
    AutoRotation(bool),
    Gainceiling(GainCeiling),
    SpecialEffect(SpecialEffect),
    DeviceRotation(Rotation),
}

impl SensorSession {
    pub(crate) fn apply_request(&mut self, request: ConfigRequest) -> Result<(), SensorError> {
        match request {
            ConfigRequest::Pixformat(pixformat) => self.set_pixformat(pixformat),
            ConfigRequest::Framesize(framesize) => self.set_framesize(framesize),
            ConfigRequest::Framerate(framerate) => self.set_framerate(framerate),
            ConfigRequest::Windowing(w) => self.set_windowing(w.x, w.y, w.w, w.h),
            ConfigRequest::Hmirror(enable) => self.set_hmirror(enable),
            ConfigRequest::Vflip(enable) => self.set_vflip(enable),
            ConfigRequest::Transpose(enable) => self.set_transpose(enable),
            ConfigRequest::AutoRotation(enable) => self.set_auto_rotation(enable),
            ConfigRequest::Gainceiling(ceiling) => self.set_gainceiling(ceiling),
            ConfigRequest::SpecialEffect(sde) => self.set_special_effect(sde),
            ConfigRequest::DeviceRotation(rotation) => {
                self.set_device_rotation(rotation);
                Ok(())
            }
        }
    }

    /// Reprogram the capture backend for `change`
    pub(crate) fn configure(&mut self, change: ConfigChange) -> Result<(), SensorError> {
        self.backend.reconfigure(change, &self.record).map_err(|err| {
            warn!("Capture backend rejected {:?}: {}", change, err);
            SensorError::from(err)
        })?;
        self.record.generation += 1;
        debug!(
            "Reconfigured {:?} (generation {})",
            change, self.record.generation
        );
        Ok(())
    }

    /// Re-fit frame memory when format or size changed, then reprogram the
    /// backend. On overflow or a rejected reconfiguration the previous
    /// geometry is restored.
    fn reconcile(&mut self, change: ConfigChange, previous: &LogicalState) -> Result<(), SensorError> {
        if change.intersects(ConfigChange::FRAMESIZE | ConfigChange::PIXFORMAT) {
            if let Err(err) = self.auto_crop_framebuffer() {
                warn!("Configuration does not fit frame memory: {}", err);
                self.rollback(previous);
                return Err(err);
            }
        }
        if let Err(err) = self.configure(change) {
            self.rollback(previous);
            return Err(err);
        }
        Ok(())
    }

    fn rollback(&mut self, previous: &LogicalState) {
        let state = &self.record.state;
        let (pixformat, framesize) = (state.pixformat, state.framesize);

        if let Some(prev) = previous.pixformat.filter(|p| Some(*p) != pixformat) {
            if let Err(err) = self.with_driver(|driver, ctx| driver.set_pixformat(ctx, prev)) {
                warn!("Failed to restore {:?}: {}", prev, err);
            }
        }
        if let Some(prev) = previous.framesize.filter(|s| Some(*s) != framesize) {
            if let Err(err) = self.with_driver(|driver, ctx| driver.set_framesize(ctx, prev)) {
                warn!("Failed to restore {:?}: {}", prev, err);
            }
        }

        let state = &mut self.record.state;
        state.pixformat = previous.pixformat;
        state.framesize = previous.framesize;
        state.window = previous.window;
    }

    /// Whether the current geometry fits one frame buffer
    pub fn check_framebuffer_size(&self) -> bool {
        self.record
            .geometry()
            .map_or(true, |g| fit::fits(&g, self.pool.buffer_size() as u64, &self.config.fit))
    }

    /// Degrade window, frame size and finally format until the frame fits
    pub fn auto_crop_framebuffer(&mut self) -> Result<(), SensorError> {
        let Some(current) = self.record.geometry() else {
            return Ok(());
        };
        let driver = self.bound()?;
        let outcome = fit::plan(
            &current,
            self.pool.buffer_size() as u64,
            |pixformat| driver.supports_pixformat(pixformat),
            |framesize| driver.supports_framesize(framesize),
            &self.config.fit,
        )?;

        let FitOutcome::Degrade(next) = outcome else {
            return Ok(());
        };
        info!(
            "Degrading {:?} {:?} {}x{} to {:?} {:?} {}x{} to fit {} bytes",
            current.pixformat,
            current.framesize,
            current.window.w,
            current.window.h,
            next.pixformat,
            next.framesize,
            next.window.w,
            next.window.h,
            self.pool.buffer_size()
        );
        if next.pixformat != current.pixformat {
            self.with_driver(|driver, ctx| driver.set_pixformat(ctx, next.pixformat))?;
        }
        if next.framesize != current.framesize {
            self.with_driver(|driver, ctx| driver.set_framesize(ctx, next.framesize))?;
        }
        self.record.set_geometry(next);
        Ok(())
    }

    pub fn set_pixformat(&mut self, pixformat: PixFormat) -> Result<(), SensorError> {
        let driver = self.bound()?;
        let state = &self.record.state;
        if state.pixformat == Some(pixformat) {
            return Ok(());
        }
        if !driver.supports_pixformat(pixformat) {
            return Err(SensorError::InvalidPixformat);
        }

        // A color format that would only be degraded back to Bayer keeps Bayer
        if state.pixformat == Some(PixFormat::Bayer) && pixformat.is_color() {
            let capacity = self.pool.buffer_size() as u64;
            let area = state.window.area();
            if area * 2 > capacity && area <= capacity {
                debug!("Keeping Bayer, {:?} would not fit", pixformat);
                return Ok(());
            }
        }

        // Cropping and software transforms do not work on compressed frames
        if pixformat == PixFormat::Jpeg
            && (self.record.is_cropped() || state.transpose || state.auto_rotation)
        {
            return Err(SensorError::PixformatUnsupported);
        }

        self.abort(true);
        let previous = self.record.state.clone();
        self.with_driver(|driver, ctx| driver.set_pixformat(ctx, pixformat))?;
        self.settle();
        self.record.state.pixformat = Some(pixformat);
        self.reconcile(ConfigChange::FRAMESIZE | ConfigChange::PIXFORMAT, &previous)
    }

    pub fn set_framesize(&mut self, framesize: FrameSize) -> Result<(), SensorError> {
        let driver = self.bound()?;
        if self.record.state.framesize == Some(framesize) {
            return Ok(());
        }
        if !driver.supports_framesize(framesize) {
            return Err(SensorError::InvalidFramesize);
        }

        self.abort(true);
        let previous = self.record.state.clone();
        self.with_driver(|driver, ctx| driver.set_framesize(ctx, framesize))?;
        self.settle();
        self.record.state.framesize = Some(framesize);
        self.record.state.window = Window::full(framesize);
        self.reconcile(ConfigChange::FRAMESIZE | ConfigChange::PIXFORMAT, &previous)
    }

    /// Set the target frame rate; 0 disables throttling
    ///
    /// Drivers without rate control fall back to dropping frames in software.
    pub fn set_framerate(&mut self, framerate: u32) -> Result<(), SensorError> {
        self.bound()?;
        if framerate > MAX_FRAMERATE {
            return Err(SensorError::InvalidFramerate);
        }
        if self.record.state.framerate == framerate {
            return Ok(());
        }
        match self.with_driver(|driver, ctx| driver.set_framerate(ctx, framerate)) {
            Ok(()) => {}
            Err(SensorError::CtlUnsupported) => {
                debug!("No hardware rate control, throttling to {} fps in software", framerate);
            }
            Err(err) => return Err(err),
        }
        self.record.state.framerate = framerate;
        Ok(())
    }

    /// Select the output window inside the current frame size
    pub fn set_windowing(&mut self, x: u32, y: u32, w: u32, h: u32) -> Result<(), SensorError> {
        self.bound()?;
        let state = &self.record.state;
        let framesize = state.framesize.ok_or(SensorError::InvalidFramesize)?;
        if state.pixformat == Some(PixFormat::Jpeg) {
            return Err(SensorError::PixformatUnsupported);
        }
        let window = Window::new(x, y, w, h);
        if !window.fits_in(framesize) {
            return Err(SensorError::InvalidWindow);
        }
        if let Some(pixformat) = state.pixformat {
            let geometry = Geometry {
                pixformat,
                framesize,
                window,
            };
            if !fit::fits(&geometry, self.pool.buffer_size() as u64, &self.config.fit) {
                return Err(SensorError::FramebufferOverflow);
            }
        }

        self.abort(true);
        let previous = std::mem::replace(&mut self.record.state.window, window);
        if let Err(err) = self.configure(ConfigChange::WINDOWING) {
            self.record.state.window = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn set_hmirror(&mut self, enable: bool) -> Result<(), SensorError> {
        self.bound()?;
        if self.record.state.hmirror == enable {
            return Ok(());
        }
        self.with_driver(|driver, ctx| driver.set_hmirror(ctx, enable))?;
        self.record.state.hmirror = enable;
        self.settle();
        Ok(())
    }

    pub fn set_vflip(&mut self, enable: bool) -> Result<(), SensorError> {
        self.bound()?;
        if self.record.state.vflip == enable {
            return Ok(());
        }
        self.with_driver(|driver, ctx| driver.set_vflip(ctx, enable))?;
        self.record.state.vflip = enable;
        self.settle();
        Ok(())
    }

    /// Transpose frames in software
    pub fn set_transpose(&mut self, enable: bool) -> Result<(), SensorError> {
        if self.record.state.transpose == enable {
            return Ok(());
        }
        if self.record.state.pixformat == Some(PixFormat::Jpeg) {
            return Err(SensorError::PixformatUnsupported);
        }
        self.record.state.transpose = enable;
        Ok(())
    }

    /// Follow the device rotation in software
    pub fn set_auto_rotation(&mut self, enable: bool) -> Result<(), SensorError> {
        if self.record.state.auto_rotation == enable {
            return Ok(());
        }
        if self.record.state.pixformat == Some(PixFormat::Jpeg) {
            return Err(SensorError::PixformatUnsupported);
        }
        self.record.state.auto_rotation = enable;
        Ok(())
    }

    pub fn set_gainceiling(&mut self, ceiling: GainCeiling) -> Result<(), SensorError> {
        self.bound()?;
        if self.record.state.gainceiling == Some(ceiling) {
            return Ok(());
        }
        self.with_driver(|driver, ctx| driver.set_gainceiling(ctx, ceiling))?;
        self.record.state.gainceiling = Some(ceiling);
        Ok(())
    }

    pub fn set_special_effect(&mut self, sde: SpecialEffect) -> Result<(), SensorError> {
        self.bound()?;
        if self.record.state.sde == Some(sde) {
            return Ok(());
        }
        self.with_driver(|driver, ctx| driver.set_special_effect(ctx, sde))?;
        self.record.state.sde = Some(sde);
        Ok(())
    }

    pub fn set_lens_correction(&mut self, enable: bool, radius: u32, coef: u32) -> Result<(), SensorError> {
        self.with_driver(|driver, ctx| driver.set_lens_correction(ctx, enable, radius, coef))
    }

    /// Contrast level, -3 to +3
    pub fn set_contrast(&mut self, level: i32) -> Result<(), SensorError> {
        check_level(level)?;
        self.with_driver(|driver, ctx| driver.set_contrast(ctx, level))
    }

    /// Brightness level, -3 to +3
    pub fn set_brightness(&mut self, level: i32) -> Result<(), SensorError> {
        check_level(level)?;
        self.with_driver(|driver, ctx| driver.set_brightness(ctx, level))
    }

    /// Saturation level, -3 to +3
    pub fn set_saturation(&mut self, level: i32) -> Result<(), SensorError> {
        check_level(level)?;
        self.with_driver(|driver, ctx| driver.set_saturation(ctx, level))
    }

    /// JPEG quality, 0 to 100
    pub fn set_quality(&mut self, quality: u8) -> Result<(), SensorError> {
        if !QUALITY_RANGE.contains(&quality) {
            return Err(SensorError::InvalidArgument);
        }
        self.with_driver(|driver, ctx| driver.set_quality(ctx, quality))
    }

    pub fn set_colorbar(&mut self, enable: bool) -> Result<(), SensorError> {
        self.with_driver(|driver, ctx| driver.set_colorbar(ctx, enable))
    }

    /// Enable AGC, or fix the gain when `enable` is false
    pub fn set_auto_gain(
        &mut self,
        enable: bool,
        gain_db: Option<f32>,
        gain_db_ceiling: Option<f32>,
    ) -> Result<(), SensorError> {
        if gain_db.is_some_and(|g| !g.is_finite())
            || gain_db_ceiling.is_some_and(|g| !g.is_finite() || g < 0.0)
        {
            return Err(SensorError::InvalidArgument);
        }
        self.with_driver(|driver, ctx| driver.set_auto_gain(ctx, enable, gain_db, gain_db_ceiling))
    }

    pub fn gain_db(&mut self) -> Result<f32, SensorError> {
        self.with_driver(|driver, ctx| driver.gain_db(ctx))
    }

    /// Enable AEC, or fix the exposure when `enable` is false
    pub fn set_auto_exposure(&mut self, enable: bool, exposure_us: Option<u32>) -> Result<(), SensorError> {
        self.with_driver(|driver, ctx| driver.set_auto_exposure(ctx, enable, exposure_us))
    }

    pub fn exposure_us(&mut self) -> Result<u32, SensorError> {
        self.with_driver(|driver, ctx| driver.exposure_us(ctx))
    }

    /// Enable AWB, or fix the channel gains when `enable` is false
    pub fn set_auto_whitebal(&mut self, enable: bool, gains: Option<RgbGains>) -> Result<(), SensorError> {
        if gains.is_some_and(|g| !g.is_finite()) {
            return Err(SensorError::InvalidArgument);
        }
        self.with_driver(|driver, ctx| driver.set_auto_whitebal(ctx, enable, gains))
    }

    pub fn rgb_gain_db(&mut self) -> Result<RgbGains, SensorError> {
        self.with_driver(|driver, ctx| driver.rgb_gain_db(ctx))
    }

    /// Enable black-level calibration, or restore a previous calibration
    pub fn set_auto_blc(&mut self, enable: bool, regs: Option<&[u16]>) -> Result<(), SensorError> {
        let blc_size = usize::from(self.record.flags.blc_size);
        if regs.is_some_and(|r| r.len() != blc_size) {
            return Err(SensorError::InvalidArgument);
        }
        self.with_driver(|driver, ctx| driver.set_auto_blc(ctx, enable, regs))
    }

    pub fn blc_regs(&mut self) -> Result<Vec<u16>, SensorError> {
        self.with_driver(|driver, ctx| driver.blc_regs(ctx))
    }

    /// Raw register read
    pub fn read_reg(&mut self, reg: u16) -> Result<u16, SensorError> {
        self.with_driver(|driver, ctx| driver.read_reg(ctx, reg))
    }

    /// Raw register write
    pub fn write_reg(&mut self, reg: u16, value: u16) -> Result<(), SensorError> {
        self.with_driver(|driver, ctx| driver.write_reg(ctx, reg, value))
    }
}

fn check_level(level: i32) -> Result<(), SensorError> {
    if LEVEL_RANGE.contains(&level) {
        Ok(())
    } else {
        Err(SensorError::InvalidArgument)
    }
}
