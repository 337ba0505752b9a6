//! Sensor Session
//!
//! Owns the bus, control port, capture backend, frame pool and the bound
//! driver. Everything that touches the sensor goes through one session.

use crate::capture::{AbortHandle, CaptureBackend, CaptureState, CaptureStats};
use crate::config::SessionConfig;
use crate::driver::{surface, DriverContext, DriverRegistry, SensorDriver};
use crate::error::SensorError;
use crate::frame;
use crate::reconcile::{ConfigChange, ConfigRequest};
use crate::record::CapabilityRecord;
use crate::types::{
    FrameSize, GainCeiling, HardwareFlags, Orientation, PixFormat, Rotation, SpecialEffect, Window,
};
use frame_pool::FramePool;
use sensor_bus::{RegisterBus, SensorPort};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Called once per committed line with the running line count
pub type VsyncCallback = Box<dyn FnMut(u32) + Send>;

/// Called once per committed frame
pub type FrameCallback = Box<dyn FnMut() + Send>;

/// Palette length expected for false-color rendering
pub const PALETTE_LEN: usize = 256;

/// Power-line settling delay used by the lifecycle operations
pub(crate) const LINE_SETTLE_MS: u32 = 10;

/// Cloneable handle for code that cannot borrow the session: callbacks,
/// other tasks and interrupt-like contexts
#[derive(Debug, Clone)]
pub struct SensorHandle {
    requests: mpsc::UnboundedSender<ConfigRequest>,
    abort: AbortHandle,
}

impl SensorHandle {
    /// Queue a configuration change; it is applied when the session is next
    /// idle or a frame completes
    pub fn request(&self, request: ConfigRequest) -> Result<(), SensorError> {
        self.requests
            .send(request)
            .map_err(|_| SensorError::CtlFailed)
    }

    /// Abort the capture in flight
    pub fn abort(&self) {
        self.abort.abort();
    }
}

/// One bound (or not yet bound) camera sensor
pub struct SensorSession {
    pub(crate) record: CapabilityRecord,
    pub(crate) driver: Option<Box<dyn SensorDriver>>,
    pub(crate) bus: Box<dyn RegisterBus>,
    pub(crate) port: Box<dyn SensorPort>,
    pub(crate) backend: Box<dyn CaptureBackend>,
    pub(crate) pool: Arc<FramePool>,
    pub(crate) registry: DriverRegistry,
    pub(crate) config: SessionConfig,
    pub(crate) state: CaptureState,
    /// Backend is streaming into a line queue
    pub(crate) streaming: bool,
    pub(crate) abort_signal: AbortHandle,
    requests_tx: mpsc::UnboundedSender<ConfigRequest>,
    requests_rx: mpsc::UnboundedReceiver<ConfigRequest>,
    pub(crate) deferred_errors: Vec<(ConfigRequest, SensorError)>,
    pub(crate) vsync_callback: Option<VsyncCallback>,
    pub(crate) frame_callback: Option<FrameCallback>,
    pub(crate) palette: Option<Arc<[u16]>>,
    pub(crate) device_rotation: Rotation,
    pub(crate) epoch: Instant,
    pub(crate) sequence: u64,
    pub(crate) stats: CaptureStats,
}

impl SensorSession {
    /// Create an unbound session; call [`SensorSession::init`] to detect the sensor
    pub fn new(
        bus: impl RegisterBus + 'static,
        port: impl SensorPort + 'static,
        backend: impl CaptureBackend + 'static,
        registry: DriverRegistry,
        config: SessionConfig,
    ) -> Result<Self, SensorError> {
        let pool = Arc::new(FramePool::new(&config.framebuffer)?);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        info!(
            "Creating sensor session on bus {} ({} driver ids registered)",
            config.bus_id,
            registry.len()
        );
        Ok(Self {
            record: CapabilityRecord::default(),
            driver: None,
            bus: Box::new(bus),
            port: Box::new(port),
            backend: Box::new(backend),
            pool,
            registry,
            config,
            state: CaptureState::Idle,
            streaming: false,
            abort_signal: AbortHandle::default(),
            requests_tx,
            requests_rx,
            deferred_errors: Vec::new(),
            vsync_callback: None,
            frame_callback: None,
            palette: Some(frame::rainbow_palette()),
            device_rotation: Rotation::Deg0,
            epoch: Instant::now(),
            sequence: 0,
            stats: CaptureStats::default(),
        })
    }

    /// Detect the sensor, bind its driver and bring up the capture backend
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.probe_init(self.config.bus_id, self.config.bus_speed)?;
        self.configure(ConfigChange::INIT)?;
        self.vsync_callback = None;
        self.frame_callback = None;
        self.record.state.detected = true;
        info!(
            "Sensor ready: chip {:#X} at {:#04X}",
            self.record.chip_id, self.record.slv_addr
        );
        Ok(())
    }

    /// Restore the default logical state and hard-reset the sensor
    pub fn reset(&mut self) -> Result<(), SensorError> {
        self.bound()?;
        self.abort(true);

        let detected = self.record.state.detected;
        self.record.state = Default::default();
        self.record.state.detected = detected;
        self.vsync_callback = None;
        self.frame_callback = None;
        self.palette = Some(frame::rainbow_palette());

        // Leave power-down, then pulse reset
        let flags = self.record.flags;
        self.port.set_powerdown(flags.power_pol.released());
        self.port.set_reset(flags.reset_pol.asserted());
        self.port.delay_ms(LINE_SETTLE_MS);
        self.port.set_reset(flags.reset_pol.released());
        self.port.delay_ms(2 * LINE_SETTLE_MS);

        match self.with_driver(|driver, ctx| driver.reset(ctx)) {
            Ok(()) | Err(SensorError::CtlUnsupported) => {}
            Err(err) => {
                warn!("Driver reset failed: {}", err);
                return Err(SensorError::CtlFailed);
            }
        }

        self.configure(ConfigChange::INIT)?;
        debug!("Sensor reset to defaults");
        Ok(())
    }

    /// Put the sensor into (or out of) its low-power sleep mode
    pub fn sleep(&mut self, enable: bool) -> Result<(), SensorError> {
        self.bound()?;
        self.abort(true);
        self.with_driver(|driver, ctx| driver.sleep(ctx, enable))
    }

    /// Drive the power-down line; leaving shutdown re-initializes the interface
    pub fn shutdown(&mut self, enable: bool) -> Result<(), SensorError> {
        self.abort(true);
        let power_pol = self.record.flags.power_pol;
        let result = if enable {
            self.port.set_powerdown(power_pol.asserted());
            Ok(())
        } else {
            self.port.set_powerdown(power_pol.released());
            self.configure(ConfigChange::INIT)
        };
        self.port.delay_ms(LINE_SETTLE_MS);
        info!("Sensor shutdown {}", if enable { "entered" } else { "left" });
        result
    }

    /// Drop the bound driver and forget the sensor
    pub fn unbind(&mut self) {
        self.abort(true);
        if let Some(driver) = self.driver.take() {
            info!("Unbinding {} driver", driver.name());
        }
        self.record.clear();
    }

    /// Whether a sensor was detected and initialized
    pub fn is_detected(&self) -> bool {
        self.record.state.detected
    }

    pub fn record(&self) -> &CapabilityRecord {
        &self.record
    }

    pub fn chip_id(&self) -> u32 {
        self.record.chip_id
    }

    pub fn slv_addr(&self) -> u8 {
        self.record.slv_addr
    }

    pub fn flags(&self) -> &HardwareFlags {
        &self.record.flags
    }

    /// Name of the bound driver
    pub fn driver_name(&self) -> Option<&'static str> {
        self.driver.as_ref().map(|driver| driver.name())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn capture_state(&self) -> CaptureState {
        self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn pixformat(&self) -> Option<PixFormat> {
        self.record.state.pixformat
    }

    pub fn framesize(&self) -> Option<FrameSize> {
        self.record.state.framesize
    }

    pub fn window(&self) -> Window {
        self.record.state.window
    }

    pub fn framerate(&self) -> u32 {
        self.record.state.framerate
    }

    pub fn gainceiling(&self) -> Option<GainCeiling> {
        self.record.state.gainceiling
    }

    pub fn special_effect(&self) -> Option<SpecialEffect> {
        self.record.state.sde
    }

    pub fn hmirror(&self) -> bool {
        self.record.state.hmirror
    }

    pub fn vflip(&self) -> bool {
        self.record.state.vflip
    }

    pub fn transpose(&self) -> bool {
        self.record.state.transpose
    }

    pub fn auto_rotation(&self) -> bool {
        self.record.state.auto_rotation
    }

    /// Whether a window smaller than the frame is applied
    pub fn is_cropped(&self) -> bool {
        self.record.is_cropped()
    }

    /// Bytes per pixel read from the sensor
    pub fn src_bpp(&self) -> u32 {
        self.record.src_bpp()
    }

    /// Bytes per pixel written to frame memory
    pub fn dst_bpp(&self) -> u32 {
        self.record.dst_bpp()
    }

    /// Frame memory shared with consumers
    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    /// Handle for deferred configuration and abort from other contexts
    pub fn handle(&self) -> SensorHandle {
        SensorHandle {
            requests: self.requests_tx.clone(),
            abort: self.abort_signal.clone(),
        }
    }

    /// Abort signal safe to raise from callbacks
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_signal.clone()
    }

    /// Sensor master clock in Hz
    pub fn xclk_frequency(&self) -> u32 {
        self.port.xclk_frequency()
    }

    /// Reprogram the sensor master clock
    pub fn set_xclk_frequency(&mut self, hz: u32) -> Result<(), SensorError> {
        self.abort(true);
        self.port.set_xclk_frequency(hz).map_err(|err| {
            warn!("Failed to program sensor clock: {}", err);
            SensorError::TimInitFailed
        })
    }

    /// Split frame memory into `count` buffers and re-fit the configuration
    pub fn set_framebuffers(&mut self, count: usize) -> Result<(), SensorError> {
        self.abort(true);
        let previous_count = self.pool.buffer_count();
        let previous = self.record.geometry();
        self.pool.set_buffer_count(count)?;

        if let Err(err) = self.auto_crop_framebuffer() {
            warn!("{} buffer(s) leave no room for a frame, keeping {}", count, previous_count);
            self.pool.set_buffer_count(previous_count)?;
            return Err(err);
        }
        if self.record.geometry() != previous {
            self.configure(ConfigChange::FRAMESIZE | ConfigChange::PIXFORMAT)?;
        }
        Ok(())
    }

    pub fn framebuffers(&self) -> usize {
        self.pool.buffer_count()
    }

    /// Replace the callback invoked at each line boundary
    pub fn set_vsync_callback(&mut self, callback: Option<VsyncCallback>) {
        self.vsync_callback = callback;
    }

    /// Replace the callback invoked once per committed frame
    pub fn set_frame_callback(&mut self, callback: Option<FrameCallback>) {
        self.frame_callback = callback;
    }

    /// Set the false-color palette; it is shared with frames, never copied
    pub fn set_color_palette(&mut self, palette: Option<Arc<[u16]>>) -> Result<(), SensorError> {
        if palette.as_ref().is_some_and(|p| p.len() != PALETTE_LEN) {
            return Err(SensorError::InvalidArgument);
        }
        self.palette = palette;
        Ok(())
    }

    pub fn color_palette(&self) -> Option<&Arc<[u16]>> {
        self.palette.as_ref()
    }

    /// Rotation reported by an external orientation source
    pub fn set_device_rotation(&mut self, rotation: Rotation) {
        self.device_rotation = rotation;
    }

    /// Software transform applied to captured frames
    pub fn effective_orientation(&self) -> Orientation {
        let state = &self.record.state;
        let mut orientation = if state.auto_rotation {
            Orientation::from_rotation(self.device_rotation)
        } else {
            Orientation::default()
        };
        orientation.transpose ^= state.transpose;
        orientation
    }

    /// Apply queued configuration requests, returning how many were handled
    ///
    /// Failures are logged and kept for [`SensorSession::take_deferred_errors`].
    pub fn apply_deferred(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(request) = self.requests_rx.try_recv() {
            handled += 1;
            if let Err(err) = self.apply_request(request.clone()) {
                warn!("Deferred {:?} failed: {}", request, err);
                self.deferred_errors.push((request, err));
            }
        }
        handled
    }

    /// Failures of deferred requests since the last call
    pub fn take_deferred_errors(&mut self) -> Vec<(ConfigRequest, SensorError)> {
        std::mem::take(&mut self.deferred_errors)
    }

    /// Milliseconds since the session was created
    pub(crate) fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Bound driver, or `IscUndetected`
    pub(crate) fn bound(&self) -> Result<&dyn SensorDriver, SensorError> {
        self.driver.as_deref().ok_or(SensorError::IscUndetected)
    }

    /// Run a driver operation against the bound sensor
    pub(crate) fn with_driver<T>(
        &mut self,
        op: impl FnOnce(&mut dyn SensorDriver, &mut DriverContext<'_>) -> Result<T, SensorError>,
    ) -> Result<T, SensorError> {
        let driver = self.driver.as_deref_mut().ok_or(SensorError::IscUndetected)?;
        let mut ctx = DriverContext::new(self.bus.as_mut(), self.record.slv_addr);
        op(driver, &mut ctx).map_err(surface)
    }

    /// Sensor settling time after register-level reconfiguration
    pub(crate) fn settle(&mut self) {
        if !self.config.disable_delays {
            self.port.delay_ms(self.config.settle_delay_ms);
        }
    }
}

impl std::fmt::Debug for SensorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("driver", &self.driver_name())
            .field("record", &self.record)
            .field("state", &self.state)
            .field("pool", &self.pool)
            .finish()
    }
}
