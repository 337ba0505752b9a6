//! Capture Orchestrator
//!
//! Drives one snapshot through `Idle -> Configuring -> Armed -> Capturing ->
//! Complete`, with `Failed` on hardware faults and timeouts. Line events come
//! from the [`CaptureBackend`] over a bounded channel; the orchestrator crops,
//! swaps and copies each line into frame memory, throttles to the configured
//! frame rate and fires the vsync and frame callbacks at fixed points.
//!
//! [`SensorSession::abort`] is the only cancellation primitive. From contexts
//! that cannot borrow the session (callbacks, other tasks) the same abort is
//! raised through an [`AbortHandle`].

use crate::driver::CapturePath;
use crate::error::SensorError;
use crate::frame::{self, Frame};
use crate::reconcile::ConfigChange;
use crate::record::{CapabilityRecord, Geometry};
use crate::session::SensorSession;
use crate::types::PixFormat;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// Capture pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureState {
    Idle,
    Configuring,
    Armed,
    Capturing,
    Complete,
    /// Snapshot stopped by an abort request
    Aborted,
    Failed,
}

/// Event delivered by the capture hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// One full sensor line (or a chunk of a compressed stream)
    Line(Vec<u8>),
    /// End of frame
    FrameEnd,
    /// Transfer error reported by the hardware
    Fault(String),
}

/// Capture backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("DMA setup failed: {0}")]
    Dma(String),

    #[error("Camera interface setup failed: {0}")]
    Interface(String),

    #[error("Capture start failed: {0}")]
    Start(String),
}

impl From<BackendError> for SensorError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Dma(_) => SensorError::DmaInitFailed,
            BackendError::Interface(_) => SensorError::CsiInitFailed,
            BackendError::Start(_) => SensorError::CaptureFailed,
        }
    }
}

/// DMA/interface hardware that shifts sensor lines into memory
pub trait CaptureBackend: Send {
    /// Reprogram the interface after a configuration change
    fn reconfigure(&mut self, change: ConfigChange, record: &CapabilityRecord) -> Result<(), BackendError>;

    /// Start streaming line events into `lines`
    fn start(&mut self, lines: mpsc::Sender<LineEvent>) -> Result<(), BackendError>;

    /// Stop streaming, discarding buffered data when `flush` is set
    fn stop(&mut self, flush: bool);

    /// Accelerated line copy; returns false when the caller must copy
    fn copy_line(&mut self, src: &[u8], dst: &mut [u8]) -> bool {
        let _ = (src, dst);
        false
    }
}

#[derive(Debug, Default)]
struct AbortSignal {
    requested: AtomicBool,
    notify: Notify,
}

/// Abort request flag, safe to raise from any context
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    signal: Arc<AbortSignal>,
}

impl AbortHandle {
    /// Request that the capture in flight stops
    pub fn abort(&self) {
        self.signal.requested.store(true, Ordering::Release);
        self.signal.notify.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.signal.requested.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        self.signal.requested.store(false, Ordering::Release);
    }

    pub(crate) async fn wait(&self) {
        self.signal.notify.notified().await;
    }
}

/// Capture counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub captured: u64,
    pub dropped: u64,
    pub failed: u64,
    pub aborted: u64,
}

impl SensorSession {
    /// Abort the capture in flight and return to `Idle`
    pub fn abort(&mut self, flush: bool) {
        if self.streaming {
            self.backend.stop(flush);
            self.streaming = false;
        }
        if matches!(self.state, CaptureState::Armed | CaptureState::Capturing) {
            debug!("Capture aborted in {:?}", self.state);
        }
        self.state = CaptureState::Idle;
        self.record.state.first_line = false;
        self.record.state.drop_frame = false;
    }

    /// Capture one frame
    pub async fn snapshot(&mut self) -> Result<Frame, SensorError> {
        if !self.record.state.detected {
            return Err(SensorError::IscUndetected);
        }
        self.apply_deferred();

        let pixformat = self.record.state.pixformat.ok_or(SensorError::InvalidPixformat)?;
        self.record.state.framesize.ok_or(SensorError::InvalidFramesize)?;
        let geometry = self.record.geometry().ok_or(SensorError::InvalidFramesize)?;
        let path = self.bound()?.capture_path();

        self.state = CaptureState::Configuring;
        let mut lease = match self.pool.try_acquire() {
            Ok(lease) => lease,
            Err(err) => {
                warn!("Frame buffer still held by a consumer: {}", err);
                self.state = CaptureState::Idle;
                return Err(err.into());
            }
        };
        self.abort_signal.clear();
        self.record.state.first_line = false;
        self.record.state.drop_frame = false;

        let result = match path {
            CapturePath::Stream => self.capture_stream(&geometry).await,
            CapturePath::Driver => self.capture_from_driver(&geometry).await,
        };
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                if self.state == CaptureState::Aborted {
                    self.stats.aborted += 1;
                } else {
                    self.stats.failed += 1;
                    metrics::counter!("sensor_capture_failures_total").increment(1);
                }
                return Err(err);
            }
        };

        let (width, height) = (geometry.window.w, geometry.window.h);
        let (data, width, height) = if pixformat == PixFormat::Jpeg {
            (data, width, height)
        } else {
            let orientation = self.effective_orientation();
            frame::orient(data, width, height, pixformat.dst_bpp(), orientation)
        };

        lease.commit();
        self.sequence += 1;
        self.stats.captured += 1;
        metrics::counter!("sensor_frames_captured_total").increment(1);
        self.state = CaptureState::Complete;

        let frame = Frame {
            width,
            height,
            pixformat,
            cfa: self.record.flags.cfa_format,
            yuv_order: self.record.flags.yuv_format,
            data,
            timestamp_ms: self.now_ms(),
            sequence: self.sequence,
            palette: self.palette.clone(),
            lease,
        };
        debug!(
            "Frame {} complete: {}x{} {:?}, {} bytes",
            frame.sequence,
            frame.width,
            frame.height,
            frame.pixformat,
            frame.data.len()
        );

        self.apply_deferred();
        Ok(frame)
    }

    /// Start the backend and hand back the line queue
    pub(crate) fn arm(&mut self) -> Result<mpsc::Receiver<LineEvent>, SensorError> {
        let (tx, rx) = mpsc::channel(self.config.line_queue_depth.max(1));
        self.backend.start(tx).map_err(|err| {
            error!("Failed to start capture: {}", err);
            self.state = CaptureState::Failed;
            SensorError::from(err)
        })?;
        self.streaming = true;
        self.state = CaptureState::Armed;
        Ok(rx)
    }

    fn disarm(&mut self, flush: bool) {
        if self.streaming {
            self.backend.stop(flush);
            self.streaming = false;
        }
    }

    fn fail(&mut self, err: SensorError) -> SensorError {
        self.disarm(true);
        self.state = CaptureState::Failed;
        self.record.state.first_line = false;
        self.record.state.drop_frame = false;
        err
    }

    fn aborted(&mut self) -> SensorError {
        self.abort(true);
        self.state = CaptureState::Aborted;
        metrics::counter!("sensor_capture_aborts_total").increment(1);
        info!("Capture aborted on request");
        SensorError::CaptureFailed
    }

    fn frame_dropped(&mut self) {
        self.record.state.drop_frame = false;
        self.record.state.first_line = false;
        self.stats.dropped += 1;
        metrics::counter!("sensor_frames_dropped_total").increment(1);
        debug!("Frame dropped by throttle");
    }

    fn frame_committed(&mut self) {
        self.record.state.first_line = false;
        if let Some(callback) = self.frame_callback.as_mut() {
            callback();
        }
    }

    async fn capture_stream(&mut self, geometry: &Geometry) -> Result<Vec<u8>, SensorError> {
        let mut lines = self.arm()?;
        let timeout = Duration::from_millis(self.config.capture_timeout_ms);
        let capacity = self.pool.buffer_size();
        let jpeg = geometry.pixformat == PixFormat::Jpeg;
        let expected = geometry.bytes_per_frame() as usize;

        let mut data = Vec::with_capacity(if jpeg { capacity } else { expected });
        let mut row: u32 = 0;

        loop {
            if self.abort_signal.is_requested() {
                return Err(self.aborted());
            }

            let event = tokio::select! {
                biased;
                _ = self.abort_signal.wait() => continue,
                event = tokio::time::timeout(timeout, lines.recv()) => event,
            };
            let event = match event {
                Err(_) => {
                    warn!("No line within {:?}", timeout);
                    return Err(self.fail(SensorError::CaptureTimeout));
                }
                Ok(None) => {
                    error!("Capture backend closed the line queue");
                    return Err(self.fail(SensorError::CaptureFailed));
                }
                Ok(Some(event)) => event,
            };

            match event {
                LineEvent::Line(line) => {
                    if !self.record.state.first_line {
                        self.throttle_framerate();
                    }
                    if self.record.state.drop_frame {
                        continue;
                    }
                    self.state = CaptureState::Capturing;

                    if jpeg {
                        if data.len() + line.len() > capacity {
                            warn!("JPEG frame exceeds {} bytes", capacity);
                            return Err(self.fail(SensorError::JpegOverflow));
                        }
                        data.extend_from_slice(&line);
                    } else if let Err(err) = self.commit_line(geometry, row, &line, &mut data) {
                        return Err(self.fail(err));
                    }
                    row += 1;
                    if let Some(callback) = self.vsync_callback.as_mut() {
                        callback(row);
                    }
                }
                LineEvent::FrameEnd => {
                    if !self.record.state.first_line {
                        // Frame end without lines
                        continue;
                    }
                    if self.record.state.drop_frame {
                        self.frame_dropped();
                        continue;
                    }
                    if !jpeg && data.len() != expected {
                        warn!("Incomplete frame: {} of {} bytes", data.len(), expected);
                        return Err(self.fail(SensorError::CaptureFailed));
                    }
                    // Interface still streaming while the frame callback runs
                    self.frame_committed();
                    self.disarm(false);
                    return Ok(data);
                }
                LineEvent::Fault(reason) => {
                    error!("Capture fault: {}", reason);
                    return Err(self.fail(SensorError::CaptureFailed));
                }
            }
        }
    }

    /// Read frames over the driver's own link until one passes the throttle
    async fn capture_from_driver(&mut self, geometry: &Geometry) -> Result<Vec<u8>, SensorError> {
        self.state = CaptureState::Capturing;
        let raw = loop {
            if self.abort_signal.is_requested() {
                return Err(self.aborted());
            }
            let mut raw = Vec::new();
            if let Err(err) = self.with_driver(|driver, ctx| driver.read_frame(ctx, geometry, &mut raw)) {
                warn!("Driver frame read failed: {}", err);
                return Err(self.fail(SensorError::CaptureFailed));
            }
            self.throttle_framerate();
            if !self.record.state.drop_frame {
                break raw;
            }
            self.frame_dropped();

            let wait = Duration::from_millis(self.until_next_frame_ms());
            tokio::select! {
                biased;
                _ = self.abort_signal.wait() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        };

        let (frame_w, _) = geometry.framesize.resolution();
        let stride = frame_w as usize * self.record.src_bpp() as usize;
        let mut data = Vec::with_capacity(geometry.bytes_per_frame() as usize);
        for (row, line) in raw.chunks(stride.max(1)).enumerate() {
            if let Err(err) = self.commit_line(geometry, row as u32, line, &mut data) {
                return Err(self.fail(err));
            }
            if let Some(callback) = self.vsync_callback.as_mut() {
                callback(row as u32 + 1);
            }
        }
        if data.len() != geometry.bytes_per_frame() as usize {
            return Err(self.fail(SensorError::CaptureFailed));
        }
        self.frame_committed();
        Ok(data)
    }

    fn frame_period_ms(&self) -> u64 {
        match self.record.state.framerate {
            0 => 0,
            fps => 1000 / u64::from(fps),
        }
    }

    /// Time left until the throttle accepts the next frame, at least 1 ms
    fn until_next_frame_ms(&self) -> u64 {
        let due = self.record.state.last_frame_ms + self.frame_period_ms();
        due.saturating_sub(self.now_ms()).max(1)
    }

    /// Drop frames that arrive faster than the configured frame rate
    ///
    /// The accepted-frame timestamp advances by whole periods so the output
    /// stays phase-locked to the requested rate.
    fn throttle_framerate(&mut self) {
        let now = self.now_ms();
        let period = self.frame_period_ms();
        let state = &mut self.record.state;
        state.first_line = true;
        if state.last_frame_ms_valid && now.saturating_sub(state.last_frame_ms) < period {
            state.drop_frame = true;
        } else if state.last_frame_ms_valid {
            state.last_frame_ms += period;
        } else {
            state.last_frame_ms = now;
            state.last_frame_ms_valid = true;
        }
    }

    /// Copy one sensor line into frame memory
    ///
    /// Rows outside the window are skipped. Inside it, the line is cropped,
    /// byte-swapped or reduced to luma when the sensor needs it; otherwise
    /// the backend's accelerated copy is tried before a plain copy.
    fn commit_line(
        &mut self,
        geometry: &Geometry,
        row: u32,
        line: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), SensorError> {
        let window = geometry.window;
        if row < window.y || row >= window.y + window.h {
            return Ok(());
        }
        let flags = self.record.flags;
        let src_bpp = geometry.pixformat.src_bpp(flags.mono_bpp) as usize;
        let start = window.x as usize * src_bpp;
        let end = start + window.w as usize * src_bpp;
        let src = line.get(start..end).ok_or_else(|| {
            warn!("Short line {}: {} bytes, need {}", row, line.len(), end);
            SensorError::CaptureFailed
        })?;

        match geometry.pixformat {
            PixFormat::Grayscale if src_bpp == 2 => out.extend(src.iter().step_by(2)),
            PixFormat::Rgb565 if flags.rgb_swap => swap_bytes(src, out),
            PixFormat::Yuv422 if flags.yuv_swap => swap_bytes(src, out),
            _ => {
                let offset = out.len();
                out.resize(offset + src.len(), 0);
                if !self.backend.copy_line(src, &mut out[offset..]) {
                    out[offset..].copy_from_slice(src);
                }
            }
        }
        Ok(())
    }
}

fn swap_bytes(src: &[u8], out: &mut Vec<u8>) {
    for pair in src.chunks_exact(2) {
        out.extend_from_slice(&[pair[1], pair[0]]);
    }
}
