//! Simulated capture interface
//!
//! Streams a moving test pattern in the sensor's wire format: two-byte
//! grayscale on YUV-only parts, byte-swapped RGB565 where the flags say so,
//! raw CFA data for Bayer and a real JPEG stream split into chunks.

use super::SimJournal;
use crate::capture::{BackendError, CaptureBackend, LineEvent};
use crate::frame::rgb888_to_rgb565;
use crate::reconcile::ConfigChange;
use crate::record::{CapabilityRecord, Geometry};
use crate::types::{CfaPattern, HardwareFlags, PixFormat};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Compressed frames are delivered in chunks of this many bytes
pub const JPEG_CHUNK: usize = 512;

/// How the simulated interface behaves once started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimMode {
    /// Frames at the configured rate
    #[default]
    Normal,
    /// Never delivers anything
    Silent,
    /// Reports a transfer error instead of the next frame
    Fault,
}

#[derive(Debug)]
struct ControlState {
    mode: SimMode,
    fps: u32,
    fail_init: bool,
    fail_reconfigure: bool,
    frames: u64,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            mode: SimMode::Normal,
            fps: 30,
            fail_init: false,
            fail_reconfigure: false,
            frames: 0,
        }
    }
}

/// Shared knobs of a [`SimBackend`], kept by the test after the backend
/// moves into the session
#[derive(Debug, Clone, Default)]
pub struct SimBackendControl {
    state: Arc<Mutex<ControlState>>,
}

impl SimBackendControl {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_mode(&self, mode: SimMode) {
        self.lock().mode = mode;
    }

    pub fn mode(&self) -> SimMode {
        self.lock().mode
    }

    /// Sensor output rate
    pub fn set_fps(&self, fps: u32) {
        self.lock().fps = fps.max(1);
    }

    pub fn fps(&self) -> u32 {
        self.lock().fps
    }

    /// Make the next full interface initialization fail
    pub fn fail_init(&self, fail: bool) {
        self.lock().fail_init = fail;
    }

    /// Make every reconfiguration fail, not only full initialization
    pub fn fail_reconfigure(&self, fail: bool) {
        self.lock().fail_reconfigure = fail;
    }

    /// Frames streamed so far, dropped ones included
    pub fn frames_emitted(&self) -> u64 {
        self.lock().frames
    }
}

/// In-memory stand-in for the DMA/interface hardware
#[derive(Debug)]
pub struct SimBackend {
    control: SimBackendControl,
    journal: SimJournal,
    geometry: Option<Geometry>,
    flags: HardwareFlags,
    task: Option<JoinHandle<()>>,
}

impl SimBackend {
    pub fn new(control: SimBackendControl, journal: SimJournal) -> Self {
        Self {
            control,
            journal,
            geometry: None,
            flags: HardwareFlags::DEFAULT,
            task: None,
        }
    }
}

impl CaptureBackend for SimBackend {
    fn reconfigure(&mut self, change: ConfigChange, record: &CapabilityRecord) -> Result<(), BackendError> {
        let names: Vec<&str> = change.iter_names().map(|(name, _)| name).collect();
        self.journal.record(format!("reconfigure {}", names.join("|")));
        {
            let control = self.control.lock();
            if change.contains(ConfigChange::INIT) && control.fail_init {
                return Err(BackendError::Interface("sync signals not detected".into()));
            }
            if control.fail_reconfigure {
                return Err(BackendError::Interface("line length rejected".into()));
            }
        }
        self.geometry = record.geometry();
        self.flags = record.flags;
        Ok(())
    }

    fn start(&mut self, lines: mpsc::Sender<LineEvent>) -> Result<(), BackendError> {
        let geometry = self
            .geometry
            .ok_or_else(|| BackendError::Start("interface not configured".into()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| BackendError::Start(err.to_string()))?;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.journal.record("start");
        let control = self.control.clone();
        let flags = self.flags;
        self.task = Some(runtime.spawn(stream(control, geometry, flags, lines)));
        Ok(())
    }

    fn stop(&mut self, flush: bool) {
        self.journal.record(if flush { "stop flush" } else { "stop" });
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SimBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn stream(control: SimBackendControl, geometry: Geometry, flags: HardwareFlags, lines: mpsc::Sender<LineEvent>) {
    loop {
        let interval = Duration::from_micros(1_000_000 / u64::from(control.fps()));
        tokio::time::sleep(interval).await;

        let seq = {
            let mut state = control.lock();
            state.frames += 1;
            state.frames
        };
        match control.mode() {
            SimMode::Silent => std::future::pending::<()>().await,
            SimMode::Fault => {
                let _ = lines.send(LineEvent::Fault("DMA transfer error".into())).await;
                return;
            }
            SimMode::Normal => {}
        }

        let events = match render(&geometry, &flags, seq) {
            Ok(events) => events,
            Err(err) => {
                warn!("Test pattern encode failed: {}", err);
                let _ = lines.send(LineEvent::Fault(err)).await;
                return;
            }
        };
        for event in events {
            if lines.send(event).await.is_err() {
                debug!("Line queue closed, stopping stream");
                return;
            }
        }
    }
}

/// Test pattern pixel: horizontal red ramp, vertical green ramp, blue follows the frame
fn pattern(x: u32, y: u32, w: u32, h: u32, seq: u64) -> [u8; 3] {
    [
        (x * 255 / w.max(2).saturating_sub(1)) as u8,
        (y * 255 / h.max(2).saturating_sub(1)) as u8,
        (seq * 16) as u8,
    ]
}

fn luma([r, g, b]: [u8; 3]) -> u8 {
    ((u32::from(r) * 77 + u32::from(g) * 150 + u32::from(b) * 29) >> 8) as u8
}

fn cfa_channel(cfa: CfaPattern, x: u32, y: u32) -> usize {
    let tile = match cfa {
        CfaPattern::Bggr => [[2, 1], [1, 0]],
        CfaPattern::Gbrg => [[1, 2], [0, 1]],
        CfaPattern::Grbg => [[1, 0], [2, 1]],
        CfaPattern::Rggb => [[0, 1], [1, 2]],
    };
    tile[(y % 2) as usize][(x % 2) as usize]
}

/// Render one full frame as line events, ending with `FrameEnd`
fn render(geometry: &Geometry, flags: &HardwareFlags, seq: u64) -> Result<Vec<LineEvent>, String> {
    let (w, h) = geometry.framesize.resolution();
    let mut events = Vec::with_capacity(h as usize + 1);

    if geometry.pixformat == PixFormat::Jpeg {
        let img = RgbImage::from_fn(w, h, |x, y| image::Rgb(pattern(x, y, w, h, seq)));
        let mut jpeg = Vec::new();
        img.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .map_err(|err| err.to_string())?;
        events.extend(jpeg.chunks(JPEG_CHUNK).map(|chunk| LineEvent::Line(chunk.to_vec())));
        events.push(LineEvent::FrameEnd);
        return Ok(events);
    }

    let bpp = geometry.pixformat.src_bpp(flags.mono_bpp) as usize;
    for y in 0..h {
        let mut line = Vec::with_capacity(w as usize * bpp);
        for x in 0..w {
            let rgb = pattern(x, y, w, h, seq);
            match geometry.pixformat {
                PixFormat::Grayscale if bpp == 2 => line.extend_from_slice(&[luma(rgb), 0x80]),
                PixFormat::Grayscale => line.push(luma(rgb)),
                PixFormat::Bayer => line.push(rgb[cfa_channel(flags.cfa_format, x, y)]),
                PixFormat::Rgb565 => {
                    let px = rgb888_to_rgb565(rgb[0], rgb[1], rgb[2]);
                    if flags.rgb_swap {
                        line.extend_from_slice(&px.to_be_bytes());
                    } else {
                        line.extend_from_slice(&px.to_le_bytes());
                    }
                }
                PixFormat::Yuv422 => {
                    let chroma = if x % 2 == 0 { 0x60 } else { 0xA0 };
                    if flags.yuv_swap {
                        line.extend_from_slice(&[chroma, luma(rgb)]);
                    } else {
                        line.extend_from_slice(&[luma(rgb), chroma]);
                    }
                }
                PixFormat::Jpeg => {}
            }
        }
        events.push(LineEvent::Line(line));
    }
    events.push(LineEvent::FrameEnd);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameSize;

    #[test]
    fn test_two_byte_grayscale_carries_luma_first() {
        let geometry = Geometry::full(PixFormat::Grayscale, FrameSize::Qqqqvga);
        let flags = HardwareFlags {
            mono_bpp: 2,
            ..HardwareFlags::DEFAULT
        };
        let events = render(&geometry, &flags, 0).unwrap();
        let (w, h) = FrameSize::Qqqqvga.resolution();
        assert_eq!(events.len(), h as usize + 1);
        let LineEvent::Line(first) = &events[0] else {
            panic!("expected a line");
        };
        assert_eq!(first.len(), w as usize * 2);
        assert_eq!(first[1], 0x80);
        assert_eq!(events.last(), Some(&LineEvent::FrameEnd));
    }

    #[test]
    fn test_jpeg_stream_is_chunked() {
        let geometry = Geometry::full(PixFormat::Jpeg, FrameSize::Qqvga);
        let events = render(&geometry, &HardwareFlags::DEFAULT, 1).unwrap();
        let LineEvent::Line(head) = &events[0] else {
            panic!("expected a chunk");
        };
        assert!(head.len() <= JPEG_CHUNK);
        // SOI marker
        assert_eq!(&head[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_waits_one_interval_before_first_frame() {
        let control = SimBackendControl::default();
        control.set_fps(10);
        let journal = SimJournal::default();
        let mut backend = SimBackend::new(control.clone(), journal.clone());
        let mut record = CapabilityRecord::default();
        record.set_geometry(Geometry::full(PixFormat::Grayscale, FrameSize::Qqqqvga));
        backend.reconfigure(ConfigChange::INIT, &record).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        backend.start(tx).unwrap();
        let started = tokio::time::Instant::now();
        assert!(matches!(rx.recv().await, Some(LineEvent::Line(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));

        backend.stop(true);
        assert_eq!(journal.entries(), vec!["reconfigure INIT", "start", "stop flush"]);
    }
}
