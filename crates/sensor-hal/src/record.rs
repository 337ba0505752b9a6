//! Capability Record
//!
//! Identity, hardware flags and logical state of the bound sensor. Identity
//! and flags are written once at bind time; the logical state is owned by
//! the reconciler and the capture orchestrator.

use crate::types::{FrameSize, GainCeiling, HardwareFlags, PixFormat, SpecialEffect, Window};
use serde::Serialize;

/// Mutable logical configuration of the sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalState {
    pub pixformat: Option<PixFormat>,
    pub framesize: Option<FrameSize>,
    /// Output window inside the frame
    pub window: Window,
    /// Target frame rate, 0 = unthrottled
    pub framerate: u32,
    pub sde: Option<SpecialEffect>,
    pub gainceiling: Option<GainCeiling>,
    pub hmirror: bool,
    pub vflip: bool,
    pub transpose: bool,
    pub auto_rotation: bool,
    /// Set once the first line of the current frame has arrived
    pub first_line: bool,
    /// Current frame is being discarded by the throttle
    pub drop_frame: bool,
    pub last_frame_ms: u64,
    pub last_frame_ms_valid: bool,
    pub detected: bool,
}

impl Default for LogicalState {
    fn default() -> Self {
        Self {
            pixformat: None,
            framesize: None,
            window: Window::default(),
            framerate: 0,
            sde: None,
            gainceiling: None,
            hmirror: false,
            vflip: false,
            transpose: false,
            auto_rotation: false,
            first_line: false,
            drop_frame: false,
            last_frame_ms: 0,
            last_frame_ms_valid: false,
            detected: false,
        }
    }
}

/// Format, size and window that together determine frame memory use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub pixformat: PixFormat,
    pub framesize: FrameSize,
    pub window: Window,
}

impl Geometry {
    /// Geometry covering a whole frame
    pub fn full(pixformat: PixFormat, framesize: FrameSize) -> Self {
        Self {
            pixformat,
            framesize,
            window: Window::full(framesize),
        }
    }

    /// Bytes one frame occupies in memory (0 for JPEG)
    pub fn bytes_per_frame(&self) -> u64 {
        self.window.area() * u64::from(self.pixformat.dst_bpp())
    }

    /// Whether the window is smaller than the frame
    pub fn is_cropped(&self) -> bool {
        self.window != Window::full(self.framesize)
    }
}

/// Descriptor of the attached sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityRecord {
    /// Chip identifier read at detection
    pub chip_id: u32,
    /// Bus address the sensor answered on
    pub slv_addr: u8,
    pub flags: HardwareFlags,
    pub state: LogicalState,
    /// Bumped on every successful reconfiguration
    pub generation: u64,
}

impl Default for CapabilityRecord {
    fn default() -> Self {
        Self {
            chip_id: 0,
            slv_addr: 0,
            flags: HardwareFlags::DEFAULT,
            state: LogicalState::default(),
            generation: 0,
        }
    }
}

impl CapabilityRecord {
    /// Current geometry, if format and size are both set
    pub fn geometry(&self) -> Option<Geometry> {
        Some(Geometry {
            pixformat: self.state.pixformat?,
            framesize: self.state.framesize?,
            window: self.state.window,
        })
    }

    /// Restore a geometry captured earlier
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.state.pixformat = Some(geometry.pixformat);
        self.state.framesize = Some(geometry.framesize);
        self.state.window = geometry.window;
    }

    /// Bytes per pixel read from the sensor for the current format
    pub fn src_bpp(&self) -> u32 {
        self.state
            .pixformat
            .map_or(0, |fmt| fmt.src_bpp(self.flags.mono_bpp))
    }

    /// Bytes per pixel written to memory for the current format
    pub fn dst_bpp(&self) -> u32 {
        self.state.pixformat.map_or(0, |fmt| fmt.dst_bpp())
    }

    /// Whether the output window is smaller than the frame
    pub fn is_cropped(&self) -> bool {
        self.geometry().is_some_and(|g| g.is_cropped())
    }

    /// Forget identity and state
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_requires_format_and_size() {
        let mut record = CapabilityRecord::default();
        assert!(record.geometry().is_none());
        record.state.pixformat = Some(PixFormat::Rgb565);
        assert!(record.geometry().is_none());
        record.state.framesize = Some(FrameSize::Qvga);
        record.state.window = Window::full(FrameSize::Qvga);
        let geometry = record.geometry().unwrap();
        assert_eq!(geometry.bytes_per_frame(), 320 * 240 * 2);
        assert!(!record.is_cropped());
    }

    #[test]
    fn test_grayscale_from_two_byte_stream() {
        let mut record = CapabilityRecord::default();
        record.flags.mono_bpp = 2;
        record.state.pixformat = Some(PixFormat::Grayscale);
        assert_eq!(record.src_bpp(), 2);
        assert_eq!(record.dst_bpp(), 1);
    }

    #[test]
    fn test_clear_resets_identity() {
        let mut record = CapabilityRecord {
            chip_id: 0x26,
            slv_addr: 0x60,
            ..Default::default()
        };
        record.state.detected = true;
        record.clear();
        assert_eq!(record.chip_id, 0);
        assert!(!record.state.detected);
    }
}
