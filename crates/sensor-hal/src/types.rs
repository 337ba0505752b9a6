//! Sensor Domain Types
//!
//! Pixel formats, the standard frame-size table, control enums and the
//! hardware flags a driver profile carries.

use serde::{Deserialize, Serialize};

/// Output pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixFormat {
    /// Single channel, 1 byte per pixel in memory
    Grayscale,
    /// 16-bit RGB
    Rgb565,
    /// Raw color-filter-array data, 1 byte per pixel
    Bayer,
    /// 4:2:2 luma/chroma, 2 bytes per pixel
    Yuv422,
    /// Compressed stream from the sensor
    Jpeg,
}

impl PixFormat {
    /// Every pixel format
    pub const ALL: [PixFormat; 5] = [
        PixFormat::Grayscale,
        PixFormat::Rgb565,
        PixFormat::Bayer,
        PixFormat::Yuv422,
        PixFormat::Jpeg,
    ];

    /// Whether the format carries color that a raw-only sensor cannot produce
    pub fn is_color(&self) -> bool {
        matches!(self, PixFormat::Rgb565 | PixFormat::Yuv422)
    }

    /// Bytes per pixel read from the sensor
    ///
    /// Grayscale depends on the sensor: parts that only emit YUV deliver two
    /// bytes per pixel and the luma byte is picked out during the copy.
    pub fn src_bpp(&self, mono_bpp: u8) -> u32 {
        match self {
            PixFormat::Bayer | PixFormat::Jpeg => 1,
            PixFormat::Rgb565 | PixFormat::Yuv422 => 2,
            PixFormat::Grayscale => u32::from(mono_bpp.max(1)),
        }
    }

    /// Bytes per pixel written to frame memory (0 for variable-size JPEG)
    pub fn dst_bpp(&self) -> u32 {
        match self {
            PixFormat::Grayscale | PixFormat::Bayer => 1,
            PixFormat::Rgb565 | PixFormat::Yuv422 => 2,
            PixFormat::Jpeg => 0,
        }
    }
}

/// Standard frame sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameSize {
    // C/SIF
    Qqcif,
    Qcif,
    Cif,
    Qqsif,
    Qsif,
    Sif,
    // VGA
    Qqqqvga,
    Qqqvga,
    Qqvga,
    Qvga,
    Vga,
    Hqqqqvga,
    Hqqqvga,
    Hqqvga,
    Hqvga,
    Hvga,
    // FFT
    #[serde(rename = "64X32")]
    R64x32,
    #[serde(rename = "64X64")]
    R64x64,
    #[serde(rename = "128X64")]
    R128x64,
    #[serde(rename = "128X128")]
    R128x128,
    // Himax
    #[serde(rename = "160X160")]
    R160x160,
    #[serde(rename = "320X320")]
    R320x320,
    // Other
    Lcd,
    Qqvga2,
    Wvga,
    Wvga2,
    Svga,
    Xga,
    Wxga,
    Sxga,
    Sxgam,
    Uxga,
    Hd,
    Fhd,
    Qhd,
    Qxga,
    Wqxga,
    Wqxga2,
}

impl FrameSize {
    /// Every standard frame size, in table order
    pub const ALL: [FrameSize; 38] = [
        FrameSize::Qqcif,
        FrameSize::Qcif,
        FrameSize::Cif,
        FrameSize::Qqsif,
        FrameSize::Qsif,
        FrameSize::Sif,
        FrameSize::Qqqqvga,
        FrameSize::Qqqvga,
        FrameSize::Qqvga,
        FrameSize::Qvga,
        FrameSize::Vga,
        FrameSize::Hqqqqvga,
        FrameSize::Hqqqvga,
        FrameSize::Hqqvga,
        FrameSize::Hqvga,
        FrameSize::Hvga,
        FrameSize::R64x32,
        FrameSize::R64x64,
        FrameSize::R128x64,
        FrameSize::R128x128,
        FrameSize::R160x160,
        FrameSize::R320x320,
        FrameSize::Lcd,
        FrameSize::Qqvga2,
        FrameSize::Wvga,
        FrameSize::Wvga2,
        FrameSize::Svga,
        FrameSize::Xga,
        FrameSize::Wxga,
        FrameSize::Sxga,
        FrameSize::Sxgam,
        FrameSize::Uxga,
        FrameSize::Hd,
        FrameSize::Fhd,
        FrameSize::Qhd,
        FrameSize::Qxga,
        FrameSize::Wqxga,
        FrameSize::Wqxga2,
    ];

    /// Degradation order used when a frame does not fit, largest area first
    pub const DEGRADE_ORDER: [FrameSize; 38] = [
        FrameSize::Wqxga2,
        FrameSize::Wqxga,
        FrameSize::Qhd,
        FrameSize::Qxga,
        FrameSize::Fhd,
        FrameSize::Uxga,
        FrameSize::Sxga,
        FrameSize::Sxgam,
        FrameSize::Wxga,
        FrameSize::Hd,
        FrameSize::Xga,
        FrameSize::Svga,
        FrameSize::Wvga2,
        FrameSize::Wvga,
        FrameSize::Vga,
        FrameSize::Hvga,
        FrameSize::R320x320,
        FrameSize::Cif,
        FrameSize::Sif,
        FrameSize::Qvga,
        FrameSize::Hqvga,
        FrameSize::R160x160,
        FrameSize::Qcif,
        FrameSize::Qsif,
        FrameSize::Lcd,
        FrameSize::Qqvga2,
        FrameSize::Qqvga,
        FrameSize::R128x128,
        FrameSize::Hqqvga,
        FrameSize::R128x64,
        FrameSize::Qqcif,
        FrameSize::Qqsif,
        FrameSize::Qqqvga,
        FrameSize::R64x64,
        FrameSize::Hqqqvga,
        FrameSize::R64x32,
        FrameSize::Qqqqvga,
        FrameSize::Hqqqqvga,
    ];

    /// Width and height in pixels
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            FrameSize::Qqcif => (88, 72),
            FrameSize::Qcif => (176, 144),
            FrameSize::Cif => (352, 288),
            FrameSize::Qqsif => (88, 60),
            FrameSize::Qsif => (176, 120),
            FrameSize::Sif => (352, 240),
            FrameSize::Qqqqvga => (40, 30),
            FrameSize::Qqqvga => (80, 60),
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qvga => (320, 240),
            FrameSize::Vga => (640, 480),
            FrameSize::Hqqqqvga => (30, 20),
            FrameSize::Hqqqvga => (60, 40),
            FrameSize::Hqqvga => (120, 80),
            FrameSize::Hqvga => (240, 160),
            FrameSize::Hvga => (480, 320),
            FrameSize::R64x32 => (64, 32),
            FrameSize::R64x64 => (64, 64),
            FrameSize::R128x64 => (128, 64),
            FrameSize::R128x128 => (128, 128),
            FrameSize::R160x160 => (160, 160),
            FrameSize::R320x320 => (320, 320),
            FrameSize::Lcd => (128, 160),
            FrameSize::Qqvga2 => (128, 160),
            FrameSize::Wvga => (720, 480),
            FrameSize::Wvga2 => (752, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Wxga => (1280, 768),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Sxgam => (1280, 960),
            FrameSize::Uxga => (1600, 1200),
            FrameSize::Hd => (1280, 720),
            FrameSize::Fhd => (1920, 1080),
            FrameSize::Qhd => (2560, 1440),
            FrameSize::Qxga => (2048, 1536),
            FrameSize::Wqxga => (2560, 1600),
            FrameSize::Wqxga2 => (2592, 1944),
        }
    }

    /// Pixel count
    pub fn area(&self) -> u64 {
        let (w, h) = self.resolution();
        u64::from(w) * u64::from(h)
    }

    /// Sizes that come after this one in the degradation order
    pub fn smaller(&self) -> impl Iterator<Item = FrameSize> {
        let start = Self::DEGRADE_ORDER
            .iter()
            .position(|s| s == self)
            .map_or(Self::DEGRADE_ORDER.len(), |pos| pos + 1);
        Self::DEGRADE_ORDER[start..].iter().copied()
    }
}

/// Rectangle of the frame selected for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Window {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Window {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Window covering a whole frame
    pub fn full(size: FrameSize) -> Self {
        let (w, h) = size.resolution();
        Self { x: 0, y: 0, w, h }
    }

    /// Pixel count
    pub fn area(&self) -> u64 {
        u64::from(self.w) * u64::from(self.h)
    }

    /// Whether the window is non-empty and lies inside `size`
    pub fn fits_in(&self, size: FrameSize) -> bool {
        let (fw, fh) = size.resolution();
        self.w > 0
            && self.h > 0
            && u64::from(self.x) + u64::from(self.w) <= u64::from(fw)
            && u64::from(self.y) + u64::from(self.h) <= u64::from(fh)
    }
}

/// AGC gain ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainCeiling {
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
    X128,
}

impl GainCeiling {
    /// Multiplier
    pub fn factor(&self) -> u32 {
        match self {
            GainCeiling::X2 => 2,
            GainCeiling::X4 => 4,
            GainCeiling::X8 => 8,
            GainCeiling::X16 => 16,
            GainCeiling::X32 => 32,
            GainCeiling::X64 => 64,
            GainCeiling::X128 => 128,
        }
    }
}

/// Special digital effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEffect {
    Normal,
    Negative,
}

/// Signal polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    ActiveLow,
    #[default]
    ActiveHigh,
}

impl Polarity {
    /// Line level that asserts the signal
    pub fn asserted(&self) -> bool {
        matches!(self, Polarity::ActiveHigh)
    }

    /// Line level that releases the signal
    pub fn released(&self) -> bool {
        !self.asserted()
    }
}

/// Chroma byte order of YUV output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum YuvOrder {
    #[default]
    Yuv,
    Yvu,
}

/// Color filter array layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CfaPattern {
    #[default]
    Bggr,
    Gbrg,
    Grbg,
    Rggb,
}

/// Per-chip hardware flags, fixed when the driver is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFlags {
    /// Reset line polarity
    pub reset_pol: Polarity,
    /// Power-down line polarity
    pub power_pol: Polarity,
    /// Vertical sync polarity
    pub vsync_pol: Polarity,
    /// Horizontal sync polarity
    pub hsync_pol: Polarity,
    /// Pixel clock sampling edge
    pub pixck_pol: Polarity,
    /// Hardware frame sync input present
    pub frame_sync: bool,
    /// Bytes per pixel the sensor emits in grayscale mode
    pub mono_bpp: u8,
    /// Byte-swap 2-byte RGB after capture
    pub rgb_swap: bool,
    /// Byte-swap 2-byte YUV after capture
    pub yuv_swap: bool,
    /// Number of black-level calibration registers
    pub blc_size: u8,
    /// Sensor only emits raw CFA data
    pub raw_output: bool,
    /// YUV/YVU order
    pub yuv_format: YuvOrder,
    /// JPEG output mode, if the sensor can compress
    pub jpg_mode: Option<u8>,
    /// CFA layout
    pub cfa_format: CfaPattern,
}

impl HardwareFlags {
    pub const DEFAULT: HardwareFlags = HardwareFlags {
        reset_pol: Polarity::ActiveHigh,
        power_pol: Polarity::ActiveHigh,
        vsync_pol: Polarity::ActiveHigh,
        hsync_pol: Polarity::ActiveHigh,
        pixck_pol: Polarity::ActiveHigh,
        frame_sync: false,
        mono_bpp: 1,
        rgb_swap: false,
        yuv_swap: false,
        blc_size: 0,
        raw_output: false,
        yuv_format: YuvOrder::Yuv,
        jpg_mode: None,
        cfa_format: CfaPattern::Bggr,
    };
}

impl Default for HardwareFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Device rotation reported by an orientation source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

/// Software transform applied to the final image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub transpose: bool,
    pub hmirror: bool,
    pub vflip: bool,
}

impl Orientation {
    /// Transform that undoes a device rotation
    pub fn from_rotation(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Deg0 => Self::default(),
            Rotation::Deg90 => Self {
                transpose: true,
                hmirror: true,
                vflip: false,
            },
            Rotation::Deg180 => Self {
                transpose: false,
                hmirror: true,
                vflip: true,
            },
            Rotation::Deg270 => Self {
                transpose: true,
                hmirror: false,
                vflip: true,
            },
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.transpose && !self.hmirror && !self.vflip
    }
}

/// Per-channel white balance gains in dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RgbGains {
    pub r_db: f32,
    pub g_db: f32,
    pub b_db: f32,
}

impl RgbGains {
    pub fn is_finite(&self) -> bool {
        self.r_db.is_finite() && self.g_db.is_finite() && self.b_db.is_finite()
    }
}
