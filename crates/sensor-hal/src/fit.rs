//! Frame-Buffer Fitting
//!
//! Pure planning over geometries: given the current format, frame size and
//! window, find the largest configuration that fits a frame buffer. The
//! degradation order is fixed:
//!
//! 1. shrink the window (aspect ratio kept, centered) at the current size
//! 2. walk the smaller standard frame sizes, full window first
//! 3. repeat 1 and 2 with the most compact raw format the driver supports
//!
//! JPEG has no fixed size per frame. Planning uses a worst-case bound taken
//! from the policy's minimum compression ratio, so a compressed stream can
//! only shrink its frame size. Frames that still outgrow the buffer fail at
//! capture time with [`SensorError::JpegOverflow`].

use crate::config::FitPolicy;
use crate::error::SensorError;
use crate::record::Geometry;
use crate::types::{FrameSize, PixFormat, Window};

/// Result of a fitting pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    /// The geometry already fits
    Fits,
    /// Switch to this geometry
    Degrade(Geometry),
}

/// Bytes one frame may occupy in memory
///
/// Exact for raw formats. For JPEG this is the size of a 2-byte-per-pixel
/// frame divided by `policy.jpeg_compression`.
pub fn frame_bound(geometry: &Geometry, policy: &FitPolicy) -> u64 {
    match geometry.pixformat {
        PixFormat::Jpeg => {
            (geometry.window.area() * 2).div_ceil(u64::from(policy.jpeg_compression.max(1)))
        }
        _ => geometry.bytes_per_frame(),
    }
}

/// Whether a geometry fits `capacity` bytes
pub fn fits(geometry: &Geometry, capacity: u64, policy: &FitPolicy) -> bool {
    frame_bound(geometry, policy) <= capacity
}

/// Plan the degradation of `current` into `capacity` bytes
pub fn plan(
    current: &Geometry,
    capacity: u64,
    pixformat_ok: impl Fn(PixFormat) -> bool,
    framesize_ok: impl Fn(FrameSize) -> bool,
    policy: &FitPolicy,
) -> Result<FitOutcome, SensorError> {
    if fits(current, capacity, policy) {
        return Ok(FitOutcome::Fits);
    }

    let mut formats = vec![current.pixformat];
    if policy.allow_format_fallback {
        formats.extend(
            [PixFormat::Bayer, PixFormat::Grayscale]
                .into_iter()
                .filter(|fmt| {
                    *fmt != current.pixformat
                        && fmt.dst_bpp() < current.pixformat.dst_bpp()
                        && pixformat_ok(*fmt)
                }),
        );
    }

    for pixformat in formats {
        // Window as requested, then the same window shrunk
        let at_current = Geometry { pixformat, ..*current };
        if fits(&at_current, capacity, policy) {
            return Ok(FitOutcome::Degrade(at_current));
        }
        if let Some(window) = shrink_window(&current.window, pixformat, capacity, policy) {
            return Ok(FitOutcome::Degrade(Geometry { window, ..at_current }));
        }

        for framesize in current.framesize.smaller().filter(|s| framesize_ok(*s)) {
            let full = Geometry::full(pixformat, framesize);
            if fits(&full, capacity, policy) {
                return Ok(FitOutcome::Degrade(full));
            }
            if let Some(window) = shrink_window(&full.window, pixformat, capacity, policy) {
                return Ok(FitOutcome::Degrade(Geometry { window, ..full }));
            }
        }
    }

    Err(SensorError::FramebufferOverflow)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Largest centered window with the aspect ratio of `window` that fits
///
/// Dimensions step in multiples of the reduced aspect ratio, stay even, and
/// never drop below `window / max_crop_divisor`.
pub fn shrink_window(
    window: &Window,
    pixformat: PixFormat,
    capacity: u64,
    policy: &FitPolicy,
) -> Option<Window> {
    let bpp = u64::from(pixformat.dst_bpp());
    if window.w == 0 || window.h == 0 || bpp == 0 {
        return None;
    }
    let divisor = policy.max_crop_divisor.max(1);
    let (min_w, min_h) = (window.w.div_ceil(divisor), window.h.div_ceil(divisor));

    let g = gcd(window.w, window.h);
    let (u_sub, v_sub) = (window.w / g, window.h / g);

    (1..g).rev().find_map(|k| {
        let (w, h) = (u_sub * k, v_sub * k);
        if w < min_w || h < min_h {
            return None;
        }
        if w % 2 != 0 || h % 2 != 0 {
            return None;
        }
        if u64::from(w) * u64::from(h) * bpp > capacity {
            return None;
        }
        Some(Window {
            x: window.x + (window.w - w) / 2,
            y: window.y + (window.h - h) / 2,
            w,
            h,
        })
    })
}
