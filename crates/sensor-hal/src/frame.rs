//! Captured frames and pixel conversion

use crate::types::{CfaPattern, Orientation, PixFormat, YuvOrder};
use frame_pool::FrameLease;
use image::{ImageFormat, RgbImage};
use std::sync::{Arc, OnceLock};

/// One committed frame
///
/// Holds its frame-pool slot until dropped, so the slot cannot be re-armed
/// while the pixels are still being read.
#[derive(Debug)]
pub struct Frame {
    /// Frame width after windowing and orientation
    pub width: u32,
    /// Frame height after windowing and orientation
    pub height: u32,
    pub pixformat: PixFormat,
    /// CFA layout, meaningful for Bayer frames
    pub cfa: CfaPattern,
    /// Chroma order, meaningful for YUV frames
    pub yuv_order: YuvOrder,
    /// Pixel data (`width * height * bpp`, or the compressed stream)
    pub data: Vec<u8>,
    /// Capture timestamp (milliseconds since the session started)
    pub timestamp_ms: u64,
    /// Frame sequence number
    pub sequence: u64,
    /// False-color palette for grayscale rendering
    pub palette: Option<Arc<[u16]>>,
    pub(crate) lease: FrameLease,
}

impl Frame {
    /// Frame-pool slot holding this frame
    pub fn slot(&self) -> usize {
        self.lease.slot()
    }

    pub fn palette(&self) -> Option<&[u16]> {
        self.palette.as_deref()
    }

    /// Bytes per pixel of the stored data (0 for JPEG)
    pub fn bpp(&self) -> u32 {
        self.pixformat.dst_bpp()
    }

    /// Render to RGB888
    ///
    /// Grayscale goes through the palette when one is attached. Returns
    /// `None` when the data is truncated or the JPEG stream does not decode.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        let (w, h) = (self.width as usize, self.height as usize);
        let pixels = w * h;
        let rgb = match self.pixformat {
            PixFormat::Jpeg => {
                let img = image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg).ok()?;
                return Some(img.to_rgb8());
            }
            PixFormat::Grayscale => {
                let gray = self.data.get(..pixels)?;
                match self.palette() {
                    Some(palette) => gray
                        .iter()
                        .flat_map(|&y| rgb565_to_rgb888(palette.get(usize::from(y)).copied().unwrap_or(0)))
                        .collect(),
                    None => gray.iter().flat_map(|&y| [y, y, y]).collect(),
                }
            }
            PixFormat::Rgb565 => self
                .data
                .get(..pixels * 2)?
                .chunks_exact(2)
                .flat_map(|px| rgb565_to_rgb888(u16::from_le_bytes([px[0], px[1]])))
                .collect(),
            PixFormat::Yuv422 => yuv422_to_rgb(self.data.get(..pixels * 2)?, self.yuv_order),
            PixFormat::Bayer => demosaic(self.data.get(..pixels)?, w, h, self.cfa),
        };
        RgbImage::from_raw(self.width, self.height, rgb)
    }
}

pub fn rgb565_to_rgb888(px: u16) -> [u8; 3] {
    let r = ((px >> 11) & 0x1F) as u8;
    let g = ((px >> 5) & 0x3F) as u8;
    let b = (px & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344 * u - 0.714 * v),
        clamp(y + 1.772 * u),
    ]
}

fn yuv422_to_rgb(data: &[u8], order: YuvOrder) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    // Y0 C0 Y1 C1 per pixel pair
    for quad in data.chunks_exact(4) {
        let (u, v) = match order {
            YuvOrder::Yuv => (quad[1], quad[3]),
            YuvOrder::Yvu => (quad[3], quad[1]),
        };
        rgb.extend_from_slice(&yuv_to_rgb(quad[0], u, v));
        rgb.extend_from_slice(&yuv_to_rgb(quad[2], u, v));
    }
    // Odd trailing pixel
    if data.len() % 4 == 2 {
        let y = data[data.len() - 2];
        rgb.extend_from_slice(&[y, y, y]);
    }
    rgb
}

/// Channel (0 = R, 1 = G, 2 = B) at each position of a 2x2 CFA tile
fn cfa_tile(cfa: CfaPattern) -> [[usize; 2]; 2] {
    match cfa {
        CfaPattern::Bggr => [[2, 1], [1, 0]],
        CfaPattern::Gbrg => [[1, 2], [0, 1]],
        CfaPattern::Grbg => [[1, 0], [2, 1]],
        CfaPattern::Rggb => [[0, 1], [1, 2]],
    }
}

/// Nearest 2x2 tile demosaic
fn demosaic(raw: &[u8], w: usize, h: usize, cfa: CfaPattern) -> Vec<u8> {
    let tile = cfa_tile(cfa);
    let mut rgb = vec![0u8; w * h * 3];
    for y in 0..h {
        let ty = (y & !1).min(h.saturating_sub(2));
        for x in 0..w {
            let tx = (x & !1).min(w.saturating_sub(2));
            let mut sum = [0u32; 3];
            let mut n = [0u32; 3];
            for dy in 0..2 {
                for dx in 0..2 {
                    let (sx, sy) = (tx + dx, ty + dy);
                    if sx < w && sy < h {
                        let channel = tile[sy % 2][sx % 2];
                        sum[channel] += u32::from(raw[sy * w + sx]);
                        n[channel] += 1;
                    }
                }
            }
            let out = &mut rgb[(y * w + x) * 3..][..3];
            for c in 0..3 {
                out[c] = if n[c] == 0 { 0 } else { (sum[c] / n[c]) as u8 };
            }
        }
    }
    rgb
}

/// Default false-color palette: blue through red, RGB565
pub fn rainbow_palette() -> Arc<[u16]> {
    static PALETTE: OnceLock<Arc<[u16]>> = OnceLock::new();
    PALETTE
        .get_or_init(|| {
            (0..256u32)
                .map(|i| {
                    let hue = 240.0 - 240.0 * i as f32 / 255.0;
                    let [r, g, b] = hue_to_rgb(hue);
                    rgb888_to_rgb565(r, g, b)
                })
                .collect()
        })
        .clone()
}

fn hue_to_rgb(hue: f32) -> [u8; 3] {
    let h = hue / 60.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        _ => (x, 0.0, 1.0),
    };
    let scale = |c: f32| (c * 255.0).round() as u8;
    [scale(r), scale(g), scale(b)]
}

/// Apply a software orientation to packed pixel data
///
/// Mirror and flip act on the source image, transpose last. Returns the new
/// data with its width and height.
pub fn orient(data: Vec<u8>, w: u32, h: u32, bpp: u32, orientation: Orientation) -> (Vec<u8>, u32, u32) {
    if orientation.is_identity() || bpp == 0 {
        return (data, w, h);
    }
    let (wu, hu, bpp) = (w as usize, h as usize, bpp as usize);
    let mut out = vec![0u8; data.len()];
    for y in 0..hu {
        let sy = if orientation.vflip { hu - 1 - y } else { y };
        for x in 0..wu {
            let sx = if orientation.hmirror { wu - 1 - x } else { x };
            let src = (sy * wu + sx) * bpp;
            let dst = if orientation.transpose {
                (x * hu + y) * bpp
            } else {
                (y * wu + x) * bpp
            };
            if let (Some(from), Some(to)) = (data.get(src..src + bpp), out.get_mut(dst..dst + bpp)) {
                to.copy_from_slice(from);
            }
        }
    }
    if orientation.transpose {
        (out, h, w)
    } else {
        (out, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_pool::FramePool;

    fn frame(pixformat: PixFormat, width: u32, height: u32, data: Vec<u8>) -> Frame {
        let pool = Arc::new(FramePool::with_capacity(4096));
        Frame {
            width,
            height,
            pixformat,
            cfa: CfaPattern::Bggr,
            yuv_order: YuvOrder::Yuv,
            data,
            timestamp_ms: 0,
            sequence: 1,
            palette: None,
            lease: pool.try_acquire().unwrap(),
        }
    }

    #[test]
    fn test_rgb565_extremes() {
        assert_eq!(rgb565_to_rgb888(0xFFFF), [255, 255, 255]);
        assert_eq!(rgb565_to_rgb888(0xF800), [255, 0, 0]);
        assert_eq!(rgb888_to_rgb565(0, 255, 0), 0x07E0);
    }

    #[test]
    fn test_rainbow_palette_runs_blue_to_red() {
        let palette = rainbow_palette();
        assert_eq!(palette.len(), 256);
        assert_eq!(palette[0], rgb888_to_rgb565(0, 0, 255));
        assert_eq!(palette[255], rgb888_to_rgb565(255, 0, 0));
        assert!(Arc::ptr_eq(&palette, &rainbow_palette()));
    }

    #[test]
    fn test_orient_transpose_swaps_dimensions() {
        // 3x2 single-byte image
        let data = vec![1, 2, 3, 4, 5, 6];
        let orientation = Orientation {
            transpose: true,
            hmirror: false,
            vflip: false,
        };
        let (out, w, h) = orient(data, 3, 2, 1, orientation);
        assert_eq!((w, h), (2, 3));
        assert_eq!(out, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_orient_mirror_and_flip_is_half_turn() {
        let data = vec![1, 2, 3, 4, 5, 6];
        let (out, w, h) = orient(data, 3, 2, 1, Orientation::from_rotation(crate::types::Rotation::Deg180));
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_grayscale_uses_palette() {
        let mut f = frame(PixFormat::Grayscale, 2, 1, vec![0, 255]);
        let plain = f.to_rgb_image().unwrap();
        assert_eq!(plain.get_pixel(1, 0).0, [255, 255, 255]);

        f.palette = Some(rainbow_palette());
        let colored = f.to_rgb_image().unwrap();
        assert_eq!(colored.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(colored.get_pixel(1, 0).0, [255, 0, 0]);
    }

    #[test]
    fn test_bayer_tile_demosaic() {
        // BGGR: B=10, G=100/100, R=200
        let f = frame(PixFormat::Bayer, 2, 2, vec![10, 100, 100, 200]);
        let img = f.to_rgb_image().unwrap();
        for px in img.pixels() {
            assert_eq!(px.0, [200, 100, 10]);
        }
    }

    #[test]
    fn test_truncated_frame_does_not_render() {
        let f = frame(PixFormat::Rgb565, 4, 4, vec![0; 8]);
        assert!(f.to_rgb_image().is_none());
    }
}
