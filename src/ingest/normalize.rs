//! Camera pixel formats and their conversion to packed RGB.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Capture formats a V4L2 driver may settle on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Planar luma followed by interleaved 2x2-subsampled chroma.
    Nv12,
    /// Packed 4:2:2, two pixels per `Y0 U Y1 V` quad.
    Yuyv,
}

impl PixelFormat {
    pub(crate) const PREFERRED_FOURCC: &'static [u8; 4] = b"RGB3";

    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"NV12" => Some(PixelFormat::Nv12),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    /// Bytes one `width` x `height` frame occupies in this format.
    fn frame_len(self, width: usize, height: usize) -> Option<usize> {
        let pixels = width.checked_mul(height)?;
        match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
            PixelFormat::Yuyv => pixels.checked_mul(2),
        }
    }

    /// Convert one captured buffer. Drivers may hand back padded buffers;
    /// only the leading frame is read.
    pub(crate) fn to_rgb_image(self, buffer: &[u8], width: u32, height: u32) -> Result<RgbImage> {
        let (w, h) = (width as usize, height as usize);
        if self == PixelFormat::Yuyv && w % 2 != 0 {
            return Err(anyhow!("YUYV frames need an even width, got {}", w));
        }
        let len = self
            .frame_len(w, h)
            .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", self))?;
        let data = buffer.get(..len).ok_or_else(|| {
            anyhow!(
                "{:?} frame too short: expected {} bytes, got {}",
                self,
                len,
                buffer.len()
            )
        })?;

        let image = match self {
            PixelFormat::Rgb24 => RgbImage::from_raw(width, height, data.to_vec()),
            PixelFormat::Nv12 => {
                let (luma, chroma) = data.split_at(w * h);
                Some(RgbImage::from_fn(width, height, |x, y| {
                    let (x, y) = (x as usize, y as usize);
                    let uv = (y / 2) * w + (x / 2) * 2;
                    yuv_pixel(luma[y * w + x], chroma[uv], chroma[uv + 1])
                }))
            }
            PixelFormat::Yuyv => Some(RgbImage::from_fn(width, height, |x, y| {
                let quad = (y as usize * w + (x as usize & !1)) * 2;
                let luma = data[quad + (x as usize & 1) * 2];
                yuv_pixel(luma, data[quad + 1], data[quad + 3])
            })),
        };
        image.ok_or_else(|| anyhow!("converted frame has unexpected size"))
    }
}

/// BT.601 full-range YUV to RGB.
fn yuv_pixel(y: u8, u: u8, v: u8) -> image::Rgb<u8> {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    image::Rgb([
        to_channel(y + 1.402 * v),
        to_channel(y - 0.344_136 * u - 0.714_136 * v),
        to_channel(y + 1.772 * u),
    ])
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
