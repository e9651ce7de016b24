//! Raw camera buffers and their conversion to decoded RGBA.

use image::{DynamicImage, RgbaImage};

use crate::types::{FrameSurface, PixelFormat};
use crate::{HuginnError, Result};

/// Tightly packed pixel memory in a native capture encoding.
#[derive(Debug, Clone)]
pub struct RawSurface {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl RawSurface {
    /// Wrap `data`, checking its length against the format.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = format.frame_len(width, height);
        if data.len() != expected {
            return Err(HuginnError::InvalidInput(format!(
                "{format} surface {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A surface filled with one repeated pixel value.
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![value; format.frame_len(width, height)],
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn to_rgba(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut out = Vec::with_capacity(w * h * 4);
        match self.format {
            PixelFormat::Rgba8 => out.extend_from_slice(&self.data),
            PixelFormat::Bgra8 => {
                for px in self.data.chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                }
            }
            PixelFormat::Rgb32 => {
                for px in self.data.chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0], 255]);
                }
            }
            PixelFormat::Rgb8 => {
                for px in self.data.chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            PixelFormat::Gray8 => {
                for &y in &self.data {
                    out.extend_from_slice(&[y, y, y, 255]);
                }
            }
            PixelFormat::Nv12 => {
                let (luma, chroma) = self.data.split_at(w * h);
                let chroma_stride = 2 * w.div_ceil(2);
                for row in 0..h {
                    for col in 0..w {
                        let uv = (row / 2) * chroma_stride + (col / 2) * 2;
                        out.extend_from_slice(&yuv_to_rgba(
                            luma[row * w + col],
                            chroma[uv],
                            chroma[uv + 1],
                        ));
                    }
                }
            }
            PixelFormat::Yuy2 => {
                let stride = w.div_ceil(2) * 4;
                for row in 0..h {
                    for col in 0..w {
                        let pair = row * stride + (col / 2) * 4;
                        let y = self.data[pair + (col % 2) * 2];
                        out.extend_from_slice(&yuv_to_rgba(
                            y,
                            self.data[pair + 1],
                            self.data[pair + 3],
                        ));
                    }
                }
            }
        }
        out
    }
}

/// BT.601 limited-range YUV to RGBA.
fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = (i32::from(y) - 16).max(0);
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
        255,
    ]
}

impl FrameSurface for RawSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn to_image(&self) -> Result<DynamicImage> {
        let buffer = RgbaImage::from_raw(self.width, self.height, self.to_rgba()).ok_or_else(
            || HuginnError::InvalidInput(format!("{} surface has a short buffer", self.format)),
        )?;
        Ok(DynamicImage::ImageRgba8(buffer))
    }
}
