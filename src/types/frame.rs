//! Frames and the pixel containers they carry.
//!
//! A [`Frame`] is owned by whoever produced it until it is handed to a
//! dispatcher. Bindings never take ownership of a frame: decoded pixels are
//! shared through an `Arc`, surface pixels are converted into a fresh image.
//! Frames that came from a bounded pool carry a [`FrameLease`] which returns
//! the buffer when the frame is dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;

use super::feature::PixelFormat;
use crate::{HuginnError, Result};

/// Undecoded pixel memory, e.g. a camera buffer in its native encoding.
pub trait FrameSurface: Send + Sync + fmt::Debug {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn pixel_format(&self) -> PixelFormat;

    /// Convert into a decoded image.
    fn to_image(&self) -> Result<DynamicImage>;
}

/// Pixel payload of a frame.
#[derive(Debug, Clone)]
pub enum FramePixels {
    Decoded(Arc<DynamicImage>),
    Surface(Arc<dyn FrameSurface>),
    Empty,
}

/// Returns a pooled buffer when dropped.
pub struct FrameLease {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl FrameLease {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for FrameLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLease")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// One timestamped frame.
///
/// Deliberately not `Clone`: a pooled frame has exactly one owner, and
/// dropping it releases the pool slot.
#[derive(Debug)]
pub struct Frame {
    pixels: FramePixels,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    timestamp: Duration,
    sequence: u64,
    lease: Option<FrameLease>,
}

impl Frame {
    /// Frame over an already decoded image.
    pub fn from_image(image: DynamicImage) -> Self {
        Self::from_shared(Arc::new(image))
    }

    /// Frame sharing a decoded image with other frames.
    pub fn from_shared(image: Arc<DynamicImage>) -> Self {
        let pixel_format = match image.as_ref() {
            DynamicImage::ImageLuma8(_) => PixelFormat::Gray8,
            DynamicImage::ImageRgb8(_) => PixelFormat::Rgb8,
            _ => PixelFormat::Rgba8,
        };
        Self {
            width: image.width(),
            height: image.height(),
            pixel_format,
            pixels: FramePixels::Decoded(image),
            timestamp: Duration::ZERO,
            sequence: 0,
            lease: None,
        }
    }

    /// Frame over raw surface memory.
    pub fn from_surface(surface: Arc<dyn FrameSurface>) -> Self {
        Self {
            width: surface.width(),
            height: surface.height(),
            pixel_format: surface.pixel_format(),
            pixels: FramePixels::Surface(surface),
            timestamp: Duration::ZERO,
            sequence: 0,
            lease: None,
        }
    }

    /// Frame without pixel data. Binding it fails.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            pixels: FramePixels::Empty,
            width,
            height,
            pixel_format: PixelFormat::Bgra8,
            timestamp: Duration::ZERO,
            sequence: 0,
            lease: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_lease(mut self, lease: FrameLease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn pixels(&self) -> &FramePixels {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.pixels, FramePixels::Empty)
    }

    /// Whether dropping this frame returns a pooled buffer.
    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    /// Decoded pixels for this frame.
    ///
    /// Decoded frames share their image; surfaces are converted into a
    /// new image that does not reference the surface.
    pub fn to_image(&self) -> Result<Arc<DynamicImage>> {
        match &self.pixels {
            FramePixels::Decoded(image) => Ok(Arc::clone(image)),
            FramePixels::Surface(surface) => Ok(Arc::new(surface.to_image()?)),
            FramePixels::Empty => Err(HuginnError::InvalidInput(format!(
                "frame {} carries neither decoded pixels nor a surface",
                self.sequence
            ))),
        }
    }
}
