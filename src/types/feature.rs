//! Feature descriptors: the named inputs and outputs a skill declares.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HuginnError, Result};

/// What kind of value a feature carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// A decoded image.
    Image,
    /// A flat float tensor with a declared shape.
    Tensor,
    /// A skill-specific structured value (tags, detections, enum parameters).
    Custom,
}

/// Pixel encodings a frame or capture stream may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
    Rgb8,
    /// 32-bit BGRX, alpha byte ignored.
    Rgb32,
    /// Planar Y followed by interleaved UV at quarter resolution.
    Nv12,
    /// Packed 4:2:2, `Y0 U Y1 V`.
    Yuy2,
    Gray8,
}

impl PixelFormat {
    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bgra8 => "bgra8",
            Self::Rgba8 => "rgba8",
            Self::Rgb8 => "rgb8",
            Self::Rgb32 => "rgb32",
            Self::Nv12 => "nv12",
            Self::Yuy2 => "yuy2",
            Self::Gray8 => "gray8",
        }
    }

    /// Number of bytes a tightly packed `width` x `height` frame occupies.
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Bgra8 | Self::Rgba8 | Self::Rgb32 => w * h * 4,
            Self::Rgb8 => w * h * 3,
            Self::Gray8 => w * h,
            Self::Nv12 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
            Self::Yuy2 => w.div_ceil(2) * 4 * h,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bgra8" => Ok(Self::Bgra8),
            "rgba8" => Ok(Self::Rgba8),
            "rgb8" => Ok(Self::Rgb8),
            "rgb32" => Ok(Self::Rgb32),
            "nv12" => Ok(Self::Nv12),
            "yuy2" => Ok(Self::Yuy2),
            "gray8" => Ok(Self::Gray8),
            other => Err(HuginnError::InvalidInput(format!(
                "unknown pixel format '{other}'"
            ))),
        }
    }
}

/// Metadata for one skill input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    pub description: String,
    pub kind: FeatureKind,
    /// Tensor shape; `-1` marks a free dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<i64>>,
    /// Preferred pixel encoding for image features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<PixelFormat>,
    /// Preferred image size for image features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<(u32, u32)>,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FeatureDescriptor {
    fn new(name: impl Into<String>, description: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            shape: None,
            pixel_format: None,
            size: None,
            required: true,
        }
    }

    /// Image feature.
    pub fn image(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, FeatureKind::Image)
    }

    /// Float tensor feature with the given shape.
    pub fn tensor(
        name: impl Into<String>,
        description: impl Into<String>,
        shape: impl Into<Vec<i64>>,
    ) -> Self {
        let mut descriptor = Self::new(name, description, FeatureKind::Tensor);
        descriptor.shape = Some(shape.into());
        descriptor
    }

    /// Skill-specific structured feature.
    pub fn custom(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, FeatureKind::Custom)
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Number of elements a tensor with this shape holds, if fully fixed.
    pub fn element_count(&self) -> Option<usize> {
        let shape = self.shape.as_ref()?;
        shape.iter().try_fold(1usize, |acc, &dim| {
            usize::try_from(dim).ok().map(|d| acc * d)
        })
    }
}
