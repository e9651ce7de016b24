//! Detection result types.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HuginnError, Result};

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rectangle with edges normalised to `[0, 1]` of the frame size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Normalised face location. All zeros means no face was found.
pub type FaceRectangle = NormalizedRect;

impl NormalizedRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rebuild from a `[left, top, right, bottom]` tensor.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        match values {
            [left, top, right, bottom] => Ok(Self::new(*left, *top, *right, *bottom)),
            _ => Err(HuginnError::InvalidInput(format!(
                "rectangle needs 4 values, got {}",
                values.len()
            ))),
        }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.left, self.top, self.right, self.bottom]
    }

    /// True when every edge is zero.
    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|&v| v == 0.0)
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another rectangle.
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = Self::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    /// Scale to pixel coordinates of a `width` x `height` frame.
    pub fn to_pixels(&self, width: u32, height: u32) -> BoundingBox {
        let clamp = |v: f32| v.clamp(0.0, 1.0);
        let x0 = (clamp(self.left) * width as f32).round() as u32;
        let y0 = (clamp(self.top) * height as f32).round() as u32;
        let x1 = (clamp(self.right) * width as f32).round() as u32;
        let y1 = (clamp(self.bottom) * height as f32).round() as u32;
        BoundingBox::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// A concept tag with its confidence.
///
/// Identity is the tag name alone: two tags with the same name are equal
/// whatever their scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptTagScore {
    pub name: String,
    pub score: f32,
}

impl ConceptTagScore {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

impl PartialEq for ConceptTagScore {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ConceptTagScore {}

impl Hash for ConceptTagScore {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// One detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub kind: String,
    pub bounds: NormalizedRect,
    pub score: f32,
}

/// A skeletal joint in normalised coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub label: String,
    pub x: f32,
    pub y: f32,
}

/// Segment between two joints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limb {
    pub joint1: Joint,
    pub joint2: Joint,
}

/// One detected body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkeletonBody {
    pub limbs: Vec<Limb>,
}

/// Normalised point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Four corners in normalised coordinates: top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub points: [Point; 4],
}

impl Quad {
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// The whole frame.
    pub fn full_frame() -> Self {
        Self::new([
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ])
    }

    /// Smallest normalised rectangle containing all corners.
    pub fn bounding_rect(&self) -> NormalizedRect {
        let xs = self.points.map(|p| p.x);
        let ys = self.points.map(|p| p.y);
        NormalizedRect::new(
            xs.iter().copied().fold(f32::INFINITY, f32::min),
            ys.iter().copied().fold(f32::INFINITY, f32::min),
            xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        )
    }
}

impl FromStr for Quad {
    type Err = HuginnError;

    /// Parse eight comma-separated normalised coordinates, `x1,y1,...,x4,y4`.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| HuginnError::InvalidInput(format!("invalid quad '{s}': {e}")))?;
        if values.len() != 8 {
            return Err(HuginnError::InvalidInput(format!(
                "quad needs 8 coordinates, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(HuginnError::InvalidInput(format!(
                "quad coordinates must lie in [0, 1]: '{s}'"
            )));
        }
        Ok(Self::new([
            Point::new(values[0], values[1]),
            Point::new(values[2], values[3]),
            Point::new(values[4], values[5]),
            Point::new(values[6], values[7]),
        ]))
    }
}

/// Facial sentiment classes, in score index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentType {
    Neutral,
    Happiness,
    Surprise,
    Sadness,
    Anger,
    Disgust,
    Fear,
    Contempt,
}

impl SentimentType {
    pub const ALL: [SentimentType; 8] = [
        Self::Neutral,
        Self::Happiness,
        Self::Surprise,
        Self::Sadness,
        Self::Anger,
        Self::Disgust,
        Self::Fear,
        Self::Contempt,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happiness => "happiness",
            Self::Surprise => "surprise",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Disgust => "disgust",
            Self::Fear => "fear",
            Self::Contempt => "contempt",
        }
    }
}

impl fmt::Display for SentimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
