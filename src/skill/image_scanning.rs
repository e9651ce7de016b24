//! Image scanning: quad detection, perspective rectification and cleaning.
//!
//! The rectifier and cleaner are built in and run on the CPU. The quad
//! detector takes a [`QuadModel`]; [`FixedQuadModel`](crate::model::FixedQuadModel)
//! covers the case where the region is already known.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, info, instrument};

use super::binding::SkillBinding;
use super::traits::{Skill, SkillFactory};
use super::{ensure_can_bind, load_model, run_blocking};
use crate::device::{DeviceKind, ExecutionDevice};
use crate::model::{ModelLoader, QuadModel};
use crate::types::{FeatureDescriptor, FeatureValue, PixelFormat, Quad, SkillDescriptor, SkillVersion};
use crate::{HuginnError, Result};

pub const QUAD_DETECTOR_NAME: &str = "QuadDetector";
pub const IMAGE_RECTIFIER_NAME: &str = "ImageRectifier";
pub const IMAGE_CLEANER_NAME: &str = "ImageCleaner";

pub const INPUT_IMAGE: &str = "InputImage";
pub const INPUT_QUAD: &str = "InputQuad";
pub const INPUT_INTERPOLATION: &str = "InterpolationKind";
pub const INPUT_CLEANING: &str = "ImageCleaningKind";
pub const OUTPUT_QUADS: &str = "DetectedQuads";
pub const OUTPUT_IMAGE: &str = "OutputImage";

/// Mean saturation below which `WhiteboardOrDocument` treats an image as a
/// document.
const DOCUMENT_SATURATION_LIMIT: f32 = 0.12;

/// Largest output (in pixels) still warped at double resolution.
const SUPERSAMPLE_LIMIT: u64 = 4_000_000;

/// Resampling used when rectifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageInterpolationKind {
    #[default]
    Bilinear,
    Bicubic,
    HighQuality,
}

impl ImageInterpolationKind {
    pub const ALL: [Self; 3] = [Self::Bilinear, Self::Bicubic, Self::HighQuality];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bilinear => "Bilinear",
            Self::Bicubic => "Bicubic",
            Self::HighQuality => "HighQuality",
        }
    }
}

impl fmt::Display for ImageInterpolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageInterpolationKind {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| HuginnError::InvalidInput(format!("unknown interpolation '{s}'")))
    }
}

/// Cleaning preset applied after rectification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageCleaningKind {
    /// Pick `Whiteboard` or `Document` from the image content.
    #[default]
    WhiteboardOrDocument,
    Whiteboard,
    Document,
    Picture,
}

impl ImageCleaningKind {
    pub const ALL: [Self; 4] = [
        Self::WhiteboardOrDocument,
        Self::Whiteboard,
        Self::Document,
        Self::Picture,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::WhiteboardOrDocument => "WhiteboardOrDocument",
            Self::Whiteboard => "Whiteboard",
            Self::Document => "Document",
            Self::Picture => "Picture",
        }
    }
}

impl fmt::Display for ImageCleaningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageCleaningKind {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| HuginnError::InvalidInput(format!("unknown cleaning preset '{s}'")))
    }
}

fn image_input() -> FeatureDescriptor {
    FeatureDescriptor::image(INPUT_IMAGE, "the image to process").with_pixel_format(PixelFormat::Bgra8)
}

fn image_output() -> FeatureDescriptor {
    FeatureDescriptor::image(OUTPUT_IMAGE, "the processed image").optional()
}

pub fn quad_detector_descriptor() -> SkillDescriptor {
    SkillDescriptor {
        id: "0e6f2c1d-4a7b-4b8e-a3c9-9d1e5f7a2b80".to_string(),
        name: QUAD_DETECTOR_NAME.to_string(),
        description: "Finds the corners of a document or whiteboard in an image".to_string(),
        version: SkillVersion::new("huginn", 1, 0),
        inputs: vec![image_input()],
        outputs: vec![FeatureDescriptor::custom(OUTPUT_QUADS, "detected quads").optional()],
        supported_kinds: vec![DeviceKind::Cpu, DeviceKind::Gpu],
    }
}

pub fn image_rectifier_descriptor() -> SkillDescriptor {
    SkillDescriptor {
        id: "5b9d3e7f-6c2a-4f1b-8e4d-2a7c9b0f3e15".to_string(),
        name: IMAGE_RECTIFIER_NAME.to_string(),
        description: "Crops a quad out of an image and warps it into a rectangle".to_string(),
        version: SkillVersion::new("huginn", 1, 0),
        inputs: vec![
            image_input(),
            FeatureDescriptor::custom(INPUT_QUAD, "the quad to rectify"),
            FeatureDescriptor::custom(INPUT_INTERPOLATION, "resampling used while warping")
                .optional(),
        ],
        outputs: vec![image_output()],
        supported_kinds: vec![DeviceKind::Cpu],
    }
}

pub fn image_cleaner_descriptor() -> SkillDescriptor {
    SkillDescriptor {
        id: "9a4c6e8b-3d5f-4a2c-b7e1-6f0d8c2a4b97".to_string(),
        name: IMAGE_CLEANER_NAME.to_string(),
        description: "Enhances a scanned image for legibility".to_string(),
        version: SkillVersion::new("huginn", 1, 0),
        inputs: vec![
            image_input(),
            FeatureDescriptor::custom(INPUT_CLEANING, "cleaning preset").optional(),
        ],
        outputs: vec![image_output()],
        supported_kinds: vec![DeviceKind::Cpu],
    }
}

// ============================================================================
// Quad detector
// ============================================================================

pub struct QuadDetectorFactory {
    descriptor: SkillDescriptor,
    model: Arc<dyn ModelLoader<dyn QuadModel>>,
}

impl QuadDetectorFactory {
    pub fn new(model: Arc<dyn ModelLoader<dyn QuadModel>>) -> Self {
        Self {
            descriptor: quad_detector_descriptor(),
            model,
        }
    }
}

#[async_trait]
impl SkillFactory for QuadDetectorFactory {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn can_bind(&self, device: &ExecutionDevice) -> bool {
        device.is_bindable()
            && self.descriptor.supports_kind(device.kind())
            && self.model.supports(device)
    }

    #[instrument(skip(self), fields(skill = QUAD_DETECTOR_NAME))]
    async fn create_skill(&self, device: ExecutionDevice) -> Result<Arc<dyn Skill>> {
        ensure_can_bind(self, &device)?;
        let model = load_model(&self.model, &device).await?;
        info!(device = %device, "quad detector ready");
        Ok(Arc::new(QuadDetectorSkill {
            descriptor: self.descriptor.clone(),
            device,
            model,
        }))
    }
}

pub struct QuadDetectorSkill {
    descriptor: SkillDescriptor,
    device: ExecutionDevice,
    model: Arc<dyn QuadModel>,
}

#[async_trait]
impl Skill for QuadDetectorSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    async fn evaluate(&self, binding: &mut SkillBinding) -> Result<()> {
        binding.ensure_owner(&self.descriptor)?;
        let image = binding.input_image(INPUT_IMAGE)?;
        let model = Arc::clone(&self.model);
        let quads = run_blocking(move || model.detect_quads(&image)).await?;
        debug!(count = quads.len(), "detected quads");
        binding.set_output(OUTPUT_QUADS, FeatureValue::Quads(quads))?;
        binding.mark_evaluated();
        Ok(())
    }
}

/// Quads read from an evaluated quad detector binding.
pub fn detected_quads(binding: &SkillBinding) -> Result<Vec<Quad>> {
    let value = binding.output(OUTPUT_QUADS)?;
    value.as_quads().map(<[Quad]>::to_vec).ok_or_else(|| {
        HuginnError::InvalidInput(format!(
            "output '{OUTPUT_QUADS}' holds {}, not quads",
            value.kind_name()
        ))
    })
}

/// Processed image read from an evaluated rectifier or cleaner binding.
pub fn output_image(binding: &SkillBinding) -> Result<Arc<DynamicImage>> {
    let value = binding.output(OUTPUT_IMAGE)?;
    value.as_image().cloned().ok_or_else(|| {
        HuginnError::InvalidInput(format!(
            "output '{OUTPUT_IMAGE}' holds {}, not an image",
            value.kind_name()
        ))
    })
}

// ============================================================================
// Built-in CPU skills
// ============================================================================

/// Which built-in operation a [`BuiltinFactory`] creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Rectifier,
    Cleaner,
}

/// Factory for the built-in rectifier or cleaner.
pub struct BuiltinFactory {
    descriptor: SkillDescriptor,
    builtin: Builtin,
}

impl BuiltinFactory {
    pub fn rectifier() -> Self {
        Self {
            descriptor: image_rectifier_descriptor(),
            builtin: Builtin::Rectifier,
        }
    }

    pub fn cleaner() -> Self {
        Self {
            descriptor: image_cleaner_descriptor(),
            builtin: Builtin::Cleaner,
        }
    }
}

#[async_trait]
impl SkillFactory for BuiltinFactory {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn create_skill(&self, device: ExecutionDevice) -> Result<Arc<dyn Skill>> {
        ensure_can_bind(self, &device)?;
        Ok(Arc::new(BuiltinSkill {
            descriptor: self.descriptor.clone(),
            device,
            builtin: self.builtin,
        }))
    }
}

pub struct BuiltinSkill {
    descriptor: SkillDescriptor,
    device: ExecutionDevice,
    builtin: Builtin,
}

#[async_trait]
impl Skill for BuiltinSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    async fn evaluate(&self, binding: &mut SkillBinding) -> Result<()> {
        binding.ensure_owner(&self.descriptor)?;
        let image = binding.input_image(INPUT_IMAGE)?;

        let output = match self.builtin {
            Builtin::Rectifier => {
                let quad = match binding.input(INPUT_QUAD) {
                    Some(FeatureValue::Quads(quads)) => quads.first().copied().ok_or_else(|| {
                        HuginnError::InvalidInput(format!("input '{INPUT_QUAD}' is empty"))
                    })?,
                    Some(other) => {
                        return Err(HuginnError::InvalidInput(format!(
                            "input '{INPUT_QUAD}' holds {}, not quads",
                            other.kind_name()
                        )));
                    }
                    None => {
                        return Err(HuginnError::InvalidInput(format!(
                            "input '{INPUT_QUAD}' is not bound"
                        )));
                    }
                };
                let interpolation = text_parameter(binding, INPUT_INTERPOLATION)?;
                run_blocking(move || rectify(&image, &quad, interpolation)).await?
            }
            Builtin::Cleaner => {
                let kind = text_parameter(binding, INPUT_CLEANING)?;
                run_blocking(move || Ok(clean(&image, kind))).await?
            }
        };

        binding.set_output(OUTPUT_IMAGE, FeatureValue::Image(Arc::new(output)))?;
        binding.mark_evaluated();
        Ok(())
    }
}

/// Parse an enum parameter bound as text, falling back to its default.
fn text_parameter<T>(binding: &SkillBinding, name: &str) -> Result<T>
where
    T: FromStr<Err = HuginnError> + Default,
{
    match binding.input(name) {
        None => Ok(T::default()),
        Some(FeatureValue::Text(text)) => text.parse(),
        Some(other) => Err(HuginnError::InvalidInput(format!(
            "input '{name}' holds {}, not text",
            other.kind_name()
        ))),
    }
}

/// Bind an interpolation kind into a rectifier binding.
pub fn set_interpolation(binding: &mut SkillBinding, kind: ImageInterpolationKind) -> Result<()> {
    binding.set_parameter(INPUT_INTERPOLATION, FeatureValue::Text(kind.name().to_string()))
}

/// Bind a cleaning preset into a cleaner binding.
pub fn set_cleaning_kind(binding: &mut SkillBinding, kind: ImageCleaningKind) -> Result<()> {
    binding.set_parameter(INPUT_CLEANING, FeatureValue::Text(kind.name().to_string()))
}

/// Bind the quad to rectify.
pub fn set_quad(binding: &mut SkillBinding, quad: Quad) -> Result<()> {
    binding.set_parameter(INPUT_QUAD, FeatureValue::Quads(vec![quad]))
}

// ============================================================================
// Rectification
// ============================================================================

/// Warp the region inside `quad` into an upright rectangle.
///
/// The output size follows the longer of each pair of opposite edges.
pub fn rectify(
    image: &DynamicImage,
    quad: &Quad,
    interpolation: ImageInterpolationKind,
) -> Result<DynamicImage> {
    let (w, h) = (image.width() as f64, image.height() as f64);
    let corners = quad.points.map(|p| (f64::from(p.x) * w, f64::from(p.y) * h));
    let dist = |a: (f64, f64), b: (f64, f64)| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();

    let out_w = dist(corners[0], corners[1]).max(dist(corners[3], corners[2])).round() as u32;
    let out_h = dist(corners[0], corners[3]).max(dist(corners[1], corners[2])).round() as u32;
    if out_w == 0 || out_h == 0 {
        return Err(HuginnError::InvalidInput("quad encloses no pixels".to_string()));
    }

    // Smoother filters warp at a higher resolution first, then downsample.
    let supersample = if u64::from(out_w) * u64::from(out_h) <= SUPERSAMPLE_LIMIT { 2 } else { 1 };
    let source = image.to_rgba8();
    let rectified = match interpolation {
        ImageInterpolationKind::Bilinear => warp(&source, &corners, out_w, out_h)?,
        ImageInterpolationKind::Bicubic => {
            let large = warp(&source, &corners, out_w * supersample, out_h * supersample)?;
            image::imageops::resize(&large, out_w, out_h, FilterType::CatmullRom)
        }
        ImageInterpolationKind::HighQuality => {
            let large = warp(&source, &corners, out_w * supersample, out_h * supersample)?;
            image::imageops::resize(&large, out_w, out_h, FilterType::Lanczos3)
        }
    };
    Ok(DynamicImage::ImageRgba8(rectified))
}

fn warp(source: &RgbaImage, corners: &[(f64, f64); 4], width: u32, height: u32) -> Result<RgbaImage> {
    let (w, h) = (f64::from(width), f64::from(height));
    let target = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let homography = solve_homography(&target, corners)
        .ok_or_else(|| HuginnError::InvalidInput("quad is degenerate".to_string()))?;

    Ok(RgbaImage::from_fn(width, height, |u, v| {
        let (x, y) = project(&homography, f64::from(u) + 0.5, f64::from(v) + 0.5);
        sample_bilinear(source, x - 0.5, y - 0.5)
    }))
}

/// Homography mapping each `from` point onto the matching `to` point.
fn solve_homography(from: &[(f64, f64); 4], to: &[(f64, f64); 4]) -> Option<[f64; 8]> {
    let mut m = [[0.0f64; 9]; 8];
    for i in 0..4 {
        let (u, v) = from[i];
        let (x, y) = to[i];
        m[2 * i] = [u, v, 1.0, 0.0, 0.0, 0.0, -u * x, -v * x, x];
        m[2 * i + 1] = [0.0, 0.0, 0.0, u, v, 1.0, -u * y, -v * y, y];
    }

    for col in 0..8 {
        let pivot = (col..8).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        for row in 0..8 {
            if row != col {
                let factor = m[row][col] / m[col][col];
                for k in col..9 {
                    m[row][k] -= factor * m[col][k];
                }
            }
        }
    }

    let mut h = [0.0; 8];
    for (i, value) in h.iter_mut().enumerate() {
        *value = m[i][8] / m[i][i];
    }
    Some(h)
}

fn project(h: &[f64; 8], u: f64, v: f64) -> (f64, f64) {
    let d = h[6] * u + h[7] * v + 1.0;
    ((h[0] * u + h[1] * v + h[2]) / d, (h[3] * u + h[4] * v + h[5]) / d)
}

fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let max_x = f64::from(image.width() - 1);
    let max_y = f64::from(image.height() - 1);
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let (fx, fy) = (x - f64::from(x0), y - f64::from(y0));

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = f64::from(p00[c]) * (1.0 - fx) + f64::from(p10[c]) * fx;
        let bottom = f64::from(p01[c]) * (1.0 - fx) + f64::from(p11[c]) * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

// ============================================================================
// Cleaning
// ============================================================================

/// Apply a cleaning preset.
pub fn clean(image: &DynamicImage, kind: ImageCleaningKind) -> DynamicImage {
    match resolve_cleaning(image, kind) {
        ImageCleaningKind::Document => image.grayscale().adjust_contrast(60.0).unsharpen(1.0, 4),
        ImageCleaningKind::Picture => image.unsharpen(1.5, 3).adjust_contrast(10.0),
        // Whiteboard; WhiteboardOrDocument never survives resolution.
        _ => image.adjust_contrast(30.0).brighten(20),
    }
}

/// Replace `WhiteboardOrDocument` with the preset the content calls for.
pub fn resolve_cleaning(image: &DynamicImage, kind: ImageCleaningKind) -> ImageCleaningKind {
    if kind != ImageCleaningKind::WhiteboardOrDocument {
        return kind;
    }
    if mean_saturation(image) < DOCUMENT_SATURATION_LIMIT {
        ImageCleaningKind::Document
    } else {
        ImageCleaningKind::Whiteboard
    }
}

fn mean_saturation(image: &DynamicImage) -> f32 {
    let small = image.thumbnail(64, 64).to_rgb8();
    let count = small.pixels().len();
    if count == 0 {
        return 0.0;
    }
    let total: f32 = small
        .pixels()
        .map(|p| {
            let max = p.0.iter().copied().max().unwrap_or(0);
            let min = p.0.iter().copied().min().unwrap_or(0);
            if max == 0 {
                0.0
            } else {
                f32::from(max - min) / f32::from(max)
            }
        })
        .sum();
    total / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    #[test]
    fn homography_maps_corners() {
        let from = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        let to = [(2.0, 1.0), (12.0, 3.0), (11.0, 14.0), (1.0, 12.0)];
        let h = solve_homography(&from, &to).unwrap();
        for (f, t) in from.iter().zip(to.iter()) {
            let (x, y) = project(&h, f.0, f.1);
            assert!((x - t.0).abs() < 1e-6 && (y - t.1).abs() < 1e-6);
        }
    }

    #[test]
    fn degenerate_quad_is_rejected() {
        let image = DynamicImage::new_rgb8(10, 10);
        let p = Point::new(0.5, 0.5);
        let quad = Quad::new([p, p, p, p]);
        assert!(rectify(&image, &quad, ImageInterpolationKind::Bilinear).is_err());
    }

    #[test]
    fn gray_content_resolves_to_document() {
        let gray = DynamicImage::new_luma8(16, 16).to_rgb8();
        let image = DynamicImage::ImageRgb8(gray);
        assert_eq!(
            resolve_cleaning(&image, ImageCleaningKind::WhiteboardOrDocument),
            ImageCleaningKind::Document
        );
    }

    #[test]
    fn explicit_preset_is_kept() {
        let image = DynamicImage::new_rgb8(4, 4);
        assert_eq!(
            resolve_cleaning(&image, ImageCleaningKind::Picture),
            ImageCleaningKind::Picture
        );
    }
}
