//! Inference contracts and model loading.
//!
//! Skills never run a model directly. They hold trait objects implementing
//! the contracts below, obtained from a [`ModelLoader`] for the device the
//! skill was created on. All contract methods are synchronous and may be
//! slow; skills call them from the blocking pool.

#[cfg(feature = "local-inference")]
pub mod manager;
#[cfg(feature = "local-inference")]
pub mod onnx;
#[cfg(feature = "local-inference")]
pub mod source;

mod classifier;

pub use classifier::LabelledClassifier;
#[cfg(feature = "local-inference")]
pub use manager::{ModelManager, ModelManagerConfig};
#[cfg(feature = "local-inference")]
pub use source::ModelSource;

use std::sync::Arc;

use image::DynamicImage;

use crate::Result;
use crate::device::{DeviceKind, ExecutionDevice};
use crate::types::{BoundingBox, ConceptTagScore, DetectedObject, Quad, SkeletonBody};

/// Locates faces. Boxes come back in pixel coordinates, best first.
pub trait FaceDetector: Send + Sync {
    fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>>;
}

/// Produces raw (unnormalised) class scores for a whole image.
pub trait ScoreModel: Send + Sync {
    fn score(&self, image: &DynamicImage) -> Result<Vec<f32>>;
}

/// Produces concept tags for an image.
pub trait ConceptModel: Send + Sync {
    fn tag(&self, image: &DynamicImage) -> Result<Vec<ConceptTagScore>>;
}

/// Detects objects.
pub trait ObjectModel: Send + Sync {
    fn detect_objects(&self, image: &DynamicImage) -> Result<Vec<DetectedObject>>;
}

/// Detects skeletal bodies.
pub trait PoseModel: Send + Sync {
    fn detect_bodies(&self, image: &DynamicImage) -> Result<Vec<SkeletonBody>>;
}

/// Detects document or whiteboard quads.
pub trait QuadModel: Send + Sync {
    fn detect_quads(&self, image: &DynamicImage) -> Result<Vec<Quad>>;
}

/// Loads a model for a specific execution device.
pub trait ModelLoader<M: ?Sized>: Send + Sync {
    /// Whether `load` can target this device.
    fn supports(&self, device: &ExecutionDevice) -> bool;

    /// Load (or fetch from cache) the model for `device`. May block.
    fn load(&self, device: &ExecutionDevice) -> Result<Arc<M>>;
}

/// Loader handing out an already constructed model.
///
/// Supports the CPU unless told otherwise; useful for built-in models and
/// for tests.
pub struct SharedModel<M: ?Sized> {
    model: Arc<M>,
    kinds: Vec<DeviceKind>,
}

impl<M: ?Sized> SharedModel<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            kinds: vec![DeviceKind::Cpu],
        }
    }

    pub fn with_kinds(mut self, kinds: impl Into<Vec<DeviceKind>>) -> Self {
        self.kinds = kinds.into();
        self
    }
}

impl<M: ?Sized + Send + Sync> ModelLoader<M> for SharedModel<M> {
    fn supports(&self, device: &ExecutionDevice) -> bool {
        device.is_bindable() && self.kinds.contains(&device.kind())
    }

    fn load(&self, _device: &ExecutionDevice) -> Result<Arc<M>> {
        Ok(Arc::clone(&self.model))
    }
}

/// Quad model that always reports one fixed quad.
///
/// Stands in for a learned detector when the caller already knows the
/// region, or wants the whole frame.
#[derive(Debug, Clone, Copy)]
pub struct FixedQuadModel {
    quad: Quad,
}

impl FixedQuadModel {
    pub fn new(quad: Quad) -> Self {
        Self { quad }
    }

    pub fn full_frame() -> Self {
        Self::new(Quad::full_frame())
    }
}

impl QuadModel for FixedQuadModel {
    fn detect_quads(&self, _image: &DynamicImage) -> Result<Vec<Quad>> {
        Ok(vec![self.quad])
    }
}
