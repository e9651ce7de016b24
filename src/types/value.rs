//! Values stored in a skill binding.

use std::sync::Arc;

use image::DynamicImage;

use super::detection::{ConceptTagScore, DetectedObject, Quad, SkeletonBody};

/// A bound feature value.
#[derive(Debug, Clone)]
pub enum FeatureValue {
    Image(Arc<DynamicImage>),
    TensorFloat { shape: Vec<usize>, data: Vec<f32> },
    Tags(Vec<ConceptTagScore>),
    Objects(Vec<DetectedObject>),
    Bodies(Vec<SkeletonBody>),
    Quads(Vec<Quad>),
    Text(String),
}

impl FeatureValue {
    /// Tensor of the given shape filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::TensorFloat {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// Short variant name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::TensorFloat { .. } => "tensor",
            Self::Tags(_) => "tags",
            Self::Objects(_) => "objects",
            Self::Bodies(_) => "bodies",
            Self::Quads(_) => "quads",
            Self::Text(_) => "text",
        }
    }

    pub fn as_image(&self) -> Option<&Arc<DynamicImage>> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&[f32]> {
        match self {
            Self::TensorFloat { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_tags(&self) -> Option<&[ConceptTagScore]> {
        match self {
            Self::Tags(tags) => Some(tags),
            _ => None,
        }
    }

    pub fn as_objects(&self) -> Option<&[DetectedObject]> {
        match self {
            Self::Objects(objects) => Some(objects),
            _ => None,
        }
    }

    pub fn as_bodies(&self) -> Option<&[SkeletonBody]> {
        match self {
            Self::Bodies(bodies) => Some(bodies),
            _ => None,
        }
    }

    pub fn as_quads(&self) -> Option<&[Quad]> {
        match self {
            Self::Quads(quads) => Some(quads),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}
