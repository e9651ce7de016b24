//! Core data types shared by skills, sources and the dispatcher.

pub mod descriptor;
pub mod detection;
pub mod feature;
pub mod frame;
pub mod value;

pub use descriptor::{SkillDescriptor, SkillVersion};
pub use detection::{
    BoundingBox, ConceptTagScore, DetectedObject, FaceRectangle, Joint, Limb, NormalizedRect,
    Point, Quad, SentimentType, SkeletonBody,
};
pub use feature::{FeatureDescriptor, FeatureKind, PixelFormat};
pub use frame::{Frame, FrameLease, FramePixels, FrameSurface};
pub use value::FeatureValue;
