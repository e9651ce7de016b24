//! Huginn - vision skill execution pipeline
//!
//! This crate runs vision "skills" (face sentiment, concept tagging,
//! object detection, image scanning) over still images and live frame
//! streams. A skill is described by a [`SkillDescriptor`], created on one
//! [`ExecutionDevice`] by its [`SkillFactory`], and evaluated against a
//! reusable [`SkillBinding`]. Live sources feed a [`FrameDispatcher`]
//! that keeps at most one evaluation in flight and always works on the
//! newest frame.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use huginn::skill::face_sentiment::{FaceSentimentFactory, FaceSentimentResult};
//! use huginn::model::{FaceDetector, ModelLoader, ScoreModel};
//! use huginn::{DeviceRegistry, Frame, Skill, SkillFactory, bind_and_evaluate, select_device};
//!
//! async fn sentiment(
//!     detector: Arc<dyn ModelLoader<dyn FaceDetector>>,
//!     scorer: Arc<dyn ModelLoader<dyn ScoreModel>>,
//!     image: image::DynamicImage,
//! ) -> huginn::Result<()> {
//!     let factory = FaceSentimentFactory::new(detector, scorer);
//!     let registry = DeviceRegistry::new();
//!     let device = select_device(&factory, &registry, None)?;
//!     let skill = factory.create_skill(device).await?;
//!
//!     let mut binding = skill.create_binding();
//!     bind_and_evaluate(skill.as_ref(), &mut binding, &Frame::from_image(image)).await?;
//!
//!     let result = FaceSentimentResult::from_binding(&binding)?;
//!     match result.predominant_sentiment() {
//!         Some(sentiment) => println!("Your sentiment looks like: {sentiment}"),
//!         None => println!("No face found"),
//!     }
//!     Ok(())
//! }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod output;
pub mod postprocess;
pub mod skill;
pub mod source;
pub mod telemetry;
pub mod types;
mod version;

// Re-export main types at crate root
pub use device::{DeviceKind, DeviceRegistry, ExecutionDevice};
pub use dispatch::{DispatchReport, DispatchStats, FrameDispatcher, FrameSink};
pub use error::{HuginnError, Result};
pub use skill::{
    BindingState, Skill, SkillBinding, SkillFactory, SkillRegistry, Timings, bind_and_evaluate,
    select_device,
};
pub use source::{FrameSource, SourceKind, SourceState, open_file_source};
pub use version::{
    BUILD_TIMESTAMP, GIT_BRANCH, GIT_SHA, PKG_VERSION, git_dirty, long_version, version_string,
};

// Re-export all types
pub use types::{
    BoundingBox, ConceptTagScore, DetectedObject, FaceRectangle, FeatureDescriptor, FeatureKind,
    FeatureValue, Frame, PixelFormat, Quad, SentimentType, SkeletonBody, SkillDescriptor,
};
