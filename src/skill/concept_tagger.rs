//! Concept tagging.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::binding::SkillBinding;
use super::traits::{Skill, SkillFactory};
use super::{ensure_can_bind, load_model, run_blocking};
use crate::device::{DeviceKind, ExecutionDevice};
use crate::model::{ConceptModel, ModelLoader};
use crate::postprocess::{TieBreak, deduplicate_by_name, top_k_above_threshold_by};
use crate::types::{ConceptTagScore, FeatureDescriptor, FeatureValue, PixelFormat, SkillDescriptor, SkillVersion};
use crate::{HuginnError, Result};

pub const SKILL_NAME: &str = "ConceptTagger";
pub const INPUT_IMAGE: &str = "InputImage";
pub const OUTPUT_TAGS: &str = "conceptTags";

/// Default number of tags the console program prints.
pub const DEFAULT_TOP_X: usize = 5;
/// Default minimum score for a tag to be printed.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

pub fn descriptor() -> SkillDescriptor {
    SkillDescriptor {
        id: "7d2a3a5c-2f41-4f0e-9c5e-6a1d3c8b9e10".to_string(),
        name: SKILL_NAME.to_string(),
        description: "Infers a set of concept tags and their scores describing the content of an image".to_string(),
        version: SkillVersion::new("huginn", 1, 0),
        inputs: vec![
            FeatureDescriptor::image(INPUT_IMAGE, "the image to tag")
                .with_pixel_format(PixelFormat::Bgra8),
        ],
        outputs: vec![
            FeatureDescriptor::custom(OUTPUT_TAGS, "concept tags with their scores").optional(),
        ],
        supported_kinds: vec![DeviceKind::Cpu, DeviceKind::Gpu],
    }
}

/// Creates concept tagger skills.
pub struct ConceptTaggerFactory {
    descriptor: SkillDescriptor,
    model: Arc<dyn ModelLoader<dyn ConceptModel>>,
}

impl ConceptTaggerFactory {
    pub fn new(model: Arc<dyn ModelLoader<dyn ConceptModel>>) -> Self {
        Self {
            descriptor: descriptor(),
            model,
        }
    }
}

#[async_trait]
impl SkillFactory for ConceptTaggerFactory {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn can_bind(&self, device: &ExecutionDevice) -> bool {
        device.is_bindable()
            && self.descriptor.supports_kind(device.kind())
            && self.model.supports(device)
    }

    #[instrument(skip(self), fields(skill = SKILL_NAME))]
    async fn create_skill(&self, device: ExecutionDevice) -> Result<Arc<dyn Skill>> {
        ensure_can_bind(self, &device)?;
        let model = load_model(&self.model, &device).await?;
        info!(device = %device, "concept tagger ready");
        Ok(Arc::new(ConceptTaggerSkill {
            descriptor: self.descriptor.clone(),
            device,
            model,
        }))
    }
}

pub struct ConceptTaggerSkill {
    descriptor: SkillDescriptor,
    device: ExecutionDevice,
    model: Arc<dyn ConceptModel>,
}

#[async_trait]
impl Skill for ConceptTaggerSkill {
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
        let tags = run_blocking(move || model.tag(&image)).await?;
        binding.set_output(OUTPUT_TAGS, FeatureValue::Tags(tags))?;
        binding.mark_evaluated();
        Ok(())
    }
}

/// Typed view over an evaluated concept tagger binding.
#[derive(Debug, Clone)]
pub struct ConceptTaggerResult {
    tags: Vec<ConceptTagScore>,
}

impl ConceptTaggerResult {
    pub fn from_binding(binding: &SkillBinding) -> Result<Self> {
        let value = binding.output(OUTPUT_TAGS)?;
        let tags = value.as_tags().ok_or_else(|| {
            HuginnError::InvalidInput(format!(
                "output '{OUTPUT_TAGS}' holds {}, not tags",
                value.kind_name()
            ))
        })?;
        Ok(Self::from_tags(tags.to_vec()))
    }

    pub fn from_tags(tags: Vec<ConceptTagScore>) -> Self {
        Self { tags }
    }

    /// Every tag the model produced, in model order.
    pub fn all_tags(&self) -> &[ConceptTagScore] {
        &self.tags
    }

    /// Up to `top_x` tags scoring above `threshold`, best first.
    pub fn top_x_tags_above_threshold(&self, top_x: usize, threshold: f32) -> Vec<ConceptTagScore> {
        self.top_x_tags_above_threshold_by(top_x, threshold, TieBreak::Stable)
    }

    pub fn top_x_tags_above_threshold_by(
        &self,
        top_x: usize,
        threshold: f32,
        tie_break: TieBreak,
    ) -> Vec<ConceptTagScore> {
        top_k_above_threshold_by(&self.tags, top_x, threshold, tie_break)
    }

    /// Tags collapsed to one entry per name, later scores winning.
    pub fn distinct_tags(&self) -> Vec<ConceptTagScore> {
        let mut tags: Vec<ConceptTagScore> =
            deduplicate_by_name(self.tags.iter().cloned()).into_iter().collect();
        tags.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        tags
    }
}
