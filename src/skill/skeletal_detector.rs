//! Skeletal (pose) detection.
//!
//! No pose backend ships with the crate; callers supply a [`PoseModel`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::binding::SkillBinding;
use super::traits::{Skill, SkillFactory};
use super::{ensure_can_bind, load_model, run_blocking};
use crate::device::{DeviceKind, ExecutionDevice};
use crate::model::{ModelLoader, PoseModel};
use crate::types::{FeatureDescriptor, FeatureValue, PixelFormat, SkeletonBody, SkillDescriptor, SkillVersion};
use crate::{HuginnError, Result};

pub const SKILL_NAME: &str = "SkeletalDetector";
pub const INPUT_IMAGE: &str = "InputImage";
pub const OUTPUT_BODIES: &str = "bodies";

pub fn descriptor() -> SkillDescriptor {
    SkillDescriptor {
        id: "c2e85a7d-1b39-4f62-9d0e-5a8f3b6c7d24".to_string(),
        name: SKILL_NAME.to_string(),
        description: "Detects human bodies and the position of their joints and limbs".to_string(),
        version: SkillVersion::new("huginn", 1, 0),
        inputs: vec![
            FeatureDescriptor::image(INPUT_IMAGE, "the image to run pose detection on")
                .with_pixel_format(PixelFormat::Bgra8),
        ],
        outputs: vec![FeatureDescriptor::custom(OUTPUT_BODIES, "detected bodies").optional()],
        supported_kinds: vec![DeviceKind::Cpu, DeviceKind::Gpu, DeviceKind::Vpu],
    }
}

/// Creates skeletal detector skills.
pub struct SkeletalDetectorFactory {
    descriptor: SkillDescriptor,
    model: Arc<dyn ModelLoader<dyn PoseModel>>,
}

impl SkeletalDetectorFactory {
    pub fn new(model: Arc<dyn ModelLoader<dyn PoseModel>>) -> Self {
        Self {
            descriptor: descriptor(),
            model,
        }
    }
}

#[async_trait]
impl SkillFactory for SkeletalDetectorFactory {
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
        info!(device = %device, "skeletal detector ready");
        Ok(Arc::new(SkeletalDetectorSkill {
            descriptor: self.descriptor.clone(),
            device,
            model,
        }))
    }
}

pub struct SkeletalDetectorSkill {
    descriptor: SkillDescriptor,
    device: ExecutionDevice,
    model: Arc<dyn PoseModel>,
}

#[async_trait]
impl Skill for SkeletalDetectorSkill {
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
        let bodies = run_blocking(move || model.detect_bodies(&image)).await?;
        binding.set_output(OUTPUT_BODIES, FeatureValue::Bodies(bodies))?;
        binding.mark_evaluated();
        Ok(())
    }
}

/// Typed view over an evaluated skeletal detector binding.
#[derive(Debug, Clone, Default)]
pub struct SkeletalDetectorResult {
    pub bodies: Vec<SkeletonBody>,
}

impl SkeletalDetectorResult {
    pub fn from_binding(binding: &SkillBinding) -> Result<Self> {
        let value = binding.output(OUTPUT_BODIES)?;
        let bodies = value.as_bodies().ok_or_else(|| {
            HuginnError::InvalidInput(format!(
                "output '{OUTPUT_BODIES}' holds {}, not bodies",
                value.kind_name()
            ))
        })?;
        Ok(Self {
            bodies: bodies.to_vec(),
        })
    }

    pub fn summary(&self) -> String {
        match self.bodies.len() {
            0 => "No body found".to_string(),
            1 => "Found 1 body".to_string(),
            n => format!("Found {n} bodies"),
        }
    }
}
