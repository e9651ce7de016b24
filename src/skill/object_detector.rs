//! Object detection.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::binding::SkillBinding;
use super::traits::{Skill, SkillFactory};
use super::{ensure_can_bind, load_model, run_blocking};
use crate::device::{DeviceKind, ExecutionDevice};
use crate::model::{ModelLoader, ObjectModel};
use crate::types::{DetectedObject, FeatureDescriptor, FeatureValue, PixelFormat, SkillDescriptor, SkillVersion};
use crate::{HuginnError, Result};

pub const SKILL_NAME: &str = "ObjectDetector";
pub const INPUT_IMAGE: &str = "InputImage";
pub const OUTPUT_OBJECTS: &str = "detectedObjects";

/// Class names of the COCO dataset, in model output order.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub fn descriptor() -> SkillDescriptor {
    SkillDescriptor {
        id: "3f1b9a2e-8c47-4d6a-b5e1-0a9c7d4e2f61".to_string(),
        name: SKILL_NAME.to_string(),
        description: "Detects objects in an image and reports their kind, location and confidence".to_string(),
        version: SkillVersion::new("huginn", 1, 0),
        inputs: vec![
            FeatureDescriptor::image(INPUT_IMAGE, "the image to run detection on")
                .with_pixel_format(PixelFormat::Bgra8),
        ],
        outputs: vec![
            FeatureDescriptor::custom(OUTPUT_OBJECTS, "detected objects").optional(),
        ],
        supported_kinds: vec![DeviceKind::Cpu, DeviceKind::Gpu],
    }
}

/// Creates object detector skills.
pub struct ObjectDetectorFactory {
    descriptor: SkillDescriptor,
    model: Arc<dyn ModelLoader<dyn ObjectModel>>,
}

impl ObjectDetectorFactory {
    pub fn new(model: Arc<dyn ModelLoader<dyn ObjectModel>>) -> Self {
        Self {
            descriptor: descriptor(),
            model,
        }
    }
}

#[async_trait]
impl SkillFactory for ObjectDetectorFactory {
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
        info!(device = %device, "object detector ready");
        Ok(Arc::new(ObjectDetectorSkill {
            descriptor: self.descriptor.clone(),
            device,
            model,
        }))
    }
}

pub struct ObjectDetectorSkill {
    descriptor: SkillDescriptor,
    device: ExecutionDevice,
    model: Arc<dyn ObjectModel>,
}

#[async_trait]
impl Skill for ObjectDetectorSkill {
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
        let objects = run_blocking(move || model.detect_objects(&image)).await?;
        binding.set_output(OUTPUT_OBJECTS, FeatureValue::Objects(objects))?;
        binding.mark_evaluated();
        Ok(())
    }
}

/// Typed view over an evaluated object detector binding.
#[derive(Debug, Clone, Default)]
pub struct ObjectDetectorResult {
    pub objects: Vec<DetectedObject>,
}

impl ObjectDetectorResult {
    pub fn from_binding(binding: &SkillBinding) -> Result<Self> {
        let value = binding.output(OUTPUT_OBJECTS)?;
        let objects = value.as_objects().ok_or_else(|| {
            HuginnError::InvalidInput(format!(
                "output '{OUTPUT_OBJECTS}' holds {}, not objects",
                value.kind_name()
            ))
        })?;
        Ok(Self {
            objects: objects.to_vec(),
        })
    }

    /// Only objects of the listed kinds. An empty filter keeps everything.
    pub fn filtered(&self, kinds: &[String]) -> Vec<DetectedObject> {
        self.objects
            .iter()
            .filter(|o| kinds.is_empty() || kinds.iter().any(|k| k.eq_ignore_ascii_case(&o.kind)))
            .cloned()
            .collect()
    }

    /// Object count per kind, ordered by kind name.
    pub fn counts_by_kind(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for object in &self.objects {
            *counts.entry(object.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// One-line summary such as `Found 3 objects: dog x2, person x1`.
    pub fn summary(&self) -> String {
        if self.objects.is_empty() {
            return "No object found".to_string();
        }
        let kinds: Vec<String> = self
            .counts_by_kind()
            .into_iter()
            .map(|(kind, count)| format!("{kind} x{count}"))
            .collect();
        format!("Found {} objects: {}", self.objects.len(), kinds.join(", "))
    }
}
