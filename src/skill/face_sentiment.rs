//! Face sentiment analysis.
//!
//! Two stages: a face detector locates the first face, then an emotion
//! classifier scores a crop around it. The crop is the detected box grown by
//! half its width on every side and clamped to the frame. Classifier logits
//! are softmax-normalised into eight sentiment probabilities.
//!
//! When no face is found both outputs are reset to zeros; a miss is a
//! result, not an error.

use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::{debug, info, instrument};

use super::binding::SkillBinding;
use super::traits::{Skill, SkillFactory};
use super::{ensure_can_bind, load_model, run_blocking};
use crate::device::{DeviceKind, ExecutionDevice};
use crate::model::{FaceDetector, ModelLoader, ScoreModel};
use crate::postprocess::{
    FACE_BOX_SCALE, expand_and_clamp_face_box, normalize_bounds, predominant_index, softmax,
};
use crate::types::{
    FaceRectangle, FeatureDescriptor, FeatureValue, PixelFormat, SentimentType, SkillDescriptor,
    SkillVersion,
};
use crate::{HuginnError, Result};

pub const SKILL_NAME: &str = "FaceSentimentAnalyzer";
pub const INPUT_IMAGE: &str = "InputImage";
pub const FACE_RECTANGLE: &str = "faceRectangle";
pub const FACE_SENTIMENT_SCORES: &str = "faceSentimentScores";

/// Default emotion classifier (FER+), its input and output tensor names.
pub const EMOTION_MODEL_FILE: &str = "emotion_ferplus.onnx";
pub const EMOTION_MODEL_INPUT: &str = "Input3";
pub const EMOTION_MODEL_OUTPUT: &str = "Plus692_Output_0";
/// Side length of the square grayscale crop the classifier expects.
pub const EMOTION_MODEL_SIZE: u32 = 64;

const SENTIMENT_COUNT: usize = SentimentType::ALL.len();

/// Descriptor for the face sentiment skill.
pub fn descriptor() -> SkillDescriptor {
    SkillDescriptor {
        id: "f8d275ce-c244-4e71-8a39-57335d291388".to_string(),
        name: SKILL_NAME.to_string(),
        description: "Finds a face in the image and infers its predominant sentiment from a set of 8 possible labels".to_string(),
        version: SkillVersion::new("huginn", 0, 8),
        inputs: vec![
            FeatureDescriptor::image(
                INPUT_IMAGE,
                "the input image onto which the sentiment analysis runs",
            )
            .with_pixel_format(PixelFormat::Nv12),
        ],
        outputs: vec![
            FeatureDescriptor::tensor(
                FACE_RECTANGLE,
                "face bounding box in relative coordinates (left, top, right, bottom)",
                vec![-1, 4],
            )
            .optional(),
            FeatureDescriptor::tensor(
                FACE_SENTIMENT_SCORES,
                "prediction scores for the supported sentiments of the detected face",
                vec![-1, SENTIMENT_COUNT as i64],
            )
            .optional(),
        ],
        supported_kinds: vec![DeviceKind::Cpu, DeviceKind::Gpu],
    }
}

/// Creates face sentiment skills from a detector and a classifier loader.
pub struct FaceSentimentFactory {
    descriptor: SkillDescriptor,
    detector: Arc<dyn ModelLoader<dyn FaceDetector>>,
    scorer: Arc<dyn ModelLoader<dyn ScoreModel>>,
}

impl FaceSentimentFactory {
    pub fn new(
        detector: Arc<dyn ModelLoader<dyn FaceDetector>>,
        scorer: Arc<dyn ModelLoader<dyn ScoreModel>>,
    ) -> Self {
        Self {
            descriptor: descriptor(),
            detector,
            scorer,
        }
    }
}

#[async_trait]
impl SkillFactory for FaceSentimentFactory {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn can_bind(&self, device: &ExecutionDevice) -> bool {
        device.is_bindable()
            && self.descriptor.supports_kind(device.kind())
            && self.detector.supports(device)
            && self.scorer.supports(device)
    }

    #[instrument(skip(self), fields(skill = SKILL_NAME))]
    async fn create_skill(&self, device: ExecutionDevice) -> Result<Arc<dyn Skill>> {
        ensure_can_bind(self, &device)?;
        let detector = load_model(&self.detector, &device).await?;
        let scorer = load_model(&self.scorer, &device).await?;
        info!(device = %device, "face sentiment skill ready");
        Ok(Arc::new(FaceSentimentSkill {
            descriptor: self.descriptor.clone(),
            device,
            detector,
            scorer,
        }))
    }
}

/// Face sentiment skill bound to one device.
pub struct FaceSentimentSkill {
    descriptor: SkillDescriptor,
    device: ExecutionDevice,
    detector: Arc<dyn FaceDetector>,
    scorer: Arc<dyn ScoreModel>,
}

#[async_trait]
impl Skill for FaceSentimentSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn device(&self) -> &ExecutionDevice {
        &self.device
    }

    async fn evaluate(&self, binding: &mut SkillBinding) -> Result<()> {
        binding.ensure_owner(&self.descriptor)?;
        let image = binding.input_image(INPUT_IMAGE)?;

        let detector = Arc::clone(&self.detector);
        let scorer = Arc::clone(&self.scorer);
        let (face, scores) =
            run_blocking(move || analyze(detector.as_ref(), scorer.as_ref(), &image)).await?;

        binding.set_output(
            FACE_RECTANGLE,
            FeatureValue::TensorFloat {
                shape: vec![1, 4],
                data: face.to_array().to_vec(),
            },
        )?;
        binding.set_output(
            FACE_SENTIMENT_SCORES,
            FeatureValue::TensorFloat {
                shape: vec![1, SENTIMENT_COUNT],
                data: scores,
            },
        )?;
        binding.mark_evaluated();
        Ok(())
    }
}

/// Run both stages over one image.
fn analyze(
    detector: &dyn FaceDetector,
    scorer: &dyn ScoreModel,
    image: &DynamicImage,
) -> Result<(FaceRectangle, Vec<f32>)> {
    let (width, height) = (image.width(), image.height());
    let faces = detector.detect_faces(image)?;

    let region = faces
        .first()
        .map(|face| expand_and_clamp_face_box(*face, FACE_BOX_SCALE, width, height))
        .filter(|region| !region.is_empty());
    let Some(region) = region else {
        debug!("no face found");
        return Ok((FaceRectangle::default(), vec![0.0; SENTIMENT_COUNT]));
    };

    let crop = image.crop_imm(region.x, region.y, region.width, region.height);
    let logits = scorer.score(&crop)?;
    if logits.len() != SENTIMENT_COUNT {
        return Err(HuginnError::Model(format!(
            "emotion classifier produced {} scores, expected {SENTIMENT_COUNT}",
            logits.len()
        )));
    }

    Ok((normalize_bounds(region, width, height), softmax(&logits)))
}

/// Typed view over an evaluated face sentiment binding.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceSentimentResult {
    pub face: FaceRectangle,
    pub scores: [f32; SENTIMENT_COUNT],
}

impl FaceSentimentResult {
    pub fn from_binding(binding: &SkillBinding) -> Result<Self> {
        let face = tensor_output(binding, FACE_RECTANGLE)?;
        let scores = tensor_output(binding, FACE_SENTIMENT_SCORES)?;
        let scores: [f32; SENTIMENT_COUNT] = scores.try_into().map_err(|_| {
            HuginnError::InvalidInput(format!(
                "{FACE_SENTIMENT_SCORES} holds {} values, expected {SENTIMENT_COUNT}",
                scores.len()
            ))
        })?;
        Ok(Self {
            face: FaceRectangle::from_slice(face)?,
            scores,
        })
    }

    /// A face was found when the rectangle is not all zeros.
    pub fn is_face_found(&self) -> bool {
        !self.face.is_zero()
    }

    /// Highest scoring sentiment, if a face was found.
    pub fn predominant_sentiment(&self) -> Option<SentimentType> {
        if !self.is_face_found() {
            return None;
        }
        predominant_index(&self.scores).and_then(SentimentType::from_index)
    }

    pub fn score(&self, sentiment: SentimentType) -> f32 {
        self.scores[sentiment as usize]
    }
}

fn tensor_output<'a>(binding: &'a SkillBinding, name: &str) -> Result<&'a [f32]> {
    let value = binding.output(name)?;
    value.as_tensor().ok_or_else(|| {
        HuginnError::InvalidInput(format!(
            "output '{name}' holds {}, not a tensor",
            value.kind_name()
        ))
    })
}
