//! ONNX Runtime adapters for the inference contracts.
//!
//! Each adapter pairs a cached session with the pre- and post-processing
//! its model family expects. Sessions come from the [`ModelManager`], so
//! two skills on the same device share one session per model.

use std::path::Path;
use std::sync::{Arc, MutexGuard};

use image::DynamicImage;
use image::imageops::FilterType;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use super::manager::{ModelManager, SharedSession};
use super::source::ModelSource;
use super::{FaceDetector, LabelledClassifier, ModelLoader, ObjectModel, ScoreModel};
use crate::device::{DeviceKind, ExecutionDevice};
use crate::postprocess::non_max_suppression;
use crate::types::{BoundingBox, DetectedObject, NormalizedRect};
use crate::{HuginnError, Result};

/// Whether ONNX Runtime can target `device` in this build.
pub fn onnx_supports(device: &ExecutionDevice) -> bool {
    match device.kind() {
        DeviceKind::Cpu => true,
        DeviceKind::Gpu => cfg!(feature = "cuda") && device.native_handle().is_some(),
        DeviceKind::Vpu => false,
    }
}

/// Build an ONNX session with the appropriate execution provider.
pub(crate) fn build_session(model_path: &Path, device: &ExecutionDevice) -> Result<Session> {
    if !onnx_supports(device) {
        return Err(HuginnError::UnsupportedDevice {
            skill: model_path.display().to_string(),
            device: device.to_string(),
        });
    }

    let builder = Session::builder()
        .map_err(|e| HuginnError::Configuration(format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| {
            HuginnError::Configuration(format!("Failed to set optimization level: {e}"))
        })?;

    // Configure execution provider based on device
    #[cfg(feature = "cuda")]
    let builder = match (device.kind(), device.native_handle()) {
        (DeviceKind::Gpu, Some(handle)) => {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(handle.adapter_index as i32)
                    .build()])
                .map_err(|e| HuginnError::Configuration(format!("Failed to configure CUDA: {e}")))?
        }
        _ => builder,
    };

    builder
        .commit_from_file(model_path)
        .map_err(|e| HuginnError::Model(format!("Failed to load ONNX model: {e}")))
}

/// How an image becomes an NCHW float tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Preprocess {
    /// Single luma channel, raw 0..255 values.
    Grayscale { width: u32, height: u32 },
    /// RGB scaled to 0..1, then `(x - mean) / std` per channel.
    Rgb {
        width: u32,
        height: u32,
        mean: [f32; 3],
        std: [f32; 3],
    },
}

impl Preprocess {
    /// 64x64 grayscale, as FER+ emotion models take it.
    pub fn fer_plus() -> Self {
        use crate::skill::face_sentiment::EMOTION_MODEL_SIZE;
        Self::Grayscale {
            width: EMOTION_MODEL_SIZE,
            height: EMOTION_MODEL_SIZE,
        }
    }

    /// Square RGB with ImageNet statistics.
    pub fn imagenet(size: u32) -> Self {
        Self::Rgb {
            width: size,
            height: size,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    /// 320x240 RGB mapped to roughly -1..1, as UltraFace takes it.
    pub fn ultraface() -> Self {
        Self::Rgb {
            width: 320,
            height: 240,
            mean: [127.0 / 255.0; 3],
            std: [128.0 / 255.0; 3],
        }
    }

    /// Plain 0..1 RGB, as YOLO exports take it.
    pub fn unit_rgb(size: u32) -> Self {
        Self::Rgb {
            width: size,
            height: size,
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        match *self {
            Self::Grayscale { width, height } | Self::Rgb { width, height, .. } => (width, height),
        }
    }

    /// Resize and lay out `image`. Returns the NCHW shape and data.
    pub fn to_tensor(&self, image: &DynamicImage) -> ([usize; 4], Vec<f32>) {
        match *self {
            Self::Grayscale { width, height } => {
                let luma = image
                    .resize_exact(width, height, FilterType::Triangle)
                    .to_luma8();
                let data = luma.as_raw().iter().map(|&v| f32::from(v)).collect();
                ([1, 1, height as usize, width as usize], data)
            }
            Self::Rgb {
                width,
                height,
                mean,
                std,
            } => {
                let rgb = image
                    .resize_exact(width, height, FilterType::Triangle)
                    .to_rgb8();
                let plane = (width * height) as usize;
                let mut data = vec![0.0f32; plane * 3];
                for (i, px) in rgb.pixels().enumerate() {
                    for c in 0..3 {
                        data[c * plane + i] = (f32::from(px.0[c]) / 255.0 - mean[c]) / std[c];
                    }
                }
                ([1, 3, height as usize, width as usize], data)
            }
        }
    }
}

fn lock(session: &SharedSession) -> Result<MutexGuard<'_, Session>> {
    session
        .lock()
        .map_err(|e| HuginnError::Configuration(format!("Failed to acquire session lock: {e}")))
}

/// One output tensor copied out of a session run.
struct Output {
    shape: Vec<i64>,
    data: Vec<f32>,
}

/// Run `session` on one input and copy out the named outputs.
fn run(
    session: &SharedSession,
    input: &str,
    shape: [usize; 4],
    data: &[f32],
    outputs: &[&str],
) -> Result<Vec<Output>> {
    let tensor = TensorRef::from_array_view((shape, data))
        .map_err(|e| HuginnError::Model(format!("Failed to create input tensor: {e}")))?;

    let mut session = lock(session)?;
    let results = session
        .run(ort::inputs![input => tensor])
        .map_err(|e| HuginnError::Model(format!("ONNX inference failed: {e}")))?;

    outputs
        .iter()
        .map(|name| {
            let value = results
                .get(*name)
                .ok_or_else(|| HuginnError::Model(format!("No '{name}' output found")))?;
            // try_extract_tensor returns (&Shape, &[T])
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| HuginnError::Model(format!("Failed to extract '{name}': {e}")))?;
            Ok(Output {
                shape: shape.iter().copied().collect(),
                data: data.to_vec(),
            })
        })
        .collect()
}

/// Builds a contract implementation around a loaded session.
pub trait OnnxModelSpec: Send + Sync {
    type Model: ?Sized + Send + Sync;

    fn instantiate(&self, session: SharedSession) -> Arc<Self::Model>;
}

/// [`ModelLoader`] backed by the model manager's session cache.
pub struct OnnxLoader<S> {
    manager: Arc<ModelManager>,
    source: ModelSource,
    spec: S,
}

impl<S> OnnxLoader<S> {
    pub fn new(manager: Arc<ModelManager>, source: ModelSource, spec: S) -> Self {
        Self {
            manager,
            source,
            spec,
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }
}

impl<S: OnnxModelSpec> ModelLoader<S::Model> for OnnxLoader<S> {
    fn supports(&self, device: &ExecutionDevice) -> bool {
        onnx_supports(device)
    }

    fn load(&self, device: &ExecutionDevice) -> Result<Arc<S::Model>> {
        let session = self.manager.session(&self.source, device)?;
        Ok(self.spec.instantiate(session))
    }
}

/// Whole-image classifier producing one score per class.
#[derive(Debug, Clone)]
pub struct ScoreSpec {
    pub input: String,
    pub output: String,
    pub preprocess: Preprocess,
}

impl ScoreSpec {
    /// FER+ emotion classifier from the ONNX model zoo.
    pub fn emotion_ferplus() -> Self {
        Self {
            input: crate::skill::face_sentiment::EMOTION_MODEL_INPUT.to_string(),
            output: crate::skill::face_sentiment::EMOTION_MODEL_OUTPUT.to_string(),
            preprocess: Preprocess::fer_plus(),
        }
    }
}

impl OnnxModelSpec for ScoreSpec {
    type Model = dyn ScoreModel;

    fn instantiate(&self, session: SharedSession) -> Arc<dyn ScoreModel> {
        Arc::new(OnnxScoreModel {
            session,
            spec: self.clone(),
        })
    }
}

/// [`ScoreModel`] over an ONNX classifier.
pub struct OnnxScoreModel {
    session: SharedSession,
    spec: ScoreSpec,
}

impl ScoreModel for OnnxScoreModel {
    fn score(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let (shape, data) = self.spec.preprocess.to_tensor(image);
        let mut outputs = run(
            &self.session,
            &self.spec.input,
            shape,
            &data,
            &[self.spec.output.as_str()],
        )?;
        Ok(outputs.remove(0).data)
    }
}

/// Classifier whose scores map onto a label list.
#[derive(Debug, Clone)]
pub struct ConceptSpec {
    pub scores: ScoreSpec,
    pub labels: Arc<[String]>,
}

impl OnnxModelSpec for ConceptSpec {
    type Model = dyn super::ConceptModel;

    fn instantiate(&self, session: SharedSession) -> Arc<dyn super::ConceptModel> {
        let scorer = self.scores.instantiate(session);
        Arc::new(LabelledClassifier::new(scorer, Arc::clone(&self.labels)))
    }
}

/// UltraFace-style detector: `scores` [1, N, 2] and `boxes` [1, N, 4] in
/// relative corner coordinates.
#[derive(Debug, Clone)]
pub struct FaceDetectorSpec {
    pub input: String,
    pub scores: String,
    pub boxes: String,
    pub preprocess: Preprocess,
    pub confidence: f32,
    pub iou_threshold: f32,
}

impl Default for FaceDetectorSpec {
    fn default() -> Self {
        Self {
            input: "input".to_string(),
            scores: "scores".to_string(),
            boxes: "boxes".to_string(),
            preprocess: Preprocess::ultraface(),
            confidence: 0.7,
            iou_threshold: 0.3,
        }
    }
}

impl OnnxModelSpec for FaceDetectorSpec {
    type Model = dyn FaceDetector;

    fn instantiate(&self, session: SharedSession) -> Arc<dyn FaceDetector> {
        Arc::new(OnnxFaceDetector {
            session,
            spec: self.clone(),
        })
    }
}

/// [`FaceDetector`] over an UltraFace-style model.
pub struct OnnxFaceDetector {
    session: SharedSession,
    spec: FaceDetectorSpec,
}

impl FaceDetector for OnnxFaceDetector {
    fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>> {
        let (shape, data) = self.spec.preprocess.to_tensor(image);
        let outputs = run(
            &self.session,
            &self.spec.input,
            shape,
            &data,
            &[self.spec.scores.as_str(), self.spec.boxes.as_str()],
        )?;
        let (scores, boxes) = (&outputs[0].data, &outputs[1].data);
        if scores.len() % 2 != 0 || boxes.len() != scores.len() * 2 {
            return Err(HuginnError::Model(format!(
                "face detector output shapes {:?} and {:?} do not line up",
                outputs[0].shape, outputs[1].shape
            )));
        }

        let candidates: Vec<(NormalizedRect, f32)> = scores
            .chunks_exact(2)
            .zip(boxes.chunks_exact(4))
            .filter(|(score, _)| score[1] > self.spec.confidence)
            .map(|(score, rect)| (NormalizedRect::new(rect[0], rect[1], rect[2], rect[3]), score[1]))
            .collect();

        let kept = non_max_suppression(candidates, self.spec.iou_threshold, |c| c.0, |c| c.1);
        Ok(kept
            .into_iter()
            .map(|(rect, _)| rect.to_pixels(image.width(), image.height()))
            .filter(|b| !b.is_empty())
            .collect())
    }
}

/// YOLO-style detector: one output [1, N, 5 + classes] of centre box,
/// objectness and class probabilities in input pixel units.
#[derive(Debug, Clone)]
pub struct ObjectDetectorSpec {
    pub input: String,
    pub output: String,
    pub preprocess: Preprocess,
    pub labels: Arc<[String]>,
    pub confidence: f32,
    pub iou_threshold: f32,
}

impl ObjectDetectorSpec {
    /// 640x640 YOLOv5 export with COCO labels.
    pub fn yolo_coco() -> Self {
        Self {
            input: "images".to_string(),
            output: "output0".to_string(),
            preprocess: Preprocess::unit_rgb(640),
            labels: crate::skill::object_detector::COCO_LABELS
                .iter()
                .map(|l| l.to_string())
                .collect(),
            confidence: 0.25,
            iou_threshold: 0.45,
        }
    }
}

impl OnnxModelSpec for ObjectDetectorSpec {
    type Model = dyn ObjectModel;

    fn instantiate(&self, session: SharedSession) -> Arc<dyn ObjectModel> {
        Arc::new(OnnxObjectDetector {
            session,
            spec: self.clone(),
        })
    }
}

/// [`ObjectModel`] over a YOLO-style model.
pub struct OnnxObjectDetector {
    session: SharedSession,
    spec: ObjectDetectorSpec,
}

impl ObjectModel for OnnxObjectDetector {
    fn detect_objects(&self, image: &DynamicImage) -> Result<Vec<DetectedObject>> {
        let (shape, data) = self.spec.preprocess.to_tensor(image);
        let mut outputs = run(
            &self.session,
            &self.spec.input,
            shape,
            &data,
            &[self.spec.output.as_str()],
        )?;
        let output = outputs.remove(0);

        let stride = match output.shape.as_slice() {
            [_, _, stride] if *stride > 5 => *stride as usize,
            other => {
                return Err(HuginnError::Model(format!(
                    "expected detector output [1, N, 5 + classes], got {other:?}"
                )));
            }
        };
        let (input_w, input_h) = self.spec.preprocess.input_size();
        let (input_w, input_h) = (input_w as f32, input_h as f32);

        let mut candidates = Vec::new();
        for row in output.data.chunks_exact(stride) {
            let objectness = row[4];
            let Some((class, probability)) = row[5..]
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            else {
                continue;
            };
            let score = objectness * probability;
            if score <= self.spec.confidence {
                continue;
            }
            let (cx, cy, w, h) = (row[0] / input_w, row[1] / input_h, row[2] / input_w, row[3] / input_h);
            let rect = NormalizedRect::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);
            candidates.push((class, rect, score));
        }

        let kept = non_max_suppression(candidates, self.spec.iou_threshold, |c| c.1, |c| c.2);
        Ok(kept
            .into_iter()
            .map(|(class, rect, score)| DetectedObject {
                kind: self
                    .spec
                    .labels
                    .get(class)
                    .cloned()
                    .unwrap_or_else(|| format!("class {class}")),
                bounds: rect.to_pixels(image.width(), image.height()),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn cpu_is_always_supported() {
        assert!(onnx_supports(&ExecutionDevice::cpu()));
        assert!(!onnx_supports(&ExecutionDevice::vpu("NPU", 0)));
    }

    #[test]
    fn grayscale_keeps_raw_values() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([200])));
        let (shape, data) = Preprocess::fer_plus().to_tensor(&image);
        assert_eq!(shape, [1, 1, 64, 64]);
        assert_eq!(data.len(), 64 * 64);
        assert!(data.iter().all(|&v| (v - 200.0).abs() < 1e-3));
    }

    #[test]
    fn rgb_is_planar_and_normalised() {
        let image = DynamicImage::new_rgb8(4, 4);
        let (shape, data) = Preprocess::unit_rgb(2).to_tensor(&image);
        assert_eq!(shape, [1, 3, 2, 2]);
        assert!(data.iter().all(|&v| v == 0.0));

        let (_, data) = Preprocess::ultraface().to_tensor(&image);
        assert!(data.iter().all(|&v| (v + 127.0 / 128.0).abs() < 1e-4));
    }
}
