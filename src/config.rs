//! Configuration loading for the console programs.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//! 4. built-in defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::device::{ConfiguredProbe, DeviceKind, DeviceRegistry, ExecutionDevice};
use crate::dispatch::DEFAULT_REPORT_BUFFER;
use crate::postprocess::TieBreak;
use crate::skill::concept_tagger::{DEFAULT_THRESHOLD, DEFAULT_TOP_X};
use crate::source::FormatPreference;
use crate::types::PixelFormat;
use crate::{HuginnError, Result};

/// Program configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub postprocess: PostprocessConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

/// Accelerators to offer in addition to the CPU.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicesConfig {
    #[serde(default)]
    pub accelerators: Vec<AcceleratorConfig>,
    /// Index into a skill's supported devices (default: first).
    #[serde(default)]
    pub preferred: Option<usize>,
}

/// One configured GPU or VPU.
#[derive(Debug, Clone, Deserialize)]
pub struct AcceleratorConfig {
    /// "gpu" (or "cuda") or "vpu".
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub adapter_index: u32,
}

impl DevicesConfig {
    /// Configured accelerators as devices.
    pub fn accelerators(&self) -> Result<Vec<ExecutionDevice>> {
        self.accelerators
            .iter()
            .map(|a| match a.kind.parse::<DeviceKind>()? {
                DeviceKind::Gpu => Ok(ExecutionDevice::gpu(&a.name, a.adapter_index)),
                DeviceKind::Vpu => Ok(ExecutionDevice::vpu(&a.name, a.adapter_index)),
                DeviceKind::Cpu => Err(HuginnError::Configuration(format!(
                    "accelerator '{}' cannot be a CPU; the CPU is always available",
                    a.name
                ))),
            })
            .collect()
    }

    /// Registry probing the CPU plus the configured accelerators.
    pub fn registry(&self) -> Result<DeviceRegistry> {
        Ok(DeviceRegistry::new().with_probe(ConfiguredProbe::new(self.accelerators()?)))
    }
}

/// Model locations: local paths or `hf://<owner>/<repo>/<file>`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory for model downloads (default: `HUGINN_CACHE_DIR` or the
    /// platform cache dir).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_face_detector")]
    pub face_detector: String,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    #[serde(default = "default_concept")]
    pub concept: String,
    /// Text file with one label per line, in model output order.
    #[serde(default = "default_concept_labels")]
    pub concept_labels: PathBuf,
    /// Input tensor name of the concept classifier.
    #[serde(default = "default_concept_input")]
    pub concept_input: String,
    /// Output tensor name of the concept classifier.
    #[serde(default = "default_concept_output")]
    pub concept_output: String,
    #[serde(default = "default_object_detector")]
    pub object_detector: String,
    /// Text file with one label per line; COCO labels when unset.
    #[serde(default)]
    pub object_labels: Option<PathBuf>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            face_detector: default_face_detector(),
            emotion: default_emotion(),
            concept: default_concept(),
            concept_labels: default_concept_labels(),
            concept_input: default_concept_input(),
            concept_output: default_concept_output(),
            object_detector: default_object_detector(),
            object_labels: None,
        }
    }
}

fn default_face_detector() -> String {
    "models/version-RFB-320.onnx".to_string()
}

fn default_emotion() -> String {
    format!("models/{}", crate::skill::face_sentiment::EMOTION_MODEL_FILE)
}

fn default_concept() -> String {
    "models/concept_tagger.onnx".to_string()
}

fn default_concept_labels() -> PathBuf {
    PathBuf::from("models/concept_labels.txt")
}

fn default_concept_input() -> String {
    "input".to_string()
}

fn default_concept_output() -> String {
    "output".to_string()
}

fn default_object_detector() -> String {
    "models/yolov5s.onnx".to_string()
}

/// Camera stream preferences.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Preferred encoding; the skill's own preference wins when it has one.
    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,
    #[serde(default = "default_min_fps")]
    pub min_fps: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            pixel_format: None,
            min_fps: default_min_fps(),
        }
    }
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_min_fps() -> f64 {
    15.0
}

impl CameraConfig {
    /// Merge with the preference a skill declares.
    pub fn preference(&self, skill: FormatPreference) -> FormatPreference {
        FormatPreference {
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format.unwrap_or(skill.pixel_format),
            min_fps: self.min_fps,
        }
    }
}

/// Result selection defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct PostprocessConfig {
    #[serde(default = "default_top_x")]
    pub top_x: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default)]
    pub tie_break: TieBreak,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            top_x: default_top_x(),
            threshold: default_threshold(),
            tie_break: TieBreak::default(),
        }
    }
}

fn default_top_x() -> usize {
    DEFAULT_TOP_X
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

/// Live-mode dispatcher settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Reports buffered for the console (default: 16).
    #[serde(default = "default_report_buffer")]
    pub report_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            report_buffer: default_report_buffer(),
        }
    }
}

fn default_report_buffer() -> usize {
    DEFAULT_REPORT_BUFFER
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first existing
    /// standard file is used, falling back to defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_has_expected_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.postprocess.top_x, 5);
        assert!((config.postprocess.threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.postprocess.tie_break, TieBreak::Stable);
        assert_eq!(config.dispatcher.report_buffer, 16);
        assert_eq!((config.camera.width, config.camera.height), (1920, 1080));
        assert!(config.devices.accelerators.is_empty());
    }

    #[test]
    fn cpu_accelerator_is_rejected() {
        let toml = r#"
            [[devices.accelerators]]
            kind = "cpu"
            name = "host"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.devices.accelerators().is_err());
    }
}
