//! Tests for console program configuration.

#![cfg(feature = "cli")]

use std::io::Write;

use huginn::config::{CameraConfig, Config};
use huginn::postprocess::TieBreak;
use huginn::source::FormatPreference;
use huginn::{DeviceKind, HuginnError, PixelFormat};

const FULL_CONFIG: &str = r#"
[devices]
preferred = 1

[[devices.accelerators]]
kind = "cuda"
name = "Test GPU"
adapter_index = 0

[[devices.accelerators]]
kind = "vpu"
name = "Test VPU"
adapter_index = 2

[models]
cache_dir = "/tmp/huginn-models"
emotion = "hf://onnx/models/emotion-ferplus-8.onnx"
concept_labels = "labels/imagenet.txt"

[camera]
width = 1280
height = 720
pixel_format = "nv12"
min_fps = 24.0

[postprocess]
top_x = 3
threshold = 0.5
tie_break = "by_name"

[dispatcher]
report_buffer = 4
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn explicit_config_file_is_loaded() {
    let file = write_config(FULL_CONFIG);
    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.devices.preferred, Some(1));
    assert_eq!(config.models.emotion, "hf://onnx/models/emotion-ferplus-8.onnx");
    assert_eq!(config.camera.pixel_format, Some(PixelFormat::Nv12));
    assert_eq!(config.postprocess.top_x, 3);
    assert_eq!(config.postprocess.tie_break, TieBreak::ByName);
    assert_eq!(config.dispatcher.report_buffer, 4);
}

#[test]
fn unset_sections_keep_defaults() {
    let file = write_config("[postprocess]\ntop_x = 10\n");
    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.postprocess.top_x, 10);
    assert!((config.postprocess.threshold - 0.7).abs() < f32::EPSILON);
    assert_eq!(config.models.face_detector, "models/version-RFB-320.onnx");
    assert_eq!(config.camera.min_fps, 15.0);
}

#[test]
fn missing_explicit_config_is_an_error() {
    let err = Config::load(Some(std::path::Path::new("/nonexistent/huginn.toml"))).unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn malformed_config_is_an_error() {
    let file = write_config("[postprocess\ntop_x = ");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
}

#[test]
fn accelerators_extend_the_registry() {
    let config: Config = toml::from_str(FULL_CONFIG).unwrap();
    let registry = config.devices.registry().unwrap();
    let kinds: Vec<DeviceKind> = registry
        .devices()
        .unwrap()
        .iter()
        .map(|d| d.kind())
        .collect();
    assert_eq!(kinds, vec![DeviceKind::Cpu, DeviceKind::Gpu, DeviceKind::Vpu]);
    assert_eq!(registry.get(2).unwrap().native_handle().map(|h| h.adapter_index), Some(2));
}

#[test]
fn unknown_accelerator_kind_is_rejected() {
    let config: Config = toml::from_str(
        r#"
        [[devices.accelerators]]
        kind = "fpga"
        name = "mystery"
        "#,
    )
    .unwrap();
    assert!(config.devices.registry().is_err());
}

#[test]
fn camera_encoding_falls_back_to_skill_preference() {
    let skill = FormatPreference {
        pixel_format: PixelFormat::Nv12,
        ..FormatPreference::default()
    };

    let unset = CameraConfig::default().preference(skill);
    assert_eq!(unset.pixel_format, PixelFormat::Nv12);
    assert_eq!((unset.width, unset.height), (1920, 1080));

    let configured = CameraConfig {
        pixel_format: Some(PixelFormat::Yuy2),
        width: 640,
        height: 480,
        min_fps: 30.0,
    }
    .preference(skill);
    assert_eq!(configured.pixel_format, PixelFormat::Yuy2);
    assert_eq!(configured.min_fps, 30.0);
}
