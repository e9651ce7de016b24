//! Tests for device enumeration, device selection and the skill registry.

use std::sync::Arc;

use huginn::device::{ConfiguredProbe, DeviceProbe};
use huginn::model::{ObjectModel, PoseModel, SharedModel};
use huginn::skill::object_detector::ObjectDetectorFactory;
use huginn::skill::skeletal_detector::SkeletalDetectorFactory;
use huginn::{
    DetectedObject, DeviceKind, DeviceRegistry, ExecutionDevice, HuginnError, Result,
    SkeletonBody, Skill, SkillFactory, SkillRegistry, select_device,
};
use image::DynamicImage;

struct NoObjects;

impl ObjectModel for NoObjects {
    fn detect_objects(&self, _image: &DynamicImage) -> Result<Vec<DetectedObject>> {
        Ok(Vec::new())
    }
}

struct NoBodies;

impl PoseModel for NoBodies {
    fn detect_bodies(&self, _image: &DynamicImage) -> Result<Vec<SkeletonBody>> {
        Ok(Vec::new())
    }
}

fn object_factory(kinds: &[DeviceKind]) -> ObjectDetectorFactory {
    let model: Arc<dyn ObjectModel> = Arc::new(NoObjects);
    ObjectDetectorFactory::new(Arc::new(SharedModel::new(model).with_kinds(kinds.to_vec())))
}

fn accelerated_registry() -> DeviceRegistry {
    DeviceRegistry::new().with_probe(ConfiguredProbe::new(vec![
        ExecutionDevice::gpu("Test GPU", 0),
        ExecutionDevice::unbound(DeviceKind::Gpu, "Detached GPU"),
        ExecutionDevice::vpu("Test VPU", 1),
    ]))
}

// ============================================================================
// Devices
// ============================================================================

#[test]
fn device_kinds_parse_and_display() {
    assert_eq!("cuda".parse::<DeviceKind>().unwrap(), DeviceKind::Gpu);
    assert_eq!("CPU".parse::<DeviceKind>().unwrap(), DeviceKind::Cpu);
    assert!(matches!(
        "tpu".parse::<DeviceKind>(),
        Err(HuginnError::Configuration(_))
    ));
    assert_eq!(DeviceKind::Vpu.to_string(), "VPU");
}

#[test]
fn accelerators_need_a_native_handle() {
    assert!(ExecutionDevice::cpu().is_bindable());
    assert!(ExecutionDevice::gpu("gpu", 0).is_bindable());
    assert!(!ExecutionDevice::unbound(DeviceKind::Gpu, "gpu").is_bindable());
    assert_eq!(ExecutionDevice::default(), ExecutionDevice::cpu());
}

#[test]
fn registry_lists_probes_in_order() {
    let registry = accelerated_registry();
    let devices = registry.devices().unwrap();
    let kinds: Vec<DeviceKind> = devices.iter().map(ExecutionDevice::kind).collect();
    assert_eq!(
        kinds,
        vec![DeviceKind::Cpu, DeviceKind::Gpu, DeviceKind::Gpu, DeviceKind::Vpu]
    );
    assert_eq!(registry.get(3).unwrap().name(), "Test VPU");
}

#[test]
fn configured_probe_reports_its_list() {
    let probe = ConfiguredProbe::new(vec![ExecutionDevice::gpu("a", 0)]);
    assert_eq!(probe.name(), "configured");
    assert_eq!(probe.probe().unwrap().len(), 1);
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn supported_devices_skip_unbindable_and_unsupported() {
    let factory = object_factory(&[DeviceKind::Cpu, DeviceKind::Gpu, DeviceKind::Vpu]);
    let devices = factory.supported_devices(&accelerated_registry()).unwrap();
    let names: Vec<&str> = devices.iter().map(ExecutionDevice::name).collect();

    // The detached GPU has no handle; the object detector declares no VPU.
    assert_eq!(names, vec!["CPU", "Test GPU"]);
}

#[test]
fn select_device_honours_preferred_index() {
    let factory = object_factory(&[DeviceKind::Cpu, DeviceKind::Gpu]);
    let registry = accelerated_registry();

    assert_eq!(select_device(&factory, &registry, None).unwrap(), ExecutionDevice::cpu());
    assert_eq!(
        select_device(&factory, &registry, Some(1)).unwrap().name(),
        "Test GPU"
    );
    assert!(matches!(
        select_device(&factory, &registry, Some(5)),
        Err(HuginnError::InvalidInput(_))
    ));
}

#[test]
fn model_without_devices_leaves_nothing_to_select() {
    let factory = object_factory(&[]);
    let devices = factory.supported_devices(&accelerated_registry()).unwrap();
    assert!(devices.is_empty());
    assert!(matches!(
        select_device(&factory, &accelerated_registry(), None),
        Err(HuginnError::NoDeviceAvailable(_))
    ));
}

#[test]
fn skeletal_detector_accepts_vpu() {
    let model: Arc<dyn PoseModel> = Arc::new(NoBodies);
    let factory = SkeletalDetectorFactory::new(Arc::new(
        SharedModel::new(model).with_kinds([DeviceKind::Cpu, DeviceKind::Vpu]),
    ));
    let devices = factory.supported_devices(&accelerated_registry()).unwrap();
    let kinds: Vec<DeviceKind> = devices.iter().map(ExecutionDevice::kind).collect();
    assert_eq!(kinds, vec![DeviceKind::Cpu, DeviceKind::Vpu]);
}

// ============================================================================
// Skill registry
// ============================================================================

#[test]
fn skill_registry_looks_up_by_name() {
    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(object_factory(&[DeviceKind::Cpu])));
    let model: Arc<dyn PoseModel> = Arc::new(NoBodies);
    registry.register(Arc::new(SkeletalDetectorFactory::new(Arc::new(
        SharedModel::new(model),
    ))));

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), vec!["ObjectDetector", "SkeletalDetector"]);
    assert!(registry.get("objectdetector").is_some());
    assert!(matches!(
        registry.require("FaceSentimentAnalyzer"),
        Err(HuginnError::InvalidInput(_))
    ));
}

#[test]
fn registering_same_name_replaces_factory() {
    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(object_factory(&[DeviceKind::Cpu])));
    registry.register(Arc::new(object_factory(&[DeviceKind::Gpu])));
    assert_eq!(registry.len(), 1);

    let factory = registry.require("ObjectDetector").unwrap();
    assert!(!factory.can_bind(&ExecutionDevice::cpu()));
}

#[tokio::test]
async fn detectors_report_empty_results() {
    use huginn::skill::object_detector::ObjectDetectorResult;
    use huginn::skill::skeletal_detector::SkeletalDetectorResult;
    use huginn::{Frame, bind_and_evaluate};

    let frame = Frame::from_image(DynamicImage::new_rgb8(8, 8));

    let objects = object_factory(&[DeviceKind::Cpu])
        .create_skill(ExecutionDevice::cpu())
        .await
        .unwrap();
    let mut binding = objects.create_binding();
    bind_and_evaluate(objects.as_ref(), &mut binding, &frame).await.unwrap();
    let result = ObjectDetectorResult::from_binding(&binding).unwrap();
    assert_eq!(result.summary(), "No object found");

    let model: Arc<dyn PoseModel> = Arc::new(NoBodies);
    let bodies = SkeletalDetectorFactory::new(Arc::new(SharedModel::new(model)))
        .create_skill(ExecutionDevice::cpu())
        .await
        .unwrap();
    let mut binding = bodies.create_binding();
    bind_and_evaluate(bodies.as_ref(), &mut binding, &frame).await.unwrap();
    let result = SkeletalDetectorResult::from_binding(&binding).unwrap();
    assert_eq!(result.summary(), "No body found");
}
