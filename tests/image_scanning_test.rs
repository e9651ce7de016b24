//! Tests for the image scanning pipeline: quad detection, rectification and
//! cleaning.

use std::sync::Arc;

use huginn::model::{FixedQuadModel, QuadModel, SharedModel};
use huginn::skill::image_scanning::{
    self, BuiltinFactory, ImageCleaningKind, ImageInterpolationKind, QuadDetectorFactory,
    detected_quads, output_image, rectify, set_cleaning_kind, set_interpolation, set_quad,
};
use huginn::types::Point;
use huginn::{
    BindingState, DeviceKind, ExecutionDevice, Frame, HuginnError, Quad, Skill, SkillFactory,
    bind_and_evaluate,
};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

/// Left half red, right half blue.
fn split_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    }))
}

fn left_half() -> Quad {
    Quad::new([
        Point::new(0.0, 0.0),
        Point::new(0.5, 0.0),
        Point::new(0.5, 1.0),
        Point::new(0.0, 1.0),
    ])
}

async fn builtin(factory: BuiltinFactory) -> Arc<dyn Skill> {
    factory.create_skill(ExecutionDevice::cpu()).await.unwrap()
}

// ============================================================================
// Quad detection
// ============================================================================

#[tokio::test]
async fn fixed_quad_model_reports_its_quad() {
    let model: Arc<dyn QuadModel> = Arc::new(FixedQuadModel::new(left_half()));
    let factory = QuadDetectorFactory::new(Arc::new(SharedModel::new(model)));
    let skill = factory.create_skill(ExecutionDevice::cpu()).await.unwrap();

    let mut binding = skill.create_binding();
    bind_and_evaluate(
        skill.as_ref(),
        &mut binding,
        &Frame::from_image(split_image(20, 10)),
    )
    .await
    .unwrap();

    assert_eq!(detected_quads(&binding).unwrap(), vec![left_half()]);
}

#[test]
fn quads_parse_from_eight_coordinates() {
    let quad: Quad = "0,0, 0.5,0, 0.5,1, 0,1".parse().unwrap();
    assert_eq!(quad, left_half());

    assert!("0,0,1,1".parse::<Quad>().is_err());
    assert!("0,0,1,0,1,1,0,1.5".parse::<Quad>().is_err());
    assert!("a,0,1,0,1,1,0,1".parse::<Quad>().is_err());
}

// ============================================================================
// Rectification
// ============================================================================

#[tokio::test]
async fn rectifier_crops_the_quad() {
    let skill = builtin(BuiltinFactory::rectifier()).await;
    let mut binding = skill.create_binding();

    binding
        .set_input_image(&Frame::from_image(split_image(40, 20)))
        .unwrap();
    set_quad(&mut binding, left_half()).unwrap();
    set_interpolation(&mut binding, ImageInterpolationKind::Bilinear).unwrap();
    skill.evaluate(&mut binding).await.unwrap();

    let output = output_image(&binding).unwrap();
    assert_eq!((output.width(), output.height()), (20, 20));
    assert_eq!(output.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
}

#[tokio::test]
async fn every_interpolation_keeps_output_size() {
    let image = split_image(30, 30);
    for kind in ImageInterpolationKind::ALL {
        let rectified = rectify(&image, &Quad::full_frame(), kind).unwrap();
        assert_eq!((rectified.width(), rectified.height()), (30, 30), "{kind}");
    }
}

#[tokio::test]
async fn rectifier_requires_a_quad() {
    let skill = builtin(BuiltinFactory::rectifier()).await;
    let mut binding = skill.create_binding();
    binding
        .set_input_image(&Frame::from_image(split_image(8, 8)))
        .unwrap();

    let err = skill.evaluate(&mut binding).await.unwrap_err();
    assert!(matches!(err, HuginnError::InvalidInput(_)));
    assert_eq!(binding.state(), BindingState::Bound);
}

// ============================================================================
// Cleaning
// ============================================================================

#[tokio::test]
async fn cleaner_produces_image_of_same_size() {
    let skill = builtin(BuiltinFactory::cleaner()).await;
    for kind in ImageCleaningKind::ALL {
        let mut binding = skill.create_binding();
        binding
            .set_input_image(&Frame::from_image(split_image(24, 16)))
            .unwrap();
        set_cleaning_kind(&mut binding, kind).unwrap();
        skill.evaluate(&mut binding).await.unwrap();

        let output = output_image(&binding).unwrap();
        assert_eq!((output.width(), output.height()), (24, 16), "{kind}");
    }
}

#[tokio::test]
async fn scan_pipeline_chains_three_skills() {
    let image = split_image(40, 20);
    let frame = Frame::from_image(image);

    let model: Arc<dyn QuadModel> = Arc::new(FixedQuadModel::full_frame());
    let detector = QuadDetectorFactory::new(Arc::new(SharedModel::new(model)))
        .create_skill(ExecutionDevice::cpu())
        .await
        .unwrap();
    let mut detect = detector.create_binding();
    bind_and_evaluate(detector.as_ref(), &mut detect, &frame).await.unwrap();
    let quad = detected_quads(&detect).unwrap()[0];

    let rectifier = builtin(BuiltinFactory::rectifier()).await;
    let mut warp = rectifier.create_binding();
    set_quad(&mut warp, quad).unwrap();
    bind_and_evaluate(rectifier.as_ref(), &mut warp, &frame).await.unwrap();
    let rectified = output_image(&warp).unwrap();

    let cleaner = builtin(BuiltinFactory::cleaner()).await;
    let mut enhance = cleaner.create_binding();
    enhance
        .set_image(image_scanning::INPUT_IMAGE, rectified)
        .unwrap();
    cleaner.evaluate(&mut enhance).await.unwrap();

    let cleaned = output_image(&enhance).unwrap();
    assert_eq!((cleaned.width(), cleaned.height()), (40, 20));
}

#[test]
fn presets_parse_case_insensitively() {
    assert_eq!(
        "document".parse::<ImageCleaningKind>().unwrap(),
        ImageCleaningKind::Document
    );
    assert_eq!(
        "HIGHQUALITY".parse::<ImageInterpolationKind>().unwrap(),
        ImageInterpolationKind::HighQuality
    );
    assert!("sepia".parse::<ImageCleaningKind>().is_err());
}

#[test]
fn builtins_run_on_cpu_only() {
    let rectifier = BuiltinFactory::rectifier();
    assert!(rectifier.can_bind(&ExecutionDevice::cpu()));
    assert!(!rectifier.can_bind(&ExecutionDevice::gpu("Test GPU", 0)));
    assert_eq!(
        rectifier.descriptor().supported_kinds,
        vec![DeviceKind::Cpu]
    );
}
