//! Tests for the skill binding lifecycle.

use std::sync::Arc;

use huginn::model::{ConceptModel, SharedModel};
use huginn::skill::concept_tagger::{self, ConceptTaggerFactory, ConceptTaggerResult};
use huginn::skill::image_scanning::BuiltinFactory;
use huginn::{
    BindingState, ConceptTagScore, ExecutionDevice, FeatureValue, Frame, HuginnError, Result,
    Skill, SkillBinding, SkillFactory, bind_and_evaluate,
};
use image::DynamicImage;

// ============================================================================
// Fixtures
// ============================================================================

/// Tags an image by its width, so successive frames are distinguishable.
struct WidthTagger;

impl ConceptModel for WidthTagger {
    fn tag(&self, image: &DynamicImage) -> Result<Vec<ConceptTagScore>> {
        Ok(vec![ConceptTagScore::new(format!("w{}", image.width()), 0.9)])
    }
}

async fn tagger() -> Arc<dyn Skill> {
    let factory = ConceptTaggerFactory::new(Arc::new(SharedModel::new(
        Arc::new(WidthTagger) as Arc<dyn ConceptModel>
    )));
    factory.create_skill(ExecutionDevice::cpu()).await.unwrap()
}

fn frame(width: u32) -> Frame {
    Frame::from_image(DynamicImage::new_rgb8(width, 4))
}

fn first_tag(binding: &SkillBinding) -> String {
    ConceptTaggerResult::from_binding(binding).unwrap().all_tags()[0]
        .name
        .clone()
}

// ============================================================================
// State machine
// ============================================================================

#[tokio::test]
async fn new_binding_is_ready_without_outputs() {
    let skill = tagger().await;
    let binding = skill.create_binding();
    assert_eq!(binding.state(), BindingState::Ready);
    assert_eq!(binding.evaluations(), 0);
    assert!(matches!(
        binding.output(concept_tagger::OUTPUT_TAGS),
        Err(HuginnError::OutputsUnavailable { state: "ready" })
    ));
}

#[tokio::test]
async fn binding_moves_through_bound_and_evaluated() {
    let skill = tagger().await;
    let mut binding = skill.create_binding();

    binding.set_input_image(&frame(8)).unwrap();
    assert_eq!(binding.state(), BindingState::Bound);
    assert!(binding.primary_output().is_err());

    skill.evaluate(&mut binding).await.unwrap();
    assert_eq!(binding.state(), BindingState::Evaluated);
    assert_eq!(binding.evaluations(), 1);
    assert_eq!(first_tag(&binding), "w8");
}

#[tokio::test]
async fn rebinding_hides_stale_outputs() {
    let skill = tagger().await;
    let mut binding = skill.create_binding();
    bind_and_evaluate(skill.as_ref(), &mut binding, &frame(8)).await.unwrap();

    binding.set_input_image(&frame(16)).unwrap();
    assert_eq!(binding.state(), BindingState::Bound);
    assert!(matches!(
        binding.output(concept_tagger::OUTPUT_TAGS),
        Err(HuginnError::OutputsUnavailable { state: "bound" })
    ));

    skill.evaluate(&mut binding).await.unwrap();
    assert_eq!(first_tag(&binding), "w16");
    assert_eq!(binding.evaluations(), 2);
}

#[tokio::test]
async fn bindings_from_one_skill_are_independent() {
    let skill = tagger().await;
    let mut a = skill.create_binding();
    let mut b = skill.create_binding();

    bind_and_evaluate(skill.as_ref(), &mut a, &frame(2)).await.unwrap();
    bind_and_evaluate(skill.as_ref(), &mut b, &frame(3)).await.unwrap();

    assert_eq!(first_tag(&a), "w2");
    assert_eq!(first_tag(&b), "w3");
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn foreign_binding_is_rejected() {
    let skill = tagger().await;
    let cleaner = BuiltinFactory::cleaner()
        .create_skill(ExecutionDevice::cpu())
        .await
        .unwrap();

    let mut foreign = cleaner.create_binding();
    foreign.set_input_image(&frame(4)).unwrap();

    let err = skill.evaluate(&mut foreign).await.unwrap_err();
    assert!(matches!(err, HuginnError::BindingMismatch { .. }));
    assert_eq!(foreign.state(), BindingState::Bound);
}

#[tokio::test]
async fn evaluate_without_input_fails() {
    let skill = tagger().await;
    let mut binding = skill.create_binding();
    let err = skill.evaluate(&mut binding).await.unwrap_err();
    assert!(matches!(err, HuginnError::InvalidInput(_)));
    assert_eq!(binding.state(), BindingState::Ready);
}

#[tokio::test]
async fn empty_frame_cannot_be_bound() {
    let skill = tagger().await;
    let mut binding = skill.create_binding();
    let err = binding.set_input_image(&Frame::empty(4, 4)).unwrap_err();
    assert!(matches!(err, HuginnError::InvalidInput(_)));
    assert_eq!(binding.state(), BindingState::Ready);
}

#[tokio::test]
async fn unknown_features_are_not_found() {
    let skill = tagger().await;
    let mut binding = skill.create_binding();

    let err = binding
        .set_parameter("Threshold", FeatureValue::Text("0.5".into()))
        .unwrap_err();
    assert!(matches!(err, HuginnError::FeatureNotFound(_)));

    bind_and_evaluate(skill.as_ref(), &mut binding, &frame(1)).await.unwrap();
    let err = binding.output("boxes").unwrap_err();
    assert!(matches!(err, HuginnError::FeatureNotFound(_)));
}

#[test]
fn binding_remembers_its_skill() {
    let descriptor = concept_tagger::descriptor();
    let binding = SkillBinding::new(&descriptor);
    assert_eq!(binding.skill_name(), concept_tagger::SKILL_NAME);
    assert_eq!(binding.skill_id(), descriptor.id);
    assert!(binding.ensure_owner(&descriptor).is_ok());
}
