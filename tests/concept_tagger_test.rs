//! Tests for the concept tagger skill and its result reader.

use std::sync::Arc;

use huginn::model::{ConceptModel, LabelledClassifier, ScoreModel, SharedModel};
use huginn::postprocess::TieBreak;
use huginn::skill::concept_tagger::{
    self, ConceptTaggerFactory, ConceptTaggerResult, DEFAULT_THRESHOLD, DEFAULT_TOP_X,
};
use huginn::{
    ConceptTagScore, ExecutionDevice, Frame, Result, Skill, SkillFactory, bind_and_evaluate,
};
use image::DynamicImage;

struct FixedTags(Vec<ConceptTagScore>);

impl ConceptModel for FixedTags {
    fn tag(&self, _image: &DynamicImage) -> Result<Vec<ConceptTagScore>> {
        Ok(self.0.clone())
    }
}

struct FixedLogits(Vec<f32>);

impl ScoreModel for FixedLogits {
    fn score(&self, _image: &DynamicImage) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

fn beach_tags() -> Vec<ConceptTagScore> {
    vec![
        ConceptTagScore::new("beach", 0.95),
        ConceptTagScore::new("sand", 0.8),
        ConceptTagScore::new("sky", 0.65),
        ConceptTagScore::new("water", 0.72),
    ]
}

async fn run(model: Arc<dyn ConceptModel>) -> ConceptTaggerResult {
    let factory = ConceptTaggerFactory::new(Arc::new(SharedModel::new(model)));
    let skill = factory.create_skill(ExecutionDevice::cpu()).await.unwrap();
    let mut binding = skill.create_binding();
    bind_and_evaluate(
        skill.as_ref(),
        &mut binding,
        &Frame::from_image(DynamicImage::new_rgb8(32, 32)),
    )
    .await
    .unwrap();
    ConceptTaggerResult::from_binding(&binding).unwrap()
}

fn names(tags: &[ConceptTagScore]) -> Vec<&str> {
    tags.iter().map(|t| t.name.as_str()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn default_filter_prints_best_tags() {
    let result = run(Arc::new(FixedTags(beach_tags()))).await;
    let top = result.top_x_tags_above_threshold(DEFAULT_TOP_X, DEFAULT_THRESHOLD);
    assert_eq!(names(&top), vec!["beach", "sand", "water"]);
}

#[tokio::test]
async fn all_tags_keep_model_order() {
    let result = run(Arc::new(FixedTags(beach_tags()))).await;
    assert_eq!(
        names(result.all_tags()),
        vec!["beach", "sand", "sky", "water"]
    );
}

#[tokio::test]
async fn distinct_tags_collapse_duplicate_names() {
    let result = run(Arc::new(FixedTags(vec![
        ConceptTagScore::new("cat", 0.9),
        ConceptTagScore::new("dog", 0.6),
        ConceptTagScore::new("cat", 0.8),
    ])))
    .await;

    let distinct = result.distinct_tags();
    assert_eq!(names(&distinct), vec!["cat", "dog"]);
    assert_eq!(distinct[0].score, 0.8);
}

#[tokio::test]
async fn labelled_classifier_feeds_the_skill() {
    let classifier = LabelledClassifier::new(
        Arc::new(FixedLogits(vec![4.0, 0.0, 0.0])),
        vec!["dog".to_string(), "cat".to_string(), "bird".to_string()],
    );
    let result = run(Arc::new(classifier)).await;

    let top = result.top_x_tags_above_threshold(1, 0.5);
    assert_eq!(names(&top), vec!["dog"]);
    let sum: f32 = result.all_tags().iter().map(|t| t.score).sum();
    assert!((sum - 1.0).abs() < 1e-5);
}

#[test]
fn tie_break_by_name_is_available_on_results() {
    let result = ConceptTaggerResult::from_tags(vec![
        ConceptTagScore::new("b", 0.9),
        ConceptTagScore::new("a", 0.9),
    ]);
    assert_eq!(
        names(&result.top_x_tags_above_threshold(2, 0.0)),
        vec!["b", "a"]
    );
    assert_eq!(
        names(&result.top_x_tags_above_threshold_by(2, 0.0, TieBreak::ByName)),
        vec!["a", "b"]
    );
}

#[test]
fn descriptor_has_one_image_input() {
    let descriptor = concept_tagger::descriptor();
    assert_eq!(descriptor.name, "ConceptTagger");
    assert_eq!(
        descriptor.image_input().map(|f| f.name.as_str()),
        Some(concept_tagger::INPUT_IMAGE)
    );
    assert_eq!(
        descriptor.primary_output().map(|f| f.name.as_str()),
        Some(concept_tagger::OUTPUT_TAGS)
    );
}
