//! Concept tags from a plain classifier.

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use super::{ConceptModel, ScoreModel};
use crate::postprocess::softmax;
use crate::types::ConceptTagScore;
use crate::{HuginnError, Result};

/// Turns a classifier's logits into concept tags, one per label.
pub struct LabelledClassifier {
    scorer: Arc<dyn ScoreModel>,
    labels: Arc<[String]>,
}

impl LabelledClassifier {
    pub fn new(scorer: Arc<dyn ScoreModel>, labels: impl Into<Arc<[String]>>) -> Self {
        Self {
            scorer,
            labels: labels.into(),
        }
    }

    /// Read labels from a text file, one per line. Blank lines are skipped.
    pub fn read_labels(path: &Path) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(path)?;
        let labels: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if labels.is_empty() {
            return Err(HuginnError::Configuration(format!(
                "label file {} is empty",
                path.display()
            )));
        }
        Ok(labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl ConceptModel for LabelledClassifier {
    fn tag(&self, image: &DynamicImage) -> Result<Vec<ConceptTagScore>> {
        let logits = self.scorer.score(image)?;
        if logits.len() != self.labels.len() {
            return Err(HuginnError::Model(format!(
                "classifier produced {} scores for {} labels",
                logits.len(),
                self.labels.len()
            )));
        }
        Ok(self
            .labels
            .iter()
            .zip(softmax(&logits))
            .map(|(label, score)| ConceptTagScore::new(label.clone(), score))
            .collect())
    }
}
