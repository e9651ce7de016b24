//! Skill bindings: reusable named slots for one skill instance.
//!
//! A binding moves through `Ready -> Bound -> Evaluated -> Bound -> ...`.
//! Outputs are only readable in the `Evaluated` state; binding a new input
//! invalidates them, so stale results can never be observed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

use crate::types::{FeatureDescriptor, FeatureKind, FeatureValue, Frame, SkillDescriptor};
use crate::{HuginnError, Result};

/// Lifecycle state of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Created, nothing bound yet.
    Ready,
    /// An input changed since the last evaluation.
    Bound,
    /// Outputs reflect the current inputs.
    Evaluated,
}

impl BindingState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Bound => "bound",
            Self::Evaluated => "evaluated",
        }
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input and output slots for one skill.
#[derive(Debug)]
pub struct SkillBinding {
    skill_id: String,
    skill_name: String,
    input_features: Vec<FeatureDescriptor>,
    output_features: Vec<FeatureDescriptor>,
    inputs: HashMap<String, FeatureValue>,
    outputs: HashMap<String, FeatureValue>,
    state: BindingState,
    evaluations: u64,
}

impl SkillBinding {
    /// Empty binding for the skill described by `descriptor`.
    pub fn new(descriptor: &SkillDescriptor) -> Self {
        Self {
            skill_id: descriptor.id.clone(),
            skill_name: descriptor.name.clone(),
            input_features: descriptor.inputs.clone(),
            output_features: descriptor.outputs.clone(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            state: BindingState::Ready,
            evaluations: 0,
        }
    }

    pub fn skill_id(&self) -> &str {
        &self.skill_id
    }

    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    /// Number of successful evaluations against this binding.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Fail unless this binding was created for the skill `descriptor`
    /// describes.
    pub fn ensure_owner(&self, descriptor: &SkillDescriptor) -> Result<()> {
        if self.skill_id == descriptor.id {
            Ok(())
        } else {
            Err(HuginnError::BindingMismatch {
                expected: descriptor.name.clone(),
                found: self.skill_name.clone(),
            })
        }
    }

    /// Bind a frame into the skill's primary image input.
    pub fn set_input_image(&mut self, frame: &Frame) -> Result<()> {
        let name = self
            .input_features
            .iter()
            .find(|f| f.kind == FeatureKind::Image)
            .map(|f| f.name.clone())
            .ok_or_else(|| {
                HuginnError::FeatureNotFound(format!("{} has no image input", self.skill_name))
            })?;
        self.set_input_image_named(&name, frame)
    }

    /// Bind a frame into the named image input.
    ///
    /// The binding keeps the decoded pixels, never the frame, so any pool
    /// lease the frame carries is released when the caller drops it.
    pub fn set_input_image_named(&mut self, name: &str, frame: &Frame) -> Result<()> {
        let feature = self.input_feature(name)?;
        if feature.kind != FeatureKind::Image {
            return Err(HuginnError::InvalidInput(format!(
                "input '{name}' is not an image feature"
            )));
        }
        let image = frame.to_image()?;
        self.inputs.insert(name.to_string(), FeatureValue::Image(image));
        self.state = BindingState::Bound;
        Ok(())
    }

    /// Bind a decoded image directly.
    pub fn set_image(&mut self, name: &str, image: Arc<DynamicImage>) -> Result<()> {
        self.set_parameter(name, FeatureValue::Image(image))
    }

    /// Set any declared input.
    pub fn set_parameter(&mut self, name: &str, value: FeatureValue) -> Result<()> {
        self.input_feature(name)?;
        self.inputs.insert(name.to_string(), value);
        self.state = BindingState::Bound;
        Ok(())
    }

    pub fn input(&self, name: &str) -> Option<&FeatureValue> {
        self.inputs.get(name)
    }

    /// The image bound to `name`.
    pub fn input_image(&self, name: &str) -> Result<Arc<DynamicImage>> {
        match self.inputs.get(name) {
            Some(FeatureValue::Image(image)) => Ok(Arc::clone(image)),
            Some(other) => Err(HuginnError::InvalidInput(format!(
                "input '{name}' holds {}, not an image",
                other.kind_name()
            ))),
            None => Err(HuginnError::InvalidInput(format!(
                "input '{name}' is not bound"
            ))),
        }
    }

    /// Read an output. Only valid after a successful evaluation.
    pub fn output(&self, name: &str) -> Result<&FeatureValue> {
        if self.state != BindingState::Evaluated {
            return Err(HuginnError::OutputsUnavailable {
                state: self.state.name(),
            });
        }
        self.output_feature(name)?;
        self.outputs
            .get(name)
            .ok_or_else(|| HuginnError::FeatureNotFound(format!("output '{name}' was not produced")))
    }

    /// The primary (index 0) output.
    pub fn primary_output(&self) -> Result<&FeatureValue> {
        let name = self
            .output_features
            .first()
            .map(|f| f.name.as_str())
            .ok_or_else(|| HuginnError::FeatureNotFound(format!("{} has no outputs", self.skill_name)))?;
        self.output(name)
    }

    /// Store an output value. Called by skills during evaluation.
    pub fn set_output(&mut self, name: &str, value: FeatureValue) -> Result<()> {
        self.output_feature(name)?;
        self.outputs.insert(name.to_string(), value);
        Ok(())
    }

    /// Mark outputs as valid for the current inputs.
    pub fn mark_evaluated(&mut self) {
        self.state = BindingState::Evaluated;
        self.evaluations += 1;
    }

    fn input_feature(&self, name: &str) -> Result<&FeatureDescriptor> {
        self.input_features
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                HuginnError::FeatureNotFound(format!("{} has no input '{name}'", self.skill_name))
            })
    }

    fn output_feature(&self, name: &str) -> Result<&FeatureDescriptor> {
        self.output_features
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                HuginnError::FeatureNotFound(format!("{} has no output '{name}'", self.skill_name))
            })
    }
}
