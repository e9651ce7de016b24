//! Skill descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::feature::{FeatureDescriptor, FeatureKind};
use crate::Result;
use crate::device::DeviceKind;

/// Skill version and authorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillVersion {
    pub author: String,
    pub publisher: String,
    pub major: u32,
    pub minor: u32,
}

impl SkillVersion {
    pub fn new(author: impl Into<String>, major: u32, minor: u32) -> Self {
        let author = author.into();
        Self {
            publisher: author.clone(),
            author,
            major,
            minor,
        }
    }
}

impl fmt::Display for SkillVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Static metadata describing a skill: what it consumes, what it produces,
/// and which device kinds it can run on.
///
/// Output index 0 is always the primary result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: SkillVersion,
    pub inputs: Vec<FeatureDescriptor>,
    pub outputs: Vec<FeatureDescriptor>,
    pub supported_kinds: Vec<DeviceKind>,
}

impl SkillDescriptor {
    /// Look up an input feature by name.
    pub fn input(&self, name: &str) -> Option<&FeatureDescriptor> {
        self.inputs.iter().find(|f| f.name == name)
    }

    /// Look up an output feature by name.
    pub fn output(&self, name: &str) -> Option<&FeatureDescriptor> {
        self.outputs.iter().find(|f| f.name == name)
    }

    /// The primary output (index 0).
    pub fn primary_output(&self) -> Option<&FeatureDescriptor> {
        self.outputs.first()
    }

    /// The first image input, which frame sources bind into.
    pub fn image_input(&self) -> Option<&FeatureDescriptor> {
        self.inputs.iter().find(|f| f.kind == FeatureKind::Image)
    }

    pub fn supports_kind(&self, kind: DeviceKind) -> bool {
        self.supported_kinds.contains(&kind)
    }

    /// Pretty-printed JSON rendering, used by `--describe`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SkillDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} ({})", self.name, self.version, self.id)
    }
}
