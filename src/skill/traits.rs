//! Skill traits.
//!
//! A [`SkillFactory`] describes a capability and creates [`Skill`]
//! instances bound to one execution device. A skill evaluates
//! [`SkillBinding`]s it created.

use std::sync::Arc;

use async_trait::async_trait;

use super::binding::SkillBinding;
use crate::Result;
use crate::device::{DeviceRegistry, ExecutionDevice};
use crate::types::SkillDescriptor;

/// Describes a skill and instantiates it on a device.
#[async_trait]
pub trait SkillFactory: Send + Sync {
    fn descriptor(&self) -> &SkillDescriptor;

    /// Whether the skill's backend can run on `device`.
    fn can_bind(&self, device: &ExecutionDevice) -> bool {
        device.is_bindable() && self.descriptor().supports_kind(device.kind())
    }

    /// Devices from `registry` this skill can run on, in registry order.
    ///
    /// An empty list is a valid answer.
    fn supported_devices(&self, registry: &DeviceRegistry) -> Result<Vec<ExecutionDevice>> {
        Ok(registry
            .devices()?
            .iter()
            .filter(|d| self.can_bind(d))
            .cloned()
            .collect())
    }

    /// Create a skill instance owning `device` for its lifetime.
    ///
    /// Fails with `UnsupportedDevice` when `can_bind` is false.
    async fn create_skill(&self, device: ExecutionDevice) -> Result<Arc<dyn Skill>>;
}

/// A skill instance bound to one device.
#[async_trait]
pub trait Skill: Send + Sync {
    fn descriptor(&self) -> &SkillDescriptor;

    fn device(&self) -> &ExecutionDevice;

    /// A fresh, independent binding for this skill.
    fn create_binding(&self) -> SkillBinding {
        SkillBinding::new(self.descriptor())
    }

    /// Run the skill over the binding's current inputs and store outputs.
    ///
    /// A binding created by another skill fails with `BindingMismatch`.
    async fn evaluate(&self, binding: &mut SkillBinding) -> Result<()>;
}
