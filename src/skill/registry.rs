//! Name-keyed skill registry, built once at startup.

use std::sync::Arc;

use tracing::debug;

use super::traits::SkillFactory;
use crate::types::SkillDescriptor;
use crate::{HuginnError, Result};

/// Skill factories in registration order.
#[derive(Default)]
pub struct SkillRegistry {
    factories: Vec<Arc<dyn SkillFactory>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. A later factory with the same skill name
    /// replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn SkillFactory>) -> &mut Self {
        let name = factory.descriptor().name.clone();
        debug!(skill = %name, "registering skill");
        match self
            .factories
            .iter_mut()
            .find(|f| f.descriptor().name == name)
        {
            Some(existing) => *existing = factory,
            None => self.factories.push(factory),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SkillFactory>> {
        self.factories
            .iter()
            .find(|f| f.descriptor().name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Like [`get`](Self::get) but an unknown name is an input error.
    pub fn require(&self, name: &str) -> Result<Arc<dyn SkillFactory>> {
        self.get(name).ok_or_else(|| {
            HuginnError::InvalidInput(format!(
                "unknown skill '{name}' (available: {})",
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.factories
            .iter()
            .map(|f| f.descriptor().name.clone())
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SkillDescriptor> {
        self.factories.iter().map(|f| f.descriptor())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
