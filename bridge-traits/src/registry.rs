//! Resource Type Registry
//!
//! Type-level facts (download priority, dependency rules) and optional
//! per-type capabilities.

use std::sync::Arc;

use crate::resource::{DependencyRule, Ingredient, ResourceKey};

/// What the registry knows about one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceTypeInfo {
    pub type_id: String,
    /// Lower is more urgent. `None` lets the caller apply its default.
    pub download_priority: Option<u32>,
    pub dependencies: Vec<DependencyRule>,
}

impl ResourceTypeInfo {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            download_priority: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.download_priority = Some(priority);
        self
    }

    pub fn with_dependency(mut self, rule: DependencyRule) -> Self {
        self.dependencies.push(rule);
        self
    }
}

/// Capability for types whose ingredients are cached under predictable keys.
///
/// Types that opt in let the completeness checker recognise content that was
/// cached before completion markers existed.
pub trait IngredientProbe: Send + Sync {
    /// Cache key under which `ingredient` of `resource` is stored.
    fn ingredient_cache_key(&self, resource: &ResourceKey, ingredient: &Ingredient) -> String;
}

/// Registry lookup trait
pub trait ResourceTypeRegistry: Send + Sync {
    /// Facts for `type_id`, `None` for unknown types.
    fn get(&self, type_id: &str) -> Option<ResourceTypeInfo>;

    /// Ingredient probe for `type_id`, if the type supports one.
    fn ingredient_probe(&self, _type_id: &str) -> Option<Arc<dyn IngredientProbe>> {
        None
    }
}
