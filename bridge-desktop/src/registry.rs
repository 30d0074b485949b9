//! Static Resource Type Registry

use bridge_traits::{
    registry::{IngredientProbe, ResourceTypeInfo, ResourceTypeRegistry},
    resource::{Ingredient, ResourceKey},
};
use std::collections::HashMap;
use std::sync::Arc;

/// Probe for types whose ingredients are cached under
/// `"{prefix}{owner}/{language}/{id}/{ingredient}"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPathProbe {
    prefix: String,
}

impl KeyPathProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl IngredientProbe for KeyPathProbe {
    fn ingredient_cache_key(&self, resource: &ResourceKey, ingredient: &Ingredient) -> String {
        format!("{}{}/{}", self.prefix, resource, ingredient.identifier)
    }
}

/// Registry whose contents are fixed at startup.
///
/// # Example
///
/// ```
/// use bridge_desktop::{KeyPathProbe, StaticTypeRegistry};
/// use bridge_traits::{DependencyRule, ResourceTypeInfo, ResourceTypeRegistry};
///
/// let registry = StaticTypeRegistry::builder()
///     .register(ResourceTypeInfo::new("scripture").with_priority(1))
///     .register_with_probe(
///         ResourceTypeInfo::new("notes")
///             .with_priority(10)
///             .with_dependency(DependencyRule::on("scripture").same_owner().same_language()),
///         KeyPathProbe::new(),
///     )
///     .build();
///
/// assert_eq!(registry.get("scripture").unwrap().download_priority, Some(1));
/// assert!(registry.ingredient_probe("notes").is_some());
/// assert!(registry.get("lexicon").is_none());
/// ```
#[derive(Default)]
pub struct StaticTypeRegistry {
    types: HashMap<String, ResourceTypeInfo>,
    probes: HashMap<String, Arc<dyn IngredientProbe>>,
}

impl StaticTypeRegistry {
    pub fn builder() -> StaticTypeRegistryBuilder {
        StaticTypeRegistryBuilder::default()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl ResourceTypeRegistry for StaticTypeRegistry {
    fn get(&self, type_id: &str) -> Option<ResourceTypeInfo> {
        self.types.get(type_id).cloned()
    }

    fn ingredient_probe(&self, type_id: &str) -> Option<Arc<dyn IngredientProbe>> {
        self.probes.get(type_id).cloned()
    }
}

impl std::fmt::Debug for StaticTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTypeRegistry")
            .field("types", &self.types)
            .field("probes", &self.probes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`StaticTypeRegistry`]. Registering a type id twice keeps the
/// last registration.
#[derive(Default)]
pub struct StaticTypeRegistryBuilder {
    registry: StaticTypeRegistry,
}

impl StaticTypeRegistryBuilder {
    pub fn register(mut self, info: ResourceTypeInfo) -> Self {
        self.registry.probes.remove(&info.type_id);
        self.registry.types.insert(info.type_id.clone(), info);
        self
    }

    pub fn register_with_probe(
        mut self,
        info: ResourceTypeInfo,
        probe: impl IngredientProbe + 'static,
    ) -> Self {
        self.registry
            .probes
            .insert(info.type_id.clone(), Arc::new(probe));
        self.registry.types.insert(info.type_id.clone(), info);
        self
    }

    pub fn build(self) -> StaticTypeRegistry {
        self.registry
    }
}
