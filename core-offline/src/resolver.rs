//! # Dependency Resolver
//!
//! Turns type-level dependency rules into concrete resource keys, expands a
//! candidate set to its transitive closure and orders it so dependencies
//! always come first.
//!
//! ## Failure Policy
//!
//! Nothing in here returns an error. A missing descriptor, an unknown type or
//! a failing catalog read all degrade to "no dependencies" and are logged at
//! `warn`. Dependency cycles are broken during ordering and counted in
//! [`OrderedResources::cycles_broken`].
//!
//! ## Ordering Contract
//!
//! The result of [`DependencyResolver::reorder_with_dependencies`] is sorted
//! by dependency depth (longest chain of in-set dependencies below a
//! resource), then by declared priority (lower first). A resource never
//! precedes any of its in-set, non-cyclic dependencies.

use bridge_traits::{MetadataStore, ResourceDescriptor, ResourceKey, ResourceTypeRegistry};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::completeness::CompletenessChecker;

/// A resource with its dependencies and priority for one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedResource {
    pub key: ResourceKey,
    pub descriptor: ResourceDescriptor,
    /// Deduplicated, never contains `key` itself.
    pub dependencies: Vec<ResourceKey>,
    /// Lower is more urgent.
    pub priority: u32,
}

/// Result of ordering a resource set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderedResources {
    pub resources: Vec<ResolvedResource>,
    /// Back edges skipped while sorting. Non-zero means the relative order of
    /// the resources on those cycles is arbitrary.
    pub cycles_broken: usize,
}

impl OrderedResources {
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.resources.iter().map(|r| r.key.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }
}

pub struct DependencyResolver {
    metadata: Arc<dyn MetadataStore>,
    registry: Arc<dyn ResourceTypeRegistry>,
    checker: Arc<CompletenessChecker>,
    default_priority: u32,
}

impl DependencyResolver {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        registry: Arc<dyn ResourceTypeRegistry>,
        checker: Arc<CompletenessChecker>,
        default_priority: u32,
    ) -> Self {
        Self {
            metadata,
            registry,
            checker,
            default_priority,
        }
    }

    /// Priority of `type_id`, falling back to the configured default.
    pub fn priority_for(&self, type_id: &str) -> u32 {
        self.registry
            .get(type_id)
            .and_then(|info| info.download_priority)
            .unwrap_or(self.default_priority)
    }

    /// Keys of the catalog resources `key` depends on.
    #[instrument(skip(self), fields(resource = %key))]
    pub async fn resolve_dependencies(&self, key: &ResourceKey) -> Vec<ResourceKey> {
        match self.metadata.get_resource_metadata(key).await {
            Ok(Some(descriptor)) => self.dependencies_of(&descriptor).await,
            Ok(None) => {
                debug!("Resource not in catalog, no dependencies");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Descriptor lookup failed, treating as no dependencies");
                Vec::new()
            }
        }
    }

    async fn dependencies_of(&self, descriptor: &ResourceDescriptor) -> Vec<ResourceKey> {
        let rules = match self.registry.get(&descriptor.resource_type) {
            Some(info) if !info.dependencies.is_empty() => info.dependencies,
            _ => return Vec::new(),
        };

        let catalog = match self.metadata.get_all_resources().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(
                    resource = %descriptor.key,
                    error = %e,
                    "Catalog scan failed, treating as no dependencies"
                );
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();
        for rule in &rules {
            let target = rule.target_for(&descriptor.key);
            for candidate in &catalog {
                if candidate.key != descriptor.key
                    && target.matches(candidate)
                    && seen.insert(candidate.key.clone())
                {
                    dependencies.push(candidate.key.clone());
                }
            }
        }

        dependencies
    }

    /// Dependencies and priority of a descriptor.
    pub async fn resolve(&self, descriptor: ResourceDescriptor) -> ResolvedResource {
        let dependencies = self.dependencies_of(&descriptor).await;
        let priority = self.priority_for(&descriptor.resource_type);
        ResolvedResource {
            key: descriptor.key.clone(),
            descriptor,
            dependencies,
            priority,
        }
    }

    /// Like [`resolve`](Self::resolve), starting from a key. `None` when the
    /// key is not in the catalog.
    pub async fn resolve_key(&self, key: &ResourceKey) -> Option<ResolvedResource> {
        match self.metadata.get_resource_metadata(key).await {
            Ok(Some(descriptor)) => Some(self.resolve(descriptor).await),
            Ok(None) => {
                warn!(resource = %key, "Dependency not in catalog");
                None
            }
            Err(e) => {
                warn!(resource = %key, error = %e, "Descriptor lookup failed");
                None
            }
        }
    }

    async fn is_complete(&self, key: &ResourceKey) -> bool {
        match self.checker.check_resource(key).await {
            Ok(status) => status.is_complete(),
            Err(e) => {
                warn!(resource = %key, error = %e, "Completeness check failed, assuming incomplete");
                false
            }
        }
    }

    /// Add every transitive dependency of `resources` to the set.
    ///
    /// With `skip_complete`, complete resources are not expanded and complete
    /// dependencies are not added. Input order is kept; discovered
    /// dependencies follow in discovery order.
    #[instrument(skip(self, resources), fields(initial = resources.len()))]
    pub async fn expand_with_dependencies(
        &self,
        resources: Vec<ResolvedResource>,
        skip_complete: bool,
    ) -> Vec<ResolvedResource> {
        let mut order: Vec<ResourceKey> = Vec::with_capacity(resources.len());
        let mut included: HashMap<ResourceKey, ResolvedResource> = HashMap::new();
        let mut worklist = VecDeque::new();

        for resource in resources {
            if included.contains_key(&resource.key) {
                continue;
            }
            order.push(resource.key.clone());
            worklist.push_back(resource.key.clone());
            included.insert(resource.key.clone(), resource);
        }

        while let Some(key) = worklist.pop_front() {
            if skip_complete && self.is_complete(&key).await {
                continue;
            }

            let dependencies = match included.get(&key) {
                Some(resource) => resource.dependencies.clone(),
                None => continue,
            };

            for dependency in dependencies {
                if included.contains_key(&dependency) {
                    continue;
                }
                if skip_complete && self.is_complete(&dependency).await {
                    continue;
                }
                if let Some(resolved) = self.resolve_key(&dependency).await {
                    debug!(resource = %key, dependency = %dependency, "Pulled in dependency");
                    order.push(dependency.clone());
                    worklist.push_back(dependency.clone());
                    included.insert(dependency, resolved);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|key| included.remove(&key))
            .collect()
    }

    /// Order `resources` so dependencies come first, then by priority.
    #[instrument(skip(self, resources), fields(count = resources.len()))]
    pub async fn reorder_with_dependencies(
        &self,
        resources: Vec<ResolvedResource>,
        skip_complete: bool,
    ) -> OrderedResources {
        let mut pending = Vec::with_capacity(resources.len());
        for resource in resources {
            if skip_complete && self.is_complete(&resource.key).await {
                debug!(resource = %resource.key, "Already complete, dropped from order");
                continue;
            }
            pending.push(resource);
        }

        order_resources(pending)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

struct Graph<'a> {
    deps: HashMap<&'a ResourceKey, Vec<&'a ResourceKey>>,
}

impl<'a> Graph<'a> {
    fn new(resources: &'a [ResolvedResource]) -> Self {
        let members: HashSet<&ResourceKey> = resources.iter().map(|r| &r.key).collect();
        let deps = resources
            .iter()
            .map(|r| {
                let in_set = r
                    .dependencies
                    .iter()
                    .filter(|d| members.contains(d))
                    .collect();
                (&r.key, in_set)
            })
            .collect();
        Self { deps }
    }

    fn dependencies(&self, key: &ResourceKey) -> &[&'a ResourceKey] {
        self.deps.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first post-order; returns the number of back edges skipped.
    fn visit(
        &self,
        key: &'a ResourceKey,
        state: &mut HashMap<&'a ResourceKey, Visit>,
        sorted: &mut Vec<&'a ResourceKey>,
    ) -> usize {
        match state.get(key) {
            Some(Visit::Done) => return 0,
            Some(Visit::InProgress) => {
                warn!(resource = %key, "Dependency cycle detected, breaking it");
                return 1;
            }
            None => {}
        }

        state.insert(key, Visit::InProgress);
        let mut cycles = 0;
        for dependency in self.dependencies(key).iter().copied() {
            cycles += self.visit(dependency, state, sorted);
        }
        state.insert(key, Visit::Done);
        sorted.push(key);
        cycles
    }

    /// Longest chain of in-set dependencies below `key`. Edges closing a
    /// cycle contribute nothing.
    fn depth(
        &self,
        key: &'a ResourceKey,
        memo: &mut HashMap<&'a ResourceKey, usize>,
        on_path: &mut HashSet<&'a ResourceKey>,
    ) -> usize {
        if let Some(depth) = memo.get(key) {
            return *depth;
        }
        if !on_path.insert(key) {
            return 0;
        }

        let mut depth = 0;
        for dependency in self.dependencies(key).iter().copied() {
            if on_path.contains(dependency) {
                continue;
            }
            depth = depth.max(self.depth(dependency, memo, on_path) + 1);
        }

        on_path.remove(key);
        memo.insert(key, depth);
        depth
    }
}

/// Topological sort followed by a stable (depth, priority) sort.
fn order_resources(resources: Vec<ResolvedResource>) -> OrderedResources {
    let (sorted_keys, depths, cycles_broken) = {
        let graph = Graph::new(&resources);

        let mut state = HashMap::new();
        let mut sorted = Vec::with_capacity(resources.len());
        let mut cycles_broken = 0;
        for resource in &resources {
            cycles_broken += graph.visit(&resource.key, &mut state, &mut sorted);
        }

        let mut memo = HashMap::new();
        let mut on_path = HashSet::new();
        let mut depths: HashMap<ResourceKey, usize> = HashMap::with_capacity(sorted.len());
        for key in sorted.iter().copied() {
            depths.insert(key.clone(), graph.depth(key, &mut memo, &mut on_path));
        }

        let sorted_keys: Vec<ResourceKey> = sorted.into_iter().cloned().collect();
        (sorted_keys, depths, cycles_broken)
    };

    let mut by_key: HashMap<ResourceKey, ResolvedResource> = resources
        .into_iter()
        .map(|r| (r.key.clone(), r))
        .collect();

    let mut ordered: Vec<ResolvedResource> = sorted_keys
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();

    ordered.sort_by_key(|r| (depths.get(&r.key).copied().unwrap_or(0), r.priority));

    if cycles_broken > 0 {
        warn!(cycles_broken, "Ordering completed with broken dependency cycles");
    }

    OrderedResources {
        resources: ordered,
        cycles_broken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(id: &str, deps: &[&str], priority: u32) -> ResolvedResource {
        let key = ResourceKey::new("org1", "en", id);
        ResolvedResource {
            descriptor: ResourceDescriptor::new(key.clone(), "scripture"),
            key,
            dependencies: deps
                .iter()
                .map(|d| ResourceKey::new("org1", "en", *d))
                .collect(),
            priority,
        }
    }

    fn ids(ordered: &OrderedResources) -> Vec<String> {
        ordered
            .resources
            .iter()
            .map(|r| r.key.resource_id.clone())
            .collect()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let ordered = order_resources(vec![
            resolved("c", &["b"], 1),
            resolved("b", &["a"], 1),
            resolved("a", &[], 99),
        ]);
        assert_eq!(ids(&ordered), vec!["a", "b", "c"]);
        assert_eq!(ordered.cycles_broken, 0);
    }

    #[test]
    fn test_priority_breaks_depth_ties() {
        let ordered = order_resources(vec![
            resolved("notes", &[], 20),
            resolved("lexicon", &[], 30),
            resolved("text", &[], 1),
        ]);
        assert_eq!(ids(&ordered), vec!["text", "notes", "lexicon"]);
    }

    #[test]
    fn test_depth_beats_priority() {
        let ordered = order_resources(vec![
            resolved("urgent", &["base"], 1),
            resolved("base", &[], 90),
            resolved("other", &[], 50),
        ]);
        assert_eq!(ids(&ordered), vec!["other", "base", "urgent"]);
    }

    #[test]
    fn test_out_of_set_dependencies_ignored() {
        let ordered = order_resources(vec![resolved("a", &["elsewhere"], 1)]);
        assert_eq!(ids(&ordered), vec!["a"]);
    }

    #[test]
    fn test_cycle_terminates_with_each_resource_once() {
        let ordered = order_resources(vec![resolved("a", &["b"], 1), resolved("b", &["a"], 1)]);
        let mut got = ids(&ordered);
        got.sort();
        assert_eq!(got, vec!["a", "b"]);
        assert_eq!(ordered.cycles_broken, 1);
    }

    #[test]
    fn test_diamond() {
        let ordered = order_resources(vec![
            resolved("top", &["left", "right"], 1),
            resolved("left", &["bottom"], 5),
            resolved("right", &["bottom"], 2),
            resolved("bottom", &[], 9),
        ]);
        assert_eq!(ids(&ordered), vec!["bottom", "right", "left", "top"]);
    }
}
