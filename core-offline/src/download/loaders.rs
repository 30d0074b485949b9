//! Loader lookup by descriptor.

use bridge_traits::{ResourceDescriptor, ResourceLoader};
use std::fmt;
use std::sync::Arc;

/// Ordered set of loaders; the first that can handle a descriptor owns it.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn ResourceLoader>>,
}

impl LoaderRegistry {
    pub fn new(loaders: Vec<Arc<dyn ResourceLoader>>) -> Self {
        Self { loaders }
    }

    pub fn register(&mut self, loader: Arc<dyn ResourceLoader>) {
        self.loaders.push(loader);
    }

    pub fn find(&self, descriptor: &ResourceDescriptor) -> Option<Arc<dyn ResourceLoader>> {
        self.loaders
            .iter()
            .find(|loader| loader.can_handle(descriptor))
            .cloned()
    }

    pub fn can_download(&self, descriptor: &ResourceDescriptor) -> bool {
        self.loaders.iter().any(|loader| loader.can_handle(descriptor))
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.loaders.iter().map(|l| l.name()))
            .finish()
    }
}
