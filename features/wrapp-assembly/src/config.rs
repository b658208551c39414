use std::sync::Arc;

use crate::{descriptor::DescriptorCache, extension::ExtensionRegistry};

/// Settings of a single assembly
///
/// Assemblies only share caches when they are handed the same `Arc`s.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Name of the application scope, the first segment of every scope path
    pub name: String,
    pub descriptors: Arc<DescriptorCache>,
    pub extensions: Arc<ExtensionRegistry>,
    /// Seal scopes left open when the assembly finishes, parents before children
    ///
    /// If disabled, an open scope fails the build.
    pub auto_seal: bool,
}
impl Default for AssemblyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblyConfig {
    pub fn new() -> Self {
        Self {
            name: "app".to_string(),
            descriptors: Arc::new(DescriptorCache::new()),
            extensions: Arc::new(ExtensionRegistry::new()),
            auto_seal: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_descriptors(mut self, descriptors: Arc<DescriptorCache>) -> Self {
        self.descriptors = descriptors;
        self
    }

    /// Uses the given cache if there is one, keeping the current one otherwise
    pub fn maybe_descriptors(self, descriptors: Option<Arc<DescriptorCache>>) -> Self {
        match descriptors {
            Some(descriptors) => self.with_descriptors(descriptors),
            None => self,
        }
    }

    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Uses the given registry if there is one, keeping the current one otherwise
    pub fn maybe_extensions(self, extensions: Option<Arc<ExtensionRegistry>>) -> Self {
        match extensions {
            Some(extensions) => self.with_extensions(extensions),
            None => self,
        }
    }

    pub fn with_auto_seal(mut self, auto_seal: bool) -> Self {
        self.auto_seal = auto_seal;
        self
    }
}
