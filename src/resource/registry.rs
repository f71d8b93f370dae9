// src/resource/registry.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{Result, TuttleError};

use super::{split_url, FileResource, Resource, ResourceSettings};

/// Constructor for one scheme: receives the full url and the part after `://`.
pub type ResourceFactory = fn(&str, &str, &ResourceSettings) -> Arc<dyn Resource>;

/// Startup-time mapping from url scheme to backend constructor.
///
/// The registry is built once and passed around explicitly; nothing is
/// registered at runtime behind the caller's back.
#[derive(Clone)]
pub struct ResourceRegistry {
    settings: ResourceSettings,
    factories: HashMap<&'static str, ResourceFactory>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.factories.keys().collect();
        schemes.sort();
        f.debug_struct("ResourceRegistry")
            .field("settings", &self.settings)
            .field("schemes", &schemes)
            .finish()
    }
}

impl ResourceRegistry {
    /// Registry with no backend at all.
    pub fn empty(settings: ResourceSettings) -> Self {
        Self {
            settings,
            factories: HashMap::new(),
        }
    }

    /// Registry with every backend shipped in this crate.
    pub fn with_builtin(settings: ResourceSettings) -> Self {
        let mut registry = Self::empty(settings);
        registry.register("file", build_file);
        registry
    }

    pub fn register(&mut self, scheme: &'static str, factory: ResourceFactory) {
        self.factories.insert(scheme, factory);
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    /// Build the resource handle for `url`.
    pub fn build(&self, url: &str) -> Result<Arc<dyn Resource>> {
        let (scheme, path) = split_url(url)?;
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| TuttleError::UnsupportedScheme {
                scheme: scheme.to_string(),
                url: url.to_string(),
            })?;
        Ok(factory(url, path, &self.settings))
    }
}

fn build_file(url: &str, path: &str, settings: &ResourceSettings) -> Arc<dyn Resource> {
    Arc::new(FileResource::new(url, path, settings))
}
