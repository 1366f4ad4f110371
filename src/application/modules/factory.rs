//! Factory registry - entry points compiled into the host

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::application::errors::BoxError;
use super::module::{Module, ModuleContext, ModuleFactory};

/// Entry points provided by the host binary.
///
/// Shared entries form the framework namespace every module loader falls back
/// to. Linked entries are scoped to a single module id and are only visible to
/// that module's artifact.
#[derive(Default)]
pub struct FactoryRegistry {
    shared: RwLock<HashMap<String, ModuleFactory>>,
    linked: RwLock<HashMap<(String, String), ModuleFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a framework entry point visible to every module
    pub fn register_shared<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleContext) -> Result<Box<dyn Module>, BoxError> + Send + Sync + 'static,
    {
        self.shared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(factory));
    }

    /// Register an entry point that only `module_id`'s artifact can resolve
    pub fn register_linked<F>(&self, module_id: &str, name: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleContext) -> Result<Box<dyn Module>, BoxError> + Send + Sync + 'static,
    {
        self.linked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((module_id.to_lowercase(), name.into()), Arc::new(factory));
    }

    pub fn shared(&self, name: &str) -> Option<ModuleFactory> {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn linked(&self, module_id: &str, name: &str) -> Option<ModuleFactory> {
        self.linked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(module_id.to_string(), name.to_string()))
            .cloned()
    }
}
