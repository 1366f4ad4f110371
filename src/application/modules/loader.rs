//! Isolated loader - resolves entry points for exactly one artifact

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::application::errors::{BoxError, ModuleError};
use super::artifact::Artifact;
use super::factory::FactoryRegistry;
use super::module::{Module, ModuleContext, ModuleFactory};

/// Namespace an entry point was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    /// The module's own artifact
    Local,
    /// The host's shared framework namespace
    Shared,
}

/// A resolved, constructible entry point
#[derive(Clone)]
pub struct EntryPoint {
    name: String,
    origin: EntryOrigin,
    factory: ModuleFactory,
}

impl EntryPoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> EntryOrigin {
        self.origin
    }

    /// Build a fresh instance
    pub fn construct(&self, context: &ModuleContext) -> Result<Box<dyn Module>, BoxError> {
        (self.factory)(context)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Per-module code-loading boundary.
///
/// Local names come from the module's artifact only; anything else falls back
/// to the shared framework namespace. Names that failed local resolution once
/// are remembered so the artifact is not searched for them again.
pub struct ModuleLoader {
    module_id: String,
    resolved: Mutex<HashMap<String, EntryPoint>>,
    not_local: Mutex<HashSet<String>>,
    parent: Arc<FactoryRegistry>,
    // Dropped last: cached factories above may still point into its code.
    artifact: Box<dyn Artifact>,
}

impl ModuleLoader {
    pub fn new(module_id: impl Into<String>, artifact: Box<dyn Artifact>, parent: Arc<FactoryRegistry>) -> Self {
        Self {
            module_id: module_id.into(),
            resolved: Mutex::new(HashMap::new()),
            not_local: Mutex::new(HashSet::new()),
            parent,
            artifact,
        }
    }

    pub fn artifact_path(&self) -> &Path {
        self.artifact.path()
    }

    /// Resolve an entry point by name
    pub fn load_entry(&self, name: &str) -> Result<EntryPoint, ModuleError> {
        if let Some(entry) = self.resolved.lock().unwrap_or_else(PoisonError::into_inner).get(name) {
            return Ok(entry.clone());
        }

        let known_remote = self
            .not_local
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name);

        if !known_remote {
            if let Some(factory) = self.artifact.find_local(name) {
                tracing::debug!(module = %self.module_id, entry = name, "Resolved entry point locally");
                let entry = EntryPoint {
                    name: name.to_string(),
                    origin: EntryOrigin::Local,
                    factory,
                };
                self.resolved
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), entry.clone());
                return Ok(entry);
            }

            self.not_local
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string());
        }

        match self.parent.shared(name) {
            Some(factory) => {
                tracing::debug!(module = %self.module_id, entry = name, "Resolved entry point from shared namespace");
                Ok(EntryPoint {
                    name: name.to_string(),
                    origin: EntryOrigin::Shared,
                    factory,
                })
            }
            None => Err(ModuleError::EntryPointNotFound {
                id: self.module_id.clone(),
                entry_point: name.to_string(),
            }),
        }
    }
}
