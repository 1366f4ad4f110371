//! Linked artifacts - modules compiled into the host binary
//!
//! The artifact is a JSON document:
//!
//! ```json
//! {
//!   "descriptor": { "id": "ping", "version": "1.0.0", "entryPoint": "PingModule" },
//!   "exports": ["PingModule"]
//! }
//! ```
//!
//! Exported names resolve to factories the host registered for that module id
//! with [`FactoryRegistry::register_linked`]. Installing a new version of the
//! document decides which build of a linked module is active.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::errors::ModuleError;
use crate::application::modules::{Artifact, ArtifactFormat, FactoryRegistry, ModuleFactory};
use crate::domain::entities::ModuleDescriptor;
use super::store::ArtifactStore;

/// File extension of linked artifacts
pub const LINKED_EXTENSION: &str = "module";

#[derive(Debug, Deserialize, Serialize)]
struct LinkedDocument {
    descriptor: serde_json::Value,
    #[serde(default)]
    exports: Vec<String>,
}

/// Opens linked artifacts against a factory registry
#[derive(Clone)]
pub struct LinkedFormat {
    factories: Arc<FactoryRegistry>,
}

impl LinkedFormat {
    pub fn new(factories: Arc<FactoryRegistry>) -> Self {
        Self { factories }
    }

    /// Write the artifact for `descriptor` into `store`.
    ///
    /// Artifacts are immutable: an existing file for the same id and version is
    /// never overwritten.
    pub fn package(store: &ArtifactStore, descriptor: &ModuleDescriptor, exports: &[&str]) -> Result<PathBuf, ModuleError> {
        let path = store.artifact_path(&descriptor.id, &descriptor.version);
        if path.exists() {
            return Err(ModuleError::artifact_read(&path, "artifact already exists"));
        }

        let document = LinkedDocument {
            descriptor: serde_json::to_value(descriptor).map_err(|e| ModuleError::artifact_read(&path, e))?,
            exports: exports.iter().map(|e| e.to_string()).collect(),
        };
        let text = serde_json::to_string_pretty(&document).map_err(|e| ModuleError::artifact_read(&path, e))?;

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ModuleError::artifact_read(dir, e))?;
        }
        std::fs::write(&path, text).map_err(|e| ModuleError::artifact_read(&path, e))?;
        Ok(path)
    }
}

impl ArtifactFormat for LinkedFormat {
    fn extension(&self) -> &str {
        LINKED_EXTENSION
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Artifact>, ModuleError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ModuleError::ArtifactNotFound(path.to_path_buf())
            } else {
                ModuleError::artifact_read(path, e)
            }
        })?;

        let document: LinkedDocument = serde_json::from_str(&text)
            .map_err(|e| ModuleError::artifact_read(path, format!("malformed artifact: {}", e)))?;
        let descriptor = document.descriptor.to_string();
        let owner = ModuleDescriptor::from_json(&descriptor, path).ok().map(|d| d.id);

        Ok(Box::new(LinkedArtifact {
            path: path.to_path_buf(),
            descriptor,
            owner,
            exports: document.exports,
            factories: Arc::clone(&self.factories),
        }))
    }
}

struct LinkedArtifact {
    path: PathBuf,
    descriptor: String,
    owner: Option<String>,
    exports: Vec<String>,
    factories: Arc<FactoryRegistry>,
}

impl Artifact for LinkedArtifact {
    fn path(&self) -> &Path {
        &self.path
    }

    fn descriptor(&self) -> Result<ModuleDescriptor, ModuleError> {
        ModuleDescriptor::from_json(&self.descriptor, &self.path)
    }

    fn find_local(&self, name: &str) -> Option<ModuleFactory> {
        let owner = self.owner.as_deref()?;
        if !self.exports.iter().any(|e| e == name) {
            return None;
        }
        self.factories.linked(owner, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BoxError;
    use crate::application::modules::{HookResult, Module, ModuleContext};
    use semver::Version;
    use tempfile::tempdir;

    struct Quiet;

    impl Module for Quiet {
        fn init(&self, _context: &ModuleContext) -> HookResult {
            Ok(())
        }

        fn shut_down(&self) -> HookResult {
            Ok(())
        }
    }

    fn quiet(_: &ModuleContext) -> Result<Box<dyn Module>, BoxError> {
        Ok(Box::new(Quiet))
    }

    #[test]
    fn test_package_then_open() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), LINKED_EXTENSION);
        let descriptor = ModuleDescriptor::new("ping", Version::new(1, 0, 0), "PingModule");

        let path = LinkedFormat::package(&store, &descriptor, &["PingModule"]).unwrap();
        assert_eq!(path, dir.path().join("module/ping/ping-1.0.0.module"));

        let format = LinkedFormat::new(Arc::new(FactoryRegistry::new()));
        let artifact = format.open(&path).unwrap();
        assert_eq!(artifact.descriptor().unwrap(), descriptor);
    }

    #[test]
    fn test_package_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), LINKED_EXTENSION);
        let descriptor = ModuleDescriptor::new("ping", Version::new(1, 0, 0), "PingModule");

        LinkedFormat::package(&store, &descriptor, &["PingModule"]).unwrap();
        assert!(matches!(
            LinkedFormat::package(&store, &descriptor, &[]),
            Err(ModuleError::ArtifactRead { .. })
        ));
    }

    #[test]
    fn test_exports_are_scoped_to_owner() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), LINKED_EXTENSION);
        let factories = Arc::new(FactoryRegistry::new());
        factories.register_linked("ping", "PingModule", quiet);
        factories.register_linked("dice", "DiceModule", quiet);

        let descriptor = ModuleDescriptor::new("ping", Version::new(1, 0, 0), "PingModule");
        let path = LinkedFormat::package(&store, &descriptor, &["PingModule", "DiceModule", "Unbuilt"]).unwrap();
        let artifact = LinkedFormat::new(factories).open(&path).unwrap();

        assert!(artifact.find_local("PingModule").is_some());
        // Exported, but registered for another module
        assert!(artifact.find_local("DiceModule").is_none());
        // Exported, but never registered
        assert!(artifact.find_local("Unbuilt").is_none());
        assert!(artifact.find_local("Other").is_none());
    }

    #[test]
    fn test_open_errors() {
        let dir = tempdir().unwrap();
        let format = LinkedFormat::new(Arc::new(FactoryRegistry::new()));

        let missing = dir.path().join("ghost-1.0.0.module");
        assert!(matches!(format.open(&missing), Err(ModuleError::ArtifactNotFound(_))));

        let garbage = dir.path().join("bad-1.0.0.module");
        std::fs::write(&garbage, "{ not json").unwrap();
        assert!(matches!(format.open(&garbage), Err(ModuleError::ArtifactRead { .. })));

        let no_entry = dir.path().join("odd-1.0.0.module");
        std::fs::write(&no_entry, r#"{"descriptor": {"id": "odd", "version": "1.0.0"}}"#).unwrap();
        let artifact = format.open(&no_entry).unwrap();
        assert!(matches!(artifact.descriptor(), Err(ModuleError::ArtifactRead { .. })));
    }
}
