//! Artifact store - on-disk layout of module artifacts
//!
//! ```text
//! <root>/module/modules.json
//! <root>/module/<id>/<id>-<version>.<ext>
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::application::errors::ModuleError;
use crate::domain::entities::normalize_id;

const MODULE_DIR: &str = "module";
const LIST_FILE: &str = "modules.json";

/// Maps `(id, version)` to artifact paths under a host root directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    extension: String,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn module_dir(&self) -> PathBuf {
        self.root.join(MODULE_DIR)
    }

    /// Location of the persisted module list
    pub fn list_path(&self) -> PathBuf {
        self.module_dir().join(LIST_FILE)
    }

    pub fn artifact_path(&self, id: &str, version: &Version) -> PathBuf {
        self.module_dir()
            .join(id)
            .join(format!("{}-{}.{}", id, version, self.extension))
    }

    /// Every version of `id` present on disk, lowest first
    pub fn versions(&self, id: &str) -> Result<Vec<Version>, ModuleError> {
        let dir = self.module_dir().join(id);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ModuleError::artifact_read(&dir, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            match self.parse_version(id, name) {
                Some(version) => versions.push(version),
                None => tracing::debug!("Ignoring {} in {}", name, dir.display()),
            }
        }

        versions.sort();
        Ok(versions)
    }

    /// Highest version of `id` present on disk
    pub fn latest(&self, id: &str) -> Result<Version, ModuleError> {
        self.versions(id)?
            .pop()
            .ok_or_else(|| ModuleError::NoSuchModule(id.to_string()))
    }

    /// Every module id with at least one artifact, with its versions
    pub fn installed(&self) -> Result<BTreeMap<String, Vec<Version>>, ModuleError> {
        let dir = self.module_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(ModuleError::artifact_read(&dir, e)),
        };

        let mut installed = BTreeMap::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().and_then(|n| normalize_id(n).ok()) else {
                continue;
            };

            let versions = self.versions(&id)?;
            if !versions.is_empty() {
                installed.insert(id, versions);
            }
        }
        Ok(installed)
    }

    /// `<id>-<semver>.<ext>` -> semver
    fn parse_version(&self, id: &str, file_name: &str) -> Option<Version> {
        let stem = file_name
            .strip_prefix(id)?
            .strip_prefix('-')?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        Version::parse(stem).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_artifact_path_convention() {
        let store = ArtifactStore::new("/srv/bot", "so");

        assert_eq!(
            store.artifact_path("ping", &Version::new(1, 0, 0)),
            PathBuf::from("/srv/bot/module/ping/ping-1.0.0.so")
        );
        assert_eq!(store.list_path(), PathBuf::from("/srv/bot/module/modules.json"));
    }

    #[test]
    fn test_latest_picks_highest_semver() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "module");

        for version in ["1.2.0", "1.10.0", "1.9.3", "2.0.0-rc.1"] {
            touch(&store.module_dir().join("ping").join(format!("ping-{}.module", version)));
        }

        assert_eq!(store.latest("ping").unwrap(), Version::parse("2.0.0-rc.1").unwrap());
        assert_eq!(store.versions("ping").unwrap().len(), 4);
    }

    #[test]
    fn test_ignores_files_outside_convention() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "module");
        let ping_dir = store.module_dir().join("ping");

        touch(&ping_dir.join("ping-1.0.0.module"));
        touch(&ping_dir.join("ping-latest.module"));
        touch(&ping_dir.join("ping-9.0.0.so"));
        touch(&ping_dir.join("pong-5.0.0.module"));
        touch(&ping_dir.join("ping-roll-3.0.0.module"));

        assert_eq!(store.versions("ping").unwrap(), vec![Version::new(1, 0, 0)]);
    }

    #[test]
    fn test_latest_without_artifacts_is_no_such_module() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "module");

        assert!(matches!(store.latest("ghost"), Err(ModuleError::NoSuchModule(id)) if id == "ghost"));
    }

    #[test]
    fn test_installed_lists_every_module() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "module");

        touch(&store.artifact_path("ping", &Version::new(1, 0, 0)));
        touch(&store.artifact_path("ping", &Version::new(1, 1, 0)));
        touch(&store.artifact_path("core", &Version::new(3, 0, 0)));
        std::fs::create_dir_all(store.module_dir().join("empty")).unwrap();
        touch(&store.list_path());

        let installed = store.installed().unwrap();
        assert_eq!(installed.keys().collect::<Vec<_>>(), vec!["core", "ping"]);
        assert_eq!(installed["ping"], vec![Version::new(1, 0, 0), Version::new(1, 1, 0)]);
    }
}
