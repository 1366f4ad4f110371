//! File-based storage for the persisted module list

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::application::errors::ModuleError;

/// `{id: version}` set of modules the host should run
pub type ModuleList = BTreeMap<String, Version>;

/// JSON file holding the persisted module list
#[derive(Debug, Clone)]
pub struct ModuleListStore {
    path: PathBuf,
}

impl ModuleListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the list, `None` if it was never written
    pub fn read(&self) -> Result<Option<ModuleList>, ModuleError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ModuleError::ListPersistence(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let list: ModuleList = serde_json::from_str(&content).map_err(|e| {
            ModuleError::ListPersistence(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        // Ids are case-insensitive, so "Ping" and "ping" name the same module.
        let mut normalized = ModuleList::new();
        for (id, version) in list {
            let id = id.to_lowercase();
            if normalized.contains_key(&id) {
                return Err(ModuleError::ListPersistence(format!(
                    "{} lists module '{}' more than once",
                    self.path.display(),
                    id
                )));
            }
            normalized.insert(id, version);
        }
        Ok(Some(normalized))
    }

    /// Replace the list on disk.
    ///
    /// Written to a sibling temp file first and renamed over the old list.
    pub fn write(&self, list: &ModuleList) -> Result<(), ModuleError> {
        let content = serde_json::to_string_pretty(list).map_err(|e| self.write_error(e))?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.write_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| self.write_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.write_error(e))?;
        Ok(())
    }

    fn write_error(&self, e: impl std::fmt::Display) -> ModuleError {
        ModuleError::ListPersistence(format!("failed to write {}: {}", self.path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_list_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = ModuleListStore::new(dir.path().join("module/modules.json"));

        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_write_creates_flat_sorted_object() {
        let dir = tempdir().unwrap();
        let store = ModuleListStore::new(dir.path().join("module/modules.json"));

        let mut list = ModuleList::new();
        list.insert("ping".to_string(), Version::new(1, 0, 0));
        list.insert("core".to_string(), Version::parse("2.3.4-beta.1").unwrap());
        store.write(&list).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"core": "2.3.4-beta.1", "ping": "1.0.0"}));
        assert!(!store.path().with_extension("json.tmp").exists());

        assert_eq!(store.read().unwrap(), Some(list));
    }

    #[test]
    fn test_read_normalizes_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modules.json");
        std::fs::write(&path, r#"{"Ping": "1.0.0"}"#).unwrap();

        let list = ModuleListStore::new(&path).read().unwrap().unwrap();
        assert_eq!(list.get("ping"), Some(&Version::new(1, 0, 0)));
    }

    #[test]
    fn test_ids_differing_only_in_case_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modules.json");
        std::fs::write(&path, r#"{"Ping": "1.0.0", "ping": "1.1.0"}"#).unwrap();

        match ModuleListStore::new(&path).read() {
            Err(ModuleError::ListPersistence(reason)) => assert!(reason.contains("'ping' more than once"), "{}", reason),
            other => panic!("expected a persistence failure, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_list_is_persistence_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modules.json");

        std::fs::write(&path, r#"{"ping": "not-a-version"}"#).unwrap();
        assert!(matches!(ModuleListStore::new(&path).read(), Err(ModuleError::ListPersistence(_))));

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(ModuleListStore::new(&path).read(), Err(ModuleError::ListPersistence(_))));
    }
}
