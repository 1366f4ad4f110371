//! Module descriptor - metadata embedded in every module artifact

use once_cell::sync::Lazy;
use regex_lite::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::application::errors::ModuleError;

static MODULE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]*$").expect("module id pattern is valid"));

/// Normalize a module id and check that it is safe to use as a path component.
pub fn normalize_id(id: &str) -> Result<String, ModuleError> {
    let normalized = id.trim().to_lowercase();
    if MODULE_ID.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ModuleError::NoSuchModule(id.to_string()))
    }
}

/// Module metadata
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Module id, lowercase
    pub id: String,

    /// Module version
    pub version: Version,

    /// Name of the entry point that builds the module instance
    pub entry_point: String,

    /// Whether the module may be unloaded outside of host shutdown
    #[serde(default = "default_reloadable")]
    pub reloadable: bool,

    /// Human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_reloadable() -> bool {
    true
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<String>, version: Version, entry_point: impl Into<String>) -> Self {
        Self {
            id: id.into().to_lowercase(),
            version,
            entry_point: entry_point.into(),
            reloadable: true,
            name: None,
            description: None,
        }
    }

    pub fn with_reloadable(mut self, reloadable: bool) -> Self {
        self.reloadable = reloadable;
        self
    }

    /// Parse a descriptor from its JSON form, normalizing the id.
    ///
    /// `origin` is the artifact the text was read from and only feeds error reporting.
    pub fn from_json(text: &str, origin: &std::path::Path) -> Result<Self, ModuleError> {
        let mut descriptor: ModuleDescriptor = serde_json::from_str(text)
            .map_err(|e| ModuleError::artifact_read(origin, format!("malformed descriptor: {}", e)))?;

        descriptor.id = descriptor.id.trim().to_lowercase();
        if descriptor.entry_point.trim().is_empty() {
            return Err(ModuleError::artifact_read(origin, "descriptor has an empty entryPoint"));
        }
        Ok(descriptor)
    }

    /// Check that this descriptor is the one that was requested.
    ///
    /// Both halves must agree; a mismatch is never corrected.
    pub fn validate(&self, id: &str, version: &Version) -> Result<(), ModuleError> {
        if self.id != id || &self.version != version {
            return Err(ModuleError::IdentityMismatch {
                expected: format!("{}@{}", id, version),
                found: format!("{}@{}", self.id, self.version),
            });
        }
        Ok(())
    }

    /// `id@version`
    pub fn label(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}
