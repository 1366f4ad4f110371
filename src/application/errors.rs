//! Application layer errors

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by module code (hooks and factories)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Module lifecycle errors
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("No such module: {0}")]
    NoSuchModule(String),

    #[error("Module '{0}' is already loaded, unload it first")]
    AlreadyLoaded(String),

    #[error("Module identity mismatch: expected {expected}, artifact declares {found}")]
    IdentityMismatch { expected: String, found: String },

    #[error("Artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Failed to read artifact {}: {reason}", .path.display())]
    ArtifactRead { path: PathBuf, reason: String },

    #[error("Entry point '{entry_point}' not found for module '{id}'")]
    EntryPointNotFound { id: String, entry_point: String },

    #[error("Module '{id}' failed during {stage}: {source}")]
    InitFailure {
        id: String,
        stage: LifecycleStage,
        #[source]
        source: BoxError,
    },

    #[error("Module '{0}' is not reloadable")]
    UnloadRejected(String),

    #[error("Module '{0}' has already been unloaded")]
    AlreadyUnloaded(String),

    #[error("Module list persistence failed: {0}")]
    ListPersistence(String),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl ModuleError {
    pub(crate) fn artifact_read(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::ArtifactRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Lifecycle step in which module code failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Construct,
    Init,
    PostBatchInit,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStage::Construct => write!(f, "construction"),
            LifecycleStage::Init => write!(f, "init"),
            LifecycleStage::PostBatchInit => write!(f, "post-batch init"),
        }
    }
}

/// Aggregate of the per-entry failures of one bulk load
#[derive(Error, Debug)]
pub struct BatchError {
    pub failures: Vec<(String, ModuleError)>,
}

impl BatchError {
    /// Ids of the entries that failed, in batch order
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} module(s) failed to load", self.failures.len())?;
        for (id, err) in &self.failures {
            write!(f, "\n  {}: {}", id, err)?;
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
