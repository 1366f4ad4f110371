//! Artifact abstraction - one packaged module version on disk

use std::path::Path;

use crate::application::errors::ModuleError;
use crate::domain::entities::ModuleDescriptor;
use super::module::ModuleFactory;

/// An opened module artifact.
///
/// Dropping it releases whatever it holds open (for native artifacts, the library).
pub trait Artifact: Send + Sync {
    /// Location the artifact was opened from
    fn path(&self) -> &Path;

    /// Read the descriptor stored at the artifact's fixed descriptor location
    fn descriptor(&self) -> Result<ModuleDescriptor, ModuleError>;

    /// Resolve `name` from the artifact's own code only
    fn find_local(&self, name: &str) -> Option<ModuleFactory>;
}

/// A packaging format the artifact store can open
pub trait ArtifactFormat: Send + Sync {
    /// File extension of artifacts in this format, without the dot
    fn extension(&self) -> &str;

    fn open(&self, path: &Path) -> Result<Box<dyn Artifact>, ModuleError>;
}
