//! Module system for carik-host
//!
//! Modules are versioned artifacts loaded at runtime, each through its own
//! isolated loader. The [`ModuleManager`] owns every instance and hands out
//! [`WeakModuleHandle`]s that never keep a module alive.

pub mod artifact;
pub mod bus;
pub mod factory;
pub mod handle;
pub mod loader;
pub mod manager;
pub mod module;
pub mod progress;

pub use artifact::{Artifact, ArtifactFormat};
pub use bus::{ModuleBus, NullBus};
pub use factory::FactoryRegistry;
pub use handle::WeakModuleHandle;
pub use loader::{EntryOrigin, EntryPoint, ModuleLoader};
pub use manager::{ModuleManager, UnloadOutcome};
pub use module::{FactoryInjector, HookResult, Module, ModuleContext, ModuleFactory, ModuleInjector};
pub use progress::{NoProgress, ProgressListener};
