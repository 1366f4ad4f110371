//! Module handles - the manager's owned records and their external weak views

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::application::errors::ModuleError;
use crate::domain::entities::{Message, ModuleDescriptor};
use super::module::{HookResult, Module, ModuleContext};

pub(crate) type ModuleMap = HashMap<String, ModuleHandle>;

/// A module instance together with the context that keeps its code loaded.
///
/// Shared with bus subscribers through `Weak`, so an upgraded subscriber keeps
/// the loader (and with it the artifact) alive for as long as it runs.
pub(crate) struct LoadedModule {
    // Declared first so the instance is dropped before the loader that owns its code.
    instance: Box<dyn Module>,
    context: ModuleContext,
}

impl Module for LoadedModule {
    fn init(&self, context: &ModuleContext) -> HookResult {
        self.instance.init(context)
    }

    fn post_batch_init(&self) -> HookResult {
        self.instance.post_batch_init()
    }

    fn shut_down(&self) -> HookResult {
        self.instance.shut_down()
    }

    fn on_message(&self, message: &Message) -> Option<String> {
        self.instance.on_message(message)
    }
}

/// Authoritative record of one loaded module
pub(crate) struct ModuleHandle {
    loaded: Arc<LoadedModule>,
    epoch: u64,
}

impl ModuleHandle {
    pub(crate) fn new(instance: Box<dyn Module>, context: ModuleContext, epoch: u64) -> Self {
        Self {
            loaded: Arc::new(LoadedModule { instance, context }),
            epoch,
        }
    }

    pub(crate) fn module(&self) -> &dyn Module {
        self.loaded.instance.as_ref()
    }

    pub(crate) fn context(&self) -> &ModuleContext {
        &self.loaded.context
    }

    pub(crate) fn descriptor(&self) -> &ModuleDescriptor {
        self.loaded.context.descriptor()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Weak reference handed to the module bus
    pub(crate) fn subscriber(&self) -> Weak<dyn Module> {
        let subscriber: Weak<LoadedModule> = Arc::downgrade(&self.loaded);
        subscriber
    }

    fn artifact_path(&self) -> PathBuf {
        self.loaded.context.loader().artifact_path().to_path_buf()
    }
}

/// External view of a loaded module.
///
/// Holds no reference to the module itself, only the id and the epoch of the
/// handle it was issued for. Every accessor checks that this exact handle is
/// still registered and fails with [`ModuleError::AlreadyUnloaded`] otherwise,
/// including after the module was reloaded under the same id.
#[derive(Clone)]
pub struct WeakModuleHandle {
    id: String,
    epoch: u64,
    modules: Weak<RwLock<ModuleMap>>,
}

impl WeakModuleHandle {
    pub(crate) fn new(id: impl Into<String>, handle: &ModuleHandle, modules: &Arc<RwLock<ModuleMap>>) -> Self {
        Self {
            id: id.into(),
            epoch: handle.epoch(),
            modules: Arc::downgrade(modules),
        }
    }

    /// Id this handle was issued for
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_loaded(&self) -> bool {
        self.with_handle(|_| ()).is_ok()
    }

    pub fn descriptor(&self) -> Result<ModuleDescriptor, ModuleError> {
        self.with_handle(|handle| handle.descriptor().clone())
    }

    pub fn artifact_path(&self) -> Result<PathBuf, ModuleError> {
        self.with_handle(ModuleHandle::artifact_path)
    }

    /// Run `f` against the live module instance.
    ///
    /// `f` runs under the manager's read lock and must not call back into the manager.
    pub fn with_module<R>(&self, f: impl FnOnce(&dyn Module) -> R) -> Result<R, ModuleError> {
        self.with_handle(|handle| f(handle.module()))
    }

    fn with_handle<R>(&self, f: impl FnOnce(&ModuleHandle) -> R) -> Result<R, ModuleError> {
        let modules = self
            .modules
            .upgrade()
            .ok_or_else(|| ModuleError::AlreadyUnloaded(self.id.clone()))?;
        let map = modules.read().unwrap_or_else(PoisonError::into_inner);

        let result = match map.get(&self.id) {
            Some(handle) if handle.epoch() == self.epoch => Ok(f(handle)),
            _ => Err(ModuleError::AlreadyUnloaded(self.id.clone())),
        };
        result
    }
}

impl fmt::Debug for WeakModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakModuleHandle")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .finish()
    }
}
