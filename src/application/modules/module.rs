//! Module capability surface and the context handed to module code

use std::sync::Arc;

use crate::application::errors::{BoxError, ModuleError};
use crate::domain::entities::{Message, ModuleDescriptor};
use super::loader::{EntryPoint, ModuleLoader};

/// Lifecycle hook result
pub type HookResult = Result<(), BoxError>;

/// Builds a module instance from an entry point
pub type ModuleFactory = Arc<dyn Fn(&ModuleContext) -> Result<Box<dyn Module>, BoxError> + Send + Sync>;

/// Trait every loadable module implements.
///
/// Lifecycle hooks run on the caller's thread while the module manager holds
/// its write lock, so they must not call back into the manager.
pub trait Module: Send + Sync {
    /// Called right after the module is constructed. The module is registered
    /// on the event bus only once this returns `Ok`.
    fn init(&self, context: &ModuleContext) -> HookResult;

    /// Called once every module of the current loading batch has finished `init`.
    /// Initialization that depends on other modules belongs here.
    fn post_batch_init(&self) -> HookResult {
        Ok(())
    }

    /// Called when the module is about to be unloaded. Errors are logged and
    /// never stop the unload.
    fn shut_down(&self) -> HookResult;

    /// Answer a chat message forwarded by the event bus.
    ///
    /// Runs outside the manager's lock and may read other modules through
    /// weak handles. A delivery that races an unload can arrive after `shut_down`.
    fn on_message(&self, _message: &Message) -> Option<String> {
        None
    }
}

/// What module code sees of its own loaded state
#[derive(Clone)]
pub struct ModuleContext {
    descriptor: ModuleDescriptor,
    loader: Arc<ModuleLoader>,
}

impl ModuleContext {
    pub(crate) fn new(descriptor: ModuleDescriptor, loader: Arc<ModuleLoader>) -> Self {
        Self { descriptor, loader }
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Resolve an entry point through this module's own loader
    pub fn resolve(&self, name: &str) -> Result<EntryPoint, ModuleError> {
        self.loader.load_entry(name)
    }

    pub(crate) fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }
}

/// Turns a resolved entry point into a wired module instance
pub trait ModuleInjector: Send + Sync {
    fn instantiate(&self, entry: &EntryPoint, context: &ModuleContext) -> Result<Box<dyn Module>, BoxError>;
}

/// Injector that calls the entry point's own factory
#[derive(Debug, Default, Clone, Copy)]
pub struct FactoryInjector;

impl ModuleInjector for FactoryInjector {
    fn instantiate(&self, entry: &EntryPoint, context: &ModuleContext) -> Result<Box<dyn Module>, BoxError> {
        entry.construct(context)
    }
}
