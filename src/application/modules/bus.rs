//! Event/service collaborator interface

use std::sync::Weak;

use super::module::Module;

/// Where loaded modules are announced.
///
/// Implementations only ever receive weak references and the module manager
/// stays the owner of every instance. An upgraded reference keeps the module's
/// code loaded until it is dropped, so it must not be held across deliveries.
pub trait ModuleBus: Send + Sync {
    /// Called right after a successful `init`
    fn register(&self, id: &str, module: Weak<dyn Module>);

    /// Called right after `shut_down`, or when a load is rolled back after registration
    fn unregister(&self, id: &str);
}

/// Bus that ignores every registration
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl ModuleBus for NullBus {
    fn register(&self, _id: &str, _module: Weak<dyn Module>) {}

    fn unregister(&self, _id: &str) {}
}
