//! Module manager - owns every loaded module and serializes lifecycle changes
//!
//! All mutating operations hold the write lock for their whole duration,
//! artifact I/O and module hooks included. Reads (snapshots, lookups and weak
//! handle accessors) take the read lock.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use semver::Version;

use crate::application::errors::{BatchError, BoxError, LifecycleStage, ModuleError};
use crate::domain::entities::normalize_id;
use crate::infrastructure::artifacts::ArtifactStore;
use crate::infrastructure::storage::{ModuleList, ModuleListStore};
use super::artifact::ArtifactFormat;
use super::bus::{ModuleBus, NullBus};
use super::factory::FactoryRegistry;
use super::handle::{ModuleHandle, ModuleMap, WeakModuleHandle};
use super::loader::ModuleLoader;
use super::module::{FactoryInjector, ModuleContext, ModuleInjector};
use super::progress::{percent, NoProgress, ProgressListener};

/// Result of a non-failing unload request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    /// The module is not reloadable and the unload was not forced
    Rejected,
}

/// Registry of loaded modules
pub struct ModuleManager {
    modules: Arc<RwLock<ModuleMap>>,
    next_epoch: AtomicU64,
    store: ArtifactStore,
    list: ModuleListStore,
    format: Arc<dyn ArtifactFormat>,
    factories: Arc<FactoryRegistry>,
    injector: Arc<dyn ModuleInjector>,
    bus: Arc<dyn ModuleBus>,
}

impl ModuleManager {
    /// Create an empty manager for the host directory `root`
    pub fn new(root: impl Into<PathBuf>, format: Arc<dyn ArtifactFormat>) -> Self {
        let store = ArtifactStore::new(root, format.extension());
        let list = ModuleListStore::new(store.list_path());

        Self {
            modules: Arc::new(RwLock::new(ModuleMap::new())),
            next_epoch: AtomicU64::new(1),
            store,
            list,
            format,
            factories: Arc::new(FactoryRegistry::new()),
            injector: Arc::new(FactoryInjector),
            bus: Arc::new(NullBus),
        }
    }

    /// Use `factories` as the shared framework namespace
    pub fn with_factories(mut self, factories: Arc<FactoryRegistry>) -> Self {
        self.factories = factories;
        self
    }

    pub fn with_injector(mut self, injector: Arc<dyn ModuleInjector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn ModuleBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Load a module, the latest version on disk when `version` is `None`
    pub fn load(&self, id: &str, version: Option<&Version>) -> Result<WeakModuleHandle, ModuleError> {
        let id = normalize_id(id)?;
        let mut modules = self.write();
        self.load_locked(&mut modules, &id, version, false)?;
        Ok(self.weak_handle(&modules, &id))
    }

    /// Unload a module.
    ///
    /// Non-reloadable modules are only removed when `force` is set, which is
    /// reserved for host shutdown.
    pub fn unload(&self, id: &str, force: bool) -> Result<UnloadOutcome, ModuleError> {
        let id = normalize_id(id)?;
        let mut modules = self.write();
        self.unload_locked(&mut modules, &id, force)
    }

    /// Unload then load `id` without releasing the lock in between
    pub fn reload(&self, id: &str, version: Option<&Version>) -> Result<WeakModuleHandle, ModuleError> {
        let id = normalize_id(id)?;
        let mut modules = self.write();

        if self.unload_locked(&mut modules, &id, false)? == UnloadOutcome::Rejected {
            return Err(ModuleError::UnloadRejected(id));
        }
        self.load_locked(&mut modules, &id, version, false)?;

        tracing::info!("Reloaded module {}", modules[&id].descriptor().label());
        Ok(self.weak_handle(&modules, &id))
    }

    /// Load several modules as one batch.
    ///
    /// `post_batch_init` runs only after every entry was attempted. Failures do
    /// not stop the batch; they are returned together as [`ModuleError::Batch`].
    pub fn bulk_load<I>(&self, entries: I) -> Result<(), ModuleError>
    where
        I: IntoIterator<Item = (String, Option<Version>)>,
    {
        self.bulk_load_with_progress(entries, &NoProgress)
    }

    pub fn bulk_load_with_progress<I>(&self, entries: I, listener: &dyn ProgressListener) -> Result<(), ModuleError>
    where
        I: IntoIterator<Item = (String, Option<Version>)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        let total = entries.len();
        let mut modules = self.write();
        let mut loaded = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (done, (id, version)) in entries.into_iter().enumerate() {
            listener.update(Some(percent(done, total)), &format!("Loading {}", id));

            let result = normalize_id(&id)
                .and_then(|normalized| self.load_locked(&mut modules, &normalized, version.as_ref(), true).map(|_| normalized));
            match result {
                Ok(normalized) => loaded.push(normalized),
                Err(e) => failures.push((id, e)),
            }
        }

        listener.update(None, "Running post-batch initialization");
        let mut initialized = 0;
        for id in loaded {
            match self.post_batch_init_locked(&mut modules, &id) {
                Ok(()) => initialized += 1,
                Err(e) => failures.push((id, e)),
            }
        }
        drop(modules);

        listener.update(Some(100), &format!("Loaded {} of {} modules", initialized, total));
        tracing::info!("Batch finished: {} loaded, {} failed", initialized, failures.len());

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchError { failures }.into())
        }
    }

    /// Persist the `{id: version}` set of loaded modules
    pub fn save_list(&self) -> Result<(), ModuleError> {
        self.save_list_locked(&self.write())
    }

    /// Bulk-load the persisted list with the saved versions
    pub fn load_persisted_list(&self) -> Result<(), ModuleError> {
        self.load_from_list(true)
    }

    /// Bulk-load the persisted ids, each at the latest version on disk
    pub fn load_latest_from_list(&self) -> Result<(), ModuleError> {
        self.load_from_list(false)
    }

    /// Weak view of every loaded module, keyed by id
    pub fn snapshot(&self) -> BTreeMap<String, WeakModuleHandle> {
        let modules = self.read();
        modules
            .keys()
            .map(|id| (id.clone(), self.weak_handle(&modules, id)))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<WeakModuleHandle> {
        let id = normalize_id(id).ok()?;
        let modules = self.read();
        modules.contains_key(&id).then(|| self.weak_handle(&modules, &id))
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// `{id: version}` set of loaded modules
    pub fn loaded(&self) -> ModuleList {
        Self::list_of(&self.read())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Versions of `id` present in the artifact store
    pub fn available_versions(&self, id: &str) -> Result<Vec<Version>, ModuleError> {
        self.store.versions(&normalize_id(id)?)
    }

    pub fn installed(&self) -> Result<BTreeMap<String, Vec<Version>>, ModuleError> {
        self.store.installed()
    }

    /// Force-unload every module, returning how many were unloaded
    pub fn unload_all(&self) -> usize {
        self.unload_all_locked(&mut self.write())
    }

    /// Save the module list, then force-unload everything, without releasing
    /// the lock in between
    pub fn shutdown(&self) -> usize {
        let mut modules = self.write();
        if let Err(e) = self.save_list_locked(&modules) {
            tracing::error!("Failed to save module list on shutdown: {}", e);
        }
        let unloaded = self.unload_all_locked(&mut modules);
        tracing::info!("Unloaded {} module(s)", unloaded);
        unloaded
    }

    fn save_list_locked(&self, modules: &ModuleMap) -> Result<(), ModuleError> {
        let list = Self::list_of(modules);
        self.list.write(&list)?;
        tracing::info!("Saved {} module(s) to {}", list.len(), self.list.path().display());
        Ok(())
    }

    fn unload_all_locked(&self, modules: &mut ModuleMap) -> usize {
        let ids: Vec<String> = modules.keys().cloned().collect();

        let mut unloaded = 0;
        for id in ids {
            match self.unload_locked(modules, &id, true) {
                Ok(_) => unloaded += 1,
                Err(e) => tracing::warn!("Failed to unload module {}: {}", id, e),
            }
        }
        unloaded
    }

    fn load_from_list(&self, pinned: bool) -> Result<(), ModuleError> {
        let Some(list) = self.list.read()? else {
            tracing::info!("No module list at {}, nothing to load", self.list.path().display());
            return Ok(());
        };

        tracing::info!("Loading {} module(s) from {}", list.len(), self.list.path().display());
        self.bulk_load(
            list.into_iter()
                .map(|(id, version)| (id, pinned.then_some(version))),
        )
    }

    fn load_locked(
        &self,
        modules: &mut ModuleMap,
        id: &str,
        version: Option<&Version>,
        bulk: bool,
    ) -> Result<(), ModuleError> {
        if modules.contains_key(id) {
            return Err(ModuleError::AlreadyLoaded(id.to_string()));
        }

        let version = match version {
            Some(version) => version.clone(),
            None => self.store.latest(id)?,
        };

        let path = self.store.artifact_path(id, &version);
        let artifact = self.format.open(&path)?;
        let descriptor = artifact.descriptor()?;
        descriptor.validate(id, &version)?;

        let loader = Arc::new(ModuleLoader::new(id, artifact, Arc::clone(&self.factories)));
        let entry = loader.load_entry(&descriptor.entry_point)?;
        let context = ModuleContext::new(descriptor, loader);

        let instance = guarded(id, LifecycleStage::Construct, || self.injector.instantiate(&entry, &context))?;
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        modules.insert(id.to_string(), ModuleHandle::new(instance, context, epoch));

        let handle = &modules[id];
        if let Err(e) = guarded(id, LifecycleStage::Init, || handle.module().init(handle.context())) {
            modules.remove(id);
            return Err(e);
        }
        self.bus.register(id, handle.subscriber());

        tracing::info!("Loaded module {} from {}", handle.descriptor().label(), path.display());

        if !bulk {
            self.post_batch_init_locked(modules, id)?;
        }
        Ok(())
    }

    fn post_batch_init_locked(&self, modules: &mut ModuleMap, id: &str) -> Result<(), ModuleError> {
        let Some(handle) = modules.get(id) else {
            return Ok(());
        };

        if let Err(e) = guarded(id, LifecycleStage::PostBatchInit, || handle.module().post_batch_init()) {
            if let Some(handle) = modules.remove(id) {
                self.shut_down(id, &handle);
                self.bus.unregister(id);
            }
            return Err(e);
        }
        Ok(())
    }

    fn unload_locked(&self, modules: &mut ModuleMap, id: &str, force: bool) -> Result<UnloadOutcome, ModuleError> {
        let handle = modules
            .remove(id)
            .ok_or_else(|| ModuleError::NoSuchModule(id.to_string()))?;

        if !force && !handle.descriptor().reloadable {
            tracing::warn!("Refusing to unload non-reloadable module {}", handle.descriptor().label());
            modules.insert(id.to_string(), handle);
            return Ok(UnloadOutcome::Rejected);
        }

        self.shut_down(id, &handle);
        self.bus.unregister(id);
        tracing::info!("Unloaded module {}", handle.descriptor().label());
        Ok(UnloadOutcome::Unloaded)
    }

    /// Run the shutdown hook; failures are logged and swallowed
    fn shut_down(&self, id: &str, handle: &ModuleHandle) {
        match panic::catch_unwind(AssertUnwindSafe(|| handle.module().shut_down())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(module = id, "Module shut down with an error: {}", e),
            Err(payload) => tracing::error!(module = id, "Module panicked while shutting down: {}", panic_message(payload.as_ref())),
        }
    }

    fn weak_handle(&self, modules: &ModuleMap, id: &str) -> WeakModuleHandle {
        WeakModuleHandle::new(id, &modules[id], &self.modules)
    }

    fn list_of(modules: &ModuleMap) -> ModuleList {
        modules
            .iter()
            .map(|(id, handle)| (id.clone(), handle.descriptor().version.clone()))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, ModuleMap> {
        self.modules.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Module registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModuleMap> {
        self.modules.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Module registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Run module code, turning errors and panics into `InitFailure`
fn guarded<T>(id: &str, stage: LifecycleStage, f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, ModuleError> {
    let source = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => e,
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())).into(),
    };

    Err(ModuleError::InitFailure {
        id: id.to_string(),
        stage,
        source,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
