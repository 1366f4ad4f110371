//! Native artifacts - modules compiled to shared libraries
//!
//! A native artifact exports two kinds of symbols:
//! - `carik_module_descriptor`: returns the module descriptor as a
//!   NUL-terminated UTF-8 JSON string with static lifetime
//! - one symbol per entry point, named after it, returning a module created
//!   with `Box::into_raw`

use std::ffi::{c_char, CStr};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::application::errors::{BoxError, ModuleError};
use crate::application::modules::{Artifact, ArtifactFormat, Module, ModuleContext, ModuleFactory};
use crate::domain::entities::ModuleDescriptor;

/// Symbol holding the descriptor
pub const DESCRIPTOR_SYMBOL: &str = "carik_module_descriptor";

/// Signature of the descriptor symbol
pub type DescriptorFn = unsafe extern "C" fn() -> *const c_char;

/// Signature of an entry point symbol
pub type ModuleEntryFn = unsafe extern "C" fn() -> *mut dyn Module;

/// Shared library artifacts (`.so`, `.dylib` or `.dll` depending on platform)
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFormat;

impl ArtifactFormat for NativeFormat {
    fn extension(&self) -> &str {
        std::env::consts::DLL_EXTENSION
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Artifact>, ModuleError> {
        if let Err(e) = std::fs::metadata(path) {
            return Err(if e.kind() == ErrorKind::NotFound {
                ModuleError::ArtifactNotFound(path.to_path_buf())
            } else {
                ModuleError::artifact_read(path, e)
            });
        }

        // SAFETY: loading a library runs its initializers; artifacts in the
        // module directory are trusted the same way the host binary is.
        let library = unsafe { Library::new(path) }
            .map_err(|e| ModuleError::artifact_read(path, format!("failed to load library: {}", e)))?;

        Ok(Box::new(NativeArtifact {
            path: path.to_path_buf(),
            library: Arc::new(library),
        }))
    }
}

struct NativeArtifact {
    path: PathBuf,
    library: Arc<Library>,
}

impl Artifact for NativeArtifact {
    fn path(&self) -> &Path {
        &self.path
    }

    fn descriptor(&self) -> Result<ModuleDescriptor, ModuleError> {
        // SAFETY: the symbol type is the documented descriptor contract.
        let symbol: Symbol<DescriptorFn> = unsafe { self.library.get(DESCRIPTOR_SYMBOL.as_bytes()) }
            .map_err(|e| ModuleError::artifact_read(&self.path, format!("missing {}: {}", DESCRIPTOR_SYMBOL, e)))?;

        // SAFETY: the library stays loaded while `symbol` is borrowed from it.
        unsafe { read_descriptor(*symbol, &self.path) }
    }

    fn find_local(&self, name: &str) -> Option<ModuleFactory> {
        // SAFETY: entry point symbols follow the `ModuleEntryFn` contract.
        let symbol: Symbol<ModuleEntryFn> = match unsafe { self.library.get(name.as_bytes()) } {
            Ok(symbol) => symbol,
            Err(e) => {
                tracing::debug!("{} does not export {}: {}", self.path.display(), name, e);
                return None;
            }
        };

        // SAFETY: the factory owns a reference to the library the symbol came from.
        Some(unsafe { entry_factory(*symbol, Arc::clone(&self.library)) })
    }
}

/// Call a descriptor symbol and parse what it returns.
///
/// # Safety
///
/// `symbol` must follow the [`DescriptorFn`] contract and its code must stay
/// loaded for the duration of the call.
unsafe fn read_descriptor(symbol: DescriptorFn, path: &Path) -> Result<ModuleDescriptor, ModuleError> {
    let raw = symbol();
    if raw.is_null() {
        return Err(ModuleError::artifact_read(path, "descriptor symbol returned null"));
    }
    let text = CStr::from_ptr(raw)
        .to_str()
        .map_err(|e| ModuleError::artifact_read(path, format!("descriptor is not UTF-8: {}", e)))?;

    ModuleDescriptor::from_json(text, path)
}

/// Wrap an entry point symbol into a factory that keeps `library` alive.
///
/// # Safety
///
/// `entry` must follow the [`ModuleEntryFn`] contract and its code must stay
/// loaded for as long as `library` is.
unsafe fn entry_factory<L>(entry: ModuleEntryFn, library: Arc<L>) -> ModuleFactory
where
    L: Send + Sync + 'static,
{
    Arc::new(move |_context: &ModuleContext| -> Result<Box<dyn Module>, BoxError> {
        let _library = &library;
        // SAFETY: the pointer comes from `Box::into_raw` in the module's entry point.
        let raw = unsafe { entry() };
        if raw.is_null() {
            return Err("entry point returned null".into());
        }
        Ok(unsafe { Box::from_raw(raw) })
    })
}

#[cfg(test)]
#[allow(improper_ctypes_definitions)]
mod tests {
    use super::*;
    use crate::application::modules::{FactoryRegistry, HookResult, ModuleLoader};
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    static LIVE_PINGS: AtomicUsize = AtomicUsize::new(0);

    struct Ping;

    impl Ping {
        fn new() -> Self {
            LIVE_PINGS.fetch_add(1, Ordering::SeqCst);
            Ping
        }
    }

    impl Drop for Ping {
        fn drop(&mut self) {
            LIVE_PINGS.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Module for Ping {
        fn init(&self, _context: &ModuleContext) -> HookResult {
            Ok(())
        }

        fn shut_down(&self) -> HookResult {
            Ok(())
        }
    }

    unsafe extern "C" fn ping_descriptor() -> *const c_char {
        b"{\"id\": \"Ping\", \"version\": \"1.0.0\", \"entryPoint\": \"PingModule\", \"name\": \"Ping\"}\0"
            .as_ptr()
            .cast()
    }

    unsafe extern "C" fn null_descriptor() -> *const c_char {
        ptr::null()
    }

    unsafe extern "C" fn ping_entry() -> *mut dyn Module {
        Box::into_raw(Box::new(Ping::new()) as Box<dyn Module>)
    }

    unsafe extern "C" fn null_entry() -> *mut dyn Module {
        ptr::null_mut::<Ping>() as *mut dyn Module
    }

    /// Stands in for a loaded library and records when it is unloaded
    struct Sentinel(Arc<Mutex<Vec<&'static str>>>);

    impl Drop for Sentinel {
        fn drop(&mut self) {
            self.0.lock().unwrap().push("library unloaded");
        }
    }

    fn context() -> ModuleContext {
        struct Empty(PathBuf);

        impl Artifact for Empty {
            fn path(&self) -> &Path {
                &self.0
            }

            fn descriptor(&self) -> Result<ModuleDescriptor, ModuleError> {
                Err(ModuleError::artifact_read(&self.0, "no descriptor"))
            }

            fn find_local(&self, _name: &str) -> Option<ModuleFactory> {
                None
            }
        }

        let descriptor = ModuleDescriptor::new("ping", semver::Version::new(1, 0, 0), "PingModule");
        let loader = ModuleLoader::new("ping", Box::new(Empty(PathBuf::from("ping-1.0.0.so"))), Arc::new(FactoryRegistry::new()));
        ModuleContext::new(descriptor, Arc::new(loader))
    }

    #[test]
    fn test_extension_matches_platform() {
        assert_eq!(NativeFormat.extension(), std::env::consts::DLL_EXTENSION);
    }

    #[test]
    fn test_missing_library_is_artifact_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ping-1.0.0.so");

        assert!(matches!(NativeFormat.open(&path), Err(ModuleError::ArtifactNotFound(p)) if p == path));
    }

    #[test]
    fn test_garbage_library_is_read_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ping-1.0.0.so");
        std::fs::write(&path, b"definitely not a shared object").unwrap();

        assert!(matches!(NativeFormat.open(&path), Err(ModuleError::ArtifactRead { .. })));
    }

    #[test]
    fn test_descriptor_symbol_is_parsed() {
        let path = Path::new("ping-1.0.0.so");
        let descriptor = unsafe { read_descriptor(ping_descriptor, path) }.unwrap();

        assert_eq!(descriptor.id, "ping");
        assert_eq!(descriptor.version, semver::Version::new(1, 0, 0));
        assert_eq!(descriptor.entry_point, "PingModule");
        assert_eq!(descriptor.name.as_deref(), Some("Ping"));
        assert!(descriptor.reloadable);
    }

    #[test]
    fn test_null_descriptor_is_read_failure() {
        let result = unsafe { read_descriptor(null_descriptor, Path::new("ping-1.0.0.so")) };
        assert!(matches!(result, Err(ModuleError::ArtifactRead { .. })));
    }

    #[test]
    fn test_entry_factory_owns_instance_and_keeps_library_alive() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let library = Arc::new(Sentinel(Arc::clone(&events)));
        let factory = unsafe { entry_factory(ping_entry, library) };

        let before = LIVE_PINGS.load(Ordering::SeqCst);
        let module = (*factory)(&context()).unwrap();
        assert_eq!(LIVE_PINGS.load(Ordering::SeqCst), before + 1);

        drop(module);
        assert_eq!(LIVE_PINGS.load(Ordering::SeqCst), before);
        assert!(events.lock().unwrap().is_empty());

        drop(factory);
        assert_eq!(*events.lock().unwrap(), vec!["library unloaded"]);
    }

    #[test]
    fn test_null_entry_is_construction_error() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let factory = unsafe { entry_factory(null_entry, Arc::new(Sentinel(events))) };

        let error = (*factory)(&context()).err().unwrap();
        assert_eq!(error.to_string(), "entry point returned null");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_real_library_without_module_symbols() {
        let candidates = [
            "/lib/x86_64-linux-gnu/libc.so.6",
            "/lib/aarch64-linux-gnu/libc.so.6",
            "/usr/lib64/libc.so.6",
            "/lib64/libc.so.6",
            "/usr/lib/libc.so.6",
        ];
        let Some(path) = candidates.iter().map(Path::new).find(|path| path.exists()) else {
            return;
        };

        let artifact = NativeFormat.open(path).unwrap();
        assert_eq!(artifact.path(), path);
        assert!(matches!(artifact.descriptor(), Err(ModuleError::ArtifactRead { .. })));
        assert!(artifact.find_local("carik_no_such_entry").is_none());
    }
}
