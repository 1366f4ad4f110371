use std::collections::BTreeMap;
use std::sync::Arc;

use semver::Version;

use crate::application::errors::{BotError, ModuleError};
use crate::application::modules::{ModuleManager, UnloadOutcome};

const USAGE: &str = "Usage: /module list | available [id] | load <id> [version] | unload <id> | reload <id> [version] | save";

/// Chat front-end for module administration (`/module ...`)
pub struct ModuleAdminService {
    manager: Arc<ModuleManager>,
}

impl ModuleAdminService {
    pub fn new(manager: Arc<ModuleManager>) -> Self {
        Self { manager }
    }

    /// Run a `/module` command and render the reply, errors included
    pub fn handle(&self, args: &[String]) -> String {
        match self.execute(args) {
            Ok(reply) => reply,
            Err(e) => format!("Error: {}", e),
        }
    }

    pub fn execute(&self, args: &[String]) -> Result<String, BotError> {
        let action = args.first().map(|a| a.to_lowercase()).unwrap_or_default();
        let id = args.get(1).map(String::as_str);
        let version = args.get(2).map(|v| parse_version(v)).transpose()?;

        match (action.as_str(), id) {
            ("list", _) => Ok(self.list()),
            ("available", id) => self.available(id),
            ("load", Some(id)) => {
                let handle = self.manager.load(id, version.as_ref())?;
                Ok(format!("Loaded {}", handle.descriptor()?.label()))
            }
            ("unload", Some(id)) => match self.manager.unload(id, false)? {
                UnloadOutcome::Unloaded => Ok(format!("Unloaded {}", id)),
                UnloadOutcome::Rejected => Ok(format!("Module {} is not reloadable and stays loaded", id)),
            },
            ("reload", Some(id)) => {
                let handle = self.manager.reload(id, version.as_ref())?;
                Ok(format!("Reloaded {}", handle.descriptor()?.label()))
            }
            ("save", _) => {
                self.manager.save_list()?;
                Ok(format!("Saved {} module(s)", self.manager.len()))
            }
            _ => Ok(USAGE.to_string()),
        }
    }

    fn list(&self) -> String {
        let snapshot = self.manager.snapshot();
        if snapshot.is_empty() {
            return "No modules loaded".to_string();
        }

        let mut reply = "Loaded modules:".to_string();
        for handle in snapshot.values() {
            // A concurrent unload can win between the snapshot and this read.
            let Ok(descriptor) = handle.descriptor() else {
                tracing::debug!("Module {} was unloaded while listing", handle.id());
                continue;
            };
            reply.push_str(&format!("\n  {}", descriptor.label()));
            if !descriptor.reloadable {
                reply.push_str(" (pinned)");
            }
        }
        reply
    }

    fn available(&self, id: Option<&str>) -> Result<String, BotError> {
        let installed: BTreeMap<String, Vec<Version>> = match id {
            Some(id) => {
                let versions = self.manager.available_versions(id)?;
                if versions.is_empty() {
                    return Err(ModuleError::NoSuchModule(id.to_string()).into());
                }
                std::iter::once((id.to_lowercase(), versions)).collect()
            }
            None => self.manager.installed()?,
        };

        if installed.is_empty() {
            return Ok("No modules installed".to_string());
        }

        let mut reply = "Installed modules:".to_string();
        for (id, versions) in installed {
            let versions: Vec<String> = versions.iter().map(Version::to_string).collect();
            reply.push_str(&format!("\n  {}: {}", id, versions.join(", ")));
        }
        Ok(reply)
    }
}

fn parse_version(text: &str) -> Result<Version, BotError> {
    Version::parse(text).map_err(|e| BotError::Parse(format!("invalid version '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BoxError;
    use crate::application::modules::{FactoryRegistry, HookResult, Module, ModuleContext};
    use crate::domain::entities::ModuleDescriptor;
    use crate::infrastructure::artifacts::LinkedFormat;
    use tempfile::{tempdir, TempDir};

    struct Quiet;

    impl Module for Quiet {
        fn init(&self, _context: &ModuleContext) -> HookResult {
            Ok(())
        }

        fn shut_down(&self) -> HookResult {
            Ok(())
        }
    }

    fn quiet(_: &ModuleContext) -> Result<Box<dyn Module>, BoxError> {
        Ok(Box::new(Quiet))
    }

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn setup() -> (TempDir, ModuleAdminService) {
        let dir = tempdir().unwrap();
        let factories = Arc::new(FactoryRegistry::new());
        factories.register_linked("ping", "Ping", quiet);
        factories.register_linked("core", "Core", quiet);

        let manager = ModuleManager::new(dir.path(), Arc::new(LinkedFormat::new(Arc::clone(&factories))))
            .with_factories(factories);
        for version in [Version::new(1, 0, 0), Version::new(1, 1, 0)] {
            let descriptor = ModuleDescriptor::new("ping", version, "Ping");
            LinkedFormat::package(manager.store(), &descriptor, &["Ping"]).unwrap();
        }
        let core = ModuleDescriptor::new("core", Version::new(2, 0, 0), "Core").with_reloadable(false);
        LinkedFormat::package(manager.store(), &core, &["Core"]).unwrap();

        (dir, ModuleAdminService::new(Arc::new(manager)))
    }

    #[test]
    fn test_load_list_unload() {
        let (_dir, admin) = setup();

        assert_eq!(admin.handle(&args("list")), "No modules loaded");
        assert_eq!(admin.handle(&args("load ping 1.0.0")), "Loaded ping@1.0.0");
        assert_eq!(admin.handle(&args("load core")), "Loaded core@2.0.0");
        assert_eq!(admin.handle(&args("list")), "Loaded modules:\n  core@2.0.0 (pinned)\n  ping@1.0.0");

        assert_eq!(admin.handle(&args("unload ping")), "Unloaded ping");
        assert_eq!(admin.handle(&args("unload core")), "Module core is not reloadable and stays loaded");
    }

    #[test]
    fn test_reload_picks_latest() {
        let (_dir, admin) = setup();

        admin.handle(&args("load ping 1.0.0"));
        assert_eq!(admin.handle(&args("reload PING")), "Reloaded ping@1.1.0");
    }

    #[test]
    fn test_errors_are_rendered() {
        let (_dir, admin) = setup();

        assert!(admin.handle(&args("load ghost")).starts_with("Error: "));
        assert!(admin.handle(&args("load ping nope")).contains("invalid version"));
        assert!(admin.handle(&args("reload ping")).starts_with("Error: "));
        assert_eq!(admin.handle(&args("frobnicate")), USAGE);
        assert_eq!(admin.handle(&[]), USAGE);
    }

    #[test]
    fn test_available() {
        let (_dir, admin) = setup();

        assert_eq!(admin.handle(&args("available ping")), "Installed modules:\n  ping: 1.0.0, 1.1.0");
        assert_eq!(
            admin.handle(&args("available")),
            "Installed modules:\n  core: 2.0.0\n  ping: 1.0.0, 1.1.0"
        );
    }

    #[test]
    fn test_save_writes_list() {
        let (dir, admin) = setup();

        admin.handle(&args("load ping"));
        assert_eq!(admin.handle(&args("save")), "Saved 1 module(s)");
        assert!(dir.path().join("module/modules.json").exists());
    }
}
