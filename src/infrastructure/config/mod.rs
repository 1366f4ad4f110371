//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::application::errors::ConfigError;

/// Host configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModulesConfig {
    /// Host directory, artifacts live under `<root>/module`
    pub root: PathBuf,
    #[serde(default)]
    pub format: ArtifactKind,
    /// Replay the persisted module list at startup
    #[serde(default = "enabled")]
    pub auto_load: bool,
    /// Replay the list at the latest installed versions instead of the saved ones
    #[serde(default)]
    pub load_latest: bool,
    #[serde(default = "enabled")]
    pub save_on_shutdown: bool,
}

/// Artifact format the host loads modules from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    #[default]
    Native,
    Linked,
}

fn enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "carik-host".to_string(),
                prefix: "!".to_string(),
            },
            modules: ModulesConfig {
                root: PathBuf::from("."),
                format: ArtifactKind::Native,
                auto_load: true,
                load_latest: false,
                save_on_shutdown: true,
            },
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn load_env() -> Self {
        Config::default().with_env()
    }

    /// Apply `CARIK_HOME` and `BOT_PREFIX` on top of this config
    pub fn with_env(mut self) -> Self {
        if let Ok(home) = std::env::var("CARIK_HOME") {
            self.modules.root = PathBuf::from(home);
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        self
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue("bot.prefix must not be empty".to_string()));
        }
        if self.modules.root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("modules.root must not be empty".to_string()));
        }
        Ok(())
    }
}
