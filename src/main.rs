use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use carik_host::application::errors::{BotError, BoxError};
use carik_host::application::messaging::{EventBus, MessageDispatcher};
use carik_host::application::modules::{ArtifactFormat, FactoryRegistry, HookResult, Module, ModuleContext, ModuleManager};
use carik_host::application::services::ModuleAdminService;
use carik_host::domain::entities::Message;
use carik_host::domain::traits::Bot;
use carik_host::infrastructure::adapters::ConsoleAdapter;
use carik_host::infrastructure::artifacts::{ArtifactStore, LinkedFormat, NativeFormat, LINKED_EXTENSION};
use carik_host::infrastructure::config::{ArtifactKind, Config};
use carik_host::infrastructure::storage::ModuleListStore;

#[derive(Parser)]
#[command(name = "carik-host")]
#[command(about = "A chat-bot host with hot-swappable modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Host directory (overrides config)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host
    Run,
    /// List installed module artifacts
    Modules,
    /// Show version
    Version,
    /// Generate default config
    InitConfig {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => run_host(load_config(&cli.config, cli.root)),
        Commands::Modules => list_modules(&load_config(&cli.config, cli.root)),
        Commands::Version => {
            println!("carik-host v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig { output, force } => init_config(output.as_deref(), force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path, root: Option<PathBuf>) -> Config {
    let mut config = if path.exists() {
        Config::load(path)
            .map(Config::with_env)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Config::load_env()
            })
    } else {
        Config::load_env()
    };

    if let Some(root) = root {
        config.modules.root = root;
    }
    config
}

fn run_host(config: Config) -> Result<(), BotError> {
    tracing::info!("Starting {} in {}", config.bot.name, config.modules.root.display());

    let bus = Arc::new(EventBus::new());
    let manager = Arc::new(build_manager(&config, Arc::clone(&bus)));

    if config.modules.auto_load {
        let loaded = if config.modules.load_latest {
            manager.load_latest_from_list()
        } else {
            manager.load_persisted_list()
        };
        if let Err(e) = loaded {
            tracing::warn!("Continuing with a partial module set: {}", e);
        }
    }
    tracing::info!("{} module(s) loaded", manager.len());

    let dispatcher = MessageDispatcher::new(&config.bot.prefix, ModuleAdminService::new(Arc::clone(&manager)), bus);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;
    let result = rt.block_on(async {
        let bot = ConsoleAdapter::new(&config.bot.name);
        run_console_bot(&bot, &dispatcher).await
    });

    if config.modules.save_on_shutdown {
        manager.shutdown();
    } else {
        manager.unload_all();
    }

    // A pending stdin read would otherwise keep the runtime alive.
    rt.shutdown_background();
    result
}

fn build_manager(config: &Config, bus: Arc<EventBus>) -> ModuleManager {
    let factories = Arc::new(FactoryRegistry::new());
    let format: Arc<dyn ArtifactFormat> = match config.modules.format {
        ArtifactKind::Native => Arc::new(NativeFormat),
        ArtifactKind::Linked => {
            register_linked_modules(&factories);
            Arc::new(LinkedFormat::new(Arc::clone(&factories)))
        }
    };

    ModuleManager::new(&config.modules.root, format)
        .with_factories(factories)
        .with_bus(bus)
}

async fn run_console_bot(bot: &ConsoleAdapter, dispatcher: &MessageDispatcher) -> Result<(), BotError> {
    bot.start().await?;
    let chat_id = bot.bot_info().id;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            line = bot.next_text() => {
                let Some(line) = line else {
                    tracing::info!("End of input, shutting down");
                    break;
                };
                for reply in dispatcher.process_text(chat_id.as_str(), line) {
                    bot.send_message(&chat_id, &reply).await?;
                }
            }
        }
    }
    Ok(())
}

fn list_modules(config: &Config) -> Result<(), BotError> {
    let extension = match config.modules.format {
        ArtifactKind::Native => NativeFormat.extension().to_string(),
        ArtifactKind::Linked => LINKED_EXTENSION.to_string(),
    };
    let store = ArtifactStore::new(&config.modules.root, extension);
    let listed = ModuleListStore::new(store.list_path()).read()?.unwrap_or_default();
    let installed = store.installed()?;

    if installed.is_empty() {
        println!("No modules installed in {}", store.module_dir().display());
        return Ok(());
    }

    for (id, versions) in installed {
        let versions: Vec<String> = versions.iter().map(ToString::to_string).collect();
        match listed.get(&id) {
            Some(version) => println!("{}: {} (listed: {})", id, versions.join(", "), version),
            None => println!("{}: {}", id, versions.join(", ")),
        }
    }
    Ok(())
}

fn init_config(output: Option<&Path>, force: bool) -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;

    let Some(path) = output else {
        println!("{}", yaml);
        println!("\nSave this to config.yaml and adjust as needed.");
        return Ok(());
    };

    if path.exists() && !force {
        return Err(BotError::Internal(format!("{} already exists, use --force to overwrite", path.display())));
    }
    std::fs::write(path, yaml)
        .map_err(|e| BotError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Answers `ping` with `pong`
struct PingModule;

impl Module for PingModule {
    fn init(&self, context: &ModuleContext) -> HookResult {
        tracing::info!("{} ready", context.descriptor().label());
        Ok(())
    }

    fn shut_down(&self) -> HookResult {
        Ok(())
    }

    fn on_message(&self, message: &Message) -> Option<String> {
        let text = message.content.text()?;
        text.trim().eq_ignore_ascii_case("ping").then(|| "pong".to_string())
    }
}

/// Modules compiled into this binary, loadable through `.module` artifacts
fn register_linked_modules(factories: &FactoryRegistry) {
    factories.register_linked("ping", "PingModule", |_: &ModuleContext| -> Result<Box<dyn Module>, BoxError> {
        Ok(Box::new(PingModule))
    });
}
