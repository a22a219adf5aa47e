use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use odin_bot::application::errors::{BotError, StorageError};
use odin_bot::application::messaging::{
    ConversationRouter, LoggingMiddleware, MessageDispatcher, RateLimitMiddleware, ReconcileMiddleware,
};
use odin_bot::application::services::{AdminCommands, LifecycleCoordinator, LifecycleSettings, ServerConfigs};
use odin_bot::domain::traits::{Bot, ServerConfigStore, SourceStore};
use odin_bot::extensions::{general, ExtensionRegistry, BASE_EXTENSION};
use odin_bot::infrastructure::adapters::console::ConsoleAdapter;
use odin_bot::infrastructure::config::{Config, StorageBackend};
use odin_bot::infrastructure::database::SqliteServerStore;
use odin_bot::infrastructure::extensions::{FsSourceStore, UnitLoader};
use odin_bot::infrastructure::storage::{CommandDescriptions, JsonServerStore};

#[derive(Parser)]
#[command(name = "odin-bot")]
#[command(about = "A chat command bot with runtime-loadable extensions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Show a server's persisted extensions and the available sources
    Extensions {
        #[arg(long)]
        server: String,
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
        Commands::Run => run_bot(load_config(&cli.config, cli.token)),
        Commands::Version => {
            println!("odin-bot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
        Commands::Extensions { server } => show_extensions(&load_config(&cli.config, cli.token), &server),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(config_path: &str, token_override: Option<String>) -> Config {
    let mut config = if Path::new(config_path).exists() {
        Config::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        })
    } else {
        Config::load_env()
    };

    if token_override.is_some() {
        config.bot.token = token_override;
    }
    config
}

fn open_server_store(config: &Config) -> Result<Arc<dyn ServerConfigStore>, StorageError> {
    Ok(match config.storage.backend {
        StorageBackend::Json => Arc::new(JsonServerStore::new(config.storage.servers_dir.clone())),
        StorageBackend::Sqlite => Arc::new(SqliteServerStore::open(&config.storage.sqlite_path)?),
    })
}

fn run_bot(config: Config) -> Result<(), BotError> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;
    rt.block_on(serve(config))
}

async fn serve(config: Config) -> Result<(), BotError> {
    info!("Starting odin-bot: {}", config.bot.name);
    if config.bot.token.is_some() {
        info!("Bot token configured");
    }

    let store = open_server_store(&config)?;
    info!("Server records: {:?} backend", config.storage.backend);

    let descriptions = Arc::new(CommandDescriptions::open(config.storage.commands_file.clone())?);
    AdminCommands::register(&descriptions)?;

    let extensions_dir = config.extensions.directory.clone();
    let sources = Arc::new(FsSourceStore::new(extensions_dir.clone()));
    let registry = Arc::new(
        ExtensionRegistry::new(sources.clone(), Arc::new(UnitLoader::new(extensions_dir)), descriptions)
            .with_builtin(BASE_EXTENSION, general::create),
    );

    let console = Arc::new(ConsoleAdapter::new(config.bot.name.clone()));
    let router = Arc::new(ConversationRouter::new(console.clone()));

    let coordinator = Arc::new(LifecycleCoordinator::new(
        registry,
        ServerConfigs::new(store, BASE_EXTENSION),
        sources,
        router.clone(),
        LifecycleSettings {
            base: BASE_EXTENSION.to_string(),
            collect_timeout: config.collect_timeout(),
        },
    ));
    coordinator.start()?;

    let admin = Arc::new(AdminCommands::new(coordinator.clone(), config.security.admins.clone()));
    let rate_limit = &config.security.rate_limit;
    let dispatcher = Arc::new(
        MessageDispatcher::new(config.bot.prefix.clone(), admin)
            .with_middleware(LoggingMiddleware)
            .with_middleware(RateLimitMiddleware::new(rate_limit.max_requests, rate_limit.window_seconds))
            .with_middleware(ReconcileMiddleware::new(coordinator)),
    );

    let Some(console_config) = config.adapters.console.as_ref().filter(|c| c.enabled) else {
        warn!("No adapter enabled, nothing to do");
        return Ok(());
    };

    console.start().await?;
    let info = console.bot_info();
    info!("Bot started: @{}", info.username);

    console
        .run(dispatcher, router, console_config.server_id.clone())
        .await
}

fn init_config() -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}

fn show_extensions(config: &Config, server_id: &str) -> Result<(), BotError> {
    let store = open_server_store(config)?;
    match store.load(server_id)? {
        Some(record) if !record.is_empty() => {
            println!("Server {} enables: {}", server_id, record.names().join(", "));
        }
        Some(_) => println!("Server {} enables no extensions", server_id),
        None => println!("Server {} has no record yet", server_id),
    }
    println!("Base extension: {}", BASE_EXTENSION);

    let sources = FsSourceStore::new(config.extensions.directory.clone());
    let names = sources.names()?;
    if names.is_empty() {
        println!("No source units in {}", config.extensions.directory.display());
    } else {
        println!("Source units: {}", names.join(", "));
    }
    Ok(())
}
