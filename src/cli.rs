use crate::admin::{self, AdminState};
use crate::bus::EventBus;
use crate::config::{self, Config};
use crate::dispatch::Dispatcher;
use crate::errors::RollcallError;
use crate::sched::ExpiryEnforcer;
use crate::store::Store;
use crate::transport::{ChatTransport, TelegramTransport};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Tenant-scoped check-in bot for group chats")]
struct Cli {
    /// Path to the config file (default: ~/.rollcall/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot, admin API, and expiry sweep (the default)
    Run,
    /// Write a default config file and exit
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init { force } => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => config::get_config_path()?,
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::save_config(&Config::default(), Some(&path))?;
            println!("Wrote {}", path.display());
            println!("Set bot.token before running.");
            Ok(())
        }
        Commands::Run => {
            let config = config::load_config(config_path)?;
            run_bot(config).await
        }
    }
}

async fn run_bot(config: Config) -> Result<()> {
    if config.bot.token.is_empty() {
        bail!("bot.token is not set — run `rollcall init` and edit the config file");
    }

    let db_path = match &config.storage.db_path {
        Some(path) => PathBuf::from(path),
        None => config::loader::get_rollcall_home()?.join("rollcall.db"),
    };
    let store = Arc::new(Store::open(&db_path)?);
    info!("Store ready at {}", db_path.display());

    let transport = Arc::new(TelegramTransport::new(&config.bot)?);
    let shared: Arc<dyn ChatTransport> = transport.clone();
    let enforcer = Arc::new(ExpiryEnforcer::new(store.clone(), shared.clone()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), shared, enforcer.clone()));

    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let poller = transport.clone();
    tokio::spawn(async move { poller.poll_updates(raw_tx).await });

    let admin_state = AdminState {
        store,
        dispatcher: dispatcher.clone(),
    };
    let admin_config = config.admin.clone();
    let admin_api = async move {
        if admin_config.enabled {
            admin::serve(&admin_config, admin_state).await
        } else {
            info!("Admin API disabled");
            std::future::pending().await
        }
    };

    info!("rollcall {} up", crate::VERSION);
    tokio::select! {
        () = dispatch_loop(raw_rx, dispatcher) => {
            bail!("event stream ended unexpectedly")
        }
        result = admin_api => result,
        () = enforcer.run(config.expiry.sweep_interval_secs) => Ok(()),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
            Ok(())
        }
    }
}

/// Feed polled updates through the rate-limiting bus and dispatch in order.
async fn dispatch_loop(
    mut raw_rx: mpsc::UnboundedReceiver<crate::bus::InboundEvent>,
    dispatcher: Arc<Dispatcher>,
) {
    let mut bus = EventBus::default();
    while let Some(event) = raw_rx.recv().await {
        bus.publish(event);
        while let Some(event) = bus.try_consume() {
            match dispatcher.handle_event(event).await {
                Ok(()) => {}
                Err(RollcallError::TenantInactive { chat_id }) => {
                    debug!("Dropped message for inactive tenant {chat_id}");
                }
                Err(e) => warn!("Dispatch failed: {e:#}"),
            }
        }
    }
}
