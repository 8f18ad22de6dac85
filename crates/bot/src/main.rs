mod discord;
mod handler;

use anyhow::{bail, Context as _, Result};
use parking_lot::RwLock;
use serenity::{all::GatewayIntents, Client};
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Arc,
};

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use statusbot_core::{
    config::{self, AppConfig},
    poller::PollSettings,
    BotContext, FileCacheStore, HttpStatusSource, Lifecycle, Poller, PollerHandle, PresenceHub,
    ReconnectSupervisor,
};

use handler::{BotState, Handler};

/// Command line options.
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    init_config: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--init-config" => {
                    let path = args
                        .next()
                        .unwrap_or_else(|| config::CONFIG_FILE_NAME.to_string());
                    parsed.init_config = Some(PathBuf::from(path));
                }
                other => bail!("unknown argument `{other}`"),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let args = Args::parse(std::env::args().skip(1))?;
    if let Some(path) = args.init_config {
        config::write_template(&path)?;
        info!("wrote configuration template to {}", path.display());
        return Ok(());
    }

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(Lifecycle::ConfigError.exit_code());
        }
    };

    let lifecycle = run(config).await?;
    warn!("shutting down: {lifecycle}");
    std::process::exit(lifecycle.exit_code());
}

/// Run gateway sessions until a restart is requested or reconnects run out.
async fn run(config: AppConfig) -> Result<Lifecycle> {
    let config = Arc::new(config);
    let store = Arc::new(FileCacheStore::new(&config.cache.path));
    let presence = PresenceHub::new();
    let source = HttpStatusSource::from_config(&config)?;
    let poller = Poller::new(
        source,
        store.clone(),
        presence.clone(),
        PollSettings::from(config.as_ref()),
    );
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();

    let state = Arc::new(BotState {
        context: BotContext::new(config.clone(), store),
        presence,
        poller: PollerHandle::new(poller),
        supervisor: ReconnectSupervisor::new(config.backoff_policy()),
        shards: RwLock::new(None),
        exit: exit_tx,
    });

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    loop {
        let session = Client::builder(&config.credentials.bot_token, intents)
            .event_handler(Handler::new(state.clone()))
            .await;

        match session {
            Ok(mut client) => {
                let shards = client.shard_manager.clone();
                *state.shards.write() = Some(shards.clone());
                tokio::select! {
                    result = client.start() => match result {
                        Ok(()) => warn!("gateway session ended"),
                        Err(err) => error!("gateway session failed: {err}"),
                    },
                    Some(lifecycle) = exit_rx.recv() => {
                        shards.shutdown_all().await;
                        state.poller.stop();
                        return Ok(lifecycle);
                    }
                }
            }
            Err(err) => error!("failed to build gateway client: {err}"),
        }

        state.presence.detach();
        state.shards.write().take();
        match state.supervisor.on_session_lost() {
            Ok(delay) => tokio::time::sleep(delay).await,
            Err(err) => {
                error!("{err}");
                state.poller.stop();
                return Ok(Lifecycle::ReconnectExhausted);
            }
        }
    }
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("statusbot.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
