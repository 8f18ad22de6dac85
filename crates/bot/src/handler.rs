use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use parking_lot::RwLock;
use serenity::{
    all::{Context, EventHandler, Message, Ready, ResumedEvent, ShardManager},
    async_trait,
    collector::MessageCollector,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use statusbot_core::{
    commands::{self, Command},
    BotContext, HttpStatusSource, Lifecycle, PollerHandle, PresenceHub, ReconnectSupervisor,
    Reply, SystemReport, Tone,
};

use crate::discord::{self, GatewayPresence};

/// State that outlives individual gateway sessions.
pub struct BotState {
    pub context: BotContext,
    pub presence: PresenceHub,
    pub poller: PollerHandle<HttpStatusSource>,
    pub supervisor: ReconnectSupervisor,
    pub shards: RwLock<Option<Arc<ShardManager>>>,
    pub exit: mpsc::UnboundedSender<Lifecycle>,
}

pub struct Handler {
    state: Arc<BotState>,
}

impl Handler {
    pub fn new(state: Arc<BotState>) -> Self {
        Self { state }
    }

    fn session_up(&self, ctx: &Context) {
        self.state
            .presence
            .attach(Arc::new(GatewayPresence::new(ctx.shard.clone())));
        if self.state.poller.ensure_running() {
            info!("status poller launched for shard {}", ctx.shard_id);
        }
        self.state.supervisor.mark_healthy();
    }

    async fn dispatch(&self, ctx: &Context, msg: &Message, command: Command) -> Result<Option<Reply>> {
        let config = self.state.context.config();
        let reply = match command {
            Command::Ping => commands::ping_reply(self.latency(ctx).await),
            Command::Help => commands::help_reply(&config.commands.prefix),
            Command::Players => self.state.context.players(),
            Command::Info => commands::info_reply(&SystemReport::collect().await),
            Command::Version => commands::version_reply(env!("CARGO_PKG_VERSION")),
            Command::RawCache => self.state.context.raw_cache(),
            Command::Restart => return self.restart(ctx, msg).await,
            Command::Unknown(name) => commands::unknown_reply(&config.commands.prefix, &name),
        };
        Ok(Some(reply))
    }

    /// Heartbeat latency of this shard, or a REST round trip before the first heartbeat.
    async fn latency(&self, ctx: &Context) -> Option<Duration> {
        let manager = self.state.shards.read().clone();
        if let Some(manager) = manager {
            let runners = manager.runners.lock().await;
            if let Some(latency) = runners.get(&ctx.shard_id).and_then(|runner| runner.latency) {
                return Some(latency);
            }
        }
        let started = Instant::now();
        match ctx.http.get_current_user().await {
            Ok(_) => Some(started.elapsed()),
            Err(err) => {
                warn!("latency probe failed: {err}");
                None
            }
        }
    }

    async fn restart(&self, ctx: &Context, msg: &Message) -> Result<Option<Reply>> {
        if !self.state.context.may_restart(msg.author.id.get()) {
            warn!("restart denied for {} ({})", msg.author.name, msg.author.id);
            return Ok(Some(Reply::error(
                "You are not authorized to restart the bot.",
            )));
        }

        let timeout = self.state.context.config().restart_confirm_timeout();
        let prompt = Reply::new(
            Tone::Warning,
            "Confirm restart",
            format!(
                "Reply `yes` within {} seconds to restart the bot.",
                timeout.as_secs()
            ),
        );
        let sent = msg
            .author
            .direct_message(ctx, discord::message(&prompt))
            .await?;

        let answer = MessageCollector::new(&ctx.shard)
            .author_id(msg.author.id)
            .channel_id(sent.channel_id)
            .timeout(timeout)
            .next()
            .await;

        let confirmed = answer
            .as_ref()
            .is_some_and(|answer| commands::is_confirmation(&answer.content));
        let outcome = match (confirmed, answer) {
            (true, _) => {
                info!("restart confirmed by {}", msg.author.name);
                Reply::new(Tone::Notice, "Restarting", "The bot is restarting now.")
            }
            (false, Some(_)) => {
                Reply::new(Tone::Info, "Restart cancelled", "The bot keeps running.")
            }
            (false, None) => Reply::new(
                Tone::Info,
                "Restart cancelled",
                "No confirmation received in time.",
            ),
        };
        sent.channel_id
            .send_message(&ctx.http, discord::message(&outcome))
            .await?;
        if confirmed && self.state.exit.send(Lifecycle::RestartRequested).is_err() {
            error!("restart requested but the session runner is gone");
        }
        Ok(None)
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected", ready.user.name);
        self.session_up(&ctx);
    }

    async fn resume(&self, ctx: Context, _: ResumedEvent) {
        info!("gateway session resumed");
        self.session_up(&ctx);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let settings = &self.state.context.config().commands;
        if commands::is_blacklisted(&msg.content, &settings.blacklisted_phrases) {
            info!("ignoring blacklisted message from {}", msg.author.name);
            return;
        }
        let Some(command) = Command::parse(&msg.content, &settings.prefix) else {
            return;
        };
        info!("{} ran {:?}", msg.author.name, command);

        let reply = match self.dispatch(&ctx, &msg, command).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(err) => {
                error!("command failed: {err:#}");
                Reply::error("Something went wrong while running that command.")
            }
        };
        if let Err(err) = msg
            .channel_id
            .send_message(&ctx.http, discord::message(&reply))
            .await
        {
            error!("failed to send reply: {err}");
        }
    }
}
