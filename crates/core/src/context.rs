//! Shared state handed to the command layer.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    cache::CacheStore,
    commands::{self, Reply},
    config::AppConfig,
    rate_limit::{CommandFamily, RateWindow},
};

/// Configuration, cache access and throttle state for command handling.
///
/// The poller and the commands only meet through the cache store; nothing
/// here is written by the poller.
pub struct BotContext {
    config: Arc<AppConfig>,
    store: Arc<dyn CacheStore>,
    windows: HashMap<CommandFamily, RateWindow>,
}

impl BotContext {
    /// Context with one throttle per command family.
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn CacheStore>) -> Self {
        let windows = HashMap::from([(
            CommandFamily::Players,
            RateWindow::new(config.players_cooldown()),
        )]);
        Self {
            config,
            store,
            windows,
        }
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Snapshot cache shared with the poller.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Throttle of a command family.
    pub fn window(&self, family: CommandFamily) -> Option<&RateWindow> {
        self.windows.get(&family)
    }

    /// Whether `user_id` may run the restart command.
    pub fn may_restart(&self, user_id: u64) -> bool {
        self.config.commands.authorized_restart_user_id == Some(user_id)
    }

    /// Rate-limited player count reply.
    pub fn players(&self) -> Reply {
        if let Some(window) = self.window(CommandFamily::Players) {
            if let Err(limited) = window.try_acquire() {
                info!("players command throttled: {limited}");
                return commands::rate_limited_reply(&limited);
            }
        }
        let cached = self.store.latest();
        if let Err(err) = &cached {
            warn!("players command could not read the cache: {err}");
        }
        commands::players_reply(
            cached,
            self.config.status.server_index,
            Utc::now(),
            self.config.stale_after(),
        )
    }

    /// Redacted dump of the cached snapshot.
    pub fn raw_cache(&self) -> Reply {
        let cached = self.store.latest();
        if let Err(err) = &cached {
            warn!("rawcache command could not read the cache: {err}");
        }
        commands::rawcache_reply(cached, &self.config.secrets())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MemoryCacheStore,
        commands::Tone,
        models::{ServerOccupancy, StatusSnapshot},
    };

    fn context(yaml_extra: &str) -> (BotContext, Arc<MemoryCacheStore>) {
        let yaml = format!(
            "credentials:\n  bot_token: bot-token-value\n  server_id: \"777\"\n  api_key: api-key-value\n{yaml_extra}"
        );
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        let store = Arc::new(MemoryCacheStore::new());
        (BotContext::new(Arc::new(config), store.clone()), store)
    }

    #[test]
    fn players_is_throttled_within_window() {
        let (ctx, store) = context("commands:\n  players_cooldown_secs: 60\n");
        store
            .put(&StatusSnapshot::success(
                vec![ServerOccupancy::parse(0, "5/20").unwrap()],
                Utc::now(),
            ))
            .unwrap();

        assert_eq!(ctx.players().title, "Players Online");
        let second = ctx.players();
        assert_eq!(second.title, "Slow down");
        assert_eq!(second.tone, Tone::Warning);
    }

    #[test]
    fn players_without_cooldown_runs_every_time() {
        let (ctx, _store) = context("commands:\n  players_cooldown_secs: 0\n");
        assert_eq!(ctx.players().title, "No data yet");
        assert_eq!(ctx.players().title, "No data yet");
    }

    #[test]
    fn restart_requires_configured_user() {
        let (ctx, _) = context("");
        assert!(!ctx.may_restart(42));

        let (ctx, _) = context("commands:\n  authorized_restart_user_id: 42\n");
        assert!(ctx.may_restart(42));
        assert!(!ctx.may_restart(43));
    }

    #[test]
    fn raw_cache_masks_configured_secrets() {
        let (ctx, store) = context("");
        store
            .put(
                &StatusSnapshot::success(
                    vec![ServerOccupancy::parse(0, "1/2").unwrap()],
                    Utc::now(),
                )
                .with_raw(serde_json::json!({"Note": "server 777"})),
            )
            .unwrap();
        let reply = ctx.raw_cache();
        assert!(!reply.description.contains("777"));
    }
}
