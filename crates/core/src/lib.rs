#![warn(clippy::all, missing_docs)]

//! Core logic for the server status bot.
//!
//! This crate hosts the status API client, snapshot models, the cache,
//! presence reconciliation, the polling loop and the chat command
//! behaviour. It knows nothing about the chat platform; the `statusbot`
//! binary wires it to the gateway.

pub mod banner;
pub mod cache;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod poller;
pub mod presence;
pub mod rate_limit;
pub mod reconnect;
pub mod status;
pub mod system;

pub use cache::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use commands::{Command, Reply, Tone};
pub use config::AppConfig;
pub use context::BotContext;
pub use error::{ConfigError, PresenceError, StatusError, StoreError};
pub use lifecycle::Lifecycle;
pub use models::{ServerOccupancy, StatusSnapshot};
pub use poller::{Poller, PollerHandle};
pub use presence::{Presence, PresenceHub, PresenceSink, PresenceState};
pub use reconnect::ReconnectSupervisor;
pub use status::{HttpStatusSource, StatusSource};
pub use system::SystemReport;
