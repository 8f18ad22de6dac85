//! Command parsing and reply composition, independent of the chat client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    banner,
    error::{RateLimited, StoreError},
    models::{parse_players, StatusSnapshot},
    system::SystemReport,
};

/// Placeholder written over sensitive values.
pub const REDACTED: &str = "[redacted]";
/// Object keys whose values are always redacted (compared case-insensitively).
pub const SENSITIVE_KEYS: &[&str] = &["ip", "key", "token", "id"];
/// Room left for the dump inside one chat message.
const DUMP_LIMIT: usize = 1_900;

/// Commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Gateway latency.
    Ping,
    /// Command list.
    Help,
    /// Cached player count banner.
    Players,
    /// Host system report.
    Info,
    /// Crate version.
    Version,
    /// Redacted dump of the cache.
    RawCache,
    /// Privileged restart with DM confirmation.
    Restart,
    /// Any other word after the prefix.
    Unknown(String),
}

impl Command {
    /// Parse a message. `None` when it does not start with `prefix`.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let name = rest.split_whitespace().next()?.to_lowercase();
        Some(match name.as_str() {
            "ping" => Command::Ping,
            "help" => Command::Help,
            "players" => Command::Players,
            "info" => Command::Info,
            "version" => Command::Version,
            "rawcache" => Command::RawCache,
            "restart" => Command::Restart,
            _ => Command::Unknown(name),
        })
    }
}

/// Whether `content` contains any blacklisted phrase, ignoring case.
pub fn is_blacklisted(content: &str, phrases: &[String]) -> bool {
    let lowered = content.to_lowercase();
    phrases
        .iter()
        .filter(|phrase| !phrase.is_empty())
        .any(|phrase| lowered.contains(&phrase.to_lowercase()))
}

/// Whether a restart confirmation reply approves the restart.
pub fn is_confirmation(reply: &str) -> bool {
    matches!(
        reply.trim().to_lowercase().as_str(),
        "yes" | "y" | "confirm"
    )
}

/// Colour family of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Command succeeded.
    Success,
    /// Neutral information.
    Info,
    /// Bot metadata.
    Notice,
    /// Usable but degraded, e.g. throttled or stale.
    Warning,
    /// Command failed.
    Error,
}

/// Platform-neutral rich reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Heading.
    pub title: String,
    /// Body text, may be empty.
    pub description: String,
    /// Colour family.
    pub tone: Tone,
    /// Name/value rows in display order.
    pub fields: Vec<(String, String)>,
    /// Small print under the reply.
    pub footer: Option<String>,
}

impl Reply {
    /// Reply with no fields or footer.
    pub fn new(tone: Tone, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tone,
            fields: Vec::new(),
            footer: None,
        }
    }

    /// Error-toned reply titled `Error`.
    pub fn error(description: impl Into<String>) -> Self {
        Self::new(Tone::Error, "Error", description)
    }

    /// Append a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Set the footer.
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

/// Command list with one line per command.
pub fn help_reply(prefix: &str) -> Reply {
    let lines = [
        ("ping", "Check the bot's latency."),
        ("help", "Display this help message."),
        ("players", "Display the amount of players currently in the server."),
        ("info", "Display the system uptime and other information."),
        ("version", "Display the bot's current version."),
        ("rawcache", "Dump the cached server data."),
        ("restart", "Restart the bot (authorized user only)."),
    ];
    let description = lines
        .iter()
        .map(|(name, text)| format!("`{prefix}{name}` - {text}"))
        .collect::<Vec<_>>()
        .join("\n");
    Reply::new(Tone::Info, "Help Menu", description)
}

/// Latency in milliseconds, when known.
pub fn ping_reply(latency: Option<Duration>) -> Reply {
    let description = match latency {
        Some(latency) => format!("Pong! {}ms", latency.as_millis()),
        None => "Pong! Latency not measured yet.".to_string(),
    };
    Reply::new(Tone::Success, "Ping", description)
}

/// The running version.
pub fn version_reply(version: &str) -> Reply {
    Reply::new(Tone::Notice, "Bot Version", "").field("Bot Version", version)
}

/// One field per line of the host report.
pub fn info_reply(report: &SystemReport) -> Reply {
    report
        .fields()
        .into_iter()
        .fold(Reply::new(Tone::Success, "System Information", ""), |reply, (name, value)| {
            reply.field(name, value)
        })
}

/// Error naming the unrecognized command.
pub fn unknown_reply(prefix: &str, name: &str) -> Reply {
    Reply::error(format!(
        "Unknown command `{prefix}{name}`. Try `{prefix}help`."
    ))
}

/// Cooldown notice with the remaining wait.
pub fn rate_limited_reply(limited: &RateLimited) -> Reply {
    Reply::new(
        Tone::Warning,
        "Slow down",
        format!("This command is on cooldown, {limited}."),
    )
}

fn cache_failure_reply(error: &StoreError) -> Reply {
    match error {
        StoreError::NotFound => Reply::new(
            Tone::Warning,
            "No data yet",
            "The server status has not been fetched yet. Try again in a moment.",
        ),
        _ => Reply::error("Unable to fetch player count information."),
    }
}

/// Compose the `players` reply from the cached snapshot.
pub fn players_reply(
    cached: Result<StatusSnapshot, StoreError>,
    server_index: usize,
    now: DateTime<Utc>,
    stale_after: chrono::Duration,
) -> Reply {
    let snapshot = match cached {
        Ok(snapshot) => snapshot,
        Err(err) => return cache_failure_reply(&err),
    };
    let Some(server) = snapshot.server(server_index) else {
        return Reply::error(format!(
            "The cached data has no entry for server {server_index}."
        ));
    };

    let banner = banner::occupancy_banner(server.current_players, server.max_slots);
    let mut reply = Reply::new(
        Tone::Success,
        "Players Online",
        format!("```\n{banner}\n```"),
    )
    .footer(format!(
        "Last updated {}",
        snapshot.fetched_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if snapshot.is_stale(now, stale_after) {
        reply.tone = Tone::Warning;
        reply = reply.field(
            "Stale data",
            format!(
                "These numbers are {} old; the status API has not answered since.",
                describe_age(snapshot.age(now))
            ),
        );
    }
    reply
}

/// Compose the `rawcache` reply with sensitive values removed.
pub fn rawcache_reply(cached: Result<StatusSnapshot, StoreError>, secrets: &[String]) -> Reply {
    match cached {
        Ok(snapshot) => {
            let dump = redacted_dump(&snapshot, secrets);
            Reply::new(Tone::Info, "Cached Data", format!("```json\n{dump}\n```"))
        }
        Err(StoreError::NotFound) => cache_failure_reply(&StoreError::NotFound),
        Err(_) => Reply::error("Unable to read the cached data."),
    }
}

/// Pretty JSON of the snapshot with sensitive keys and secrets masked.
///
/// Secrets are masked inside string values only. Numbers and `N/M` player
/// counts are data and stay intact even when a short secret matches them.
pub fn redacted_dump(snapshot: &StatusSnapshot, secrets: &[String]) -> String {
    let secrets: Vec<&str> = secrets
        .iter()
        .map(String::as_str)
        .filter(|secret| !secret.is_empty())
        .collect();
    let mut value = serde_json::to_value(snapshot).unwrap_or(Value::Null);
    redact_value(&mut value, &secrets);
    truncate_dump(serde_json::to_string_pretty(&value).unwrap_or_default())
}

fn redact_value(value: &mut Value, secrets: &[&str]) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let lowered = key.to_lowercase();
                if SENSITIVE_KEYS.contains(&lowered.as_str()) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact_value(entry, secrets);
                }
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| redact_value(item, secrets)),
        Value::String(text) if parse_players(text.as_str()).is_err() => {
            for &secret in secrets {
                if text.contains(secret) {
                    *text = text.replace(secret, REDACTED);
                }
            }
        }
        _ => {}
    }
}

fn truncate_dump(text: String) -> String {
    if text.chars().count() <= DUMP_LIMIT {
        return text;
    }
    let mut truncated: String = text.chars().take(DUMP_LIMIT).collect();
    truncated.push_str("\n… (truncated)");
    truncated
}

fn describe_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds();
    match secs {
        s if s < 120 => format!("{s} seconds"),
        s if s < 7_200 => format!("{} minutes", s / 60),
        s => format!("{} hours", s / 3_600),
    }
}
