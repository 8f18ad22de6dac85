//! Error taxonomy shared by the poller, the cache stores and the command layer.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Maximum length of a custom status line on the chat platform.
pub const PRESENCE_LABEL_LIMIT: usize = 128;

/// Failure of a single fetch-parse step against the remote status source.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request failed: {0}")]
    Transport(String),
    /// The remote answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    /// The body was not JSON or lacked the expected shape.
    #[error("malformed response: {0}")]
    Parse(String),
    /// The body decoded but reported `Success: false`.
    #[error("API error: {0}")]
    Upstream(String),
    /// The configured server index has no entry in the response.
    #[error("server index {index} out of range ({available} servers listed)")]
    ServerIndex {
        /// Configured index.
        index: usize,
        /// Number of servers in the response.
        available: usize,
    },
}

impl StatusError {
    /// Short diagnostic suitable for the presence text.
    pub fn presence_label(&self) -> String {
        let label = match self {
            StatusError::Upstream(message) => format!("API error: {message}"),
            other => format!("Error: {other}"),
        };
        truncate_label(&label, PRESENCE_LABEL_LIMIT)
    }
}

impl From<reqwest::Error> for StatusError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => StatusError::HttpStatus(status.as_u16()),
            None => StatusError::Transport(err.to_string()),
        }
    }
}

/// Failure of the cache store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing has been stored yet.
    #[error("no cached snapshot available")]
    NotFound,
    /// Filesystem failure while reading or writing the cache.
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        /// Cache location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Stored data could not be decoded into a valid snapshot.
    #[error("cached snapshot is corrupt: {0}")]
    Corrupt(String),
}

/// Missing or invalid configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file was found at any candidate location.
    #[error("configuration file not found (looked in: {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),
    /// The file exists but does not describe a usable configuration.
    #[error("invalid configuration in {path}: {reason}")]
    Invalid {
        /// File that was loaded.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

/// Failure delivering a presence update to the chat session.
#[derive(Debug, Error)]
#[error("presence update failed: {0}")]
pub struct PresenceError(pub String);

/// Poller lifecycle violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollerError {
    /// A polling loop is already active.
    #[error("a polling loop is already running")]
    AlreadyRunning,
}

/// Returned when a throttled command is invoked inside its rate window.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("rate limited, retry in {}s", whole_seconds(.retry_after))]
pub struct RateLimited {
    /// Time left until the window reopens.
    pub retry_after: Duration,
}

/// Reconnect supervision errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconnectError {
    /// Every allowed reconnect attempt failed.
    #[error("gave up reconnecting after {attempts} attempts")]
    Exhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

fn whole_seconds(duration: &Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncate on a char boundary, marking the cut with an ellipsis.
pub fn truncate_label(label: &str, limit: usize) -> String {
    if label.chars().count() <= limit {
        return label.to_string();
    }
    let mut truncated: String = label.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
