//! Shared domain models.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StatusError;

static OCCUPANCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s*/\s*(\d+)\s*$").expect("invalid occupancy regex")
});

/// Player occupancy of one listed server.
///
/// `current_players <= max_slots` is what the remote usually reports but it is
/// not enforced; overfull servers are represented as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOccupancy {
    /// Position of the server in the remote listing.
    pub index: usize,
    /// Players currently connected.
    pub current_players: u32,
    /// Configured player slots.
    pub max_slots: u32,
}

impl ServerOccupancy {
    /// Parse an `"N/M"` players string for the server at `index`.
    pub fn parse(index: usize, players: &str) -> Result<Self, StatusError> {
        let (current_players, max_slots) = parse_players(players)?;
        Ok(Self {
            index,
            current_players,
            max_slots,
        })
    }

    /// Whether every slot is taken.
    pub fn is_full(&self) -> bool {
        self.current_players == self.max_slots
    }
}

impl fmt::Display for ServerOccupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current_players, self.max_slots)
    }
}

/// Split an `"N/M"` string into its two counts.
pub fn parse_players(players: &str) -> Result<(u32, u32), StatusError> {
    let captures = OCCUPANCY_RE
        .captures(players)
        .ok_or_else(|| StatusError::Parse(format!("players field {players:?} is not N/M")))?;
    let count = |group: usize| -> Result<u32, StatusError> {
        u32::from_str(&captures[group])
            .map_err(|err| StatusError::Parse(format!("players field {players:?}: {err}")))
    };
    Ok((count(1)?, count(2)?))
}

/// The normalized result of one poll.
///
/// Construct through [`StatusSnapshot::success`] or [`StatusSnapshot::failure`];
/// deserialization re-checks the same invariant so a cache file cannot smuggle
/// in a half-valid record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRecord")]
pub struct StatusSnapshot {
    success: bool,
    servers: Vec<ServerOccupancy>,
    fetched_at: DateTime<Utc>,
    raw_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<Value>,
}

#[derive(Deserialize)]
struct SnapshotRecord {
    success: bool,
    #[serde(default)]
    servers: Vec<ServerOccupancy>,
    fetched_at: DateTime<Utc>,
    #[serde(default)]
    raw_error: Option<String>,
    #[serde(default)]
    raw: Option<Value>,
}

impl TryFrom<SnapshotRecord> for StatusSnapshot {
    type Error = String;

    fn try_from(record: SnapshotRecord) -> Result<Self, Self::Error> {
        match (record.success, record.raw_error.is_some()) {
            (true, true) => Err("successful snapshot carries an error".to_string()),
            (false, false) => Err("failed snapshot carries no error".to_string()),
            (false, true) if !record.servers.is_empty() => {
                Err("failed snapshot lists servers".to_string())
            }
            _ => Ok(Self {
                success: record.success,
                servers: record.servers,
                fetched_at: record.fetched_at,
                raw_error: record.raw_error,
                raw: record.raw,
            }),
        }
    }
}

impl StatusSnapshot {
    /// A successful poll listing the parsed servers.
    pub fn success(servers: Vec<ServerOccupancy>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            servers,
            fetched_at,
            raw_error: None,
            raw: None,
        }
    }

    /// A failed poll; carries no servers.
    pub fn failure(error: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            servers: Vec::new(),
            fetched_at,
            raw_error: Some(error.into()),
            raw: None,
        }
    }

    /// Attach the decoded upstream body.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Whether the poll succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Parsed server occupancies in listing order.
    pub fn servers(&self) -> &[ServerOccupancy] {
        &self.servers
    }

    /// Look up a server by its listing position.
    pub fn server(&self, index: usize) -> Option<&ServerOccupancy> {
        self.servers.iter().find(|server| server.index == index)
    }

    /// When the poll completed.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Error reported for a failed poll.
    pub fn raw_error(&self) -> Option<&str> {
        self.raw_error.as_deref()
    }

    /// Decoded upstream body, if retained.
    pub fn raw(&self) -> Option<&Value> {
        self.raw.as_ref()
    }

    /// Time elapsed since the poll, clamped at zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).max(Duration::zero())
    }

    /// Whether the snapshot is older than `stale_after`.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.age(now) > stale_after
    }
}
