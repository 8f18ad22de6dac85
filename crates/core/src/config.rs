//! Application configuration loaded from YAML with environment overrides.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::ConfigError, reconnect::BackoffPolicy};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "STATUSBOT_CONFIG";
/// Prefix for per-key environment overrides (`STATUSBOT__STATUS__SERVER_INDEX=1`).
pub const ENV_PREFIX: &str = "STATUSBOT";
/// File name looked up in the working and user config directories.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Annotated template written by `--init-config`.
pub const CONFIG_TEMPLATE: &str = r#"# statusbot configuration
credentials:
  bot_token: "YOUR_BOT_TOKEN"
  server_id: "YOUR_SERVER_ID"
  api_key: "YOUR_API_KEY"

status:
  endpoint: "https://api.scpslgame.com/serverinfo.php"
  # Seconds between polls of the status API.
  poll_interval_secs: 60
  request_timeout_secs: 10
  # Reflect the player count in the bot's presence.
  enabled: true
  # Which server of the listing to display.
  server_index: 0
  # stale_after_secs: 180

cache:
  path: "data.json"

commands:
  prefix: "!"
  blacklisted_phrases: ["!!", "!!!", "!!!!"]
  players_cooldown_secs: 10
  # authorized_restart_user_id: 123456789012345678
  restart_confirm_timeout_secs: 30

reconnect:
  max_attempts: 5
  initial_delay_secs: 5
  max_delay_secs: 300
"#;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tokens and identifiers for the chat platform and status API.
    pub credentials: Credentials,
    /// Poller settings.
    #[serde(default)]
    pub status: StatusSettings,
    /// Cache location.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Command layer settings.
    #[serde(default)]
    pub commands: CommandSettings,
    /// Session reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

/// Secrets; never logged or echoed.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Chat platform bot token.
    pub bot_token: String,
    /// Status API server listing id.
    pub server_id: String,
    /// Status API key.
    pub api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"[redacted]")
            .field("server_id", &"[redacted]")
            .field("api_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct StatusSettings {
    pub endpoint: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub enabled: bool,
    pub server_index: usize,
    pub stale_after_secs: Option<u64>,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.scpslgame.com/serverinfo.php".to_string(),
            poll_interval_secs: 60,
            request_timeout_secs: 10,
            enabled: true,
            server_index: 0,
            stale_after_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct CacheSettings {
    pub path: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct CommandSettings {
    pub prefix: String,
    pub blacklisted_phrases: Vec<String>,
    pub players_cooldown_secs: u64,
    pub authorized_restart_user_id: Option<u64>,
    pub restart_confirm_timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            blacklisted_phrases: vec!["!!".into(), "!!!".into(), "!!!!".into()],
            players_cooldown_secs: 10,
            authorized_restart_user_id: None,
            restart_confirm_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct ReconnectSettings {
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_secs: 5,
            max_delay_secs: 300,
        }
    }
}

impl AppConfig {
    /// Resolve the configuration file and load it.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = resolve_config_path(explicit)?;
        Self::from_file(&path)
    }

    /// Load and validate the file at `path`, applying environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(vec![path.to_path_buf()]));
        }
        let invalid = |reason: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|err| invalid(err.to_string()))?;
        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|err| invalid(err.to_string()))?;
        config.validate().map_err(invalid)?;

        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from YAML text without environment overrides.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            path: PathBuf::from("<inline>"),
            reason,
        };
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|err| invalid(err.to_string()))?;
        config.validate().map_err(invalid)?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        let credentials = [
            ("credentials.bot_token", &self.credentials.bot_token),
            ("credentials.server_id", &self.credentials.server_id),
            ("credentials.api_key", &self.credentials.api_key),
        ];
        for (key, value) in credentials {
            if value.trim().is_empty() {
                return Err(format!("{key} must not be empty"));
            }
        }
        if self.status.poll_interval_secs == 0 {
            return Err("status.poll_interval_secs must be greater than zero".into());
        }
        if self.status.request_timeout_secs == 0 {
            return Err("status.request_timeout_secs must be greater than zero".into());
        }
        if self.commands.prefix.is_empty() {
            return Err("commands.prefix must not be empty".into());
        }
        if self.reconnect.initial_delay_secs == 0 {
            return Err("reconnect.initial_delay_secs must be greater than zero".into());
        }
        if self.reconnect.max_delay_secs < self.reconnect.initial_delay_secs {
            return Err("reconnect.max_delay_secs must be at least initial_delay_secs".into());
        }
        Ok(())
    }

    /// Time between poll cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.status.poll_interval_secs)
    }

    /// Upper bound for one status request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.status.request_timeout_secs)
    }

    /// Age after which cached data is reported as stale.
    pub fn stale_after(&self) -> chrono::Duration {
        let secs = self
            .status
            .stale_after_secs
            .unwrap_or(self.status.poll_interval_secs.saturating_mul(3));
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
    }

    /// Minimum spacing between two `players` renders.
    pub fn players_cooldown(&self) -> Duration {
        Duration::from_secs(self.commands.players_cooldown_secs)
    }

    /// How long a restart confirmation is awaited.
    pub fn restart_confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.commands.restart_confirm_timeout_secs)
    }

    /// Reconnect backoff derived from the settings.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_secs(self.reconnect.initial_delay_secs),
            max_delay: Duration::from_secs(self.reconnect.max_delay_secs),
            max_attempts: self.reconnect.max_attempts,
        }
    }

    /// Secret strings that must never appear in user-facing output.
    pub fn secrets(&self) -> Vec<String> {
        [
            &self.credentials.bot_token,
            &self.credentials.server_id,
            &self.credentials.api_key,
        ]
        .into_iter()
        .filter(|value| !value.is_empty())
        .cloned()
        .collect()
    }
}

/// Candidate locations, in lookup order, when no explicit path is given.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("statusbot").join(CONFIG_FILE_NAME));
    }
    candidates
}

/// Pick the configuration file: explicit path, then env var, then candidates.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let candidates = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => vec![PathBuf::from(path)],
            None => candidate_paths(),
        },
    };
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or(ConfigError::NotFound(candidates))
}

/// Write the annotated template to `path`, refusing to overwrite.
pub fn write_template(path: &Path) -> anyhow::Result<()> {
    use anyhow::{bail, Context};

    if path.exists() {
        bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, CONFIG_TEMPLATE).with_context(|| format!("failed to write {}", path.display()))
}
