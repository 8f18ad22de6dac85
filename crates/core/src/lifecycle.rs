//! Process exit reasons and their exit codes.

use std::fmt;

/// Why the bot process is ending on purpose.
///
/// A process supervisor is expected to relaunch on `RestartRequested` and
/// to alert on the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// An authorized user confirmed the restart command.
    RestartRequested,
    /// The gateway could not be reached within the reconnect budget.
    ReconnectExhausted,
    /// Configuration missing or invalid at startup.
    ConfigError,
}

impl Lifecycle {
    /// Exit code reported to the process supervisor (sysexits values).
    pub fn exit_code(self) -> i32 {
        match self {
            Lifecycle::RestartRequested => 75,
            Lifecycle::ReconnectExhausted => 69,
            Lifecycle::ConfigError => 78,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Lifecycle::RestartRequested => "restart requested",
            Lifecycle::ReconnectExhausted => "reconnect attempts exhausted",
            Lifecycle::ConfigError => "configuration error",
        };
        f.write_str(reason)
    }
}
