//! Mapping of server occupancy onto the bot's availability indicator.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{error::PresenceError, models::ServerOccupancy};

/// Three-valued availability shown next to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceState {
    /// Nobody is playing, or the last poll failed.
    Idle,
    /// Every slot is taken.
    Busy,
    /// Players are connected and slots remain.
    Online,
}

impl PresenceState {
    /// State for an occupancy. Zero players wins over a full server so `0/0`
    /// reads as idle.
    pub fn for_occupancy(occupancy: &ServerOccupancy) -> Self {
        if occupancy.current_players == 0 {
            PresenceState::Idle
        } else if occupancy.is_full() {
            PresenceState::Busy
        } else {
            PresenceState::Online
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceState::Idle => write!(f, "idle"),
            PresenceState::Busy => write!(f, "busy"),
            PresenceState::Online => write!(f, "online"),
        }
    }
}

/// State plus the status line displayed with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    /// Availability indicator.
    pub state: PresenceState,
    /// Human readable status line.
    pub text: String,
}

/// Derive the presence for a poll outcome.
///
/// An error label always wins: the state is forced to idle and the label
/// replaces the player count text.
pub fn reconcile(occupancy: Option<&ServerOccupancy>, error_label: Option<&str>) -> Presence {
    match (occupancy, error_label) {
        (_, Some(label)) => Presence {
            state: PresenceState::Idle,
            text: label.to_string(),
        },
        (Some(occupancy), None) => Presence {
            state: PresenceState::for_occupancy(occupancy),
            text: format!("{occupancy} players online"),
        },
        (None, None) => Presence {
            state: PresenceState::Idle,
            text: "No server data".to_string(),
        },
    }
}

/// Destination for presence updates (the live chat session).
pub trait PresenceSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Apply the presence. Must not block for long.
    fn push(&self, presence: &Presence) -> Result<(), PresenceError>;
}

/// Slot holding the sink of the current session.
///
/// Sessions come and go across reconnects while the poller keeps running; the
/// hub lets each new session replace the previous sink without touching the
/// polling loop.
#[derive(Clone, Default)]
pub struct PresenceHub {
    inner: Arc<RwLock<HubInner>>,
}

#[derive(Default)]
struct HubInner {
    sink: Option<Arc<dyn PresenceSink>>,
    last: Option<Presence>,
}

impl PresenceHub {
    /// Hub with no session attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the sink of a (re)connected session and replay the last presence.
    pub fn attach(&self, sink: Arc<dyn PresenceSink>) {
        let last = {
            let mut inner = self.inner.write();
            inner.sink = Some(sink.clone());
            inner.last.clone()
        };
        debug!("presence sink {} attached", sink.name());
        if let Some(presence) = last {
            if let Err(err) = sink.push(&presence) {
                warn!("failed to replay presence on {}: {err}", sink.name());
            }
        }
    }

    /// Drop the current sink, e.g. when the session is lost.
    pub fn detach(&self) {
        self.inner.write().sink = None;
    }

    /// Push to the attached sink, remembering the value for later replays.
    pub fn push(&self, presence: &Presence) -> Result<(), PresenceError> {
        let sink = {
            let mut inner = self.inner.write();
            inner.last = Some(presence.clone());
            inner.sink.clone()
        };
        match sink {
            Some(sink) => sink.push(presence),
            None => {
                debug!("no session attached, presence {:?} deferred", presence.text);
                Ok(())
            }
        }
    }

    /// Most recent presence pushed through the hub.
    pub fn last(&self) -> Option<Presence> {
        self.inner.read().last.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Sink recording every presence it receives.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) seen: Mutex<Vec<Presence>>,
    }

    impl PresenceSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn push(&self, presence: &Presence) -> Result<(), PresenceError> {
            self.seen.lock().push(presence.clone());
            Ok(())
        }
    }

    fn occupancy(current_players: u32, max_slots: u32) -> ServerOccupancy {
        ServerOccupancy {
            index: 0,
            current_players,
            max_slots,
        }
    }

    #[test]
    fn reconcile_is_total_over_small_grid() {
        for slots in 0..=6 {
            for players in 0..=8 {
                let presence = reconcile(Some(&occupancy(players, slots)), None);
                let expected = if players == 0 {
                    PresenceState::Idle
                } else if players == slots {
                    PresenceState::Busy
                } else {
                    PresenceState::Online
                };
                assert_eq!(presence.state, expected, "{players}/{slots}");
            }
        }
    }

    #[test]
    fn zero_players_is_idle_even_when_full() {
        let presence = reconcile(Some(&occupancy(0, 0)), None);
        assert_eq!(presence.state, PresenceState::Idle);
        assert_eq!(presence.text, "0/0 players online");
    }

    #[test]
    fn full_server_is_busy() {
        let presence = reconcile(Some(&occupancy(20, 20)), None);
        assert_eq!(presence.state, PresenceState::Busy);
    }

    #[test]
    fn error_label_overrides_counts() {
        let presence = reconcile(Some(&occupancy(5, 20)), Some("Error: timeout"));
        assert_eq!(presence.state, PresenceState::Idle);
        assert_eq!(presence.text, "Error: timeout");
    }

    #[test]
    fn hub_replays_last_presence_on_attach() {
        let hub = PresenceHub::new();
        let presence = reconcile(Some(&occupancy(5, 20)), None);
        hub.push(&presence).unwrap();

        let sink = Arc::new(RecordingSink::default());
        hub.attach(sink.clone());
        assert_eq!(sink.seen.lock().as_slice(), &[presence.clone()]);

        let next = reconcile(Some(&occupancy(6, 20)), None);
        hub.push(&next).unwrap();
        assert_eq!(sink.seen.lock().len(), 2);
        assert_eq!(hub.last(), Some(next));
    }

    #[test]
    fn hub_switches_to_latest_session() {
        let hub = PresenceHub::new();
        let old = Arc::new(RecordingSink::default());
        let new = Arc::new(RecordingSink::default());
        hub.attach(old.clone());
        hub.attach(new.clone());

        hub.push(&reconcile(Some(&occupancy(1, 2)), None)).unwrap();
        assert!(old.seen.lock().is_empty());
        assert_eq!(new.seen.lock().len(), 1);

        hub.detach();
        hub.push(&reconcile(Some(&occupancy(2, 2)), None)).unwrap();
        assert_eq!(new.seen.lock().len(), 1);
    }
}
