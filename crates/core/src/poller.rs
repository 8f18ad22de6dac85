//! The status polling loop and its single-instance handle.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    cache::CacheStore,
    config::AppConfig,
    error::{PollerError, StatusError},
    models::StatusSnapshot,
    presence::{reconcile, Presence, PresenceHub},
    status::{parse_status_body, StatusSource},
};

/// Knobs the poller needs from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Sleep between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Listing position of the server to reflect.
    pub server_index: usize,
    /// Whether presence updates are pushed at all.
    pub presence_enabled: bool,
}

impl From<&AppConfig> for PollSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            server_index: config.status.server_index,
            presence_enabled: config.status.enabled,
        }
    }
}

/// Result of one fetch-parse-persist-reconcile step.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Fresh data was parsed (and persisted unless the store failed).
    Updated {
        /// The new snapshot.
        snapshot: StatusSnapshot,
        /// Presence derived from it.
        presence: Presence,
    },
    /// The poll failed; the cache was left untouched.
    Failed {
        /// What went wrong.
        error: StatusError,
        /// Fallback presence.
        presence: Presence,
    },
}

impl CycleOutcome {
    /// Presence computed for this cycle.
    pub fn presence(&self) -> &Presence {
        match self {
            CycleOutcome::Updated { presence, .. } | CycleOutcome::Failed { presence, .. } => {
                presence
            }
        }
    }
}

/// Sole writer of the current snapshot.
pub struct Poller<S> {
    source: S,
    store: Arc<dyn CacheStore>,
    presence: PresenceHub,
    settings: PollSettings,
}

impl<S: StatusSource> Poller<S> {
    /// Assemble a poller from its collaborators.
    pub fn new(
        source: S,
        store: Arc<dyn CacheStore>,
        presence: PresenceHub,
        settings: PollSettings,
    ) -> Self {
        Self {
            source,
            store,
            presence,
            settings,
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Run one cycle. Never fails: every error becomes a fallback presence.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let fetched_at = Utc::now();
        let parsed = match self.source.fetch().await {
            Ok(body) => parse_status_body(&body, self.settings.server_index, fetched_at),
            Err(err) => Err(err),
        };

        match parsed {
            Ok(snapshot) => {
                self.persist(&snapshot).await;
                let presence = reconcile(snapshot.server(self.settings.server_index), None);
                info!("Player count: {}", presence.text);
                if self.settings.presence_enabled {
                    self.publish(&presence);
                } else {
                    debug!("presence updates disabled, skipping {:?}", presence.text);
                }
                CycleOutcome::Updated { snapshot, presence }
            }
            Err(err) => {
                match &err {
                    StatusError::Upstream(_) => error!("status API rejected the request: {err}"),
                    _ => warn!("status poll failed: {err}"),
                }
                let label = err.presence_label();
                let presence = reconcile(None, Some(&label));
                self.publish(&presence);
                CycleOutcome::Failed {
                    error: err,
                    presence,
                }
            }
        }
    }

    /// Poll forever, one cycle at a time.
    pub async fn run_forever(&self) {
        info!(
            "polling server {} every {:?}",
            self.settings.server_index, self.settings.interval
        );
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// Write the snapshot off the async workers; file stores block on fsync.
    async fn persist(&self, snapshot: &StatusSnapshot) {
        let store = Arc::clone(&self.store);
        let snapshot = snapshot.clone();
        match tokio::task::spawn_blocking(move || store.put(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("failed to persist status snapshot: {err}"),
            Err(err) => error!("snapshot persist task failed: {err}"),
        }
    }

    fn publish(&self, presence: &Presence) {
        if let Err(err) = self.presence.push(presence) {
            warn!("{err}");
        }
    }
}

/// Owner of the one polling task.
///
/// At most one loop is active at any time; starting while a loop runs is
/// rejected, and session resumes use [`PollerHandle::ensure_running`].
pub struct PollerHandle<S> {
    poller: Arc<Poller<S>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S> PollerHandle<S>
where
    S: StatusSource + 'static,
{
    /// Wrap a poller; nothing runs until [`start`](Self::start).
    pub fn new(poller: Poller<S>) -> Self {
        Self {
            poller: Arc::new(poller),
            task: Mutex::new(None),
        }
    }

    /// Spawn the polling loop on the current runtime.
    pub fn start(&self) -> Result<(), PollerError> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(PollerError::AlreadyRunning);
        }
        let poller = Arc::clone(&self.poller);
        *task = Some(tokio::spawn(async move { poller.run_forever().await }));
        info!("status poller started");
        Ok(())
    }

    /// Start unless a loop is already active. Returns whether one was started.
    pub fn ensure_running(&self) -> bool {
        match self.start() {
            Ok(()) => true,
            Err(PollerError::AlreadyRunning) => {
                debug!("status poller already running");
                false
            }
        }
    }

    /// Abort the active loop, if any. Returns whether one was running.
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                info!("status poller stopped");
                was_running
            }
            None => false,
        }
    }

    /// Whether a loop is currently active.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// The wrapped poller, e.g. for an on-demand cycle.
    pub fn poller(&self) -> &Arc<Poller<S>> {
        &self.poller
    }
}

impl<S> Drop for PollerHandle<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MemoryCacheStore,
        error::StoreError,
        presence::{tests::RecordingSink, PresenceState},
    };
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Source replaying scripted bodies, then repeating the last one.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<String, StatusError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<&str, StatusError>>) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|entry| entry.map(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl StatusSource for ScriptedSource {
        async fn fetch(&self) -> Result<String, StatusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            match script.pop_front() {
                Some(entry) => entry,
                None => Err(StatusError::Transport("script exhausted".into())),
            }
        }
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn put(&self, _snapshot: &StatusSnapshot) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("disk full".into()))
        }

        fn latest(&self) -> Result<StatusSnapshot, StoreError> {
            Err(StoreError::NotFound)
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(3600),
            server_index: 0,
            presence_enabled: true,
        }
    }

    fn harness(
        script: Vec<Result<&str, StatusError>>,
        settings: PollSettings,
    ) -> (Poller<ScriptedSource>, Arc<MemoryCacheStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryCacheStore::new());
        let sink = Arc::new(RecordingSink::default());
        let hub = PresenceHub::new();
        hub.attach(sink.clone());
        let poller = Poller::new(ScriptedSource::new(script), store.clone(), hub, settings);
        (poller, store, sink)
    }

    const FIVE_OF_TWENTY: &str = r#"{"Success": true, "Servers":[{"Players":"5/20"}]}"#;

    #[tokio::test]
    async fn occupied_server_is_online() {
        let (poller, store, sink) = harness(vec![Ok(FIVE_OF_TWENTY)], settings());
        let outcome = poller.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Updated { .. }));
        let cached = store.latest().unwrap();
        assert_eq!(cached.server(0).unwrap().to_string(), "5/20");
        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].state, PresenceState::Online);
        assert_eq!(seen[0].text, "5/20 players online");
    }

    #[tokio::test]
    async fn empty_server_is_idle() {
        let body = r#"{"Success": true, "Servers":[{"Players":"0/20"}]}"#;
        let (poller, _store, _sink) = harness(vec![Ok(body)], settings());
        let outcome = poller.run_cycle().await;
        assert_eq!(outcome.presence().state, PresenceState::Idle);
        assert_eq!(outcome.presence().text, "0/20 players online");
    }

    #[tokio::test]
    async fn malformed_body_keeps_previous_cache() {
        let (poller, store, sink) = harness(vec![Ok(FIVE_OF_TWENTY), Ok("not json")], settings());
        poller.run_cycle().await;
        let before = store.latest().unwrap();

        let outcome = poller.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: StatusError::Parse(_),
                ..
            }
        ));
        assert_eq!(store.latest().unwrap(), before);
        let seen = sink.seen.lock();
        assert_eq!(seen[1].state, PresenceState::Idle);
        assert!(seen[1].text.starts_with("Error:"));
    }

    #[tokio::test]
    async fn upstream_error_text_is_surfaced() {
        let body = r#"{"Success": false, "Error": "bad key"}"#;
        let (poller, store, _sink) = harness(vec![Ok(body)], settings());
        let outcome = poller.run_cycle().await;
        assert_eq!(outcome.presence().state, PresenceState::Idle);
        assert!(outcome.presence().text.contains("bad key"));
        assert!(matches!(store.latest(), Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn transport_failure_is_not_fatal() {
        let (poller, _store, sink) = harness(
            vec![
                Err(StatusError::Transport("connection refused".into())),
                Ok(FIVE_OF_TWENTY),
            ],
            settings(),
        );
        assert!(matches!(poller.run_cycle().await, CycleOutcome::Failed { .. }));
        assert!(matches!(poller.run_cycle().await, CycleOutcome::Updated { .. }));
        let seen = sink.seen.lock();
        assert_eq!(seen[0].state, PresenceState::Idle);
        assert_eq!(seen[1].state, PresenceState::Online);
    }

    #[tokio::test]
    async fn out_of_range_index_falls_back_to_idle() {
        let (poller, store, _sink) = harness(
            vec![Ok(FIVE_OF_TWENTY)],
            PollSettings {
                server_index: 4,
                ..settings()
            },
        );
        let outcome = poller.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                error: StatusError::ServerIndex { index: 4, .. },
                ..
            }
        ));
        assert!(store.latest().is_err());
    }

    #[tokio::test]
    async fn store_failure_still_updates_presence() {
        let sink = Arc::new(RecordingSink::default());
        let hub = PresenceHub::new();
        hub.attach(sink.clone());
        let poller = Poller::new(
            ScriptedSource::new(vec![Ok(FIVE_OF_TWENTY)]),
            Arc::new(BrokenStore),
            hub,
            settings(),
        );
        poller.run_cycle().await;
        assert_eq!(sink.seen.lock()[0].state, PresenceState::Online);
    }

    #[tokio::test]
    async fn disabled_presence_still_caches() {
        let (poller, store, sink) = harness(
            vec![Ok(FIVE_OF_TWENTY)],
            PollSettings {
                presence_enabled: false,
                ..settings()
            },
        );
        poller.run_cycle().await;
        assert!(store.latest().is_ok());
        assert!(sink.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn disabled_presence_still_reports_failures() {
        let (poller, store, sink) = harness(
            vec![Err(StatusError::Transport("down".into()))],
            PollSettings {
                presence_enabled: false,
                ..settings()
            },
        );
        let outcome = poller.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert!(matches!(store.latest(), Err(StoreError::NotFound)));

        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].state, PresenceState::Idle);
        assert!(seen[0].text.starts_with("Error:"));
    }

    #[tokio::test]
    async fn handle_rejects_second_loop() {
        let (poller, _store, _sink) = harness(vec![Ok(FIVE_OF_TWENTY)], settings());
        let handle = PollerHandle::new(poller);

        assert_eq!(handle.start(), Ok(()));
        assert_eq!(handle.start(), Err(PollerError::AlreadyRunning));
        assert!(!handle.ensure_running());
        assert!(handle.is_running());

        for _ in 0..10 {
            if handle.poller().source.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        // One loop, one fetch; the next cycle waits out the hour-long interval.
        assert_eq!(handle.poller().source.calls.load(Ordering::SeqCst), 1);

        assert!(handle.stop());
        assert!(!handle.is_running());
        assert!(handle.ensure_running());
        assert!(handle.stop());
    }
}
