//! Session controller: the single owner of the tracked session.
//!
//! All mutation happens on `&mut self`, one event at a time. Transport
//! adapters run as background tasks and only ever talk to the controller
//! through its event channel.

use std::{mem, sync::Arc};

use scholarflow_core::{
    ActivityAction, ActivityEntry, History, KeyValueStore, PersistentStore, now_millis,
};
use scholarflow_store::{FileStore, NoopStore};
use scholarflow_transport::{
    ClientMessage, Envelope, Epoch, EventSender, HttpApi, PollAdapter, PushConnector,
    ResearchApi, StreamAdapter, WebSocketConnector,
};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;

use crate::{
    config::EngineConfig,
    error::EngineError,
    export::ExportArtifact,
    reducer::{self, Effect, ReduceContext, Transition},
    state::EngineState,
};

/// Session synchronization engine.
pub struct SessionController {
    config: EngineConfig,
    store: PersistentStore,
    api: Arc<dyn ResearchApi>,
    connector: Arc<dyn PushConnector>,

    state: EngineState,
    publisher: watch::Sender<EngineState>,

    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    epoch: Epoch,
    stream: Option<StreamAdapter>,
    poll: Option<PollAdapter>,
    restored: bool,
}

impl SessionController {
    /// Create a controller. History is loaded from `store` right away; call
    /// [`restore`](Self::restore) once to pick up an interrupted session.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn ResearchApi>,
        connector: Arc<dyn PushConnector>,
    ) -> Self {
        let store = PersistentStore::new(store);
        let history = History::from_entries(store.load_history(), config.history_limit);
        let state = EngineState::new(config.activity_limit, history);
        let (publisher, _) = watch::channel(state.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            store,
            api,
            connector,
            state,
            publisher,
            events_tx,
            events_rx,
            epoch: 0,
            stream: None,
            poll: None,
            restored: false,
        }
    }

    /// Create a controller talking to a real server over WebSocket and
    /// HTTP, persisting to `FileStore::default_dir()`.
    ///
    /// Falls back to in-memory operation if the data directory is unusable.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns error if `config.server_url` is not a valid http(s) URL.
    pub fn connect(config: EngineConfig) -> Result<Self, EngineError> {
        let api = Arc::new(HttpApi::new(&config.server_url)?);
        let connector = Arc::new(WebSocketConnector::new(config.stream_url.clone()));
        let store: Arc<dyn KeyValueStore> = match FileStore::default_dir().map(FileStore::open) {
            Some(Ok(store)) => Arc::new(store),
            Some(Err(e)) => {
                tracing::warn!("Persistent storage unavailable, running in memory: {e}");
                Arc::new(NoopStore)
            }
            None => {
                tracing::warn!("No data directory, running in memory");
                Arc::new(NoopStore)
            }
        };
        Ok(Self::new(config, store, api, connector))
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Receiver that sees every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.publisher.subscribe()
    }

    /// Published states as a stream.
    #[must_use]
    pub fn state_stream(&self) -> WatchStream<EngineState> {
        WatchStream::new(self.subscribe())
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamAdapter::is_active)
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(PollAdapter::is_active)
    }

    /// Pick up where a previous run left off. Only the first call does
    /// anything.
    ///
    /// A stored session that is still running is resumed by polling; the
    /// push channel is never reopened. A finished one is shown as-is.
    pub fn restore(&mut self) {
        if mem::replace(&mut self.restored, true) {
            return;
        }
        let Some(session) = self.store.load_current() else {
            return;
        };

        if session.status.is_terminal() {
            tracing::info!(session_id = %session.session_id, "Showing stored session");
        } else {
            tracing::info!(session_id = %session.session_id, "Resuming stored session by polling");
            self.state.activity.push(
                ActivityEntry::new(
                    ActivityAction::Restoring,
                    "Restoring previous session",
                    now_millis(),
                )
                .with_detail(session.session_id.clone()),
            );
            self.state.loading = true;
            self.state.polling = true;
            self.start_polling(session.session_id.clone());
        }
        self.state.session = Some(session);
        self.publish();
    }

    /// Start a new research session for `query`.
    ///
    /// Blank queries are ignored. Progress is observed through
    /// [`state`](Self::state) as events are processed.
    pub fn start_research(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            tracing::debug!("Ignoring blank research query");
            return;
        }

        self.archive_outgoing();
        self.stop_transports();
        self.store.clear_current();
        self.state.session = None;
        self.state.activity.clear();
        self.state.error = None;
        self.state.polling = false;
        self.state.loading = true;
        self.state.pending_query = Some(query.to_owned());

        tracing::info!(query, "Starting research");
        self.epoch += 1;
        self.stream = Some(StreamAdapter::open(
            Arc::clone(&self.connector),
            EventSender::new(self.epoch, self.events_tx.clone()),
        ));
        self.publish();
    }

    /// Abandon the current session. A completed one is archived first.
    pub fn clear_session(&mut self) {
        self.archive_outgoing();
        self.reset_current();
        self.publish();
    }

    /// Show a history entry as the current session (read-only replay).
    ///
    /// Returns `false` if no entry has this id.
    pub fn load_session_from_history(&mut self, session_id: &str) -> bool {
        let Some(entry) = self.state.history.get(session_id) else {
            return false;
        };
        let session = entry.to_session();

        self.stop_transports();
        self.state.activity.reset_to(
            ActivityEntry::new(
                ActivityAction::LoadedFromHistory,
                "Loaded from history",
                now_millis(),
            )
            .with_detail(session.original_query.clone()),
        );
        self.store.save_current(&session);
        self.state.session = Some(session);
        self.state.error = None;
        self.state.loading = false;
        self.state.polling = false;
        self.state.pending_query = None;
        self.publish();
        true
    }

    /// Forget all history. This also abandons the current session.
    pub fn clear_history(&mut self) {
        self.state.history.clear();
        self.store.save_history(&[]);
        self.reset_current();
        self.publish();
    }

    /// The current report as a Markdown file, if there is one.
    #[must_use]
    pub fn export_markdown(&self) -> Option<ExportArtifact> {
        let session = self.state.session.as_ref()?;
        let report = session.report()?;
        Some(ExportArtifact::markdown(&session.session_id, report))
    }

    /// Ask the server to render the current session as a PDF.
    ///
    /// Returns `Ok(None)` if there is no session. Failures are also shown
    /// through the state's error message; the session itself is untouched.
    ///
    /// # Errors
    /// Returns error if the server does not deliver the PDF.
    pub async fn export_pdf(&mut self) -> Result<Option<ExportArtifact>, EngineError> {
        let Some(session_id) = self.state.session_id().map(str::to_owned) else {
            return Ok(None);
        };

        match self.api.fetch_pdf(&session_id).await {
            Ok(bytes) => Ok(Some(ExportArtifact::pdf(&session_id, bytes))),
            Err(e) => {
                tracing::error!(%session_id, "PDF export failed: {e}");
                let err = EngineError::Export(e);
                self.state.error = Some(err.to_string());
                self.publish();
                Err(err)
            }
        }
    }

    /// Stop both transports and wait for pending storage writes.
    ///
    /// Call before the runtime goes away; writes still queued at that point
    /// are lost.
    pub async fn shutdown(&mut self) {
        self.stop_transports();
        self.store.flush().await;
        tracing::debug!("Session controller shut down");
    }

    /// Wait for the next transport event and apply it.
    ///
    /// Returns `false` if the event belonged to a superseded activation and
    /// was dropped. Waits forever if no transport is running.
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(envelope) => self.handle(envelope),
            None => false,
        }
    }

    /// Process events until neither transport is running and nothing is
    /// queued.
    pub async fn run_until_idle(&mut self) {
        loop {
            // Sample before draining: a finished task has already sent
            // everything it will ever send.
            let idle = !self.is_streaming() && !self.is_polling();
            let mut drained = false;
            while let Ok(envelope) = self.events_rx.try_recv() {
                self.handle(envelope);
                drained = true;
            }
            if drained {
                continue;
            }
            if idle {
                return;
            }
            self.next_event().await;
        }
    }

    /// Apply one event, unless it is stale.
    pub fn handle(&mut self, envelope: Envelope) -> bool {
        if envelope.epoch != self.epoch {
            tracing::debug!(
                epoch = envelope.epoch,
                current = self.epoch,
                "Dropping event from superseded transport"
            );
            return false;
        }

        let cx = ReduceContext {
            now: now_millis(),
            preview_len: self.config.preview_len,
        };
        let Transition { state, effects } =
            reducer::reduce(mem::take(&mut self.state), envelope.event, &cx);
        self.state = state;

        for effect in effects {
            self.apply(effect);
        }
        self.publish();
        true
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SendStart { query } => {
                let sent = self
                    .stream
                    .as_ref()
                    .map(|s| s.send(ClientMessage::start(query)));
                if let Some(Err(e)) = sent {
                    tracing::warn!("Failed to send start command: {e}");
                }
            }
            Effect::PersistSession => {
                if let Some(session) = &self.state.session {
                    self.store.save_current(session);
                }
            }
            Effect::ClearPersistedSession => self.store.clear_current(),
            Effect::PersistHistory => self.store.save_history(&self.state.history.to_vec()),
            Effect::CloseStream => {
                if let Some(mut stream) = self.stream.take() {
                    stream.close();
                    self.epoch += 1;
                }
            }
            Effect::StopPolling => {
                if let Some(poll) = self.poll.take() {
                    poll.stop();
                    self.epoch += 1;
                }
            }
            Effect::StartPolling { session_id } => {
                if let Some(mut stream) = self.stream.take() {
                    stream.close();
                }
                self.start_polling(session_id);
            }
        }
    }

    fn start_polling(&mut self, session_id: String) {
        if let Some(poll) = self.poll.take() {
            poll.stop();
        }
        self.epoch += 1;
        self.poll = Some(PollAdapter::start(
            Arc::clone(&self.api),
            session_id,
            self.config.poll_settings(),
            EventSender::new(self.epoch, self.events_tx.clone()),
        ));
    }

    /// Stop both adapters, whichever is believed active.
    fn stop_transports(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        if let Some(poll) = self.poll.take() {
            poll.stop();
        }
        self.epoch += 1;
    }

    fn archive_outgoing(&mut self) {
        if reducer::archive_current(&mut self.state, now_millis()) {
            self.store.save_history(&self.state.history.to_vec());
        }
    }

    fn reset_current(&mut self) {
        self.stop_transports();
        self.store.clear_current();
        self.state.session = None;
        self.state.activity.clear();
        self.state.error = None;
        self.state.loading = false;
        self.state.polling = false;
        self.state.pending_query = None;
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }
}
