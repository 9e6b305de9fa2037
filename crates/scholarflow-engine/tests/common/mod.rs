//! Fakes shared by the controller tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt, channel::mpsc};
use scholarflow_core::{KeyValueStore, Session, SessionStatus};
use scholarflow_engine::{EngineConfig, SessionController};
use scholarflow_store::MemoryStore;
use scholarflow_transport::{
    ApiError, FrameSink, FrameStream, HealthStatus, PushConnector, ResearchApi, SessionSnapshot,
    TransportError,
};
use serde_json::Value;
use tokio::sync::Notify;

/// Server side of one fake push channel.
pub struct Peer {
    to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    pub fn send(&self, frame: Value) {
        self.to_client.unbounded_send(Ok(frame.to_string())).unwrap();
    }

    pub fn send_raw(&self, frame: &str) {
        self.to_client.unbounded_send(Ok(frame.to_string())).unwrap();
    }

    pub async fn received(&mut self) -> Value {
        let text = self.from_client.next().await.unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

/// Hands out pre-made channels, one per connect.
#[derive(Default)]
pub struct FakeConnector {
    pending: Mutex<VecDeque<(FrameSink, FrameStream)>>,
    connects: Mutex<u32>,
}

impl FakeConnector {
    /// Prepare the next connection and return its server side.
    pub fn prepare(&self) -> Peer {
        let (to_client, client_rx) = mpsc::unbounded();
        let (client_tx, from_client) = mpsc::unbounded::<String>();
        let sink: FrameSink =
            Box::pin(client_tx.sink_map_err(|e| TransportError::WebSocket(e.to_string())));
        self.pending
            .lock()
            .unwrap()
            .push_back((sink, client_rx.boxed()));
        Peer {
            to_client,
            from_client,
        }
    }

    pub fn connects(&self) -> u32 {
        *self.connects.lock().unwrap()
    }
}

#[async_trait]
impl PushConnector for FakeConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), TransportError> {
        *self.connects.lock().unwrap() += 1;
        self.pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Connect("connection refused".into()))
    }
}

/// Scripted pull endpoint; the last response repeats forever.
pub struct FakeApi {
    sessions: Mutex<VecDeque<Result<SessionSnapshot, ApiError>>>,
    pdf: Mutex<Result<Bytes, ApiError>>,
    fetches: Mutex<u32>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::from([Err(ApiError::Status(404))])),
            pdf: Mutex::new(Err(ApiError::Status(500))),
            fetches: Mutex::new(0),
            gate: Mutex::new(None),
        }
    }
}

impl FakeApi {
    pub fn script(&self, responses: Vec<Result<SessionSnapshot, ApiError>>) {
        *self.sessions.lock().unwrap() = responses.into();
    }

    pub fn set_pdf(&self, result: Result<Bytes, ApiError>) {
        *self.pdf.lock().unwrap() = result;
    }

    pub fn fetches(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }

    /// Hold every session fetch until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl ResearchApi for FakeApi {
    async fn fetch_session(&self, _session_id: &str) -> Result<SessionSnapshot, ApiError> {
        *self.fetches.lock().unwrap() += 1;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.len() > 1 {
            sessions.pop_front().unwrap()
        } else {
            sessions.front().cloned().unwrap()
        }
    }

    async fn fetch_pdf(&self, _session_id: &str) -> Result<Bytes, ApiError> {
        self.pdf.lock().unwrap().clone()
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        Ok(HealthStatus {
            status: "healthy".into(),
            api_configured: true,
        })
    }
}

pub struct Harness {
    pub controller: SessionController,
    pub connector: Arc<FakeConnector>,
    pub api: Arc<FakeApi>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let connector = Arc::new(FakeConnector::default());
        let api = Arc::new(FakeApi::default());
        let controller = SessionController::new(
            EngineConfig::default(),
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::clone(&api) as Arc<dyn ResearchApi>,
            Arc::clone(&connector) as Arc<dyn PushConnector>,
        );
        Self {
            controller,
            connector,
            api,
            store,
        }
    }

    /// Start research and drive it until the server assigned `session_id`.
    pub async fn start(&mut self, query: &str, session_id: &str) -> Peer {
        let mut peer = self.connector.prepare();
        self.controller.start_research(query);
        assert!(self.controller.next_event().await, "stream should open");
        let start = peer.received().await;
        assert_eq!(start["action"], "start");
        assert_eq!(start["query"], query);

        peer.send(serde_json::json!({"type": "started", "session_id": session_id}));
        assert!(self.controller.next_event().await);
        peer
    }

    /// Stored current session, read straight from the backend.
    pub fn stored_session(&self) -> Option<Session> {
        self.store
            .get(scholarflow_core::store::CURRENT_SESSION_KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    pub fn stored_history_len(&self) -> usize {
        self.store
            .get(scholarflow_core::store::HISTORY_KEY)
            .unwrap()
            .map_or(0, |raw| {
                serde_json::from_str::<Vec<Value>>(&raw).unwrap().len()
            })
    }
}

pub fn snapshot(session_id: &str, status: &str, report: Option<&str>) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session_id.into(),
        status: SessionStatus::from(status),
        report: report.map(Into::into),
        plan: vec!["a".into(), "b".into()],
        current_task_index: 1,
        documents: Vec::new(),
        original_query: Some("X".into()),
        logs: Vec::new(),
        error: None,
    }
}
