//! Controller behaviour against fake transports.

mod common;

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use common::{FakeApi, FakeConnector, Harness, snapshot};
use scholarflow_core::{
    ActivityAction, HistoryEntry, KeyValueStore, PersistentStore, Session, SessionStatus,
};
use scholarflow_engine::{EngineConfig, SessionController, reducer::MISSING_REPORT};
use scholarflow_store::{FileStore, MemoryStore};
use scholarflow_transport::{ApiError, Envelope, PushConnector, ResearchApi, TransportEvent};
use serde_json::json;

fn completed_entry(id: &str) -> HistoryEntry {
    HistoryEntry {
        session_id: id.into(),
        original_query: format!("query {id}"),
        status: SessionStatus::Completed,
        report: format!("report {id}"),
        documents: Vec::new(),
        completed_at: 1,
    }
}

#[tokio::test]
async fn stream_session_reaches_history() {
    let mut h = Harness::new();
    let peer = h.start("X", "s1").await;

    let state = h.controller.state();
    assert_eq!(state.session_id(), Some("s1"));
    assert!(state.loading);
    assert_eq!(h.stored_session().unwrap().original_query, "X");

    peer.send(json!({
        "type": "progress", "node": "planner", "status": "researching",
        "plan": ["a", "b"], "current_task_index": 0, "documents": []
    }));
    assert!(h.controller.next_event().await);
    let session = h.controller.state().session.clone().unwrap();
    assert_eq!(session.plan, vec!["a", "b"]);
    assert_eq!(session.status, SessionStatus::Researching);
    assert_eq!(h.stored_session().unwrap().plan, vec!["a", "b"]);

    peer.send(json!({"type": "completed", "report": "R", "documents": []}));
    assert!(h.controller.next_event().await);

    let state = h.controller.state();
    let session = state.session.as_ref().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.report.as_deref(), Some("R"));
    assert!(!state.loading);
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history.get("s1").unwrap().report, "R");
    assert_eq!(h.stored_history_len(), 1);
    assert!(!h.controller.is_streaming());
    assert!(!h.controller.is_polling());
}

#[tokio::test]
async fn malformed_frames_change_nothing() {
    let mut h = Harness::new();
    let peer = h.start("X", "s1").await;
    let before = h.controller.state().clone();

    peer.send_raw("{\"type\": \"progress\", \"plan\": 7}");
    peer.send_raw("<<garbage>>");
    peer.send(json!({"type": "progress", "node": "writer", "status": "writing"}));
    assert!(h.controller.next_event().await);

    let state = h.controller.state();
    assert!(state.error.is_none());
    assert_eq!(state.session.as_ref().unwrap().status, SessionStatus::Writing);
    assert_eq!(state.activity.len(), before.activity.len() + 1);
}

#[tokio::test]
async fn unexpected_close_falls_back_to_polling() {
    let mut h = Harness::new();
    h.api.script(vec![Ok(snapshot("s2", "writing", None))]);
    let peer = h.start("X", "s2").await;

    drop(peer);
    assert!(h.controller.next_event().await);
    assert!(h.controller.state().polling);
    assert!(h.controller.is_polling());
    assert!(!h.controller.is_streaming());

    assert!(h.controller.next_event().await);
    let state = h.controller.state();
    let session = state.session.as_ref().unwrap();
    assert_eq!(session.status, SessionStatus::Writing);
    assert_eq!(session.original_query, "X");
    assert!(state.error.is_none());
    assert_eq!(h.connector.connects(), 1);
}

#[tokio::test]
async fn polling_completion_archives_and_stops() {
    let mut h = Harness::new();
    h.api.script(vec![Ok(snapshot("s2", "completed", Some("final")))]);
    let peer = h.start("X", "s2").await;
    drop(peer);

    h.controller.run_until_idle().await;

    let state = h.controller.state();
    assert_eq!(state.session.as_ref().unwrap().status, SessionStatus::Completed);
    assert!(state.history.contains("s2"));
    assert!(!state.polling);
    assert!(!state.loading);
    assert!(!h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn polling_gives_up_after_three_network_failures() {
    let mut h = Harness::new();
    h.api.script(vec![Err(ApiError::Network("offline".into()))]);
    let peer = h.start("X", "s3").await;
    drop(peer);

    h.controller.run_until_idle().await;

    let state = h.controller.state();
    assert_eq!(h.api.fetches(), 3);
    assert!(state.error.as_deref().unwrap().starts_with("Cannot reach"));
    // Last known state and its snapshot are kept for a later retry.
    assert_eq!(state.session_id(), Some("s3"));
    assert!(h.stored_session().is_some());
    assert!(!state.loading);
    assert!(!h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn two_failures_keep_polling() {
    let mut h = Harness::new();
    h.api.script(vec![
        Err(ApiError::Network("offline".into())),
        Err(ApiError::Network("offline".into())),
        Ok(snapshot("s3", "writing", None)),
    ]);
    let peer = h.start("X", "s3").await;
    drop(peer);

    assert!(h.controller.next_event().await); // stream closed
    assert!(h.controller.next_event().await); // third fetch succeeds
    assert_eq!(h.api.fetches(), 3);
    assert!(h.controller.state().error.is_none());
    assert!(h.controller.is_polling());
}

#[tokio::test]
async fn lost_session_clears_everything_persisted() {
    let mut h = Harness::new();
    h.api.script(vec![Err(ApiError::Status(404))]);
    let peer = h.start("X", "s4").await;
    drop(peer);

    h.controller.run_until_idle().await;

    let state = h.controller.state();
    assert!(state.session.is_none());
    assert!(state.error.is_some());
    assert!(h.stored_session().is_none());
    assert_eq!(state.activity.last().unwrap().action, ActivityAction::Error);
}

#[tokio::test]
async fn clear_session_stops_everything() {
    let mut h = Harness::new();
    h.api.script(vec![Ok(snapshot("s5", "researching", None))]);
    let peer = h.start("X", "s5").await;
    drop(peer);
    assert!(h.controller.next_event().await);
    assert!(h.controller.is_polling());

    h.controller.clear_session();

    let state = h.controller.state();
    assert!(!h.controller.is_polling());
    assert!(!h.controller.is_streaming());
    assert!(state.session.is_none());
    assert!(state.activity.is_empty());
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert!(h.stored_session().is_none());
    assert!(state.history.is_empty());
}

#[tokio::test]
async fn clear_session_archives_completed_session_once() {
    let mut h = Harness::new();
    let peer = h.start("X", "s1").await;
    peer.send(json!({"type": "completed", "report": "R", "documents": []}));
    assert!(h.controller.next_event().await);

    h.controller.clear_session();
    assert_eq!(h.controller.state().history.len(), 1);
    assert!(h.controller.state().session.is_none());

    // A completed session restored from storage is archived on clear.
    let store = Arc::new(MemoryStore::new());
    let mut finished = Session::new("s9", "restored");
    finished.status = SessionStatus::Completed;
    finished.report = Some("done".into());
    PersistentStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>).save_current(&finished);

    let mut h = Harness::with_store(store);
    h.controller.restore();
    assert!(h.controller.state().history.is_empty());
    h.controller.clear_session();
    assert_eq!(h.controller.state().history.len(), 1);
    assert!(h.controller.state().history.contains("s9"));
    assert_eq!(h.stored_history_len(), 1);
}

#[tokio::test]
async fn completion_without_report_is_an_error() {
    let mut h = Harness::new();
    let peer = h.start("X", "s1").await;
    peer.send(json!({"type": "completed", "report": null, "documents": []}));
    assert!(h.controller.next_event().await);

    let state = h.controller.state();
    assert_eq!(state.error.as_deref(), Some(MISSING_REPORT));
    assert!(state.history.is_empty());
    assert!(h.controller.export_markdown().is_none());
}

#[tokio::test]
async fn server_error_keeps_partial_progress() {
    let mut h = Harness::new();
    let peer = h.start("X", "s1").await;
    peer.send(json!({"type": "progress", "node": "planner", "plan": ["a"], "current_task_index": 0}));
    peer.send(json!({"type": "error", "message": "quota exceeded"}));
    assert!(h.controller.next_event().await);
    assert!(h.controller.next_event().await);

    let state = h.controller.state();
    assert_eq!(state.error.as_deref(), Some("quota exceeded"));
    assert_eq!(state.session.as_ref().unwrap().plan, vec!["a"]);
    assert!(!state.loading);
    assert!(!h.controller.is_streaming());
}

#[tokio::test]
async fn refused_connection_surfaces_error() {
    let mut h = Harness::new();
    // Nothing prepared: the connector refuses.
    h.controller.start_research("X");
    assert!(h.controller.next_event().await);

    let state = h.controller.state();
    assert!(state.error.is_some());
    assert!(!state.loading);
    assert!(!h.controller.is_polling());
}

#[tokio::test]
async fn blank_query_is_ignored() {
    let mut h = Harness::new();
    h.controller.start_research("   \n");
    assert!(!h.controller.state().loading);
    assert!(!h.controller.is_streaming());
    assert_eq!(h.connector.connects(), 0);
}

#[tokio::test]
async fn new_research_archives_outgoing_and_resets() {
    let mut h = Harness::new();
    let peer = h.start("first", "s1").await;
    peer.send(json!({"type": "completed", "report": "R1", "documents": []}));
    assert!(h.controller.next_event().await);

    let _peer = h.start("second", "s2").await;
    let state = h.controller.state();
    assert_eq!(state.session_id(), Some("s2"));
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.activity.len(), 1);
    assert_eq!(state.activity.first().unwrap().action, ActivityAction::Started);
}

#[tokio::test]
async fn stale_events_are_dropped() {
    let mut h = Harness::new();
    h.api.script(vec![Ok(snapshot("s1", "writing", None))]);
    let _peer = h.start("X", "s1").await;
    let before = h.controller.state().clone();

    let stale = Envelope {
        epoch: 0,
        event: TransportEvent::PollSnapshot(snapshot("s1", "completed", Some("late"))),
    };
    assert!(!h.controller.handle(stale));
    assert_eq!(h.controller.state(), &before);
}

#[tokio::test]
async fn restore_resumes_by_polling() {
    let store = Arc::new(MemoryStore::new());
    let mut running = Session::new("s7", "X");
    running.status = SessionStatus::Researching;
    PersistentStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>).save_current(&running);

    let mut h = Harness::with_store(store);
    h.api.script(vec![Ok(snapshot("s7", "writing", None))]);
    h.controller.restore();

    let state = h.controller.state();
    assert_eq!(state.activity.first().unwrap().action, ActivityAction::Restoring);
    assert!(state.loading);
    assert!(state.polling);
    assert!(h.controller.is_polling());
    assert_eq!(h.connector.connects(), 0);

    assert!(h.controller.next_event().await);
    assert_eq!(
        h.controller.state().session.as_ref().unwrap().status,
        SessionStatus::Writing
    );

    // Only the first restore counts.
    h.controller.restore();
    assert_eq!(h.controller.state().activity.len(), 2);
}

#[tokio::test]
async fn restore_shows_finished_session_as_is() {
    let store = Arc::new(MemoryStore::new());
    let mut done = Session::new("s8", "X");
    done.status = SessionStatus::Completed;
    done.report = Some("R".into());
    PersistentStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>).save_current(&done);

    let mut h = Harness::with_store(store);
    h.controller.restore();

    let state = h.controller.state();
    assert_eq!(state.session.as_ref(), Some(&done));
    assert!(!state.loading);
    assert!(!h.controller.is_polling());
    assert!(!h.controller.is_streaming());
}

#[tokio::test]
async fn history_is_loaded_bounded_and_replayable() {
    let store = Arc::new(MemoryStore::new());
    let entries: Vec<_> = (0..12).map(|i| completed_entry(&format!("h{i}"))).collect();
    PersistentStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>).save_history(&entries);

    let mut h = Harness::with_store(store);
    assert_eq!(h.controller.state().history.len(), 10);

    assert!(!h.controller.load_session_from_history("nope"));
    assert!(h.controller.load_session_from_history("h3"));

    let state = h.controller.state();
    let session = state.session.as_ref().unwrap();
    assert_eq!(session.report.as_deref(), Some("report h3"));
    assert_eq!(state.activity.len(), 1);
    assert_eq!(
        state.activity.first().unwrap().action,
        ActivityAction::LoadedFromHistory
    );
    assert!(!state.loading);
    assert!(!state.polling);
    assert!(!h.controller.is_streaming());

    let md = h.controller.export_markdown().unwrap();
    assert_eq!(md.file_name, "research-h3.md");
    assert_eq!(&md.bytes[..], b"report h3");
}

#[tokio::test]
async fn clear_history_also_clears_current() {
    let mut h = Harness::new();
    let peer = h.start("X", "s1").await;
    peer.send(json!({"type": "completed", "report": "R", "documents": []}));
    assert!(h.controller.next_event().await);

    h.controller.clear_history();

    let state = h.controller.state();
    assert!(state.history.is_empty());
    assert!(state.session.is_none());
    assert_eq!(h.stored_history_len(), 0);
    assert!(h.stored_session().is_none());
}

#[tokio::test]
async fn pdf_export() {
    let mut h = Harness::new();
    assert!(h.controller.export_pdf().await.unwrap().is_none());

    let peer = h.start("X", "abcdefghijkl").await;
    peer.send(json!({"type": "completed", "report": "R", "documents": []}));
    assert!(h.controller.next_event().await);
    let before = h.controller.state().session.clone();

    assert!(h.controller.export_pdf().await.is_err());
    assert!(h.controller.state().error.as_deref().unwrap().contains("PDF"));
    assert_eq!(h.controller.state().session, before);

    h.api.set_pdf(Ok(Bytes::from_static(b"%PDF-1.7")));
    let pdf = h.controller.export_pdf().await.unwrap().unwrap();
    assert_eq!(pdf.file_name, "research-abcdefgh.pdf");
    assert_eq!(&pdf.bytes[..], b"%PDF-1.7");
}

#[tokio::test]
async fn storage_failures_are_tolerated() {
    let mut h = Harness::with_store(Arc::new(MemoryStore::with_quota(0)));
    let peer = h.start("X", "s1").await;
    peer.send(json!({"type": "completed", "report": "R", "documents": []}));
    assert!(h.controller.next_event().await);

    let state = h.controller.state();
    assert!(state.error.is_none());
    assert!(state.history.contains("s1"));
    assert!(h.stored_session().is_none());
}

#[tokio::test]
async fn subscribers_see_published_state() {
    let mut h = Harness::new();
    let mut rx = h.controller.subscribe();
    let _peer = h.start("X", "s1").await;

    tokio::time::timeout(Duration::from_secs(1), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.borrow().session_id(), Some("s1"));
}

#[tokio::test]
async fn fetch_in_flight_when_cleared_is_dropped() {
    let mut h = Harness::new();
    h.api
        .script(vec![Ok(snapshot("s6", "completed", Some("late report")))]);
    let gate = h.api.hold();
    let peer = h.start("X", "s6").await;
    drop(peer);
    assert!(h.controller.next_event().await);
    assert!(h.controller.is_polling());

    while h.api.fetches() == 0 {
        tokio::task::yield_now().await;
    }
    h.controller.clear_session();
    gate.notify_one();

    // The fetch completes after the clear; its snapshot must not apply.
    assert!(!h.controller.next_event().await);
    let state = h.controller.state();
    assert!(state.session.is_none());
    assert!(state.history.is_empty());
    assert!(state.activity.is_empty());
    assert!(h.stored_session().is_none());
    assert_eq!(h.stored_history_len(), 0);
}

fn file_backed(store: Arc<FileStore>) -> SessionController {
    SessionController::new(
        EngineConfig::default(),
        store as Arc<dyn KeyValueStore>,
        Arc::new(FakeApi::default()) as Arc<dyn ResearchApi>,
        Arc::new(FakeConnector::default()) as Arc<dyn PushConnector>,
    )
}

#[test]
fn shutdown_makes_a_clear_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    };

    // A run that was interrupted mid-research.
    runtime().block_on(async {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let mut running = Session::new("s10", "X");
        running.status = SessionStatus::Researching;
        PersistentStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>).save_current(&running);
        store.flush().await;
    });

    // Next launch resumes it, the user clears it and quits.
    runtime().block_on(async {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let mut controller = file_backed(store);
        controller.restore();
        assert_eq!(controller.state().session_id(), Some("s10"));
        assert!(controller.is_polling());

        controller.clear_session();
        controller.shutdown().await;
        assert!(!controller.is_polling());
    });

    // The launch after that has nothing to restore.
    runtime().block_on(async {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let persisted = PersistentStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        assert!(persisted.load_current().is_none());

        let mut controller = file_backed(store);
        controller.restore();
        assert!(controller.state().session.is_none());
        assert!(!controller.is_polling());
    });
}
