//! Pure state transitions for inbound transport events.
//!
//! `reduce` never performs I/O. Everything with a side effect (persisting,
//! opening or closing transports) is returned as an [`Effect`] for the
//! controller to carry out.

use scholarflow_core::{
    ActivityAction, ActivityEntry, HistoryEntry, Session, SessionId, SessionStatus,
};
use scholarflow_transport::{PollFailure, ServerMessage, SessionSnapshot, TransportEvent};

use crate::state::EngineState;

/// Shown when a session completes without a report.
pub const MISSING_REPORT: &str = "Research finished without a report";

/// Shown when the push channel drops before the server assigned an id.
pub const LOST_BEFORE_START: &str = "Connection lost before the research session started";

/// Shown when the server finishes a session it never announced.
pub const FINISHED_BEFORE_START: &str = "Research finished before the session started";

/// A side effect requested by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Transmit the start command on the push channel.
    SendStart { query: String },
    /// Write the current session to the persistent store.
    PersistSession,
    /// Remove the current session from the persistent store.
    ClearPersistedSession,
    /// Write the history list to the persistent store.
    PersistHistory,
    CloseStream,
    StopPolling,
    /// Fall back to polling this session.
    StartPolling { session_id: SessionId },
}

/// Inputs to the reducer that are not part of the state.
#[derive(Debug, Clone, Copy)]
pub struct ReduceContext {
    /// Unix epoch milliseconds.
    pub now: i64,
    pub preview_len: usize,
}

/// Result of reducing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: EngineState,
    pub effects: Vec<Effect>,
}

/// Apply one transport event.
#[must_use]
pub fn reduce(mut state: EngineState, event: TransportEvent, cx: &ReduceContext) -> Transition {
    let mut effects = Vec::new();

    match event {
        TransportEvent::StreamOpened => {
            if let Some(query) = state.pending_query.clone() {
                effects.push(Effect::SendStart { query });
            }
        }
        TransportEvent::StreamMessage(msg) => on_message(&mut state, msg, cx, &mut effects),
        TransportEvent::StreamClosed { reason } => {
            on_stream_closed(&mut state, reason, cx, &mut effects);
        }
        TransportEvent::PollSnapshot(snapshot) => {
            on_snapshot(&mut state, snapshot, cx, &mut effects);
        }
        TransportEvent::PollFailed(failure) => on_poll_failed(&mut state, &failure, cx, &mut effects),
    }

    Transition { state, effects }
}

/// Archive the current session if it is completed with a report.
///
/// Returns `true` if history changed.
pub fn archive_current(state: &mut EngineState, now: i64) -> bool {
    state
        .session
        .as_ref()
        .and_then(|s| HistoryEntry::from_session(s, now))
        .is_some_and(|entry| state.history.insert(entry))
}

fn on_message(
    state: &mut EngineState,
    msg: ServerMessage,
    cx: &ReduceContext,
    effects: &mut Vec<Effect>,
) {
    match msg {
        ServerMessage::Started { session_id, .. } => {
            let query = state.pending_query.take().unwrap_or_default();
            tracing::info!(%session_id, "Research session started");
            state.activity.push(
                ActivityEntry::new(ActivityAction::Started, "Research session started", cx.now)
                    .with_detail(query.clone()),
            );
            state.session = Some(Session::new(session_id, query));
            effects.push(Effect::PersistSession);
        }
        ServerMessage::Progress {
            node,
            step,
            status,
            current_task_index,
            plan,
            documents,
            logs,
        } => {
            let Some(session) = state.session.as_mut() else {
                tracing::warn!(%node, "Progress before session start, ignoring");
                return;
            };
            if let Some(status) = status {
                session.status = status;
            }
            if let Some(index) = current_task_index {
                session.current_task_index = index;
            }
            replace_if_present(&mut session.plan, plan);
            replace_if_present(&mut session.documents, documents);
            replace_if_present(&mut session.logs, logs);
            if step.is_some() {
                session.step = step;
            }

            if let Some(entry) = node_activity(&node, session, cx) {
                state.activity.push(entry);
            }
            effects.push(Effect::PersistSession);
        }
        ServerMessage::Completed {
            report, documents, ..
        } => {
            let Some(session) = state.session.as_mut() else {
                tracing::warn!("Completion before session start");
                fail(state, FINISHED_BEFORE_START.to_string(), cx, effects);
                return;
            };
            session.status = SessionStatus::Completed;
            if report.is_some() {
                session.report = report;
            }
            replace_if_present(&mut session.documents, documents);
            complete(state, cx, effects);
        }
        ServerMessage::Error { message } => {
            tracing::error!("Research failed: {message}");
            fail(state, message, cx, effects);
        }
    }
}

fn on_stream_closed(
    state: &mut EngineState,
    reason: Option<String>,
    cx: &ReduceContext,
    effects: &mut Vec<Effect>,
) {
    match state.session.as_ref() {
        Some(session) if !session.status.is_terminal() => {
            let session_id = session.session_id.clone();
            tracing::info!(%session_id, ?reason, "Push channel lost, falling back to polling");
            state.polling = true;
            let mut entry = ActivityEntry::new(
                ActivityAction::Polling,
                "Connection lost, polling for updates",
                cx.now,
            );
            if let Some(reason) = reason {
                entry = entry.with_detail(reason);
            }
            state.activity.push(entry);
            effects.push(Effect::StartPolling { session_id });
        }
        Some(_) => {}
        None => {
            if state.pending_query.take().is_some() {
                let message = reason.map_or_else(
                    || LOST_BEFORE_START.to_string(),
                    |r| format!("{LOST_BEFORE_START}: {r}"),
                );
                fail(state, message, cx, effects);
            }
        }
    }
}

fn on_snapshot(
    state: &mut EngineState,
    snapshot: SessionSnapshot,
    cx: &ReduceContext,
    effects: &mut Vec<Effect>,
) {
    let Some(session) = state.session.as_mut() else {
        tracing::debug!("Snapshot with no current session, ignoring");
        return;
    };
    if session.session_id != snapshot.session_id {
        tracing::debug!(
            current = %session.session_id,
            received = %snapshot.session_id,
            "Snapshot for another session, ignoring"
        );
        return;
    }

    let changed = session.status != snapshot.status;
    session.status = snapshot.status;
    session.current_task_index = snapshot.current_task_index;
    replace_if_present(&mut session.plan, snapshot.plan);
    replace_if_present(&mut session.documents, snapshot.documents);
    replace_if_present(&mut session.logs, snapshot.logs);
    if snapshot.report.is_some() {
        session.report = snapshot.report;
    }
    if session.original_query.is_empty() {
        if let Some(query) = snapshot.original_query {
            session.original_query = query;
        }
    }

    if changed {
        if let Some(entry) = status_activity(session, cx) {
            state.activity.push(entry);
        }
    }

    match session.status {
        SessionStatus::Completed => complete(state, cx, effects),
        SessionStatus::Error => {
            let message = snapshot
                .error
                .unwrap_or_else(|| "Research failed on the server".to_string());
            effects.push(Effect::PersistSession);
            fail(state, message, cx, effects);
        }
        _ => effects.push(Effect::PersistSession),
    }
}

fn on_poll_failed(
    state: &mut EngineState,
    failure: &PollFailure,
    cx: &ReduceContext,
    effects: &mut Vec<Effect>,
) {
    let mut message = failure.to_string();
    if let PollFailure::Unreachable { reason } = failure {
        tracing::debug!("Last network error: {reason}");
        message.push_str(". Progress so far is kept; reload to retry.");
    }
    fail(state, message, cx, effects);

    if matches!(failure, PollFailure::SessionLost { .. }) {
        state.session = None;
        effects.push(Effect::ClearPersistedSession);
    }
}

/// Completion sequence shared by the push and pull paths.
fn complete(state: &mut EngineState, cx: &ReduceContext, effects: &mut Vec<Effect>) {
    state.loading = false;
    state.polling = false;
    effects.push(Effect::PersistSession);
    effects.push(Effect::CloseStream);
    effects.push(Effect::StopPolling);

    let Some(session) = state.session.as_ref() else {
        return;
    };
    if session.report().is_none() {
        tracing::warn!(session_id = %session.session_id, "Completed without a report");
        state.error = Some(MISSING_REPORT.to_string());
        state.activity.push(ActivityEntry::new(
            ActivityAction::Error,
            MISSING_REPORT,
            cx.now,
        ));
        return;
    }

    let documents = session.documents.len();
    tracing::info!(session_id = %session.session_id, documents, "Research complete");
    state.activity.push(
        ActivityEntry::new(ActivityAction::Completed, "Research complete", cx.now)
            .with_detail(format!("{documents} documents")),
    );
    if archive_current(state, cx.now) {
        effects.push(Effect::PersistHistory);
    }
}

/// Terminal failure: surface it and stop everything. Progress stays visible.
fn fail(state: &mut EngineState, message: String, cx: &ReduceContext, effects: &mut Vec<Effect>) {
    state
        .activity
        .push(ActivityEntry::new(ActivityAction::Error, message.clone(), cx.now));
    state.error = Some(message);
    state.loading = false;
    state.polling = false;
    state.pending_query = None;
    effects.push(Effect::CloseStream);
    effects.push(Effect::StopPolling);
}

/// Last-write-wins for non-empty payloads; empty payloads keep what we have.
fn replace_if_present<T>(slot: &mut Vec<T>, incoming: Vec<T>) {
    if !incoming.is_empty() {
        *slot = incoming;
    }
}

fn node_activity(node: &str, session: &Session, cx: &ReduceContext) -> Option<ActivityEntry> {
    let entry = match node {
        "planner" => ActivityEntry::new(ActivityAction::Planning, "Research plan created", cx.now)
            .with_detail(format!("{} questions", session.plan.len())),
        "researcher" => researching(session, cx),
        "writer" => ActivityEntry::new(ActivityAction::Writing, "Writing report", cx.now),
        _ => return None,
    };
    Some(entry)
}

fn status_activity(session: &Session, cx: &ReduceContext) -> Option<ActivityEntry> {
    let entry = match session.status {
        SessionStatus::Planning => {
            ActivityEntry::new(ActivityAction::Planning, "Creating research plan", cx.now)
        }
        SessionStatus::Researching => researching(session, cx),
        SessionStatus::Writing => {
            ActivityEntry::new(ActivityAction::Writing, "Writing report", cx.now)
        }
        SessionStatus::Other(ref status) => {
            ActivityEntry::new(ActivityAction::Polling, format!("Status: {status}"), cx.now)
        }
        SessionStatus::Completed | SessionStatus::Error => return None,
    };
    Some(entry)
}

fn researching(session: &Session, cx: &ReduceContext) -> ActivityEntry {
    let entry = ActivityEntry::new(
        ActivityAction::Researching,
        format!(
            "Investigating question {}/{}",
            session.current_task_index + 1,
            session.plan.len()
        ),
        cx.now,
    );
    match session.current_task() {
        Some(task) => entry.with_detail(preview(task, cx.preview_len)),
        None => entry,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
