// Copyright (C) 2023 Entropy Cryptography Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! An in-memory relay with the same HTTP surface as the production one
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use keysign_protocol::{KeysignResponse, RelayMessage};
use keysign_shared::constants::MESSAGE_ID_HEADER;
use tokio::{net::TcpListener, task::JoinHandle};

#[derive(Default)]
struct Inner {
    participants: HashMap<String, Vec<String>>,
    started: HashMap<String, Vec<String>>,
    /// Keyed by session, recipient and message id
    messages: HashMap<(String, String, String), Vec<RelayMessage>>,
    /// Keyed by session and message id
    completed: HashMap<(String, String), KeysignResponse>,
    posted: usize,
}

/// Shared state of a test relay, exposed so tests can inspect it
#[derive(Clone, Default)]
pub struct RelayState(Arc<Mutex<Inner>>);

impl RelayState {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn participants(&self, session_id: &str) -> Vec<String> {
        self.lock().participants.get(session_id).cloned().unwrap_or_default()
    }

    /// Total frames posted since the relay started
    pub fn posted_messages(&self) -> usize {
        self.lock().posted
    }

    /// Frames still waiting to be collected
    pub fn pending_messages(&self) -> usize {
        self.lock().messages.values().map(Vec::len).sum()
    }

    pub fn completion(&self, session_id: &str, message_id: &str) -> Option<KeysignResponse> {
        self.lock().completed.get(&(session_id.to_string(), message_id.to_string())).cloned()
    }
}

/// A relay served on a local port for the life of this value
pub struct TestRelay {
    pub url: String,
    pub state: RelayState,
    handle: JoinHandle<()>,
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a relay on an ephemeral port
pub async fn spawn_relay() -> anyhow::Result<TestRelay> {
    let state = RelayState::default();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let app = app(state.clone());
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Test relay stopped: {err}");
        }
    });
    Ok(TestRelay { url, state, handle })
}

pub fn app(state: RelayState) -> Router {
    Router::new()
        .route("/{session_id}", post(join).get(list_participants).delete(end_session))
        .route("/start/{session_id}", post(start_session).get(started_committee))
        .route("/message/{session_id}", post(post_message))
        .route("/message/{session_id}/{party_id}", get(poll_messages))
        .route("/message/{session_id}/{party_id}/{hash}", axum::routing::delete(delete_message))
        .route("/complete/{session_id}/keysign", post(mark_complete).get(check_complete))
        .with_state(state)
}

fn message_id(headers: &HeaderMap) -> String {
    headers
        .get(MESSAGE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn join(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
    Json(parties): Json<Vec<String>>,
) -> StatusCode {
    let mut inner = state.lock();
    let participants = inner.participants.entry(session_id).or_default();
    for party in parties {
        if !participants.contains(&party) {
            participants.push(party);
        }
    }
    StatusCode::CREATED
}

async fn list_participants(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<String>>, StatusCode> {
    state.lock().participants.get(&session_id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn end_session(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    let mut inner = state.lock();
    inner.participants.remove(&session_id);
    inner.started.remove(&session_id);
    inner.messages.retain(|(session, _, _), _| session != &session_id);
    inner.completed.retain(|(session, _), _| session != &session_id);
    StatusCode::OK
}

async fn start_session(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
    Json(committee): Json<Vec<String>>,
) -> StatusCode {
    state.lock().started.insert(session_id, committee);
    StatusCode::OK
}

async fn started_committee(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<String>>, StatusCode> {
    state.lock().started.get(&session_id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn post_message(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(message): Json<RelayMessage>,
) -> StatusCode {
    let message_id = message_id(&headers);
    let mut inner = state.lock();
    inner.posted += 1;
    for recipient in &message.to {
        inner
            .messages
            .entry((session_id.clone(), recipient.clone(), message_id.clone()))
            .or_default()
            .push(message.clone());
    }
    StatusCode::ACCEPTED
}

async fn poll_messages(
    State(state): State<RelayState>,
    Path((session_id, party_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Json<Vec<RelayMessage>> {
    let key = (session_id, party_id, message_id(&headers));
    Json(state.lock().messages.get(&key).cloned().unwrap_or_default())
}

async fn delete_message(
    State(state): State<RelayState>,
    Path((session_id, party_id, hash)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> StatusCode {
    let key = (session_id, party_id, message_id(&headers));
    if let Some(messages) = state.lock().messages.get_mut(&key) {
        messages.retain(|message| message.hash != hash);
    }
    StatusCode::OK
}

/// The first completion recorded for a message is kept
async fn mark_complete(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(response): Json<KeysignResponse>,
) -> StatusCode {
    state.lock().completed.entry((session_id, message_id(&headers))).or_insert(response);
    StatusCode::OK
}

async fn check_complete(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<KeysignResponse>, StatusCode> {
    state
        .lock()
        .completed
        .get(&(session_id, message_id(&headers)))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
