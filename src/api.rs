//! Thin HTTP surface over the store, the account registry and the live hub.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get},
    Json, Router,
};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::hub::{BroadcastHub, SubscriberId};
use crate::ingest::types::{is_valid_handle, normalize_handle, AccountRegistry};
use crate::store::{MessageRepository, Stats};

const MESSAGES_PAGE: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn MessageRepository>,
    pub accounts: Arc<dyn AccountRegistry>,
    pub hub: Arc<BroadcastHub>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/stats", get(stats))
        .route("/api/messages", get(list_messages))
        .route("/api/messages/{id}", get(get_message))
        .route("/api/accounts", get(list_accounts).post(add_account))
        .route("/api/accounts/{username}", delete(remove_account))
        .route("/api/events", get(events))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn error_json(status: StatusCode, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": msg.to_string() }))).into_response()
}

async fn stats(State(state): State<AppState>) -> Json<Stats> {
    match state.repo.stats().await {
        Ok(s) => Json(s),
        Err(e) => {
            tracing::warn!(error = ?e, "stats read failed; reporting zeros");
            Json(Stats::default())
        }
    }
}

async fn list_messages(State(state): State<AppState>) -> Response {
    match state.repo.find_all(MESSAGES_PAGE, 0).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

async fn get_message(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.repo.find_by_id(&id).await {
        Ok(Some(m)) => Json(m).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "not found"),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

async fn list_accounts(State(state): State<AppState>) -> Response {
    match state.accounts.list().await {
        Ok(v) => Json(v).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

#[derive(Deserialize)]
struct AddAccount {
    #[serde(default)]
    username: String,
}

async fn add_account(State(state): State<AppState>, Form(body): Form<AddAccount>) -> Response {
    let username = normalize_handle(&body.username);
    if username.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "username required");
    }
    if !is_valid_handle(&username) {
        return error_json(StatusCode::BAD_REQUEST, "invalid username");
    }
    match state.accounts.add(&username).await {
        Ok(true) => list_accounts(State(state)).await,
        Ok(false) => error_json(StatusCode::CONFLICT, "already tracking"),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

async fn remove_account(State(state): State<AppState>, Path(username): Path<String>) -> Response {
    match state.accounts.remove(&username).await {
        Ok(_) => list_accounts(State(state)).await,
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

/// Deregisters the SSE subscription when the response stream is dropped.
struct SubscriptionGuard {
    hub: Arc<BroadcastHub>,
    id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sub = state.hub.subscribe();
    let guard = SubscriptionGuard {
        hub: Arc::clone(&state.hub),
        id: sub.id,
    };

    let ping = stream::once(async { Ok::<_, Infallible>(Event::default().comment("ping")) });
    let updates = stream::unfold((sub.rx, guard), |(mut rx, guard)| async move {
        let payload = rx.recv().await?;
        Some((Ok(Event::default().event("message").data(payload)), (rx, guard)))
    });

    Sse::new(ping.chain(updates)).keep_alive(KeepAlive::default())
}
