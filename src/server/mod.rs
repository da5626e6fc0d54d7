// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.

//! Ingestion and subscription HTTP API.
//!
//! Routes:
//! - `POST /entries`   — append a batch to the ledger, ack the ids,
//!   best-effort push notification
//! - `POST /subscribe` — register a push subscription
//! - `POST /push-test` — fire a test notification through the dispatcher
//! - `GET  /health`    — liveness probe
//!
//! Every response body carries an `ok` flag; errors add an `error` code
//! string rather than prose.

pub mod ledger;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::entry::{epoch_millis, EntryRecord};
use crate::metrics;
use crate::push::{DispatchOutcome, NotificationPayload, PushDispatcher, Subscription, SubscriptionSet};

pub use ledger::{EntryLedger, LedgerError, LedgerRecord, MemoryLedger, SqlLedger};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn EntryLedger>,
    pub subscriptions: Arc<dyn SubscriptionSet>,
    pub dispatcher: Arc<PushDispatcher>,
}

/// Build the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/entries", post(post_entries))
        .route("/subscribe", post(post_subscribe))
        .route("/push-test", post(post_push_test))
        .route("/health", get(get_health))
        .with_state(state)
}

/// Bind and serve until the listener fails.
pub async fn serve(router: Router, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "ingestion server listening");
    axum::serve(listener, router).await
}

fn bad_request(error: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "ok": false, "error": error }))).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": "internal_error" })),
    )
        .into_response()
}

#[tracing::instrument(skip(state, body))]
async fn post_entries(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(entries) = body.get("entries").and_then(Value::as_array) else {
        return bad_request("entries must be a non-empty array");
    };
    if entries.is_empty() {
        return bad_request("entries must be a non-empty array");
    }
    let records: Vec<EntryRecord> = match serde_json::from_value(Value::Array(entries.clone())) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "rejecting malformed entry batch");
            return bad_request("entries must be a non-empty array");
        }
    };

    let acked = match state.ledger.append_batch(&records).await {
        Ok(acked) => acked,
        Err(e) => {
            error!(error = %e, "ledger append failed");
            metrics::record_operation("ingest", "append", "error");
            return internal_error();
        }
    };
    metrics::record_operation("ingest", "append", "success");
    info!(count = acked.len(), "entries ingested");

    // Best-effort: a push failure must never fail the ingestion response
    let payload = NotificationPayload::new(format!(
        "{} {} synchronized",
        acked.len(),
        if acked.len() == 1 { "entry" } else { "entries" }
    ));
    if let Err(e) = state.dispatcher.dispatch(&payload).await {
        warn!(error = %e, "post-ingest push dispatch failed");
    }

    Json(json!({ "ok": true, "syncedIds": acked })).into_response()
}

#[tracing::instrument(skip(state, body))]
async fn post_subscribe(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let valid_endpoint = body
        .get("endpoint")
        .and_then(Value::as_str)
        .is_some_and(|e| !e.is_empty());
    if !valid_endpoint {
        return bad_request("subscription requires an endpoint");
    }
    let subscription: Subscription = match serde_json::from_value(body) {
        Ok(subscription) => subscription,
        Err(_) => return bad_request("subscription requires an endpoint"),
    };

    match state.subscriptions.insert(subscription).await {
        Ok(total) => {
            metrics::set_subscriptions(total);
            (StatusCode::CREATED, Json(json!({ "ok": true, "total": total }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "subscription insert failed");
            internal_error()
        }
    }
}

#[tracing::instrument(skip(state, body))]
async fn post_push_test(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Response {
    let mut payload = NotificationPayload::default();
    if let Some(Json(body)) = body {
        if let Some(title) = body.get("title").and_then(Value::as_str) {
            payload.title = title.to_string();
        }
        if let Some(text) = body.get("body").and_then(Value::as_str) {
            payload.body = text.to_string();
        }
        if let Some(url) = body.get("url").and_then(Value::as_str) {
            payload.url = url.to_string();
        }
    }

    match state.dispatcher.dispatch(&payload).await {
        Ok(DispatchOutcome::NoSubscribers) => {
            Json(json!({ "ok": false, "error": "no_subscribers" })).into_response()
        }
        Ok(DispatchOutcome::Sent(report)) => {
            Json(json!({ "ok": true, "result": report })).into_response()
        }
        Err(e) => {
            error!(error = %e, "push test dispatch failed");
            internal_error()
        }
    }
}

async fn get_health() -> Response {
    Json(json!({ "ok": true, "service": "glowsync", "time": epoch_millis() })).into_response()
}
