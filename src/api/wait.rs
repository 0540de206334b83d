//! Node index probe and blocking wait

use super::{ApiState, Principal};
use crate::index::{IndexWaitGate, WaitOutcome};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `GET /data`: the node's current replication index as the body.
pub async fn serve_index(State(state): State<ApiState>, Principal(_): Principal) -> String {
    state.index.load().to_string()
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
    /// Milliseconds to wait before giving up; absent or non-positive
    /// waits indefinitely.
    #[serde(default)]
    pub timeout: Option<i64>,
}

/// `GET /data/wait/:index`: block until the replication index reaches the
/// target, the timeout elapses, or the client goes away.
pub async fn serve_wait(
    State(state): State<ApiState>,
    Principal(_): Principal,
    Path(index): Path<String>,
    Query(params): Query<WaitParams>,
) -> Response {
    // An unparsable target degrades to zero, and zero is not a valid
    // watermark to wait for.
    let target = index.parse::<u64>().unwrap_or(0);
    if target == 0 {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let timeout = params
        .timeout
        .filter(|t| *t > 0)
        .map(|t| Duration::from_millis(t as u64));

    // Client disconnect drops this future, which cancels the guard and
    // thereby the poll; nothing further is written.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let gate = IndexWaitGate::new(&state.index);
    match gate.wait(target, timeout, cancel).await {
        WaitOutcome::Reached(current) => current.to_string().into_response(),
        WaitOutcome::TimedOut => StatusCode::REQUEST_TIMEOUT.into_response(),
        WaitOutcome::Cancelled => ().into_response(),
    }
}
