//! Snapshot diff endpoint

use super::{ApiError, ApiState};
use crate::snapshot::Snapshot;
use crate::Error;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// `GET /data/snapshot`: stream the delta between current state and the
/// snapshot the requester already holds. Gated by a feature flag; when
/// disabled the endpoint reports not-found rather than executing.
pub async fn serve_snapshot(State(state): State<ApiState>, body: Bytes) -> Response {
    if !state.snapshot_enabled {
        return ApiError::new(
            StatusCode::NOT_FOUND,
            Error::Internal("not found".to_string()),
            false,
        )
        .into_response();
    }

    // No body means no prior state; a malformed body is a client error.
    let prior = if body.is_empty() {
        Snapshot::default()
    } else {
        match serde_json::from_slice::<Snapshot>(&body) {
            Ok(s) => s,
            Err(e) => {
                return ApiError::new(
                    StatusCode::BAD_REQUEST,
                    Error::Validation(format!("error reading previous snapshot: {}", e)),
                    false,
                )
                .into_response();
            }
        }
    };

    let mut writer = match state.snapshots.create_snapshot_writer() {
        Ok(w) => w,
        Err(e) => {
            return ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                Error::Internal(format!("error creating snapshot writer: {}", e)),
                false,
            )
            .into_response();
        }
    };

    let delta = writer.snapshot().diff(&prior);
    writer.retain(delta);

    Body::from_stream(writer.into_stream()).into_response()
}
