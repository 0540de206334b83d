//! Write endpoint

use super::{ApiError, ApiState, Principal, INDEX_HEADER};
use crate::write::{WriteError, WriteOutcome};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

/// Empty reply to CORS pre-flight requests.
pub async fn serve_options() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `POST /write`: decode, validate, and forward one point batch. The new
/// replication index is echoed in a response header.
pub async fn serve_write(
    State(state): State<ApiState>,
    Principal(user): Principal,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    match state.ingestor.ingest(&body, gzipped, user.as_ref()).await {
        Ok(WriteOutcome::Written(index)) => (
            StatusCode::OK,
            [(INDEX_HEADER, index.to_string())],
        )
            .into_response(),
        Ok(WriteOutcome::Empty) => StatusCode::OK.into_response(),
        Err(err) => {
            let status = match &err {
                WriteError::BadPayload(_) => StatusCode::BAD_REQUEST,
                WriteError::Invalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
                WriteError::UnknownDatabase(_) => StatusCode::NOT_FOUND,
                WriteError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                WriteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            ApiError::new(status, err.into_inner(), false).into_response()
        }
    }
}
