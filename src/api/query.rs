//! Query endpoint
//!
//! `GET /query` parses the request, starts execution, and answers with
//! either one buffered envelope or a chunked stream of envelopes. The
//! status code is fixed by the first result pulled off the engine channel.

use super::{is_true, ApiError, ApiState, Principal};
use crate::query::{classify_first_result, merge_buffered, Chunking, StatusClass, DEFAULT_CHUNK_SIZE};
use crate::response::{marshal_pretty, Response as QueryResponse, StatementResult};
use crate::Error;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub pretty: Option<String>,
    #[serde(default)]
    pub chunked: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<String>,
}

pub async fn serve_query(
    State(state): State<ApiState>,
    Principal(user): Principal,
    Query(params): Query<QueryParams>,
) -> Response {
    let pretty = is_true(params.pretty.as_deref());

    let text = params.q.as_deref().unwrap_or("").trim().to_string();
    if text.is_empty() {
        return ApiError::new(
            StatusCode::BAD_REQUEST,
            Error::Validation(r#"missing required parameter "q""#.to_string()),
            pretty,
        )
        .into_response();
    }

    let database = params.db.unwrap_or_default();

    // The engine chunks at this size either way; unchunked responses are
    // recombined by the buffered merge afterwards.
    let chunking = if is_true(params.chunked.as_deref()) {
        let size = params
            .chunk_size
            .as_deref()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        Chunking::Chunked(size)
    } else {
        Chunking::Buffered
    };

    let mut rx = match state
        .coordinator
        .start(&text, &database, user.as_ref(), chunking)
        .await
    {
        Ok(rx) => rx,
        Err(Error::Validation(msg)) => {
            return ApiError::new(StatusCode::BAD_REQUEST, Error::Validation(msg), pretty)
                .into_response();
        }
        Err(Error::Parse(msg)) => {
            return ApiError::new(StatusCode::BAD_REQUEST, Error::Parse(msg), pretty)
                .into_response();
        }
        Err(e) if e.is_authorization() => {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(_) => {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The first item (nil placeholder included) fixes the status; later
    // errors are embedded in the body.
    let first = rx.recv().await.flatten();
    let status = match classify_first_result(&first) {
        StatusClass::Ok => StatusCode::OK,
        StatusClass::Unauthorized => StatusCode::UNAUTHORIZED,
        StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match chunking {
        Chunking::Buffered => {
            let response = merge_buffered(first, &mut rx).await;
            (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                marshal_pretty(&response, pretty),
            )
                .into_response()
        }
        Chunking::Chunked(_) => {
            let (tx, out) = mpsc::channel::<Result<Bytes, std::convert::Infallible>>(16);
            tokio::spawn(async move {
                if let Some(result) = first {
                    if tx.send(Ok(envelope(result, pretty))).await.is_err() {
                        return;
                    }
                }
                while let Some(item) = rx.recv().await {
                    let result = match item {
                        Some(r) => r,
                        None => continue,
                    };
                    if tx.send(Ok(envelope(result, pretty))).await.is_err() {
                        return;
                    }
                }
            });

            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from_stream(ReceiverStream::new(out)))
                .unwrap_or_else(|_| status.into_response())
        }
    }
}

/// Wrap one result alone in an envelope and serialize it: one flushed
/// chunk on the wire.
fn envelope(result: StatementResult, pretty: bool) -> Bytes {
    let response = QueryResponse {
        results: vec![result],
        error: None,
    };
    Bytes::from(marshal_pretty(&response, pretty))
}
