//! Dump endpoint
//!
//! `GET /dump` streams every point in a database as newline-delimited
//! JSON batches. Discovery failures become a proper error response; a
//! failure after streaming has begun is signaled in-band by a sentinel
//! line, since sent output cannot be retracted.

use super::{is_true, ApiError, ApiState, Principal};
use crate::dump::DumpExporter;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

#[derive(Debug, Deserialize)]
pub struct DumpParams {
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub pretty: Option<String>,
}

pub async fn serve_dump(
    State(state): State<ApiState>,
    Principal(user): Principal,
    Query(params): Query<DumpParams>,
) -> Response {
    let pretty = is_true(params.pretty.as_deref());
    let database = params.db.unwrap_or_default();

    // Discovery runs before the stream starts so its failure can still be
    // a status-coded response.
    let measurements = {
        let exporter = DumpExporter::new(&state.coordinator);
        match exporter.list_measurements(&database, user.as_ref()).await {
            Ok(m) => m,
            Err(e) => {
                return ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    crate::Error::Internal(format!("error with dump: {}", e)),
                    pretty,
                )
                .into_response();
            }
        }
    };

    let (tx, out) = mpsc::channel::<Bytes>(16);
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        let exporter = DumpExporter::new(&coordinator);
        let _ = exporter
            .dump_measurements(&database, &measurements, user.as_ref(), tx)
            .await;
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(
            ReceiverStream::new(out).map(Ok::<_, std::convert::Infallible>),
        ))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
