//! Push-down mapper endpoint
//!
//! The session is a streaming sub-protocol layered over HTTP: the
//! transport status is always 200 once handling begins, and errors are
//! carried in-band as frames the requesting node can pass along.

use super::ApiState;
use crate::mapper::{run_session, MapperFrame, MapperSpec};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

/// `POST /data/run_mapper`
pub async fn serve_run_mapper(State(state): State<ApiState>, body: Bytes) -> Response {
    let spec: MapperSpec = match serde_json::from_slice(&body) {
        Ok(spec) => spec,
        Err(e) => {
            return frame_response(MapperFrame {
                error: Some(e.to_string()),
                ..Default::default()
            });
        }
    };

    let mapper = match state.mapper_sessions.open_mapper(&spec) {
        Ok(m) => m,
        Err(e) => return frame_response(MapperFrame::error(&e)),
    };

    let (tx, frames) = mpsc::channel::<MapperFrame>(16);
    tokio::spawn(async move {
        run_session(mapper, spec, tx).await;
    });

    // Frames are serialized back-to-back; each send is one flushed chunk.
    let body = Body::from_stream(ReceiverStream::new(frames).map(|frame| {
        Ok::<_, std::convert::Infallible>(Bytes::from(
            serde_json::to_vec(&frame).unwrap_or_else(|e| {
                serde_json::to_vec(&MapperFrame {
                    error: Some(e.to_string()),
                    ..Default::default()
                })
                .unwrap_or_default()
            }),
        ))
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap_or_else(|_| StatusCode::OK.into_response())
}

/// A single-frame session: the error (or terminal) frame as the entire
/// body, still under a success status.
fn frame_response(frame: MapperFrame) -> Response {
    let body = serde_json::to_vec(&frame).unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
