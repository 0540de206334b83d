//! Liveness probes, cluster membership CRUD, and replicated-state export

use super::{is_true, ApiError, ApiState};
use crate::response::marshal_pretty;
use crate::Error;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub pretty: Option<String>,
}

#[derive(Debug, Serialize)]
struct NodeStatus {
    id: u64,
    index: u64,
}

/// `GET /status`: the node's id and applied replication index.
pub async fn serve_status(
    State(state): State<ApiState>,
    Query(params): Query<StatusParams>,
) -> Response {
    let status = NodeStatus {
        id: state.node_id,
        index: state.index.load(),
    };
    (
        [(header::CONTENT_TYPE, "application/json")],
        marshal_pretty(&status, is_true(params.pretty.as_deref())),
    )
        .into_response()
}

/// `GET|HEAD /ping`: the server is running.
pub async fn serve_ping() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `GET /data/data_nodes`: all data nodes in the cluster.
pub async fn serve_data_nodes(State(state): State<ApiState>) -> Response {
    Json(state.membership.data_nodes()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateDataNode {
    #[serde(default)]
    pub url: String,
}

/// `POST /data/data_nodes`: register a new data node.
pub async fn serve_create_data_node(
    State(state): State<ApiState>,
    body: axum::body::Bytes,
) -> Response {
    let body: CreateDataNode = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            return ApiError::new(
                StatusCode::BAD_REQUEST,
                Error::Serialization(e.to_string()),
                false,
            )
            .into_response();
        }
    };

    let url = match Url::parse(&body.url) {
        Ok(u) => u,
        Err(_) => {
            return ApiError::new(
                StatusCode::BAD_REQUEST,
                Error::Validation("invalid data node url".to_string()),
                false,
            )
            .into_response();
        }
    };

    match state.membership.create_data_node(&url) {
        Ok(node) => (StatusCode::CREATED, Json(node)).into_response(),
        Err(e @ Error::DataNodeExists(_)) => {
            ApiError::new(StatusCode::CONFLICT, e, false).into_response()
        }
        Err(e) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e, false).into_response(),
    }
}

/// `DELETE /data/data_nodes/:id`: remove an existing node.
pub async fn serve_delete_data_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    let id = match id.parse::<u64>() {
        Ok(id) => id,
        Err(_) => {
            return ApiError::new(
                StatusCode::BAD_REQUEST,
                Error::Validation("invalid node id".to_string()),
                false,
            )
            .into_response();
        }
    };

    match state.membership.delete_data_node(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ Error::DataNodeNotFound(_)) => {
            ApiError::new(StatusCode::NOT_FOUND, e, false).into_response()
        }
        Err(e) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e, false).into_response(),
    }
}

/// `GET /data/metastore`: raw copy of the replicated metastore.
pub async fn serve_metastore(State(state): State<ApiState>) -> Response {
    match state.exporter.copy_metastore() {
        Ok(stream) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(
                header::CONTENT_DISPOSITION,
                r#"attachment; filename="meta""#,
            )
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e, false).into_response(),
    }
}

/// `GET /data/shard/:id`: raw copy of one shard's bytes.
pub async fn serve_shard(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let shard_id = match id.parse::<u64>() {
        Ok(id) => id,
        Err(_) => {
            return ApiError::new(
                StatusCode::BAD_REQUEST,
                Error::Validation("invalid shard ID".to_string()),
                false,
            )
            .into_response();
        }
    };

    match state.exporter.copy_shard(shard_id) {
        Ok(stream) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(
                header::CONTENT_DISPOSITION,
                format!(r#"attachment; filename="{}""#, id),
            )
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e @ Error::ShardNotFound(_)) => {
            ApiError::new(StatusCode::NOT_FOUND, e, false).into_response()
        }
        Err(e) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e, false).into_response(),
    }
}

/// `POST /data/process_continuous_queries`: run any continuous queries
/// that are due.
pub async fn serve_process_continuous_queries(State(state): State<ApiState>) -> Response {
    match state.continuous_queries.run_continuous_queries().await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e, false).into_response(),
    }
}
