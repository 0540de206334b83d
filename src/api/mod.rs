//! HTTP API for gale
//!
//! Two route groups share one handler state: the client-facing API
//! (query, write, dump, liveness) and the peer-facing cluster surface
//! (membership CRUD, index wait, push-down mapper, snapshot and state
//! export). Collaborators are injected as trait handles at construction;
//! handlers never reach for globals.

mod auth;
mod dump;
mod mapper;
mod nodes;
mod query;
mod snapshot;
mod wait;
mod write;

pub use auth::{Principal, UserStore};

use crate::cluster::{ContinuousQueryRunner, Membership, StateExporter};
use crate::index::ReplicationIndex;
use crate::mapper::MapperSessions;
use crate::query::QueryCoordinator;
use crate::snapshot::SnapshotSource;
use crate::write::WriteIngestor;
use crate::Error;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Version header attached to every response.
pub const VERSION_HEADER: &str = "X-Gale-Version";

/// Header carrying the new replication index after a successful write.
pub const INDEX_HEADER: &str = "X-Gale-Index";

/// Shared state behind every handler.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<QueryCoordinator>,
    pub ingestor: Arc<WriteIngestor>,
    pub users: Arc<dyn UserStore>,
    pub membership: Arc<dyn Membership>,
    pub mapper_sessions: Arc<dyn MapperSessions>,
    pub snapshots: Arc<dyn SnapshotSource>,
    pub exporter: Arc<dyn StateExporter>,
    pub continuous_queries: Arc<dyn ContinuousQueryRunner>,
    pub index: Arc<ReplicationIndex>,
    /// This node's cluster-assigned id.
    pub node_id: u64,
    pub require_authentication: bool,
    pub snapshot_enabled: bool,
    pub version: String,
}

/// Build the full router: client API plus cluster surface.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version = HeaderValue::from_str(&state.version)
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));

    Router::new()
        // Client-facing API
        .route("/query", get(query::serve_query))
        .route(
            "/write",
            post(write::serve_write).options(write::serve_options),
        )
        .route("/status", get(nodes::serve_status))
        .route("/ping", get(nodes::serve_ping).head(nodes::serve_ping))
        .route("/dump", get(dump::serve_dump))
        // Peer-facing cluster surface
        .route("/data", get(wait::serve_index))
        .route("/data/wait/:index", get(wait::serve_wait))
        .route("/data/run_mapper", post(mapper::serve_run_mapper))
        .route("/data/snapshot", get(snapshot::serve_snapshot))
        .route(
            "/data/data_nodes",
            get(nodes::serve_data_nodes).post(nodes::serve_create_data_node),
        )
        .route("/data/data_nodes/:id", delete(nodes::serve_delete_data_node))
        .route("/data/metastore", get(nodes::serve_metastore))
        .route("/data/shard/:id", get(nodes::serve_shard))
        .route(
            "/data/process_continuous_queries",
            post(nodes::serve_process_continuous_queries),
        )
        .with_state(state)
        .layer(middleware::from_fn(observe_request))
        .layer(middleware::from_fn(move |req: Request<Body>, next: Next| {
            let version = version.clone();
            async move {
                let mut response = next.run(req).await;
                response.headers_mut().insert(VERSION_HEADER, version);
                response
            }
        }))
        .layer(CatchPanicLayer::custom(render_panic))
        .layer(cors)
}

/// Request-boundary observability: every request is logged with timing,
/// method, and path, whether it succeeded or not.
async fn observe_request(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        error!(%method, %path, %status, elapsed_ms, "request failed");
    } else {
        info!(%method, %path, %status, elapsed_ms, "request");
    }
    response
}

/// A panicking handler still completes its response instead of killing
/// the connection task.
fn render_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    error!(detail = %detail, "request handler panicked");
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        Error::Internal(detail),
        false,
    )
    .into_response()
}

/// Error reply in the standard JSON shape.
///
/// The body is a response envelope carrying the error string, so clients
/// can parse failures the same way as results.
pub struct ApiError {
    status: StatusCode,
    error: Error,
    pretty: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, error: Error, pretty: bool) -> Self {
        Self {
            status,
            error,
            pretty,
        }
    }

    pub fn unauthorized(error: Error) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error, false)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = crate::response::marshal_pretty(
            &crate::response::Response::from_error(self.error),
            self.pretty,
        );
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

/// Parse the `pretty` query flag the way every handler does.
pub(crate) fn is_true(flag: Option<&str>) -> bool {
    flag == Some("true")
}
