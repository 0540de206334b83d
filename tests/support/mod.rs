//! Shared fixtures for the HTTP surface tests: scripted collaborator
//! implementations and a router builder wired with them.

#![allow(dead_code)]

use gale::api::{build_router, ApiState, UserStore};
use gale::cluster::{ContinuousQueryRunner, DataNodeRegistry, StateExporter};
use gale::index::ReplicationIndex;
use gale::mapper::{MapperSessions, MapperSpec, ShardMapper};
use gale::query::{QueryCoordinator, QueryEngine, ResultItem, ResultStream, UserContext};
use gale::response::{Series, StatementResult};
use gale::snapshot::{Snapshot, SnapshotSource, SnapshotStream, SnapshotWriter};
use gale::write::{Point, WriteIngestor, WritePath};
use gale::{Error, Result};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Engine that replays scripted result sequences and records every
/// `execute` call.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Vec<ResultItem>>>,
    fail_next: Mutex<Option<Error>>,
    pub queries: Mutex<Vec<(String, String, usize)>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result items one future `execute` call will stream.
    pub fn push_script(&self, items: Vec<ResultItem>) {
        self.scripts.lock().push_back(items);
    }

    /// Make the next `execute` call fail outright.
    pub fn fail_next(&self, err: Error) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().iter().map(|(q, _, _)| q.clone()).collect()
    }
}

#[async_trait::async_trait]
impl QueryEngine for ScriptedEngine {
    async fn execute(
        &self,
        query: &str,
        database: &str,
        _user: Option<&UserContext>,
        chunk_size: usize,
    ) -> Result<ResultStream> {
        self.queries
            .lock()
            .push((query.to_string(), database.to_string(), chunk_size));

        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }

        let items = self.scripts.lock().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(items.len().max(1));
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Write path over a fixed database catalog, advancing a shared index.
pub struct FakeWritePath {
    pub databases: HashSet<String>,
    pub index: Arc<ReplicationIndex>,
    pub writes: Mutex<Vec<(String, String, Vec<Point>)>>,
}

impl FakeWritePath {
    pub fn new(databases: &[&str], index: Arc<ReplicationIndex>) -> Self {
        Self {
            databases: databases.iter().map(|s| s.to_string()).collect(),
            index,
            writes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl WritePath for FakeWritePath {
    fn database_exists(&self, database: &str) -> bool {
        self.databases.contains(database)
    }

    async fn write_series(
        &self,
        database: &str,
        retention_policy: &str,
        points: Vec<Point>,
    ) -> Result<u64> {
        let next = self.index.load() + 1;
        self.index.advance_to(next);
        self.writes
            .lock()
            .push((database.to_string(), retention_policy.to_string(), points));
        Ok(next)
    }
}

/// Credential store with a single admin account.
pub struct SingleUserStore {
    pub count: usize,
    pub username: String,
    pub password: String,
}

impl SingleUserStore {
    pub fn empty() -> Self {
        Self {
            count: 0,
            username: String::new(),
            password: String::new(),
        }
    }

    pub fn admin(username: &str, password: &str) -> Self {
        Self {
            count: 1,
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl UserStore for SingleUserStore {
    fn user_count(&self) -> usize {
        self.count
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<UserContext> {
        if username == self.username && password == self.password {
            Ok(UserContext {
                name: username.to_string(),
                is_admin: true,
                ..Default::default()
            })
        } else {
            Err(Error::Unauthorized("invalid credentials".to_string()))
        }
    }
}

/// Mapper factory replaying one scripted interval sequence per session.
#[derive(Default)]
pub struct ScriptedSessions {
    intervals: Mutex<Vec<serde_json::Value>>,
    fail_open: Mutex<bool>,
}

impl ScriptedSessions {
    pub fn yielding(intervals: Vec<serde_json::Value>) -> Self {
        Self {
            intervals: Mutex::new(intervals),
            fail_open: Mutex::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            intervals: Mutex::new(Vec::new()),
            fail_open: Mutex::new(true),
        }
    }
}

impl MapperSessions for ScriptedSessions {
    fn open_mapper(&self, _spec: &MapperSpec) -> Result<Box<dyn ShardMapper>> {
        if *self.fail_open.lock() {
            return Err(Error::ShardNotFound(9));
        }
        Ok(Box::new(ReplayMapper {
            intervals: self.intervals.lock().clone().into(),
        }))
    }
}

struct ReplayMapper {
    intervals: VecDeque<serde_json::Value>,
}

#[async_trait::async_trait]
impl ShardMapper for ReplayMapper {
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn begin(&mut self, _call: Option<&str>, _tmin: i64, _chunk_size: u32) -> Result<()> {
        Ok(())
    }

    async fn next_interval(&mut self) -> Result<Option<serde_json::Value>> {
        Ok(self.intervals.pop_front())
    }

    async fn is_empty(&mut self, _tmax: i64) -> bool {
        self.intervals.is_empty()
    }
}

/// Snapshot source over a fixed manifest; streams the delta as JSON.
pub struct FixedSnapshots {
    pub snapshot: Snapshot,
}

impl SnapshotSource for FixedSnapshots {
    fn create_snapshot_writer(&self) -> Result<Box<dyn SnapshotWriter>> {
        Ok(Box::new(FixedSnapshotWriter {
            snapshot: self.snapshot.clone(),
        }))
    }
}

struct FixedSnapshotWriter {
    snapshot: Snapshot,
}

impl SnapshotWriter for FixedSnapshotWriter {
    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn retain(&mut self, delta: Snapshot) {
        self.snapshot = delta;
    }

    fn into_stream(self: Box<Self>) -> SnapshotStream {
        let bytes = serde_json::to_vec(&self.snapshot).unwrap_or_default();
        Box::pin(futures::stream::once(async move {
            Ok::<Bytes, Error>(Bytes::from(bytes))
        }))
    }
}

/// State exporter with one known shard.
pub struct FixedExporter {
    pub known_shard: u64,
}

impl StateExporter for FixedExporter {
    fn copy_metastore(&self) -> Result<SnapshotStream> {
        Ok(Box::pin(futures::stream::once(async {
            Ok::<Bytes, Error>(Bytes::from_static(b"meta-bytes"))
        })))
    }

    fn copy_shard(&self, id: u64) -> Result<SnapshotStream> {
        if id != self.known_shard {
            return Err(Error::ShardNotFound(id));
        }
        Ok(Box::pin(futures::stream::once(async {
            Ok::<Bytes, Error>(Bytes::from_static(b"shard-bytes"))
        })))
    }
}

/// Records continuous-query trigger calls.
#[derive(Default)]
pub struct RecordingCqRunner {
    pub runs: Mutex<usize>,
}

#[async_trait::async_trait]
impl ContinuousQueryRunner for RecordingCqRunner {
    async fn run_continuous_queries(&self) -> Result<()> {
        *self.runs.lock() += 1;
        Ok(())
    }
}

/// Everything a router test needs to reach into afterwards.
pub struct Fixture {
    pub engine: Arc<ScriptedEngine>,
    pub write_path: Arc<FakeWritePath>,
    pub index: Arc<ReplicationIndex>,
    pub membership: Arc<DataNodeRegistry>,
    pub cq: Arc<RecordingCqRunner>,
    pub state: ApiState,
}

impl Fixture {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

pub struct FixtureConfig {
    pub require_authentication: bool,
    pub users: SingleUserStore,
    pub snapshot_enabled: bool,
    pub snapshot: Snapshot,
    pub mapper: ScriptedSessions,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            require_authentication: false,
            users: SingleUserStore::empty(),
            snapshot_enabled: true,
            snapshot: Snapshot::default(),
            mapper: ScriptedSessions::default(),
        }
    }
}

pub fn fixture(config: FixtureConfig) -> Fixture {
    let engine = Arc::new(ScriptedEngine::new());
    let index = Arc::new(ReplicationIndex::new(0));
    let write_path = Arc::new(FakeWritePath::new(&["db0"], Arc::clone(&index)));
    let membership = Arc::new(DataNodeRegistry::new());
    let cq = Arc::new(RecordingCqRunner::default());

    let state = ApiState {
        coordinator: Arc::new(QueryCoordinator::new(engine.clone())),
        ingestor: Arc::new(WriteIngestor::new(
            write_path.clone(),
            config.require_authentication,
        )),
        users: Arc::new(config.users),
        membership: membership.clone(),
        mapper_sessions: Arc::new(config.mapper),
        snapshots: Arc::new(FixedSnapshots {
            snapshot: config.snapshot,
        }),
        exporter: Arc::new(FixedExporter { known_shard: 1 }),
        continuous_queries: cq.clone(),
        index: index.clone(),
        node_id: 1,
        require_authentication: config.require_authentication,
        snapshot_enabled: config.snapshot_enabled,
        version: "0.1.0-test".to_string(),
    };

    Fixture {
        engine,
        write_path,
        index,
        membership,
        cq,
        state,
    }
}

pub fn default_fixture() -> Fixture {
    fixture(FixtureConfig::default())
}

/// Build a statement result from series names.
pub fn result(id: usize, names: &[&str]) -> ResultItem {
    Some(StatementResult {
        statement_id: id,
        series: names
            .iter()
            .map(|n| Series {
                name: n.to_string(),
                ..Default::default()
            })
            .collect(),
        error: None,
    })
}

pub fn error_result(err: Error) -> ResultItem {
    Some(StatementResult {
        statement_id: 0,
        series: Vec::new(),
        error: Some(err),
    })
}

/// Drive one request through the router and collect the full response.
pub async fn send(
    router: Router,
    request: Request<Body>,
) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    let response = router.oneshot(request).await.expect("router call");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    (status, headers, body)
}

pub async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn post_json(
    router: Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
    )
    .await
}
