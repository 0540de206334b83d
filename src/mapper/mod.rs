//! Remote mapper protocol (server side)
//!
//! A peer node pushes a partial map phase down to the node holding the
//! shard data: it posts a mapper spec, and this node opens a local mapper,
//! drives its interval iterator, and streams encoded intervals back until
//! exhaustion. Errors travel inside the frame stream; the transport status
//! is always success once the session begins.

use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Spec governing one push-down mapper session.
///
/// `call` is the aggregate-call descriptor; its absence selects raw mode,
/// in which the session runs until the mapper is exhausted. In aggregate
/// mode the session emits at most `chunk_size` intervals before closing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<String>,
    #[serde(default)]
    pub tmin: i64,
    #[serde(default)]
    pub tmax: i64,
    #[serde(default)]
    pub chunk_size: u32,
}

impl MapperSpec {
    /// Raw mode keeps iterating until exhaustion; aggregate mode counts
    /// chunks.
    pub fn is_raw(&self) -> bool {
        self.call.is_none()
    }
}

/// One frame of the mapper session stream.
///
/// A session emits zero or more data frames followed by exactly one
/// terminal frame: either `completed=true` or an error. Nothing follows a
/// terminal frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MapperFrame {
    pub fn data(value: serde_json::Value) -> Self {
        MapperFrame {
            data: Some(value),
            ..Default::default()
        }
    }

    pub fn completed() -> Self {
        MapperFrame {
            completed: true,
            ..Default::default()
        }
    }

    pub fn error(err: &Error) -> Self {
        MapperFrame {
            error: Some(err.to_string()),
            ..Default::default()
        }
    }
}

/// A local mapper over this node's shard data, exclusively owned by one
/// session. Implementations release storage resources on drop.
#[async_trait::async_trait]
pub trait ShardMapper: Send {
    async fn open(&mut self) -> Result<()>;

    /// Prime the mapper with the call expression, minimum time bound, and
    /// chunk granularity.
    async fn begin(&mut self, call: Option<&str>, tmin: i64, chunk_size: u32) -> Result<()>;

    /// Next interval's value. `None` means this interval holds no data,
    /// which does not by itself end the session: a group-by interval may
    /// legitimately be empty.
    async fn next_interval(&mut self) -> Result<Option<serde_json::Value>>;

    /// Whether the mapper has no more data up to `tmax`.
    async fn is_empty(&mut self, tmax: i64) -> bool;
}

/// Opens local mappers for inbound sessions.
pub trait MapperSessions: Send + Sync {
    fn open_mapper(&self, spec: &MapperSpec) -> Result<Box<dyn ShardMapper>>;
}

/// Drive one mapper session, emitting frames until a terminal frame.
///
/// Every successful interval is sent as its own frame immediately; the
/// receiver flushes each frame to the wire. Any error produces one error
/// frame and ends the session with no further frames. The mapper is
/// dropped (and thereby released) on every exit path.
pub async fn run_session(
    mut mapper: Box<dyn ShardMapper>,
    spec: MapperSpec,
    frames: mpsc::Sender<MapperFrame>,
) {
    let emit = |frame: MapperFrame| {
        let frames = frames.clone();
        async move {
            // A send failure means the requester went away; there is no one
            // left to tell.
            let _ = frames.send(frame).await;
        }
    };

    if let Err(e) = mapper.open().await {
        emit(MapperFrame::error(&e)).await;
        return;
    }
    if let Err(e) = mapper.begin(spec.call.as_deref(), spec.tmin, spec.chunk_size).await {
        emit(MapperFrame::error(&e)).await;
        return;
    }

    let raw = spec.is_raw();
    let mut remaining = spec.chunk_size;
    debug!(raw, tmin = spec.tmin, tmax = spec.tmax, chunk_size = spec.chunk_size, "mapper session started");

    loop {
        let value = match mapper.next_interval().await {
            Ok(v) => v,
            Err(e) => {
                emit(MapperFrame::error(&e)).await;
                return;
            }
        };

        // An empty interval only ends the session if the mapper is also
        // exhausted; a group-by interval may legitimately hold no data, in
        // which case it still produces a (null) frame below.
        if value.is_none() && mapper.is_empty(spec.tmax).await {
            break;
        }

        emit(MapperFrame::data(value.unwrap_or(serde_json::Value::Null))).await;

        // A zero chunk budget means unbounded, same as raw mode.
        if !raw && remaining > 0 {
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }
        if mapper.is_empty(spec.tmax).await {
            break;
        }
    }

    emit(MapperFrame::completed()).await;
}
