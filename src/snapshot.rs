//! Snapshot diff transfer
//!
//! A joining node presents the snapshot it already holds; this node
//! computes the delta against current state and streams only that. The
//! snapshot writer is exclusively owned by one transfer and released when
//! the transfer ends, however it ends.

use crate::Result;

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// One file captured by a snapshot, at the replication index it was
/// written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub name: String,
    pub size: u64,
    pub index: u64,
}

/// Point-in-time manifest of a node's replicated state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub files: Vec<SnapshotFile>,
}

impl Snapshot {
    /// The subset of this snapshot not already present in `prior`: files
    /// the prior snapshot lacks entirely, or holds at a lower index.
    pub fn diff(&self, prior: &Snapshot) -> Snapshot {
        let files = self
            .files
            .iter()
            .filter(|file| {
                prior
                    .files
                    .iter()
                    .find(|p| p.name == file.name)
                    .map_or(true, |p| p.index < file.index)
            })
            .cloned()
            .collect();
        Snapshot { files }
    }
}

/// Serialized byte stream of a snapshot delta.
pub type SnapshotStream = BoxStream<'static, Result<Bytes>>;

/// A writer over one snapshot, exclusively owned by one transfer.
///
/// Implementations hold storage resources (file handles, locks) and
/// release them on drop, which covers every exit path of a transfer.
pub trait SnapshotWriter: Send {
    /// The snapshot this writer currently covers.
    fn snapshot(&self) -> &Snapshot;

    /// Restrict the writer to `delta` before streaming.
    fn retain(&mut self, delta: Snapshot);

    /// Consume the writer, streaming its serialized contents.
    fn into_stream(self: Box<Self>) -> SnapshotStream;
}

/// Produces snapshot writers for inbound transfer requests.
pub trait SnapshotSource: Send + Sync {
    fn create_snapshot_writer(&self) -> Result<Box<dyn SnapshotWriter>>;
}
