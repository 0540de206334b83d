//! Cluster coordination for gale
//!
//! Membership bookkeeping for data nodes, the client side of the join
//! protocol, and the one-shot bootstrap orchestrator that decides at
//! process start whether this node founds a cluster, restores prior
//! state, or joins an existing cluster.

mod bootstrap;
mod join;
mod registry;

pub use bootstrap::{bootstrap, BootstrapConfig, BrokerNode, DataServer};
pub use join::{join_first, JoinClient};
pub use registry::DataNodeRegistry;

use crate::snapshot::SnapshotStream;
use crate::Result;

use serde::{Deserialize, Serialize};
use url::Url;

/// One data node known to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNodeInfo {
    pub id: u64,
    pub url: Url,
}

/// Cluster membership store for data nodes.
pub trait Membership: Send + Sync {
    fn data_nodes(&self) -> Vec<DataNodeInfo>;

    /// Register a node. Fails with [`crate::Error::DataNodeExists`] when the
    /// URL is already registered.
    fn create_data_node(&self, url: &Url) -> Result<DataNodeInfo>;

    /// Remove a node. Fails with [`crate::Error::DataNodeNotFound`] for an
    /// unknown id.
    fn delete_data_node(&self, id: u64) -> Result<()>;
}

/// Byte-stream export of replicated state, for peer catch-up.
pub trait StateExporter: Send + Sync {
    /// Serialized copy of the metastore.
    fn copy_metastore(&self) -> Result<SnapshotStream>;

    /// Serialized copy of one shard's data.
    fn copy_shard(&self, id: u64) -> Result<SnapshotStream>;
}

/// Executes any continuous queries that are due to run.
#[async_trait::async_trait]
pub trait ContinuousQueryRunner: Send + Sync {
    async fn run_continuous_queries(&self) -> Result<()>;
}
