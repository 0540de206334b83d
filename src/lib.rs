//! # gale
//!
//! The query-serving and cluster-coordination core of a distributed
//! time-series database. gale sits between client traffic and a
//! replicated cluster of broker nodes (consensus/log) and data nodes
//! (storage + query execution).
//!
//! ## What lives here
//!
//! - **Query coordination**: drives the engine's per-statement result
//!   channel into chunked streaming output or one buffered envelope,
//!   deciding HTTP status from the first result's semantic error class
//! - **Remote mapper protocol**: lets a peer push a partial map phase
//!   down to the node holding the shard data and stream interval results
//!   back until exhaustion
//! - **Cluster bootstrap**: the one-shot startup decision between
//!   founding a cluster, restoring prior state, and joining via
//!   candidate peers, with strictly sequential join retry
//!
//! ## What does not
//!
//! The query parser/engine, the storage engine, the consensus log, and
//! the credential store are collaborators consumed through traits
//! ([`query::QueryEngine`], [`write::WritePath`], [`mapper::MapperSessions`],
//! [`snapshot::SnapshotSource`], [`api::UserStore`], [`cluster::BrokerNode`],
//! [`cluster::DataServer`]) and injected at construction.

pub mod api;
pub mod cluster;
pub mod dump;
pub mod index;
pub mod mapper;
pub mod query;
pub mod response;
pub mod snapshot;
pub mod telemetry;
pub mod write;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::api::{build_router, ApiState};
    pub use crate::cluster::{bootstrap, BootstrapConfig, DataNodeRegistry};
    pub use crate::index::ReplicationIndex;
    pub use crate::query::{QueryCoordinator, QueryEngine};
    pub use crate::write::WriteIngestor;
    pub use crate::{Error, Result};
}
