//! Cluster bootstrap orchestration
//!
//! Evaluated exactly once at process start. The filesystem decides what
//! kind of node this is: a missing broker directory means the broker must
//! be initialized, and a missing data directory (or a freshly initialized
//! broker) means the server must be initialized. With no join URLs a fresh
//! node founds a new single-node cluster; with join URLs it requests
//! admission from each candidate in order. Any failure here is fatal: the
//! process must not serve traffic in a half-joined state.

use super::join::join_first;
use crate::Result;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// The consensus/log node this process hosts.
#[async_trait::async_trait]
pub trait BrokerNode: Send + Sync {
    /// Open broker storage at `path`.
    async fn open(&self, path: &Path) -> Result<()>;

    /// Found a brand-new single-node cluster.
    async fn initialize(&self) -> Result<()>;

    /// Request admission from an existing broker.
    async fn join(&self, peer: &Url) -> Result<()>;

    /// This broker's own URL.
    fn url(&self) -> Url;

    /// Register a data-node replica with the broker log.
    async fn create_replica(&self, id: u64, url: &Url) -> Result<()>;

    /// Cluster identifier from the broker's configuration log entry, if
    /// the log holds one yet.
    fn cluster_id(&self) -> Option<u64>;

    /// Periodically tell a data node to run continuous queries that are
    /// due. Runs until the process exits.
    async fn run_continuous_query_loop(self: Arc<Self>);
}

/// The storage/query node this process hosts.
#[async_trait::async_trait]
pub trait DataServer: Send + Sync {
    /// Open server storage at `path`.
    async fn open(&self, path: &Path) -> Result<()>;

    fn id(&self) -> u64;

    /// This server's own URL.
    fn url(&self) -> Url;

    /// Initialize a fresh server against its local broker.
    async fn initialize(&self, broker_url: &Url) -> Result<()>;

    /// Request admission as a data node via an existing member.
    async fn join(&self, node_url: &Url, peer: &Url) -> Result<()>;

    /// Establish the durable messaging-client subscription to the broker
    /// log. Required before serving traffic, for fresh and restored
    /// servers alike.
    async fn open_messaging_client(&self, broker_urls: &[Url]) -> Result<()>;

    async fn start_retention_enforcement(&self, interval: Duration) -> Result<()>;

    async fn start_shard_group_precreate(&self, interval: Duration) -> Result<()>;

    /// Anonymous usage reporting keyed by the cluster identifier.
    async fn start_reporting_loop(&self, version: &str, cluster_id: u64);
}

/// Startup inputs for the bootstrap decision.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub broker_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Candidate cluster members to request admission from, in order.
    /// Empty means this node founds (or restores) its own cluster.
    pub join_urls: Vec<Url>,
    pub continuous_queries_enabled: bool,
    /// Retention enforcement check interval; `None` disables enforcement.
    pub retention_check_interval: Option<Duration>,
    pub shard_precreate_interval: Duration,
    pub reporting_enabled: bool,
    pub version: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            broker_dir: PathBuf::from(".gale/broker"),
            data_dir: PathBuf::from(".gale/data"),
            join_urls: Vec::new(),
            continuous_queries_enabled: true,
            retention_check_interval: None,
            shard_precreate_interval: Duration::from_secs(10 * 60),
            reporting_enabled: false,
            version: "unknown".to_string(),
        }
    }
}

impl BootstrapConfig {
    /// Broker needs initialization iff its directory is absent.
    pub fn init_broker(&self) -> bool {
        !self.broker_dir.exists()
    }

    /// Server needs initialization iff its directory is absent, or the
    /// broker needed it: a data node cannot be older than its broker.
    pub fn init_server(&self) -> bool {
        !self.data_dir.exists() || self.init_broker()
    }
}

/// Run the bootstrap state machine: construct broker and server, then
/// start the background loops.
///
/// Errors are fatal to the caller; nothing here retries past the
/// candidate list and no partial state is served.
pub async fn bootstrap(
    config: &BootstrapConfig,
    broker: Arc<dyn BrokerNode>,
    server: Arc<dyn DataServer>,
) -> Result<()> {
    let init_broker = config.init_broker();
    let init_server = config.init_server();
    if init_broker {
        info!("broker directory missing, initializing a new broker");
    }
    if init_server {
        info!("data directory missing or broker is new, initializing the server");
    }

    open_broker(config, broker.as_ref(), init_broker).await?;
    open_server(config, broker.as_ref(), server.as_ref(), init_server, init_broker).await?;
    start_background_loops(config, broker, server).await?;

    Ok(())
}

async fn open_broker(
    config: &BootstrapConfig,
    broker: &dyn BrokerNode,
    initializing: bool,
) -> Result<()> {
    broker.open(&config.broker_dir).await?;

    // A new broker either founds a new cluster or joins an existing one.
    if initializing {
        if config.join_urls.is_empty() {
            broker.initialize().await?;
        } else {
            join_first("broker", &config.join_urls, |peer| async move {
                broker.join(&peer).await
            })
            .await?;
        }
    }

    Ok(())
}

async fn open_server(
    config: &BootstrapConfig,
    broker: &dyn BrokerNode,
    server: &dyn DataServer,
    init_server: bool,
    init_broker: bool,
) -> Result<()> {
    server.open(&config.data_dir).await?;

    if init_server {
        if config.join_urls.is_empty() {
            initialize_server(broker, server, init_broker).await?;
        } else {
            let node_url = server.url();
            join_first("data node", &config.join_urls, |peer| {
                let node_url = node_url.clone();
                async move { server.join(&node_url, &peer).await }
            })
            .await?;
        }
    }

    // Fresh or restored, the server subscribes to a broker log before
    // serving traffic: explicit join URLs if configured, otherwise the
    // local broker.
    let subscription_urls = if config.join_urls.is_empty() {
        vec![broker.url()]
    } else {
        config.join_urls.clone()
    };
    server.open_messaging_client(&subscription_urls).await?;

    Ok(())
}

/// Fresh-initialize a server against its local broker: register the
/// replica first, then initialize.
async fn initialize_server(
    broker: &dyn BrokerNode,
    server: &dyn DataServer,
    init_broker: bool,
) -> Result<()> {
    if init_broker {
        broker.create_replica(1, &server.url()).await?;
        server.initialize(&broker.url()).await?;
    }
    Ok(())
}

/// Background loops start only after both broker and server are up, and
/// are independent of each other once started.
async fn start_background_loops(
    config: &BootstrapConfig,
    broker: Arc<dyn BrokerNode>,
    server: Arc<dyn DataServer>,
) -> Result<()> {
    if config.continuous_queries_enabled {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move {
            broker.run_continuous_query_loop().await;
        });
    } else {
        info!("continuous queries disabled, not starting dispatch loop");
    }

    if let Some(interval) = config.retention_check_interval {
        server.start_retention_enforcement(interval).await?;
        info!(interval_secs = interval.as_secs(), "retention enforcement enabled");
    }

    server
        .start_shard_group_precreate(config.shard_precreate_interval)
        .await?;

    if config.reporting_enabled {
        if let Some(cluster_id) = broker.cluster_id() {
            let server = Arc::clone(&server);
            let version = config.version.clone();
            tokio::spawn(async move {
                server.start_reporting_loop(&version, cluster_id).await;
            });
        }
    }

    Ok(())
}
