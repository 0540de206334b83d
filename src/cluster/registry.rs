//! In-process data node registry
//!
//! Membership implementation for single-node deployments and tests. Ids
//! are assigned sequentially and URLs are unique across the registry.

use super::{DataNodeInfo, Membership};
use crate::{Error, Result};

use parking_lot::RwLock;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<u64, DataNodeInfo>,
    next_id: u64,
}

/// Registry of data nodes keyed by id.
#[derive(Debug, Default)]
pub struct DataNodeRegistry {
    inner: RwLock<Inner>,
}

impl DataNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Membership for DataNodeRegistry {
    fn data_nodes(&self) -> Vec<DataNodeInfo> {
        let inner = self.inner.read();
        let mut nodes: Vec<_> = inner.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    fn create_data_node(&self, url: &Url) -> Result<DataNodeInfo> {
        let mut inner = self.inner.write();
        if inner.nodes.values().any(|n| &n.url == url) {
            return Err(Error::DataNodeExists(url.to_string()));
        }
        inner.next_id += 1;
        let node = DataNodeInfo {
            id: inner.next_id,
            url: url.clone(),
        };
        inner.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    fn delete_data_node(&self, id: u64) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.nodes.remove(&id) {
            Some(_) => Ok(()),
            None => Err(Error::DataNodeNotFound(id)),
        }
    }
}
