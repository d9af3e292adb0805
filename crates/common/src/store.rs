use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::network::Network;
use crate::node::Node;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unhandled node store error: {0}")]
    Provider(String),
}

/// Directory of nodes and the networks they belong to.
///
/// Lookups return `Ok(None)` for unknown domains or networks; errors are
/// reserved for failures of the backing store itself.
#[async_trait]
pub trait NodeStore: Send + Sync + std::fmt::Debug + Clone + 'static {
    async fn get_node(&self, domain: &str) -> Result<Option<Arc<Node>>, StoreError>;

    async fn get_nodes(&self, network: &str) -> Result<Option<Arc<Network>>, StoreError>;
}

/// In-memory node directory
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    inner: Arc<RwLock<MemoryNodeStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryNodeStoreInner {
    /// domain -> node
    nodes: HashMap<String, Arc<Node>>,
    /// network id -> network, rebuilt whenever a node is set
    networks: HashMap<String, Arc<Network>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node and refresh its network
    pub fn set_node(&self, node: Node) -> Result<Arc<Node>, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Provider(format!("failed to acquire write lock: {}", e)))?;

        let node = Arc::new(node);
        inner.nodes.insert(node.domain().to_string(), node.clone());

        let mut members: HashMap<String, Vec<Arc<Node>>> = HashMap::new();
        for n in inner.nodes.values() {
            members
                .entry(n.network().to_string())
                .or_default()
                .push(n.clone());
        }
        inner.networks = members
            .into_iter()
            .map(|(id, mut nodes)| {
                nodes.sort_by(|a, b| a.domain().cmp(b.domain()));
                let network = Arc::new(Network::new(id.clone(), nodes));
                (id, network)
            })
            .collect();

        Ok(node)
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn get_node(&self, domain: &str) -> Result<Option<Arc<Node>>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Provider(format!("failed to acquire read lock: {}", e)))?;
        Ok(inner.nodes.get(domain).cloned())
    }

    async fn get_nodes(&self, network: &str) -> Result<Option<Arc<Network>>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Provider(format!("failed to acquire read lock: {}", e)))?;
        Ok(inner.networks.get(network).cloned())
    }
}
