//! The nodes that make up one Swift network and client-affinity routing
//!
//! Every node in a network can recompute the home node for a client from
//! the same inputs: the active storage nodes are placed on a ring by their
//! domain hash and a client lands on the first node at or after the hash of
//! its address, wrapping to the start of the ring.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;

use crate::node::{hash32, Node, Role};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Network '{0}' has no active storage nodes")]
    NoStorageNodes(String),
    #[error("No remote address available to find a home node")]
    NoRemoteAddress,
}

#[derive(Debug, Clone)]
pub struct Network {
    id: String,
    nodes: Vec<Arc<Node>>,
}

impl Network {
    pub fn new(id: impl Into<String>, nodes: Vec<Arc<Node>>) -> Self {
        Self {
            id: id.into(),
            nodes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn get(&self, domain: &str) -> Option<Arc<Node>> {
        self.nodes.iter().find(|n| n.domain() == domain).cloned()
    }

    /// Active storage nodes ordered by their position on the ring
    fn ring(&self, now: DateTime<Utc>) -> Vec<Arc<Node>> {
        let mut ring: Vec<_> = self
            .nodes
            .iter()
            .filter(|n| n.role() == Role::Storage && n.is_active_at(now))
            .cloned()
            .collect();
        ring.sort_by(|a, b| a.hash().cmp(&b.hash()).then_with(|| a.domain().cmp(b.domain())));
        ring
    }

    /// The storage node a client with these addresses is routed to
    pub fn home_node(&self, xff: &str, remote_addr: &str) -> Result<Arc<Node>, NetworkError> {
        self.home_node_at(xff, remote_addr, Utc::now())
    }

    pub fn home_node_at(
        &self,
        xff: &str,
        remote_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<Node>, NetworkError> {
        let address = remote_address(xff, remote_addr).ok_or(NetworkError::NoRemoteAddress)?;
        let key = hash32(&address);
        let ring = self.ring(now);
        ring.iter()
            .find(|n| n.hash() >= key)
            .or_else(|| ring.first())
            .cloned()
            .ok_or_else(|| NetworkError::NoStorageNodes(self.id.clone()))
    }

    /// A random active storage node other than `exclude` for an
    /// intermediate hop. Falls back to `exclude` when it is the only one.
    pub fn next_node(&self, exclude: &str) -> Result<Arc<Node>, NetworkError> {
        let ring = self.ring(Utc::now());
        let others: Vec<_> = ring.iter().filter(|n| n.domain() != exclude).collect();
        others
            .choose(&mut rand::rng())
            .map(|n| Arc::clone(*n))
            .or_else(|| ring.first().cloned())
            .ok_or_else(|| NetworkError::NoStorageNodes(self.id.clone()))
    }
}

/// The client address used for affinity: the first X-Forwarded-For entry
/// when present, otherwise the connection's remote address without a port.
pub fn remote_address(xff: &str, remote_addr: &str) -> Option<String> {
    let forwarded = xff.split(',').next().map(str::trim).unwrap_or_default();
    if !forwarded.is_empty() {
        return Some(forwarded.to_string());
    }

    let remote = remote_addr.trim();
    if remote.is_empty() {
        return None;
    }
    if let Ok(addr) = remote.parse::<SocketAddr>() {
        return Some(addr.ip().to_string());
    }
    // host:port without brackets is only unambiguous for IPv4 and names
    match remote.split_once(':') {
        Some((host, port)) if !port.contains(':') => Some(host.to_string()),
        _ => Some(remote.to_string()),
    }
}
