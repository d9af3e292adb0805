//! Fixtures for handler tests
#![allow(dead_code)]

use axum::response::Response;
use chrono::{Duration, Utc};

use common::prelude::{MemoryNodeStore, Node, Role, Secret};

use crate::{Config, ServiceState};

pub(crate) const NETWORK: &str = "net";
pub(crate) const ACCESS: &str = "access.com";
pub(crate) const STORAGE_NODES: usize = 3;

pub(crate) fn make_node(domain: &str, role: Role) -> Node {
    let now = Utc::now();
    let node = Node::new(
        NETWORK,
        domain,
        now - Duration::minutes(1),
        now + Duration::days(30),
        role,
        Secret::generate().unwrap(),
    )
    .unwrap();
    node.add_secret(Secret::generate().unwrap());
    node
}

/// Service state over plain http with one access node and storage nodes
/// `test-1.com` to `test-3.com`
pub(crate) fn test_state(access_keys: &[&str]) -> (ServiceState, MemoryNodeStore) {
    let store = MemoryNodeStore::new();
    store.set_node(make_node(ACCESS, Role::Access)).unwrap();
    for i in 1..=STORAGE_NODES {
        store
            .set_node(make_node(&format!("test-{}.com", i), Role::Storage))
            .unwrap();
    }
    let config = Config {
        scheme: "http".to_string(),
        access_keys: access_keys.iter().map(|k| k.to_string()).collect(),
        ..Config::default()
    };
    (ServiceState::with_store(config, store.clone()), store)
}

pub(crate) async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
