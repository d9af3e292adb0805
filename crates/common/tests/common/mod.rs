//! Shared test utilities for bounce integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::form::FormValues;
use common::prelude::*;

pub const NETWORK: &str = "network";
pub const ACCESS: &str = "access.com";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Build a node with a random scrambler and one key epoch
pub fn make_node(domain: &str, role: Role) -> Node {
    let now = Utc::now();
    let node = Node::new(
        NETWORK,
        domain,
        now,
        now + Duration::days(30),
        role,
        Secret::generate().unwrap(),
    )
    .unwrap();
    node.add_secret(Secret::generate().unwrap());
    node
}

/// An in-memory directory with one access node and `storage` storage nodes
/// named `test-<n>.com`
pub fn setup_store(storage: usize) -> MemoryNodeStore {
    init_tracing();
    let store = MemoryNodeStore::new();
    store.set_node(make_node(ACCESS, Role::Access)).unwrap();
    for i in 1..=storage {
        store
            .set_node(make_node(&format!("test-{}.com", i), Role::Storage))
            .unwrap();
    }
    store
}

pub fn create_request(extra: &[(&str, &str)]) -> CreateRequest {
    let mut form = FormValues::new();
    form.append("returnUrl", "https://caller.com/complete");
    form.append("table", "swift");
    for (k, v) in extra {
        form.set(*k, *v);
    }
    CreateRequest {
        host: ACCESS.to_string(),
        form,
        forwarded_for: None,
        remote_addr: "192.168.1.20:40000".to_string(),
    }
}

pub fn data_param(url: &url::Url) -> String {
    url.query_pairs()
        .find(|(k, _)| k == "data")
        .map(|(_, v)| v.into_owned())
        .expect("url carries a data parameter")
}

/// Open the operation carried by `url` at the node it is addressed to
pub async fn receive(store: &MemoryNodeStore, url: &url::Url) -> (Arc<Node>, Operation) {
    let host = url.host_str().unwrap();
    let node = store.get_node(host).await.unwrap().unwrap();
    let network = store.get_nodes(node.network()).await.unwrap().unwrap();
    let op = Operation::from_payload(&node, network, Route::default(), &data_param(url)).unwrap();
    (node, op)
}
