//! Integration tests for a complete storage operation
//!
//! These walk an operation from the access node through every storage hop
//! and back to the caller's return URL, the way a browser following the
//! redirects would.

mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};

use ::common::operation::{create_url, Defaults, Hop};
use ::common::prelude::{Conflict, NodeStore, Pair, Results, Role};

#[tokio::test]
async fn hop_decrements_count_and_keeps_values() {
    let store = common::setup_store(6);
    let request = common::create_request(&[
        ("bounces", "3"),
        ("age+2099-01-01", "30"),
        ("colour>2099-01-01", "blue"),
    ]);
    let url = create_url(&store, &Defaults::default(), &request)
        .await
        .unwrap();

    let (home, mut op) = common::receive(&store, &url).await;
    assert_eq!(home.domain(), op.home_node());
    assert_eq!(op.node_count(), 3);
    let keys: Vec<_> = op.values().iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["age", "colour"]);

    // The home node already holds a value for a new key
    let now = Utc::now();
    let held = Pair::new(
        "visits",
        "1",
        Conflict::Add,
        now - Duration::days(2),
        now + Duration::days(5),
    );
    let hop = op.bounce(&home, &[held], now).unwrap();
    let Hop::Next(next_url) = hop else {
        panic!("expected another storage hop");
    };

    let (next, next_op) = common::receive(&store, &next_url).await;
    assert_ne!(next.domain(), home.domain());
    assert_eq!(next.role(), Role::Storage);
    assert_eq!(next_op.node_count(), 2);
    let keys: Vec<_> = next_op.values().iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["age", "colour", "visits"]);
    assert_eq!(next_op.home_node(), home.domain());
    assert_eq!(next_op.table(), "swift");
}

#[tokio::test]
async fn full_chain_returns_results_to_caller() {
    let store = common::setup_store(5);
    let request = common::create_request(&[
        ("bounces", "4"),
        ("state", "abc123"),
        ("id<2099-01-01", "first"),
    ]);
    let mut url = create_url(&store, &Defaults::default(), &request)
        .await
        .unwrap();

    let mut visited = Vec::new();
    let final_url = loop {
        let (node, mut op) = common::receive(&store, &url).await;
        visited.push(node.domain().to_string());
        match op.bounce(&node, &[], Utc::now()).unwrap() {
            Hop::Next(next) => url = next,
            Hop::Return(done) => break done,
        }
    };

    assert_eq!(visited.len(), 4);
    // First and last storage hops land on the home node
    assert_eq!(visited.first(), visited.last());

    assert_eq!(final_url.host_str(), Some("caller.com"));
    assert_eq!(final_url.path(), "/complete");
    assert!(final_url
        .query_pairs()
        .any(|(k, v)| k == "state" && v == "abc123"));

    let access = store.get_node(common::ACCESS).await.unwrap().unwrap();
    let sealed = URL_SAFE_NO_PAD
        .decode(common::data_param(&final_url))
        .unwrap();
    let results = Results::decode(&access.decrypt(&sealed).unwrap()).unwrap();
    assert!(results.is_timestamp_valid(Duration::seconds(60)));
    assert_eq!(results.values.len(), 1);
    assert_eq!(results.values[0].key, "id");
    assert_eq!(results.values[0].value, "first");
}

#[tokio::test]
async fn storage_node_cannot_open_results() {
    let store = common::setup_store(2);
    let request = common::create_request(&[("bounces", "1"), ("k+2099-01-01", "v")]);
    let url = create_url(&store, &Defaults::default(), &request)
        .await
        .unwrap();

    let (home, mut op) = common::receive(&store, &url).await;
    let Hop::Return(done) = op.bounce(&home, &[], Utc::now()).unwrap() else {
        panic!("single bounce should return to the caller");
    };
    let sealed = URL_SAFE_NO_PAD.decode(common::data_param(&done)).unwrap();
    assert!(home.decrypt(&sealed).is_err());
}

#[tokio::test]
async fn payload_only_opens_at_addressed_node() {
    let store = common::setup_store(3);
    let url = create_url(
        &store,
        &Defaults::default(),
        &common::create_request(&[]),
    )
    .await
    .unwrap();

    let home = url.host_str().unwrap().to_string();
    let other = (1..=3)
        .map(|i| format!("test-{}.com", i))
        .find(|d| *d != home)
        .unwrap();
    let node = store.get_node(&other).await.unwrap().unwrap();
    let network = store.get_nodes(node.network()).await.unwrap().unwrap();

    let result = ::common::operation::Operation::from_payload(
        &node,
        network,
        Default::default(),
        &common::data_param(&url),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn create_rejects_non_access_host() {
    let store = common::setup_store(2);
    let mut request = common::create_request(&[]);
    request.host = "test-1.com".to_string();
    let err = create_url(&store, &Defaults::default(), &request)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Domain 'test-1.com' is not an access node");

    request.host = "unknown.com".to_string();
    let err = create_url(&store, &Defaults::default(), &request)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Host 'unknown.com' is not a Swift node");
}
