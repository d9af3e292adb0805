//! Key rotation while operations are in flight

mod common;

use chrono::{Duration, Utc};

use ::common::operation::{create_url, Defaults, Hop};
use ::common::prelude::{NodeStore, Secret};

#[tokio::test]
async fn operation_survives_rotation_of_next_node() {
    let store = common::setup_store(4);
    let url = create_url(
        &store,
        &Defaults::default(),
        &common::create_request(&[("bounces", "2"), ("a>2099-01-01", "1")]),
    )
    .await
    .unwrap();

    // Rotate the addressed node's key while the browser is following the
    // redirect
    let home = store
        .get_node(url.host_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    let rotated = Secret::generate().unwrap();
    let rotated = Secret::from_key(&rotated.key_string(), Utc::now() + Duration::seconds(1)).unwrap();
    home.add_secret(rotated.clone());
    assert_eq!(home.secret().unwrap(), rotated);

    let (node, mut op) = common::receive(&store, &url).await;
    assert_eq!(node.domain(), home.domain());
    assert_eq!(op.values().len(), 1);
    assert!(matches!(
        op.bounce(&node, &[], Utc::now()).unwrap(),
        Hop::Next(_)
    ));
}

#[tokio::test]
async fn rotated_node_encrypts_under_newest_epoch() {
    let store = common::setup_store(1);
    let node = store.get_node("test-1.com").await.unwrap().unwrap();
    let original = node.secret().unwrap();

    let newer = Secret::generate().unwrap();
    let newer = Secret::from_key(&newer.key_string(), Utc::now() + Duration::minutes(5)).unwrap();
    node.add_secret(newer.clone());

    let sealed = node.encrypt(b"fresh").unwrap();
    assert!(newer.decrypt_and_decompress(&sealed).is_ok());
    assert!(original.decrypt_and_decompress(&sealed).is_err());
    assert_eq!(node.secrets().len(), 2);
}
