//! Branch namespacing and lifecycle (spec §4.2, §3 branch destruction).

use cyre::{handler_fn, ActionConfig, Cyre, HandlerResult, Payload};
use serde_json::json;

#[tokio::test]
async fn nested_branches_resolve_relative_and_absolute_paths() {
    let bus = Cyre::new();
    let b1 = bus.create_branch("b1", None).unwrap();
    let b2 = b1.create_branch("b2", None).unwrap();

    b1.action(ActionConfig::new("k")).await.unwrap();
    b2.action(ActionConfig::new("k")).await.unwrap();
    bus.action(ActionConfig::new("top")).await.unwrap();

    b1.on("k", handler_fn(|_| async move {
        HandlerResult::Value(Payload::from(json!("b1")))
    }))
    .await
    .unwrap();
    b2.on("k", handler_fn(|_| async move {
        HandlerResult::Value(Payload::from(json!("b2")))
    }))
    .await
    .unwrap();
    bus.on("top", handler_fn(|_| async move {
        HandlerResult::Value(Payload::from(json!("top")))
    }))
    .await
    .unwrap();

    assert_eq!(b1.call("k", None).await.payload, Payload::from(json!("b1")));
    assert_eq!(b2.call("k", None).await.payload, Payload::from(json!("b2")));
    // from inside b2, "../k" walks back up to b1's own "k" channel.
    assert_eq!(b2.call("../k", None).await.payload, Payload::from(json!("b1")));
    // an absolute path ignores the caller's branch entirely.
    assert_eq!(b2.call("/top", None).await.payload, Payload::from(json!("top")));
}

#[tokio::test]
async fn destroying_a_branch_forgets_every_channel_under_its_prefix() {
    let bus = Cyre::new();
    let b1 = bus.create_branch("b1", None).unwrap();
    let b2 = b1.create_branch("b2", None).unwrap();

    b1.action(ActionConfig::new("k")).await.unwrap();
    b2.action(ActionConfig::new("k")).await.unwrap();
    bus.action(ActionConfig::new("untouched")).await.unwrap();

    let removed = b1.destroy().await;
    assert_eq!(removed, 2, "b1/k and the nested b1/b2/k must both be forgotten");

    let remaining: Vec<_> = bus
        .get_all()
        .into_iter()
        .map(|config| config.id)
        .collect();
    assert_eq!(remaining, vec!["untouched".to_string()]);
}

#[tokio::test]
async fn max_depth_rejects_paths_nested_too_deep() {
    let bus = Cyre::new();
    let shallow = bus.create_branch("shallow", Some(1)).unwrap();

    assert!(shallow.action(ActionConfig::new("k")).await.is_ok());
    assert!(shallow.action(ActionConfig::new("a/b")).await.is_err());
}
