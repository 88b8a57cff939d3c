mod common;

use common::*;
use sea_orm::{ConnectionTrait, DbBackend, EntityTrait, Statement};
use time::Duration;
use time::macros::datetime;
use tor_weather::entity::email_log;
use tor_weather::error::StoreError;
use tor_weather::notification::Notification;
use tor_weather::store::Lookup;
use tor_weather::subscription::{SubscriptionKind, SubscriptionRule};

#[tokio::test]
async fn test_missing_rows_are_not_found() {
    let store = setup_test_store().await;
    assert_eq!(store.find_router(FP_A).await.unwrap(), Lookup::NotFound);
    assert_eq!(
        store.find_subscriber("nobody@example.org").await.unwrap(),
        Lookup::NotFound
    );
    assert_eq!(store.find_subscription("nope").await.unwrap(), Lookup::NotFound);
}

#[tokio::test]
async fn test_deployment_is_stamped_once() {
    let store = setup_test_store().await;
    let first = datetime!(2026-10-01 08:00 UTC);

    assert_eq!(store.deployed_at_or_init(first).await.unwrap(), first);
    assert_eq!(
        store
            .deployed_at_or_init(first + Duration::days(3))
            .await
            .unwrap(),
        first
    );
}

#[tokio::test]
async fn test_upsert_router_replaces_existing_row() {
    let store = setup_test_store().await;
    let now = datetime!(2026-10-16 12:00 UTC);
    let mut router = insert_router(&store, FP_A, true, now).await;

    router.name = "renamed".into();
    router.up = false;
    router.last_seen = now + Duration::hours(1);
    store.upsert_router(&router).await.unwrap();

    assert_eq!(store.all_routers().await.unwrap(), vec![router.clone()]);
    assert_eq!(store.find_router(FP_A).await.unwrap(), Lookup::Found(router));
}

#[tokio::test]
async fn test_mark_down_and_delete_router() {
    let store = setup_test_store().await;
    let now = datetime!(2026-10-16 12:00 UTC);
    insert_router(&store, FP_A, true, now).await;

    store.mark_router_down(FP_A).await.unwrap();
    let router = store.find_router(FP_A).await.unwrap().found().unwrap();
    assert!(!router.up);
    assert_eq!(router.name, "testrelay");

    store.delete_router(FP_A).await.unwrap();
    assert!(!store.find_router(FP_A).await.unwrap().is_found());
}

#[tokio::test]
async fn test_subscriber_tokens_are_distinct() {
    let store = setup_test_store().await;
    let a = confirmed_subscriber(&store, "a@example.org").await;
    let b = confirmed_subscriber(&store, "b@example.org").await;

    assert_ne!(a.unsubs_auth, a.pref_auth);
    assert_ne!(a.unsubs_auth, b.unsubs_auth);
    assert!(!a.unsubs_auth.contains('-'));
    assert_eq!(a.unsubs_auth.len(), 24);
}

#[tokio::test]
async fn test_subscriptions_are_loaded_by_kind() {
    let store = setup_test_store().await;
    confirmed_subscriber(&store, "a@example.org").await;

    let down = store
        .insert_subscription("a@example.org", FP_A, SubscriptionRule::node_down(3))
        .await
        .unwrap();
    store
        .insert_subscription("a@example.org", FP_A, SubscriptionRule::low_bandwidth(50))
        .await
        .unwrap();

    let (subs, invalid) = store
        .subscriptions_of_kind(SubscriptionKind::NodeDown)
        .await
        .unwrap();
    assert!(invalid.is_empty());
    assert_eq!(subs, vec![down]);

    let (subs, _) = store
        .subscriptions_of_kind(SubscriptionKind::LowBandwidth)
        .await
        .unwrap();
    assert_eq!(subs[0].rule, SubscriptionRule::LowBandwidth { threshold_kbs: 50 });
}

#[tokio::test]
async fn test_invalid_subscription_row_does_not_hide_others() {
    let store = setup_test_store().await;
    confirmed_subscriber(&store, "a@example.org").await;
    let good = store
        .insert_subscription("a@example.org", FP_A, SubscriptionRule::node_down(1))
        .await
        .unwrap();

    // Node-down row without a grace period
    store
        .connection()
        .execute(Statement::from_string(
            DbBackend::Sqlite,
            r#"INSERT INTO subscription (id, subscriber_id, router_id, emailed, "type")
               VALUES ('broken', 'a@example.org', 'AAAA', 0, 'nodedownsub');"#,
        ))
        .await
        .unwrap();

    let (subs, invalid) = store
        .subscriptions_of_kind(SubscriptionKind::NodeDown)
        .await
        .unwrap();
    assert_eq!(subs, vec![good]);
    assert_eq!(invalid.len(), 1);
    assert!(matches!(invalid[0], StoreError::InvalidRow { ref key, .. } if key == "broken"));
}

#[tokio::test]
async fn test_update_subscription_writes_state_in_place() {
    let store = setup_test_store().await;
    confirmed_subscriber(&store, "a@example.org").await;
    let mut sub = store
        .insert_subscription("a@example.org", FP_A, SubscriptionRule::node_down(2))
        .await
        .unwrap();

    sub.emailed = true;
    if let SubscriptionRule::NodeDown(rule) = &mut sub.rule {
        rule.triggered = true;
        rule.last_changed = Some(datetime!(2026-10-16 12:00 UTC));
    }
    store.update_subscription(&sub).await.unwrap();

    let stored = store.find_subscription(&sub.id).await.unwrap();
    assert_eq!(stored, Lookup::Found(sub));
}

#[tokio::test]
async fn test_log_email() {
    let store = setup_test_store().await;
    let sent_at = datetime!(2026-10-16 12:00 UTC);
    let welcome = Notification::welcome(OPERATOR, FP_A, "alpha", false);

    store.log_email(&welcome, sent_at).await.unwrap();

    let rows = email_log::Entity::find()
        .all(store.connection())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recipient, OPERATOR);
    assert_eq!(rows[0].fingerprint, FP_A);
    assert_eq!(rows[0].email_type, "welcome");
    assert_eq!(rows[0].sent_at, sent_at);
}
