//! Replication store behavior over the in-process hub.

use duplex_games::{
    Delivery, MemoryEndpoint, MemoryHub, ReplicationSettings, ReplicationStore, Subscription,
    SyncEvent, SyncMessage,
};
use duplex_tictactoe::{GameSnapshot, RulesEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn fast_settings() -> ReplicationSettings {
    ReplicationSettings {
        backoff_initial: Duration::from_millis(10),
        backoff_max: Duration::from_millis(50),
        ..ReplicationSettings::default()
    }
}

async fn store_on(endpoint: &MemoryEndpoint) -> ReplicationStore {
    ReplicationStore::connect(Arc::new(endpoint.clone()), fast_settings()).await
}

fn reset_from(origin: &str, version: u64) -> SyncMessage {
    SyncMessage::new(origin.into(), SyncEvent::Reset { version })
}

async fn wait_until_degraded(store: &ReplicationStore, degraded: bool) {
    timeout(WAIT, async {
        while store.is_degraded().await != degraded {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store did not change connectivity in time");
}

/// Publishes until the subscriber sees something; a resubscription may not
/// be in place yet when the first attempt goes out.
async fn publish_until_received(
    publisher: &ReplicationStore,
    subscription: &mut Subscription,
    message: &SyncMessage,
) -> SyncMessage {
    timeout(WAIT, async {
        loop {
            publisher.publish(message).await;
            if let Ok(Some(received)) =
                timeout(Duration::from_millis(50), subscription.next()).await
            {
                return received;
            }
        }
    })
    .await
    .expect("message never delivered")
}

#[tokio::test]
async fn test_peer_receives_published_events() {
    let hub = MemoryHub::new();
    let a = store_on(&hub.endpoint()).await;
    let b = store_on(&hub.endpoint()).await;
    let mut subscription = b.subscribe().await;

    let message = reset_from("server-a", 4);
    assert_eq!(a.publish(&message).await, Delivery::Sent);

    let received = timeout(WAIT, subscription.next()).await.unwrap().unwrap();
    assert_eq!(received, message);
}

#[tokio::test]
async fn test_snapshot_persists_across_stores() {
    let hub = MemoryHub::new();
    let a = store_on(&hub.endpoint()).await;
    let b = store_on(&hub.endpoint()).await;
    assert_eq!(b.load_snapshot().await, None);

    let mut engine = RulesEngine::new();
    engine.join("server-a".into()).unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(a.save_snapshot(&snapshot).await, Delivery::Sent);

    assert_eq!(b.load_snapshot().await, Some(snapshot));
}

#[tokio::test]
async fn test_corrupt_snapshot_loads_as_none() {
    let hub = MemoryHub::new();
    hub.put("game_state:default", "{not a snapshot").await;
    let store = store_on(&hub.endpoint()).await;

    assert_eq!(store.load_snapshot().await, None);
    assert!(!store.is_degraded().await);
}

#[tokio::test]
async fn test_malformed_payload_is_skipped() {
    let hub = MemoryHub::new();
    let a = store_on(&hub.endpoint()).await;
    let b = store_on(&hub.endpoint()).await;
    let mut subscription = b.subscribe().await;

    hub.inject("tic_tac_toe:move", "garbage");
    hub.inject("tic_tac_toe:reset", r#"{"origin":"x","event":{"kind":"teleport"}}"#);
    // A well-formed reset on the move channel is not accepted either.
    let misrouted = reset_from("server-c", 9).encode().unwrap();
    hub.inject("tic_tac_toe:move", &misrouted);
    let message = reset_from("server-a", 2);
    a.publish(&message).await;

    let received = timeout(WAIT, subscription.next()).await.unwrap().unwrap();
    assert_eq!(received, message);
}

#[tokio::test]
async fn test_degraded_store_drops_writes() {
    let hub = MemoryHub::new();
    let endpoint = hub.unreachable_endpoint();
    let store = store_on(&endpoint).await;
    assert!(store.is_degraded().await);

    assert_eq!(store.publish(&reset_from("server-a", 1)).await, Delivery::Dropped);
    assert_eq!(
        store.save_snapshot(&GameSnapshot::fresh(1)).await,
        Delivery::Dropped
    );
    assert_eq!(store.load_snapshot().await, None);
    assert_eq!(hub.value("game_state:default").await, None);
}

#[tokio::test]
async fn test_subscription_is_silent_while_degraded() {
    let hub = MemoryHub::new();
    let store = store_on(&hub.unreachable_endpoint()).await;
    let peer = store_on(&hub.endpoint()).await;
    let mut subscription = store.subscribe().await;

    peer.publish(&reset_from("server-b", 1)).await;
    assert!(
        timeout(Duration::from_millis(100), subscription.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_reconnect_bumps_generation() {
    let hub = MemoryHub::new();
    let endpoint = hub.unreachable_endpoint();
    let store = store_on(&endpoint).await;
    let mut reconnections = store.reconnections();

    endpoint.set_online(true);
    timeout(WAIT, reconnections.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(!store.is_degraded().await);
    assert_eq!(store.publish(&reset_from("server-a", 1)).await, Delivery::Sent);
}

#[tokio::test]
async fn test_subscription_resumes_after_outage() {
    let hub = MemoryHub::new();
    let endpoint = hub.endpoint();
    let store = store_on(&endpoint).await;
    let peer = store_on(&hub.endpoint()).await;
    let mut subscription = store.subscribe().await;

    endpoint.set_online(false);
    wait_until_degraded(&store, true).await;

    endpoint.set_online(true);
    wait_until_degraded(&store, false).await;

    let message = reset_from("server-b", 9);
    let received = publish_until_received(&peer, &mut subscription, &message).await;
    assert_eq!(received, message);
}
