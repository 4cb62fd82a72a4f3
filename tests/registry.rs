//! Feed registry integration tests against a local feed server.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use common::{MockServer, wait_until, within};
use feed_sync::{ClientConfig, ConnectionState, FeedRegistry, FeedSubscription, FeedUpdate};

// ============================================================================
// Helpers
// ============================================================================

type Values = Arc<Mutex<Vec<Value>>>;
type States = Arc<Mutex<Vec<ConnectionState>>>;

fn values() -> (Values, impl Fn(&FeedUpdate) + Send + Sync + 'static) {
    let seen: Values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |update: &FeedUpdate| {
        sink.lock().push(update.value().clone())
    })
}

fn states() -> (States, impl Fn(ConnectionState) + Send + Sync + 'static) {
    let seen: States = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |state: ConnectionState| sink.lock().push(state))
}

async fn subscribed(registry: &FeedRegistry, feed: &str) -> bool {
    wait_until(|| registry.is_server_subscribed(feed)).await
}

// ============================================================================
// Deduplication and Ref-counting
// ============================================================================

#[tokio::test]
async fn test_many_listeners_share_one_server_subscription() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let subscriptions: Vec<FeedSubscription> = (0..3)
        .map(|_| registry.subscribe_data("tok-1", |_| {}))
        .collect();

    assert!(subscribed(&registry, "tok-1").await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(server.subscribes_for("tok-1"), 1);
    assert_eq!(registry.listener_count("tok-1"), 3);
    assert_eq!(registry.feed_count(), 1);

    drop(subscriptions);
}

#[tokio::test]
async fn test_last_unsubscribe_releases_feed_once() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let subscriptions: Vec<FeedSubscription> = (0..3)
        .map(|_| registry.subscribe_data("tok-1", |_| {}))
        .collect();
    let _other = registry.subscribe_data("tok-2", |_| {});

    assert!(subscribed(&registry, "tok-1").await);
    server.push("tok-1", json!({"price": 10}));
    assert!(wait_until(|| registry.cached("tok-1").is_some()).await);

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }

    assert!(wait_until(|| server.unsubscribes_for("tok-1") == 1).await);
    assert!(registry.cached("tok-1").is_none());
    assert_eq!(registry.listener_count("tok-1"), 0);
    assert!(!registry.is_server_subscribed("tok-1"));

    // tok-2 keeps the connection alive.
    assert!(registry.is_active());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.unsubscribes_for("tok-1"), 1);
}

// ============================================================================
// Cache and Replay
// ============================================================================

#[tokio::test]
async fn test_late_subscriber_gets_cached_value() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let (first, on_first) = values();
    let _a = registry.subscribe_data("tok-1", on_first);
    assert!(subscribed(&registry, "tok-1").await);

    server.push("tok-1", json!({"price": 10}));
    assert!(wait_until(|| first.lock().len() == 1).await);

    let (late, on_late) = values();
    let _b = registry.subscribe_data("tok-1", on_late);

    // Delivered before subscribe returned.
    assert_eq!(*late.lock(), vec![json!({"price": 10})]);
    assert_eq!(server.subscribes_for("tok-1"), 1);
}

#[tokio::test]
async fn test_reconnect_resubscribes_each_feed_once() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let (connectivity, on_connectivity) = states();
    let (seen, on_data) = values();
    let _a = registry.subscribe("tok-1", on_data, on_connectivity);
    let _b = registry.subscribe_data("tok-2", |_| {});

    assert!(subscribed(&registry, "tok-1").await);
    assert!(subscribed(&registry, "tok-2").await);

    server.drop_connections();

    assert!(wait_until(|| server.subscribes_for("tok-1") == 2).await);
    assert!(wait_until(|| server.subscribes_for("tok-2") == 2).await);
    assert!(subscribed(&registry, "tok-1").await);
    assert!(subscribed(&registry, "tok-2").await);
    assert_eq!(server.accepted(), 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.subscribes_for("tok-1"), 2);
    assert_eq!(server.unsubscribes_for("tok-1"), 0);

    server.push("tok-1", json!({"price": 12}));
    assert!(wait_until(|| seen.lock().len() == 1).await);

    let observed = connectivity.lock().clone();
    let first_up = observed
        .iter()
        .position(|state| *state == ConnectionState::Connected)
        .expect("connected at least once");
    assert!(
        observed[first_up..].contains(&ConnectionState::Disconnected),
        "connectivity never reported the drop: {observed:?}"
    );
    assert_eq!(observed.last(), Some(&ConnectionState::Connected));
}

// ============================================================================
// Subscribe Outcomes
// ============================================================================

#[tokio::test]
async fn test_refused_subscribe_is_retried() {
    let server = MockServer::start().await;
    server.refuse_subscribes(2);
    let registry = FeedRegistry::new(server.config_builder().max_attempts(5).build().expect("config"));

    let (seen, on_data) = values();
    let _subscription = registry.subscribe_data("tok-1", on_data);

    assert!(subscribed(&registry, "tok-1").await);
    assert_eq!(server.subscribes_for("tok-1"), 3);
    assert_eq!(server.accepted(), 1);

    server.push("tok-1", json!({"price": 10}));
    assert!(wait_until(|| seen.lock().len() == 1).await);
}

#[tokio::test]
async fn test_refused_subscribe_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    server.refuse_subscribes(100);
    let registry = FeedRegistry::new(server.config_builder().max_attempts(2).build().expect("config"));

    let _subscription = registry.subscribe_data("tok-1", |_| {});

    assert!(wait_until(|| server.subscribes_for("tok-1") == 3).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.subscribes_for("tok-1"), 3);
    assert!(!registry.is_server_subscribed("tok-1"));
    assert_eq!(registry.listener_count("tok-1"), 1);
}

#[tokio::test]
async fn test_subscribe_landing_after_everyone_left_is_undone() {
    let server = MockServer::start().await;
    server.hold_subscribes("tok-1");
    let registry = FeedRegistry::new(server.config());

    // tok-2 keeps the connection up.
    let _keep = registry.subscribe_data("tok-2", |_| {});
    let subscription = registry.subscribe_data("tok-1", |_| {});
    assert!(wait_until(|| server.subscribes_for("tok-1") == 1).await);

    drop(subscription);
    assert_eq!(registry.listener_count("tok-1"), 0);

    let id = server.subscribe_id("tok-1").expect("subscribe id");
    server.respond(&id, json!("sub-tok-1"));

    assert!(wait_until(|| server.unsubscribes_for("tok-1") == 1).await);
    assert!(!registry.is_server_subscribed("tok-1"));
    assert_eq!(registry.feed_count(), 1);
    assert!(registry.is_active());
}

#[tokio::test]
async fn test_reattach_while_subscribing_reuses_call() {
    let server = MockServer::start().await;
    server.hold_subscribes("tok-1");
    let registry = FeedRegistry::new(server.config());

    let _keep = registry.subscribe_data("tok-2", |_| {});
    let first = registry.subscribe_data("tok-1", |_| {});
    assert!(wait_until(|| server.subscribes_for("tok-1") == 1).await);

    drop(first);
    let (seen, on_data) = values();
    let _second = registry.subscribe_data("tok-1", on_data);

    let id = server.subscribe_id("tok-1").expect("subscribe id");
    server.respond(&id, json!("sub-tok-1"));
    assert!(subscribed(&registry, "tok-1").await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.subscribes_for("tok-1"), 1);
    assert_eq!(server.unsubscribes_for("tok-1"), 0);

    server.push("tok-1", json!({"price": 10}));
    assert!(wait_until(|| seen.lock().len() == 1).await);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_connection_closes_when_last_listener_leaves() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let subscription = registry.subscribe_data("tok-1", |_| {});
    assert!(subscribed(&registry, "tok-1").await);

    drop(subscription);

    assert!(wait_until(|| server.open_sockets() == 0).await);
    assert!(!registry.is_active());
    assert_eq!(registry.state(), ConnectionState::Disconnected);

    // No reconnect without listeners.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_reports_exhausted() {
    let config = ClientConfig::builder("ws://127.0.0.1:1")
        .base_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(20))
        .max_attempts(2)
        .build()
        .expect("config");
    let registry = FeedRegistry::new(config);

    let (connectivity, on_connectivity) = states();
    let _subscription = registry.subscribe("tok-1", |_| {}, on_connectivity);

    assert!(wait_until(|| connectivity.lock().contains(&ConnectionState::Exhausted)).await);
    assert_eq!(registry.state(), ConnectionState::Exhausted);

    // A new subscriber restarts the cycle.
    let _again = registry.subscribe_data("tok-1", |_| {});
    assert!(
        wait_until(|| {
            let observed = connectivity.lock();
            let exhausted = observed
                .iter()
                .position(|state| *state == ConnectionState::Exhausted);
            exhausted.is_some_and(|at| observed[at..].contains(&ConnectionState::Connecting))
        })
        .await
    );
}

#[tokio::test]
async fn test_disconnect_unsubscribes_and_notifies() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let (connectivity, on_connectivity) = states();
    let subscription = registry.subscribe("tok-1", |_| {}, on_connectivity);
    assert!(subscribed(&registry, "tok-1").await);

    registry.disconnect();

    assert!(!subscription.is_active());
    assert!(!registry.is_active());
    assert_eq!(connectivity.lock().last(), Some(&ConnectionState::Disconnected));
    assert!(wait_until(|| server.unsubscribes_for("tok-1") == 1).await);
    assert!(wait_until(|| server.open_sockets() == 0).await);
}

#[tokio::test]
async fn test_call_opens_and_releases_connection() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let call = tokio::spawn({
        let registry = registry.clone();
        async move { registry.call("quote.get", json!({"symbol": "SOL"})).await }
    });

    assert!(wait_until(|| server.count("quote.get") == 1).await);
    assert!(registry.is_active());
    let id = server.calls("quote.get")[0]["id"].clone();
    server.respond(&id, json!({"price": 140}));

    let quote = within(call).await.expect("join").expect("call");
    assert_eq!(quote, json!({"price": 140}));
    assert!(!registry.is_active());
    assert!(wait_until(|| server.open_sockets() == 0).await);
}

// ============================================================================
// Callbacks
// ============================================================================

#[tokio::test]
async fn test_listener_may_unsubscribe_itself() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    let slot: Arc<Mutex<Option<FeedSubscription>>> = Arc::new(Mutex::new(None));
    let own = Arc::clone(&slot);
    let (seen, on_data) = values();
    let subscription = registry.subscribe_data("tok-1", move |update| {
        on_data(update);
        if let Some(subscription) = own.lock().take() {
            subscription.unsubscribe();
        }
    });
    *slot.lock() = Some(subscription);

    let (other, on_other) = values();
    let _other = registry.subscribe_data("tok-1", on_other);
    assert!(subscribed(&registry, "tok-1").await);

    server.push("tok-1", json!(1));
    server.push("tok-1", json!(2));

    assert!(wait_until(|| other.lock().len() == 2).await);
    assert_eq!(*seen.lock(), vec![json!(1)]);
    assert_eq!(registry.listener_count("tok-1"), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_updates_stay_ordered_while_listeners_attach() {
    const PUSHES: i64 = 200;

    let server = Arc::new(MockServer::start().await);
    let registry = FeedRegistry::new(server.config());

    let _first = registry.subscribe_data("tok-1", |_| {});
    assert!(subscribed(&registry, "tok-1").await);

    let pusher = tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            for n in 0..PUSHES {
                server.push("tok-1", json!(n));
                tokio::task::yield_now().await;
            }
        }
    });

    let mut listeners = Vec::new();
    for _ in 0..PUSHES {
        let (seen, on_data) = values();
        listeners.push((seen, registry.subscribe_data("tok-1", on_data)));
        tokio::task::yield_now().await;
    }
    within(pusher).await.expect("pusher");

    let last = json!(PUSHES - 1);
    assert!(
        wait_until(|| listeners
            .iter()
            .all(|(seen, _)| seen.lock().last() == Some(&last)))
        .await
    );

    for (seen, _) in &listeners {
        let observed: Vec<i64> = seen.lock().iter().filter_map(Value::as_i64).collect();
        assert!(
            observed.windows(2).all(|pair| pair[0] < pair[1]),
            "updates out of order: {observed:?}"
        );
    }
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test]
async fn test_two_consumers_hand_over_one_feed() {
    let server = MockServer::start().await;
    let registry = FeedRegistry::new(server.config());

    // A subscribes and sees the first value.
    let (a_seen, on_a) = values();
    let a = registry.subscribe_data("tok-1", on_a);
    assert!(subscribed(&registry, "tok-1").await);
    server.push("tok-1", json!({"price": 10}));
    assert!(wait_until(|| a_seen.lock().len() == 1).await);

    // B joins and gets the cached value at once.
    let (b_seen, on_b) = values();
    let b = registry.subscribe_data("tok-1", on_b);
    assert_eq!(*b_seen.lock(), vec![json!({"price": 10})]);

    // A leaves; the next value reaches only B.
    a.unsubscribe();
    server.push("tok-1", json!({"price": 11}));
    assert!(wait_until(|| b_seen.lock().len() == 2).await);
    assert_eq!(*a_seen.lock(), vec![json!({"price": 10})]);
    assert_eq!(b_seen.lock()[1], json!({"price": 11}));

    // B leaves; the feed and the connection are released.
    b.unsubscribe();
    assert!(wait_until(|| server.open_sockets() == 0).await);
    assert_eq!(server.subscribes_for("tok-1"), 1);
    assert_eq!(server.unsubscribes_for("tok-1"), 1);

    let settled = server.received().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received().len(), settled);
    assert_eq!(server.accepted(), 1);
}
