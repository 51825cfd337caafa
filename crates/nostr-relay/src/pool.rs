//! Relay pool: fan-out publish/subscribe across many connections, with
//! cross-relay event deduplication and resubscribe-on-reconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nostr_core::Event;
use tokio::sync::Mutex;

use crate::connection::{RelayConfig, RelayConnection, RelayConnectionState};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::message::RelayMessage;

/// A handler invoked once per fresh (non-duplicate) event delivered to a
/// subscription. Must tolerate concurrent invocation — one call per
/// distinct event id, potentially from different relay drain tasks.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// Dedup cache and pool-wide sizing knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub default_relay_config: RelayConfig,
    pub max_deduplication_cache_size: usize,
    pub deduplication_cache_ttl: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_relay_config: RelayConfig::default(),
            max_deduplication_cache_size: 10_000,
            deduplication_cache_ttl: Duration::from_secs(300),
        }
    }
}

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const SUBSCRIBE_SETTLE_DELAY: Duration = Duration::from_millis(10);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs()
}

struct DedupCache {
    seen: HashMap<String, u64>,
    last_cleanup: u64,
    max_size: usize,
    ttl_secs: u64,
}

impl DedupCache {
    fn new(config: &PoolConfig) -> Self {
        Self {
            seen: HashMap::new(),
            last_cleanup: now_secs(),
            max_size: config.max_deduplication_cache_size,
            ttl_secs: config.deduplication_cache_ttl.as_secs(),
        }
    }

    /// Returns `true` if `event_id` had not been seen before (and is now
    /// recorded), `false` if it's a duplicate still within TTL. `max_size`
    /// is only enforced during the periodic [`DedupCache::cleanup`] sweep,
    /// so the cache may transiently overshoot it between sweeps rather
    /// than paying an eviction scan on every single insert.
    fn admit(&mut self, event_id: &str) -> bool {
        let now = now_secs();
        if now.saturating_sub(self.last_cleanup) > CLEANUP_INTERVAL.as_secs() {
            self.cleanup(now);
        }

        if self.seen.contains_key(event_id) {
            return false;
        }
        self.seen.insert(event_id.to_string(), now);
        true
    }

    fn cleanup(&mut self, now: u64) {
        self.last_cleanup = now;
        let before = self.seen.len();
        self.seen.retain(|_, ts| now.saturating_sub(*ts) < self.ttl_secs);

        if self.seen.len() > self.max_size {
            let mut by_age: Vec<(String, u64)> =
                self.seen.iter().map(|(k, v)| (k.clone(), *v)).collect();
            by_age.sort_by_key(|(_, ts)| *ts);
            let overflow = self.seen.len() - self.max_size;
            for (id, _) in by_age.into_iter().take(overflow) {
                self.seen.remove(&id);
            }
        }

        let evicted = before.saturating_sub(self.seen.len());
        if evicted > 0 {
            tracing::debug!("dedup cache cleanup evicted {evicted} entries");
        }
    }
}

struct SubscriptionRecord {
    filters: Vec<Filter>,
    handler: EventHandler,
}

struct PoolInner {
    connections: HashMap<String, RelayConnection>,
    subscriptions: HashMap<String, SubscriptionRecord>,
    dedup: DedupCache,
    config: PoolConfig,
    /// Keyed by (relay URL, sub_id); aborted and replaced whenever a new
    /// drain task is spawned for the same pair, so a connection that
    /// flaps repeatedly doesn't accumulate one drain task per reconnect.
    drain_tasks: HashMap<(String, String), tokio::task::JoinHandle<()>>,
}

/// Fans events out to, and deduplicates events in from, a set of relay
/// connections keyed by URL.
pub struct RelayPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl RelayPool {
    pub fn new(config: PoolConfig) -> Self {
        let dedup = DedupCache::new(&config);
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                connections: HashMap::new(),
                subscriptions: HashMap::new(),
                dedup,
                config,
                drain_tasks: HashMap::new(),
            })),
        }
    }

    /// Add a relay by URL, starting a watcher that resubscribes every
    /// active subscription whenever the connection comes back up after a
    /// drop. Idempotent: returns the existing connection if `url` is
    /// already known.
    pub async fn add(&self, url: impl Into<String>, config: Option<RelayConfig>) -> RelayConnection {
        let url = url.into();
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.connections.get(&url) {
            return existing.clone();
        }

        let relay_config = config.unwrap_or_else(|| inner.config.default_relay_config.clone());
        let connection = RelayConnection::spawn(url.clone(), relay_config);
        inner.connections.insert(url.clone(), connection.clone());
        drop(inner);

        spawn_resubscribe_watcher(self.inner.clone(), connection.clone());
        connection
    }

    /// Attempt to connect every known relay in parallel; returns the
    /// number that succeeded.
    pub async fn connect_all(&self) -> Result<usize> {
        let connections: Vec<RelayConnection> = {
            let inner = self.inner.lock().await;
            inner.connections.values().cloned().collect()
        };
        if connections.is_empty() {
            return Ok(0);
        }

        let results = futures_util::future::join_all(connections.iter().map(|c| async {
            c.connect().await.ok();
            wait_for_connected(c, Duration::from_secs(10)).await
        }))
        .await;

        let successes = results.into_iter().filter(|ok| *ok).count();
        if successes == 0 {
            return Err(Error::ConnectionFailed(
                "All relays failed to connect".to_string(),
            ));
        }
        Ok(successes)
    }

    /// Publish `event` to every relay in parallel; succeeds if at least
    /// one relay accepts it.
    pub async fn publish(&self, event: Event) -> Result<usize> {
        let connections: Vec<RelayConnection> = {
            let inner = self.inner.lock().await;
            inner.connections.values().cloned().collect()
        };

        let results = futures_util::future::join_all(
            connections.iter().map(|c| c.publish(event.clone())),
        )
        .await;

        let successes = results.iter().filter(|r| r.is_ok()).count();
        if successes == 0 {
            if let Some(Err(last)) = results.into_iter().last() {
                return Err(last);
            }
            return Err(Error::RelayError("no relays configured".to_string()));
        }
        Ok(successes)
    }

    /// Subscribe `filters` under `sub_id`, invoking `handler` once per
    /// fresh event across all relays. The subscription record is stored
    /// before any `REQ` frame is sent so inbound events can never race
    /// ahead of bookkeeping.
    pub async fn subscribe(
        &self,
        sub_id: impl Into<String>,
        filters: Vec<Filter>,
        handler: EventHandler,
    ) -> Result<usize> {
        let sub_id = sub_id.into();
        let connections: Vec<RelayConnection> = {
            let mut inner = self.inner.lock().await;
            inner.subscriptions.insert(
                sub_id.clone(),
                SubscriptionRecord {
                    filters: filters.clone(),
                    handler,
                },
            );
            inner.connections.values().cloned().collect()
        };

        for connection in &connections {
            register_drain_task(self.inner.clone(), connection.clone(), sub_id.clone()).await;
        }

        tokio::time::sleep(SUBSCRIBE_SETTLE_DELAY).await;

        let results = futures_util::future::join_all(
            connections
                .iter()
                .map(|c| c.subscribe(sub_id.clone(), filters.clone())),
        )
        .await;

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        if accepted == 0 && !connections.is_empty() {
            return Err(Error::RelayError(
                "no relay accepted the subscription".to_string(),
            ));
        }
        Ok(accepted)
    }

    /// Remove the subscription record and best-effort `CLOSE` every relay.
    pub async fn unsubscribe(&self, sub_id: impl Into<String>) {
        let sub_id = sub_id.into();
        let connections: Vec<RelayConnection> = {
            let mut inner = self.inner.lock().await;
            inner.subscriptions.remove(&sub_id);
            let urls: Vec<String> = inner
                .drain_tasks
                .keys()
                .filter(|(_, id)| *id == sub_id)
                .map(|(url, _)| url.clone())
                .collect();
            for url in urls {
                if let Some(handle) = inner.drain_tasks.remove(&(url, sub_id.clone())) {
                    handle.abort();
                }
            }
            inner.connections.values().cloned().collect()
        };
        for connection in &connections {
            let _ = connection.unsubscribe(sub_id.clone()).await;
        }
    }

    pub async fn relay_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }
}

async fn wait_for_connected(connection: &RelayConnection, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut state_rx = connection.state_changes();
    loop {
        if matches!(*state_rx.borrow(), RelayConnectionState::Connected) {
            return true;
        }
        if matches!(*state_rx.borrow(), RelayConnectionState::Failed(_)) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        if tokio::time::timeout(remaining, state_rx.changed()).await.is_err() {
            return false;
        }
    }
}

/// Drain one connection's inbound message stream for frames matching
/// `sub_id`, deduplicating events across relays before invoking the
/// subscription's handler. Runs until the subscription is removed or the
/// broadcast channel closes (e.g. the connection actor stops).
///
/// Registers the spawned task under `(connection.url(), sub_id)`, aborting
/// whatever task previously held that key — a connection that reconnects
/// repeatedly must not accumulate one drain task per reconnect.
async fn register_drain_task(pool: Arc<Mutex<PoolInner>>, connection: RelayConnection, sub_id: String) {
    let key = (connection.url().to_string(), sub_id.clone());

    let task_pool = pool.clone();
    let task_sub_id = sub_id.clone();
    let handle = tokio::spawn(async move {
        let pool = task_pool;
        let sub_id = task_sub_id;
        let mut messages = connection.messages();
        loop {
            let msg = match messages.recv().await {
                Ok(msg) => msg,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            let still_active = {
                let inner = pool.lock().await;
                inner.subscriptions.contains_key(&sub_id)
            };
            if !still_active {
                break;
            }

            match msg {
                RelayMessage::Event { sub_id: frame_sub, event } if frame_sub == sub_id => {
                    let mut inner = pool.lock().await;
                    let fresh = inner.dedup.admit(&event.id);
                    let handler = inner.subscriptions.get(&sub_id).map(|r| r.handler.clone());
                    drop(inner);
                    if fresh {
                        if let Some(handler) = handler {
                            handler(event);
                        }
                    }
                }
                RelayMessage::Eose { sub_id: frame_sub } if frame_sub == sub_id => {
                    // No separate EOSE callback in this pool's handler shape;
                    // forwarding happens implicitly by virtue of draining.
                }
                _ => {}
            }
        }
    });

    let mut inner = pool.lock().await;
    if let Some(previous) = inner.drain_tasks.insert(key, handle) {
        previous.abort();
    }
}

/// Watch a connection's state transitions; when it returns to `Connected`
/// after having left it, resend `REQ` for every subscription currently
/// known to the pool.
fn spawn_resubscribe_watcher(pool: Arc<Mutex<PoolInner>>, connection: RelayConnection) {
    tokio::spawn(async move {
        let mut state_rx = connection.state_changes();
        let mut was_connected = matches!(*state_rx.borrow(), RelayConnectionState::Connected);
        // Only resend REQ frames once we've actually seen this connection
        // reach Connected before: the very first connect is already handled
        // by subscribe()'s own explicit REQ, and firing here too would send
        // a duplicate and register a second drain task for it.
        let mut has_been_connected = was_connected;

        while state_rx.changed().await.is_ok() {
            let now_connected = matches!(*state_rx.borrow(), RelayConnectionState::Connected);
            if now_connected && !was_connected && has_been_connected {
                let subs: Vec<(String, Vec<Filter>)> = {
                    let inner = pool.lock().await;
                    inner
                        .subscriptions
                        .iter()
                        .map(|(id, rec)| (id.clone(), rec.filters.clone()))
                        .collect()
                };
                for (sub_id, filters) in subs {
                    register_drain_task(pool.clone(), connection.clone(), sub_id.clone()).await;
                    let _ = connection.subscribe(sub_id, filters).await;
                }
            }
            if now_connected {
                has_been_connected = true;
            }
            was_connected = now_connected;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_cache_admits_each_id_once() {
        let mut cache = DedupCache::new(&PoolConfig::default());
        assert!(cache.admit("a"));
        assert!(!cache.admit("a"));
        assert!(cache.admit("b"));
    }

    #[test]
    fn dedup_cache_allows_bounded_overshoot_until_cleanup() {
        let mut config = PoolConfig::default();
        config.max_deduplication_cache_size = 2;
        let mut cache = DedupCache::new(&config);
        assert!(cache.admit("a"));
        assert!(cache.admit("b"));
        assert!(cache.admit("c"));
        // admit() never evicts on its own; overshoot is allowed until the
        // next cleanup sweep.
        assert_eq!(cache.seen.len(), 3);

        cache.cleanup(now_secs());
        assert!(cache.seen.len() <= 2);
    }

    #[tokio::test]
    async fn pool_add_is_idempotent() {
        let pool = RelayPool::new(PoolConfig::default());
        let a = pool.add("wss://relay.example", None).await;
        let b = pool.add("wss://relay.example", None).await;
        assert_eq!(a.url(), b.url());
        assert_eq!(pool.relay_count().await, 1);
    }

    #[tokio::test]
    async fn connect_all_on_empty_pool_returns_zero() {
        let pool = RelayPool::new(PoolConfig::default());
        assert_eq!(pool.connect_all().await.unwrap(), 0);
    }

    /// The resubscribe watcher must not mistake the very first connect for
    /// a reconnect-after-drop: `subscribe()` already sends its own `REQ`,
    /// so the watcher firing too would double-send it and leak a second
    /// drain task.
    #[tokio::test]
    async fn subscribe_does_not_duplicate_req_on_initial_connect() {
        use futures_util::{SinkExt, StreamExt};
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("ws://{addr}");

        let (reqs_tx, reqs_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut reqs = Vec::new();
            loop {
                match tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
                    Ok(Some(Ok(WsMessage::Ping(payload)))) => {
                        let _ = ws.send(WsMessage::Pong(payload)).await;
                    }
                    Ok(Some(Ok(WsMessage::Text(text)))) if text.contains("REQ") => {
                        reqs.push(text.to_string());
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) | Ok(None) => break,
                    Err(_) => break, // idle for 300ms: no more frames coming
                }
            }
            let _ = reqs_tx.send(reqs);
        });

        let pool = RelayPool::new(PoolConfig::default());
        let conn = pool.add(url, None).await;
        conn.connect().await.unwrap();

        pool.subscribe("sub1", vec![Filter::new().kinds([1])], Arc::new(|_event| {}))
            .await
            .unwrap();

        let reqs = tokio::time::timeout(Duration::from_secs(2), reqs_rx)
            .await
            .expect("mock relay task never finished")
            .unwrap();
        assert_eq!(reqs.len(), 1, "initial connect must send exactly one REQ, not a watcher-duplicated one");
    }

    /// Covers the documented reconnect behavior: after an unexpected
    /// socket drop, the connection reconnects on its own backoff and the
    /// pool replays the same `REQ` frame against the new socket.
    #[tokio::test]
    async fn resubscribes_after_relay_drops_and_reconnects() {
        use futures_util::{SinkExt, StreamExt};
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        async fn accept_req(listener: &TcpListener) -> String {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = ws.send(WsMessage::Pong(payload)).await;
                    }
                    Some(Ok(WsMessage::Text(text))) if text.contains("REQ") => {
                        return text.to_string();
                    }
                    Some(Ok(_)) => {}
                    _ => panic!("connection closed before REQ arrived"),
                }
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("ws://{addr}");

        let (first_tx, first_rx) = tokio::sync::oneshot::channel();
        let (second_tx, second_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let first_req = accept_req(&listener).await;
            let _ = first_tx.send(first_req);
            // the relay connection is dropped here when this WS stream
            // falls out of scope, simulating an unexpected disconnect.
            let second_req = accept_req(&listener).await;
            let _ = second_tx.send(second_req);
        });

        let mut relay_config = RelayConfig::default();
        relay_config.initial_reconnect_delay = Duration::from_millis(10);
        relay_config.max_reconnect_delay = Duration::from_millis(20);

        let pool = RelayPool::new(PoolConfig::default());
        let conn = pool.add(url, Some(relay_config)).await;
        conn.connect().await.unwrap();

        pool.subscribe("sub1", vec![Filter::new().kinds([1])], Arc::new(|_event| {}))
            .await
            .unwrap();

        let first_req = tokio::time::timeout(Duration::from_secs(2), first_rx)
            .await
            .expect("first REQ never arrived")
            .unwrap();
        assert!(first_req.contains("sub1"));

        let second_req = tokio::time::timeout(Duration::from_secs(2), second_rx)
            .await
            .expect("resubscribe REQ never arrived after reconnect")
            .unwrap();
        assert!(second_req.contains("sub1"));
    }
}
