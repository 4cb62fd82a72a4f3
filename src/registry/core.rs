//! Feed registry core.

// ============================================================================
// Imports
// ============================================================================

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::identifiers::{FeedKey, ListenerId};
use crate::transport::connection::millis;
use crate::transport::{Backoff, Connection, ConnectionState, SubscriptionHandle, invoke_guarded};

use super::feed::{
    ConnectivityHandler, DataHandler, FeedRecord, FeedUpdate, ListenerEntry, ServerSub,
};
use super::handle::FeedSubscription;

// ============================================================================
// Types
// ============================================================================

/// Connection owned by an active registry.
struct Link {
    connection: Connection,
    state_listener: ListenerId,
    /// Last state reported by the connection.
    state: ConnectionState,
}

impl Link {
    /// Detaches the registry's state listener and closes the connection.
    fn shut(self) {
        self.connection.remove_state_listener(self.state_listener);
        self.connection.close();
    }
}

/// A server subscribe to run outside the registry lock.
struct SubscribeJob {
    key: FeedKey,
    generation: u64,
    epoch: u64,
    connection: Connection,
}

/// Mutable registry state.
#[derive(Default)]
struct RegistryState {
    link: Option<Link>,
    /// Bumped whenever the link is torn down.
    epoch: u64,
    feeds: FxHashMap<FeedKey, FeedRecord>,
    cache: FxHashMap<FeedKey, FeedUpdate>,
    next_generation: u64,
    /// Sequence of the last update received on any feed.
    next_seq: u64,
    active_calls: usize,
}

impl RegistryState {
    /// Marks `key` as subscribing if it needs a server subscription.
    fn begin_subscribe(&mut self, key: &FeedKey) -> Option<SubscribeJob> {
        let link = self.link.as_ref()?;
        if !link.state.is_connected() {
            return None;
        }

        let record = self.feeds.get_mut(key)?;
        if record.listeners.is_empty() || !record.server.is_unsubscribed() {
            return None;
        }

        self.next_generation += 1;
        record.server = ServerSub::Subscribing(self.next_generation);

        Some(SubscribeJob {
            key: key.clone(),
            generation: self.next_generation,
            epoch: self.epoch,
            connection: link.connection.clone(),
        })
    }

    /// Returns `true` when nothing needs the connection.
    fn is_idle(&self) -> bool {
        self.active_calls == 0 && self.feeds.values().all(|record| record.listeners.is_empty())
    }

    /// Takes the link and forgets every feed, returning live handles.
    fn teardown(&mut self) -> (Option<Link>, Vec<SubscriptionHandle>) {
        self.epoch += 1;
        let handles = self
            .feeds
            .drain()
            .filter_map(|(_, record)| match record.server {
                ServerSub::Subscribed(handle) => Some(handle),
                _ => None,
            })
            .collect();
        self.cache.clear();
        (self.link.take(), handles)
    }
}

// ============================================================================
// FeedRegistry
// ============================================================================

/// Shared subscription registry over one connection.
///
/// Consumers attach to logical feeds by [`FeedKey`]. However many consumers
/// watch a feed, the server sees one subscription. The latest value of each
/// feed is cached and replayed to late subscribers. After a reconnect every
/// watched feed is subscribed again.
///
/// The connection is opened by the first subscription and closed when the
/// last one goes away.
///
/// # Example
///
/// ```ignore
/// use feed_sync::{ClientConfig, FeedRegistry};
///
/// let registry = FeedRegistry::new(ClientConfig::builder("ws://127.0.0.1:9000").build()?);
///
/// let subscription = registry.subscribe(
///     "tok-1",
///     |update| println!("{}: {}", update.key(), update.value()),
///     |state| println!("connection {state}"),
/// );
///
/// // ...
/// subscription.unsubscribe();
/// ```
#[derive(Clone)]
pub struct FeedRegistry {
    inner: Arc<RegistryInner>,
}

impl FeedRegistry {
    /// Creates an idle registry. Nothing is dialled yet.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// Attaches to a feed with data and connectivity callbacks.
    ///
    /// A cached value is delivered to `on_data` before this returns, and
    /// `on_connectivity` is told the current state.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn subscribe<D, C>(
        &self,
        key: impl Into<FeedKey>,
        on_data: D,
        on_connectivity: C,
    ) -> FeedSubscription
    where
        D: Fn(&FeedUpdate) + Send + Sync + 'static,
        C: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.inner
            .attach(key.into(), Arc::new(on_data), Some(Arc::new(on_connectivity)))
    }

    /// Attaches to a feed with a data callback only.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn subscribe_data<D>(&self, key: impl Into<FeedKey>, on_data: D) -> FeedSubscription
    where
        D: Fn(&FeedUpdate) + Send + Sync + 'static,
    {
        self.inner.attach(key.into(), Arc::new(on_data), None)
    }

    /// Makes a call over the shared connection.
    ///
    /// Opens the connection if idle and closes it again afterwards when no
    /// feed needs it.
    ///
    /// # Errors
    ///
    /// See [`Connection::call`].
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let connection = {
            let mut state = self.inner.state.lock();
            state.active_calls += 1;
            self.inner.ensure_link(&mut state)
        };

        let _guard = CallGuard {
            inner: &self.inner,
        };
        connection.call(method, params).await
    }

    /// Shuts everything down.
    ///
    /// Live feeds are unsubscribed, the connection is closed and every
    /// connectivity callback sees [`ConnectionState::Disconnected`].
    /// Outstanding subscriptions become inert.
    pub fn disconnect(&self) {
        let (link, records) = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.cache.clear();
            let records: Vec<FeedRecord> = state.feeds.drain().map(|(_, record)| record).collect();
            (state.link.take(), records)
        };

        let mut handles = Vec::new();
        let mut connectivity = Vec::new();
        let mut flags = Vec::new();
        for record in records {
            connectivity.extend(record.connectivity_handlers());
            flags.extend(record.listeners.iter().map(|entry| Arc::clone(entry.active())));
            if let ServerSub::Subscribed(handle) = record.server {
                handles.push(handle);
            }
        }

        drop(handles);
        if let Some(link) = link {
            info!(connection_id = %link.connection.id(), "Registry disconnected");
            link.shut();
        }

        notify_connectivity(connectivity, ConnectionState::Disconnected);
        for flag in flags {
            flag.store(false, Ordering::Release);
        }
    }

    /// Returns the connection state, or `Disconnected` when idle.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner
            .state
            .lock()
            .link
            .as_ref()
            .map_or(ConnectionState::Disconnected, |link| link.connection.state())
    }

    /// Returns `true` while the registry holds a connection.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().link.is_some()
    }

    /// Returns the number of feeds with at least one consumer.
    #[must_use]
    pub fn feed_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .feeds
            .values()
            .filter(|record| !record.listeners.is_empty())
            .count()
    }

    /// Returns the number of consumers attached to `key`.
    #[must_use]
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner
            .state
            .lock()
            .feeds
            .get(key)
            .map_or(0, |record| record.listeners.len())
    }

    /// Returns the cached value of `key`.
    #[must_use]
    pub fn cached(&self, key: &str) -> Option<FeedUpdate> {
        self.inner.state.lock().cache.get(key).cloned()
    }

    /// Returns `true` if `key` has a live server subscription.
    #[must_use]
    pub fn is_server_subscribed(&self, key: &str) -> bool {
        self.inner
            .state
            .lock()
            .feeds
            .get(key)
            .is_some_and(|record| record.server.is_subscribed())
    }
}

impl std::fmt::Debug for FeedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedRegistry")
            .field("endpoint", &self.inner.config.endpoint().as_str())
            .field("feeds", &self.feed_count())
            .finish()
    }
}

// ============================================================================
// CallGuard
// ============================================================================

/// Releases the link after a registry call if nothing else needs it.
struct CallGuard<'a> {
    inner: &'a Arc<RegistryInner>,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let link = {
            let mut state = self.inner.state.lock();
            state.active_calls = state.active_calls.saturating_sub(1);
            if state.is_idle() {
                state.teardown().0
            } else {
                None
            }
        };

        if let Some(link) = link {
            debug!(connection_id = %link.connection.id(), "Closing idle connection after call");
            link.shut();
        }
    }
}

// ============================================================================
// RegistryInner
// ============================================================================

/// Registry state shared with callbacks and handles.
pub(crate) struct RegistryInner {
    config: ClientConfig,
    state: Mutex<RegistryState>,
}

impl RegistryInner {
    /// Returns the link's connection, creating the link if absent.
    fn ensure_link(self: &Arc<Self>, state: &mut RegistryState) -> Connection {
        if let Some(link) = &state.link {
            return link.connection.clone();
        }

        let connection = Connection::new(self.config.clone());
        let weak = Arc::downgrade(self);
        let epoch = state.epoch;
        let state_listener = connection.on_state_change(move |next| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state(epoch, next);
            }
        });

        info!(connection_id = %connection.id(), endpoint = %self.config.endpoint(), "Registry activated");

        state.link = Some(Link {
            connection: connection.clone(),
            state_listener,
            state: connection.state(),
        });
        connection
    }

    fn attach(
        self: &Arc<Self>,
        key: FeedKey,
        on_data: DataHandler,
        on_connectivity: Option<ConnectivityHandler>,
    ) -> FeedSubscription {
        let id = ListenerId::next();
        let active = Arc::new(AtomicBool::new(true));
        let entry = ListenerEntry::new(id, on_data, on_connectivity.clone(), Arc::clone(&active));
        let sink = entry.sink.clone();

        let (connection, cached, job) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let connection = self.ensure_link(state);
            connection.open();

            state
                .feeds
                .entry(key.clone())
                .or_default()
                .listeners
                .push(entry);

            let cached = state.cache.get(&key).cloned();
            let job = state.begin_subscribe(&key);
            (connection, cached, job)
        };

        debug!(feed = %key, listener = %id, "Listener attached");

        if let Some(job) = job {
            self.spawn_subscribe(job);
        }

        // Skipped if a newer push already reached this listener.
        if let Some(update) = cached
            && sink.deliver(&update)
        {
            trace!(feed = %key, "Replayed cached value");
        }

        if let Some(handler) = on_connectivity
            && active.load(Ordering::Acquire)
        {
            let current = connection.state();
            invoke_guarded("connectivity listener", || handler(current));
        }

        FeedSubscription::new(Arc::downgrade(self), key, id, active)
    }

    /// Issues a server subscribe for `job` on a background task.
    fn spawn_subscribe(self: &Arc<Self>, job: SubscribeJob) {
        let params = self.config.feed().subscribe_params(&job.key);

        let weak = Arc::downgrade(self);
        let feed = job.key.clone();
        let on_push = move |payload: Value| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(&feed, payload);
            }
        };

        debug!(feed = %job.key, generation = job.generation, "Subscribing");

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let result = job.connection.subscribe(params, on_push).await;
            if let Some(inner) = weak.upgrade() {
                inner.complete_subscribe(job, result);
            }
        });
    }

    /// Records the outcome of a server subscribe.
    ///
    /// A failed subscribe is retried with the reconnect backoff while the
    /// link stays up, at most `max_attempts` times in a row.
    fn complete_subscribe(self: &Arc<Self>, job: SubscribeJob, result: Result<SubscriptionHandle>) {
        let mut retry = None;
        let discarded = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let current = state.epoch == job.epoch
                && state.feeds.get(&job.key).is_some_and(|record| {
                    matches!(record.server, ServerSub::Subscribing(generation) if generation == job.generation)
                });

            if !current {
                trace!(feed = %job.key, generation = job.generation, "Discarding stale subscribe result");
                result.ok()
            } else if state.feeds.get(&job.key).is_some_and(|record| record.listeners.is_empty()) {
                // Everyone left while the subscribe was in flight.
                state.feeds.remove(&job.key);
                state.cache.remove(&job.key);
                result.ok()
            } else {
                let Some(record) = state.feeds.get_mut(&job.key) else {
                    return;
                };
                match result {
                    Ok(handle) => {
                        debug!(feed = %job.key, key = %handle.key(), "Feed subscribed");
                        record.server = ServerSub::Subscribed(handle);
                        record.failures = 0;
                    }
                    Err(e) => {
                        record.server = ServerSub::Unsubscribed;
                        record.failures += 1;

                        let policy = *self.config.reconnect();
                        if record.failures <= policy.max_attempts {
                            let delay = Backoff::new(policy).delay_for(record.failures - 1);
                            warn!(
                                feed = %job.key,
                                error = %e,
                                attempt = record.failures,
                                delay_ms = millis(delay),
                                "Feed subscribe failed, retrying"
                            );
                            retry = Some(delay);
                        } else {
                            error!(
                                feed = %job.key,
                                error = %e,
                                attempts = record.failures,
                                "Feed subscribe failed, waiting for reconnect"
                            );
                        }
                    }
                }
                None
            }
        };

        // Dropping the handle unsubscribes at the server.
        drop(discarded);

        if let Some(delay) = retry {
            self.schedule_resubscribe(job.key, job.epoch, delay);
        }
    }

    /// Subscribes `key` again after `delay` if the link is still `epoch`.
    fn schedule_resubscribe(self: &Arc<Self>, key: FeedKey, epoch: u64, delay: Duration) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let job = {
                let mut state = inner.state.lock();
                if state.epoch != epoch {
                    return;
                }
                state.begin_subscribe(&key)
            };

            if let Some(job) = job {
                inner.spawn_subscribe(job);
            }
        });
    }

    /// Caches a push and fans it out to the feed's listeners.
    fn dispatch(&self, key: &FeedKey, payload: Value) {
        let (update, sinks) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let Some(record) = state.feeds.get(key) else {
                trace!(feed = %key, "Push for untracked feed");
                return;
            };

            let sinks = record.data_sinks();
            state.next_seq += 1;
            let update = FeedUpdate::new(key.clone(), payload, state.next_seq);
            state.cache.insert(key.clone(), update.clone());
            (update, sinks)
        };

        trace!(feed = %key, listeners = sinks.len(), "Dispatching update");

        for sink in sinks {
            sink.deliver(&update);
        }
    }

    /// Reacts to a connection state change.
    fn on_state(self: &Arc<Self>, epoch: u64, next: ConnectionState) {
        let (stale, jobs, connectivity) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.epoch != epoch {
                return;
            }
            let Some(link) = state.link.as_mut() else {
                return;
            };
            link.state = next;

            let mut stale = Vec::new();
            let mut jobs = Vec::new();

            match next {
                ConnectionState::Connected => {
                    for record in state.feeds.values_mut() {
                        record.failures = 0;
                    }
                    let keys: Vec<FeedKey> = state.feeds.keys().cloned().collect();
                    jobs.extend(keys.iter().filter_map(|key| state.begin_subscribe(key)));
                }
                ConnectionState::Disconnected | ConnectionState::Exhausted => {
                    state.feeds.retain(|_, record| !record.listeners.is_empty());
                    for record in state.feeds.values_mut() {
                        if let ServerSub::Subscribed(handle) = mem::take(&mut record.server) {
                            stale.push(handle);
                        }
                    }
                }
                ConnectionState::Connecting => {}
            }

            let connectivity: Vec<_> = state
                .feeds
                .values()
                .flat_map(FeedRecord::connectivity_handlers)
                .collect();

            (stale, jobs, connectivity)
        };

        if !jobs.is_empty() {
            info!(feeds = jobs.len(), "Resubscribing feeds");
        }

        // Handles of a lost session only clean up locally.
        drop(stale);
        for job in jobs {
            self.spawn_subscribe(job);
        }

        notify_connectivity(connectivity, next);
    }

    /// Detaches one listener, releasing the feed and link as they empty.
    pub(crate) fn release(&self, key: &FeedKey, listener: ListenerId) {
        let (handle, link) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let Some(record) = state.feeds.get_mut(key) else {
                return;
            };
            if !record.detach(listener) {
                return;
            }
            debug!(feed = %key, %listener, "Listener detached");

            let mut handle = None;
            if record.listeners.is_empty() {
                match mem::take(&mut record.server) {
                    ServerSub::Subscribed(subscribed) => {
                        handle = Some(subscribed);
                        state.feeds.remove(key);
                    }
                    // Kept until the in-flight subscribe lands.
                    ServerSub::Subscribing(generation) => {
                        record.server = ServerSub::Subscribing(generation);
                    }
                    ServerSub::Unsubscribed => {
                        state.feeds.remove(key);
                    }
                }
                state.cache.remove(key);
                debug!(feed = %key, "Feed released");
            }

            let link = if state.is_idle() {
                state.teardown().0
            } else {
                None
            };
            (handle, link)
        };

        // Unsubscribe goes out before the close.
        drop(handle);
        if let Some(link) = link {
            info!(connection_id = %link.connection.id(), "No listeners left, closing connection");
            link.shut();
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let (link, handles) = self.state.get_mut().teardown();
        drop(handles);
        if let Some(link) = link {
            link.shut();
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

fn notify_connectivity(
    handlers: Vec<(Arc<AtomicBool>, ConnectivityHandler)>,
    state: ConnectionState,
) {
    for (active, handler) in handlers {
        if active.load(Ordering::Acquire) {
            invoke_guarded("connectivity listener", || handler(state));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
