//! Reconnecting WebSocket connection and event loop.
//!
//! # Event Loop
//!
//! Each connection spawns one tokio task that owns the socket and handles:
//!
//! - Incoming frames (responses, pushes)
//! - Outgoing calls from the API, queued while the socket is down
//! - Reconnect backoff and keepalive pings
//! - State transitions, reported to state listeners
//!
//! The task ends when [`Connection::close`] is called or every handle to
//! the connection is dropped.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, RequestId, SubscriptionKey};
use crate::protocol::{Frame, Request};

use super::backoff::Backoff;
use super::correlator::{Correlator, Reply, ReplyReceiver};
use super::dispatcher::PushDispatcher;
use super::listener::{PushHandler, StateHandler, invoke_guarded};
use super::queue::{Enqueued, OutboundQueue, QueuedFrame};
use super::{ConnectionState, SubscriptionHandle};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Start connecting if idle.
    Open,
    /// Write a frame, or queue it while offline.
    Send(QueuedFrame),
    /// Drop the queued frame of an abandoned call.
    Abandon(RequestId),
    /// Shut the connection down for good.
    Close,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between handles and the event loop.
struct Shared {
    id: Uuid,
    config: ClientConfig,
    state: Mutex<ConnectionState>,
    /// Session number of the live socket, 0 when none.
    live_session: AtomicU64,
    closed: AtomicBool,
    correlator: Correlator,
    dispatcher: PushDispatcher,
    listeners: Mutex<Vec<(ListenerId, StateHandler)>>,
}

impl Shared {
    /// Moves to `next`, notifying listeners on change.
    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous == next {
            return;
        }

        debug!(connection_id = %self.id, from = %previous, to = %next, "State changed");

        let listeners: Vec<StateHandler> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for listener in listeners {
            invoke_guarded("state listener", || listener(next));
        }
    }

    fn has_listeners(&self) -> bool {
        !self.listeners.lock().is_empty()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Reconnecting, multiplexed WebSocket connection.
///
/// Carries correlated calls and server pushes over one socket. While the
/// socket is down, calls are queued and written in order once it is back.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and cheap to clone. All clones share one
/// event loop.
///
/// # Example
///
/// ```ignore
/// use feed_sync::{ClientConfig, Connection};
///
/// let config = ClientConfig::builder("ws://127.0.0.1:9000").build()?;
/// let connection = Connection::connect(config);
/// let quote = connection.call("quote.get", serde_json::json!({"symbol": "SOL"})).await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// State shared with the event loop.
    shared: Arc<Shared>,
}

impl Connection {
    /// Creates an idle connection.
    ///
    /// Nothing is dialled until [`open`](Self::open) or the first call.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            correlator: Correlator::new(config.max_pending_calls),
            dispatcher: PushDispatcher::default(),
            state: Mutex::new(ConnectionState::Disconnected),
            live_session: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            config,
        });

        debug!(connection_id = %shared.id, endpoint = %shared.config.endpoint, "Connection created");

        let event_loop = EventLoop::new(Arc::clone(&shared), command_rx);
        tokio::spawn(event_loop.run());

        Self { command_tx, shared }
    }

    /// Creates a connection and starts connecting immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn connect(config: ClientConfig) -> Self {
        let connection = Self::new(config);
        connection.open();
        connection
    }

    /// Starts connecting if idle or exhausted.
    ///
    /// No-op while connecting or connected.
    pub fn open(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Open);
    }

    /// Shuts the connection down.
    ///
    /// Pending calls fail with [`Error::ConnectionClosed`]. The connection
    /// never reconnects afterwards.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!(connection_id = %self.shared.id, "Close requested");
        }
        let _ = self.command_tx.send(ConnectionCommand::Close);
    }

    /// Returns the connection ID used in logs.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Returns the server endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.shared.config.endpoint
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Returns the number of calls awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.correlator.len()
    }

    /// Returns the number of server subscriptions with a live handler.
    #[inline]
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.dispatcher.len()
    }

    /// Registers a state observer.
    ///
    /// Handlers run on the event loop, outside any internal lock.
    pub fn on_state_change<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.shared.listeners.lock().push((id, Arc::new(handler)));
        id
    }

    /// Removes a state observer.
    pub fn remove_state_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    /// Sends a call and waits for its result.
    ///
    /// Uses the configured request timeout, if any.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the server answered with an error
    /// - [`Error::ConnectionLost`] if the socket died after the call was written
    /// - [`Error::ConnectionClosed`] if the connection was closed
    /// - [`Error::ReconnectExhausted`] if reconnection gave up
    /// - [`Error::QueueFull`] or [`Error::QueueOverflow`] if the outbound queue overflowed
    /// - [`Error::TooManyPending`] if too many calls are in flight
    /// - [`Error::RequestTimeout`] if a request timeout is configured and elapsed
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let (id, rx) = self.start_call(method, params, None)?;
        let reply = self
            .await_reply(id, rx, self.shared.config.request_timeout)
            .await?;
        Ok(reply.result)
    }

    /// Sends a call and waits at most `request_timeout` for its result.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`Error::RequestTimeout`] on elapse.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        let (id, rx) = self.start_call(method, params, None)?;
        let reply = self.await_reply(id, rx, Some(request_timeout)).await?;
        Ok(reply.result)
    }

    /// Creates a server subscription and routes its pushes to `handler`.
    ///
    /// The handler is registered before this returns, so no push is missed.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`Error::Protocol`] if the response
    /// carries no subscription key.
    pub async fn subscribe<F>(&self, params: Value, handler: F) -> Result<SubscriptionHandle>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let method = self.shared.config.feed.subscribe_method.clone();
        let hook: PushHandler = Arc::new(handler);

        let (id, rx) = self.start_call(&method, params, Some(hook))?;
        let reply = self
            .await_reply(id, rx, self.shared.config.request_timeout)
            .await?;

        let key = reply
            .subscription
            .ok_or_else(|| Error::protocol("subscribe reply without subscription key"))?;

        debug!(connection_id = %self.shared.id, %key, session = reply.session, "Subscribed");
        Ok(SubscriptionHandle::new(self.clone(), key, reply.session))
    }

    /// Sends a call without waiting for its result.
    pub(crate) fn fire(&self, method: &str, params: Value) {
        if let Err(e) = self.start_call(method, params, None) {
            debug!(connection_id = %self.shared.id, method, error = %e, "Fire-and-forget call not sent");
        }
    }

    /// Returns the session number of the live socket, 0 when none.
    pub(crate) fn live_session(&self) -> u64 {
        self.shared.live_session.load(Ordering::Acquire)
    }

    pub(crate) fn dispatcher(&self) -> &PushDispatcher {
        &self.shared.dispatcher
    }

    /// Registers a call and hands its frame to the event loop.
    fn start_call(
        &self,
        method: &str,
        params: Value,
        hook: Option<PushHandler>,
    ) -> Result<(RequestId, ReplyReceiver)> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let (id, rx) = self.shared.correlator.register(method, hook)?;

        let text = match serde_json::to_string(&Request::new(id, method, params)) {
            Ok(text) => text,
            Err(e) => {
                self.shared.correlator.forget(id);
                return Err(e.into());
            }
        };

        if self
            .command_tx
            .send(ConnectionCommand::Send(QueuedFrame::request(id, text)))
            .is_err()
        {
            self.shared.correlator.forget(id);
            return Err(Error::ConnectionClosed);
        }

        trace!(connection_id = %self.shared.id, %id, method, "Call submitted");
        Ok((id, rx))
    }

    /// Waits for a reply, abandoning the call on timeout or drop.
    async fn await_reply(
        &self,
        id: RequestId,
        rx: ReplyReceiver,
        limit: Option<Duration>,
    ) -> Result<Reply> {
        let guard = AbandonGuard::new(self, id);

        let received = match limit {
            Some(limit) => match timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(connection_id = %self.shared.id, %id, "Call timed out");
                    return Err(Error::request_timeout(id, millis(limit)));
                }
            },
            None => rx.await,
        };

        guard.disarm();

        match received {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

// ============================================================================
// AbandonGuard
// ============================================================================

/// Removes a call from the tables if its future is dropped before a reply.
struct AbandonGuard<'a> {
    connection: &'a Connection,
    id: RequestId,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(connection: &'a Connection, id: RequestId) -> Self {
        Self {
            connection,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.connection.shared.correlator.forget(self.id) {
            trace!(id = %self.id, "Call abandoned");
        }
        let _ = self
            .connection
            .command_tx
            .send(ConnectionCommand::Abandon(self.id));
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// Next phase of the event loop.
enum Step {
    /// Wait for an open or a frame to send.
    Idle,
    /// Dial the endpoint.
    Connect,
    /// Sleep before the next attempt.
    Backoff(Duration),
    /// Exit.
    Shutdown,
}

/// Owner of the socket, the outbound queue and the backoff counter.
struct EventLoop {
    shared: Arc<Shared>,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    queue: OutboundQueue,
    backoff: Backoff,
    session: u64,
}

impl EventLoop {
    fn new(shared: Arc<Shared>, command_rx: mpsc::UnboundedReceiver<ConnectionCommand>) -> Self {
        Self {
            queue: OutboundQueue::new(shared.config.queue),
            backoff: Backoff::new(shared.config.reconnect),
            shared,
            command_rx,
            session: 0,
        }
    }

    async fn run(mut self) {
        let mut step = Step::Idle;

        loop {
            step = match step {
                Step::Idle => self.idle().await,
                Step::Connect => self.connect().await,
                Step::Backoff(delay) => self.wait_backoff(delay).await,
                Step::Shutdown => break,
            };
        }

        self.shutdown();
    }

    // ------------------------------------------------------------------------
    // Offline phases
    // ------------------------------------------------------------------------

    async fn idle(&mut self) -> Step {
        loop {
            match self.command_rx.recv().await {
                Some(ConnectionCommand::Open) => return Step::Connect,
                Some(ConnectionCommand::Send(frame)) => {
                    if self.enqueue(frame) {
                        return Step::Connect;
                    }
                }
                Some(ConnectionCommand::Abandon(id)) => {
                    self.queue.remove(id);
                }
                Some(ConnectionCommand::Close) | None => return Step::Shutdown,
            }
        }
    }

    async fn wait_backoff(&mut self, delay: Duration) -> Step {
        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return Step::Connect,

                command = self.command_rx.recv() => match command {
                    Some(ConnectionCommand::Open) => {}
                    Some(ConnectionCommand::Send(frame)) => {
                        self.enqueue(frame);
                    }
                    Some(ConnectionCommand::Abandon(id)) => {
                        self.queue.remove(id);
                    }
                    Some(ConnectionCommand::Close) | None => return Step::Shutdown,
                }
            }
        }
    }

    async fn connect(&mut self) -> Step {
        self.shared.set_state(ConnectionState::Connecting);

        let connect_timeout = self.shared.config.connect_timeout;
        let endpoint = self.shared.config.endpoint.to_string();
        debug!(connection_id = %self.shared.id, %endpoint, attempt = self.backoff.attempt(), "Connecting");

        let handshake = timeout(connect_timeout, connect_async(endpoint));
        tokio::pin!(handshake);

        let outcome = loop {
            tokio::select! {
                outcome = &mut handshake => break outcome,

                command = self.command_rx.recv() => match command {
                    Some(ConnectionCommand::Open) => {}
                    Some(ConnectionCommand::Send(frame)) => {
                        self.enqueue(frame);
                    }
                    Some(ConnectionCommand::Abandon(id)) => {
                        self.queue.remove(id);
                    }
                    Some(ConnectionCommand::Close) | None => return Step::Shutdown,
                }
            }
        };

        let err = match outcome {
            Ok(Ok((stream, _))) => return self.run_session(stream).await,
            Ok(Err(e)) => Error::from(e),
            Err(_) => Error::connection_timeout(millis(connect_timeout)),
        };

        warn!(connection_id = %self.shared.id, error = %err, "Connect failed");
        self.shared.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect(false)
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    async fn run_session(&mut self, stream: WsStream) -> Step {
        self.session += 1;
        let session = self.session;
        self.backoff.reset();

        let (mut ws_write, mut ws_read) = stream.split();

        // Queued frames go out before anyone sees Connected.
        let flushed = self.queue.len();
        while let Some(frame) = self.queue.pop() {
            if let Err(frame) = self.write_frame(&mut ws_write, frame, session).await {
                self.queue.push_front(frame);
                return self.on_session_lost(session);
            }
        }

        self.shared.live_session.store(session, Ordering::Release);
        info!(connection_id = %self.shared.id, session, flushed, "Connected");
        self.shared.set_state(ConnectionState::Connected);

        let mut ping = self.shared.config.ping_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.on_message(text.as_str(), session, &mut ws_write).await;
                        }

                        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                            Ok(text) => self.on_message(text, session, &mut ws_write).await,
                            Err(_) => warn!(connection_id = %self.shared.id, "Dropping non-UTF-8 binary frame"),
                        },

                        Some(Ok(Message::Close(_))) => {
                            debug!(connection_id = %self.shared.id, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(connection_id = %self.shared.id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(connection_id = %self.shared.id, "WebSocket stream ended");
                            break;
                        }

                        // Ping and Pong are answered by tungstenite
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from the API
                command = self.command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(frame)) => {
                            if let Err(frame) = self.write_frame(&mut ws_write, frame, session).await {
                                self.queue.push_front(frame);
                                break;
                            }
                        }

                        Some(ConnectionCommand::Abandon(id)) => {
                            self.queue.remove(id);
                        }

                        Some(ConnectionCommand::Open) => {}

                        Some(ConnectionCommand::Close) | None => {
                            debug!(connection_id = %self.shared.id, "Closing socket");
                            let _ = ws_write.send(Message::Close(None)).await;
                            let _ = ws_write.close().await;
                            return Step::Shutdown;
                        }
                    }
                }

                // Keepalive
                () = next_ping(&mut ping) => {
                    if let Err(e) = ws_write.send(Message::Ping(Default::default())).await {
                        warn!(connection_id = %self.shared.id, error = %e, "Ping failed");
                        break;
                    }
                    trace!(connection_id = %self.shared.id, "Ping sent");
                }
            }
        }

        self.on_session_lost(session)
    }

    /// Writes one frame on the live socket.
    ///
    /// Returns the frame back if the write failed.
    async fn write_frame(
        &self,
        ws_write: &mut WsSink,
        frame: QueuedFrame,
        session: u64,
    ) -> std::result::Result<(), QueuedFrame> {
        let id = frame.request_id;

        if !self.shared.correlator.contains(id) {
            trace!(%id, "Skipping abandoned call");
            return Ok(());
        }

        match ws_write.send(Message::Text(frame.text.clone().into())).await {
            Ok(()) => {
                self.shared.correlator.mark_sent(id, session);
                trace!(%id, session, "Frame sent");
                Ok(())
            }
            Err(e) => {
                warn!(connection_id = %self.shared.id, %id, error = %Error::from(e), "Write failed");
                Err(frame)
            }
        }
    }

    /// Routes one inbound frame.
    async fn on_message(&self, text: &str, session: u64, ws_write: &mut WsSink) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id = %self.shared.id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        trace!(connection_id = %self.shared.id, kind = frame.kind(), "Frame received");

        match frame {
            Frame::Response(response) => {
                if let Some(orphan) =
                    self.shared
                        .correlator
                        .resolve(response, session, &self.shared.dispatcher)
                {
                    self.release_orphan(orphan, session, ws_write).await;
                }
            }
            Frame::Push(push) => {
                self.shared.dispatcher.dispatch(push);
            }
            Frame::Request { method } => {
                debug!(connection_id = %self.shared.id, %method, "Ignoring server-initiated request");
            }
        }
    }

    /// Unsubscribes a subscription whose caller went away.
    async fn release_orphan(&self, key: SubscriptionKey, session: u64, ws_write: &mut WsSink) {
        let feed = &self.shared.config.feed;
        let method = feed.unsubscribe_method.as_str();

        let Ok((id, _rx)) = self.shared.correlator.register(method, None) else {
            return;
        };
        let request = Request::new(id, method, feed.unsubscribe_params(&key));

        match serde_json::to_string(&request) {
            Ok(text) => {
                debug!(connection_id = %self.shared.id, %key, "Releasing orphaned subscription");
                if self
                    .write_frame(ws_write, QueuedFrame::request(id, text), session)
                    .await
                    .is_err()
                {
                    self.shared.correlator.forget(id);
                }
            }
            Err(e) => {
                self.shared.correlator.forget(id);
                warn!(error = %e, "Failed to encode unsubscribe");
            }
        }
    }

    fn on_session_lost(&mut self, session: u64) -> Step {
        self.shared.live_session.store(0, Ordering::Release);
        let handlers = self.shared.dispatcher.clear();
        let lost = self
            .shared
            .correlator
            .reject_session(session, || Error::ConnectionLost);

        info!(connection_id = %self.shared.id, session, handlers, lost, "Connection lost");
        self.shared.set_state(ConnectionState::Disconnected);

        self.schedule_reconnect(handlers > 0)
    }

    // ------------------------------------------------------------------------
    // Reconnect
    // ------------------------------------------------------------------------

    fn schedule_reconnect(&mut self, had_handlers: bool) -> Step {
        let interested = had_handlers
            || self.shared.correlator.len() > 0
            || !self.queue.is_empty()
            || self.shared.has_listeners();

        if !interested {
            debug!(connection_id = %self.shared.id, "Nothing needs the connection, going idle");
            self.backoff.reset();
            return Step::Idle;
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                debug!(
                    connection_id = %self.shared.id,
                    attempt = self.backoff.attempt(),
                    delay_ms = millis(delay),
                    "Reconnect scheduled"
                );
                Step::Backoff(delay)
            }
            None => self.give_up(),
        }
    }

    fn give_up(&mut self) -> Step {
        let attempts = self.backoff.attempt();
        error!(connection_id = %self.shared.id, attempts, "Reconnect attempts exhausted");

        self.shared
            .correlator
            .reject_all(|| Error::reconnect_exhausted(attempts));
        self.queue.clear();
        self.shared.dispatcher.clear();
        self.backoff.reset();
        self.shared.set_state(ConnectionState::Exhausted);

        Step::Idle
    }

    /// Queues a frame while offline.
    ///
    /// Returns `true` if the frame was queued.
    fn enqueue(&mut self, frame: QueuedFrame) -> bool {
        if !self.shared.correlator.contains(frame.request_id) {
            return false;
        }

        match self.queue.push(frame) {
            Enqueued::Accepted => true,
            Enqueued::Evicted(evicted) => {
                warn!(
                    connection_id = %self.shared.id,
                    id = %evicted.request_id,
                    "Outbound queue full, dropped oldest frame"
                );
                self.shared
                    .correlator
                    .reject(evicted.request_id, Error::QueueOverflow);
                true
            }
            Enqueued::Rejected(frame) => {
                warn!(
                    connection_id = %self.shared.id,
                    id = %frame.request_id,
                    "Outbound queue full, rejected frame"
                );
                self.shared
                    .correlator
                    .reject(frame.request_id, Error::queue_full(self.queue.capacity()));
                false
            }
        }
    }

    fn shutdown(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.live_session.store(0, Ordering::Release);

        self.shared
            .correlator
            .reject_all(|| Error::ConnectionClosed);
        let dropped = self.queue.clear();
        self.shared.dispatcher.clear();
        self.shared.set_state(ConnectionState::Disconnected);

        info!(connection_id = %self.shared.id, dropped, "Connection closed");
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves on the next ping tick, or never when pings are disabled.
async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
