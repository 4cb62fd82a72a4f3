//! Shared utilities for integration tests.
//!
//! Provides a local feed server that:
//! - Records every frame it receives
//! - Answers `subscribe` with `"sub-<feed>"` and `unsubscribe` with `true`
//! - Leaves every other call for the test to answer
//! - Can refuse subscribes or hold them for a manual answer
//! - Can push, answer and drop connections on demand

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use feed_sync::{ClientConfig, ClientConfigBuilder};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for [`wait_until`].
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing for a test, honoring `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_sync=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Awaits `future` with [`WAIT_TIMEOUT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT_TIMEOUT, future)
        .await
        .expect("timed out")
}

// ============================================================================
// MockServer
// ============================================================================

/// Command for one accepted socket.
enum SocketCommand {
    Send(String),
    Drop,
}

#[derive(Default)]
struct MockState {
    received: Mutex<Vec<Value>>,
    accepted: AtomicUsize,
    sockets: Mutex<Vec<(usize, mpsc::UnboundedSender<SocketCommand>)>>,
    /// Subscribes still to be refused.
    refusals: AtomicUsize,
    /// Feeds whose subscribes are left unanswered.
    held: Mutex<Vec<String>>,
}

/// Local WebSocket feed server.
pub struct MockServer {
    port: u16,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Binds to a random localhost port and starts accepting.
    pub async fn start() -> Self {
        init_logging();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(MockState::default());

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let socket_id = accept_state.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, socket_id, Arc::clone(&accept_state)));
            }
        });

        Self { port, state, task }
    }

    /// Returns `ws://127.0.0.1:<port>`.
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns a builder with short backoff and pings disabled.
    pub fn config_builder(&self) -> ClientConfigBuilder {
        ClientConfig::builder(self.url())
            .base_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(100))
            .no_ping()
    }

    /// Returns [`config_builder`](Self::config_builder) built.
    pub fn config(&self) -> ClientConfig {
        self.config_builder().build().expect("config")
    }

    /// Answers the next `count` subscribes with an error.
    pub fn refuse_subscribes(&self, count: usize) {
        self.state.refusals.store(count, Ordering::SeqCst);
    }

    /// Leaves subscribes for `feed` unanswered until [`respond`](Self::respond).
    pub fn hold_subscribes(&self, feed: &str) {
        self.state.held.lock().push(feed.to_string());
    }

    /// Returns the id of the latest `subscribe` call for `feed`.
    pub fn subscribe_id(&self, feed: &str) -> Option<Value> {
        self.calls("subscribe")
            .into_iter()
            .rev()
            .find(|frame| frame["params"]["feed"] == feed)
            .map(|frame| frame["id"].clone())
    }

    /// Returns every frame received so far.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().clone()
    }

    /// Returns received calls of `method`.
    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|frame| frame["method"] == method)
            .collect()
    }

    /// Returns how many calls of `method` were received.
    pub fn count(&self, method: &str) -> usize {
        self.calls(method).len()
    }

    /// Returns received `subscribe` calls for `feed`.
    pub fn subscribes_for(&self, feed: &str) -> usize {
        self.calls("subscribe")
            .iter()
            .filter(|frame| frame["params"]["feed"] == feed)
            .count()
    }

    /// Returns received `unsubscribe` calls for `feed`.
    pub fn unsubscribes_for(&self, feed: &str) -> usize {
        let key = format!("sub-{feed}");
        self.calls("unsubscribe")
            .iter()
            .filter(|frame| frame["params"]["subscriptionKey"] == key.as_str())
            .count()
    }

    /// Returns how many sockets were ever accepted.
    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Returns how many sockets are open.
    pub fn open_sockets(&self) -> usize {
        self.state.sockets.lock().len()
    }

    /// Pushes `payload` for `feed` on every open socket.
    pub fn push(&self, feed: &str, payload: Value) {
        let frame = json!({"subscriptionKey": format!("sub-{feed}"), "payload": payload});
        self.broadcast(frame.to_string());
    }

    /// Answers call `id` with `result`.
    pub fn respond(&self, id: &Value, result: Value) {
        self.broadcast(json!({"id": id, "result": result}).to_string());
    }

    /// Answers call `id` with an error payload.
    pub fn respond_error(&self, id: &Value, code: i64, message: &str) {
        self.broadcast(
            json!({"id": id, "error": {"code": code, "message": message}}).to_string(),
        );
    }

    /// Sends a raw text frame on every open socket.
    pub fn broadcast(&self, text: String) {
        for (_, socket) in self.state.sockets.lock().iter() {
            let _ = socket.send(SocketCommand::Send(text.clone()));
        }
    }

    /// Drops every open socket without a close handshake.
    pub fn drop_connections(&self) {
        for (_, socket) in self.state.sockets.lock().drain(..) {
            let _ = socket.send(SocketCommand::Drop);
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
        self.drop_connections();
    }
}

/// Serves one accepted socket.
async fn serve(stream: TcpStream, socket_id: usize, state: Arc<MockState>) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.sockets.lock().push((socket_id, tx));

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    state.received.lock().push(frame.clone());

                    if let Some(reply) = auto_reply(&frame, &state)
                        && write.send(Message::Text(reply.to_string().into())).await.is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },

            command = rx.recv() => match command {
                Some(SocketCommand::Send(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(SocketCommand::Drop) | None => break,
            },
        }
    }

    state.sockets.lock().retain(|(id, _)| *id != socket_id);
}

/// Builds the automatic answer for subscribe and unsubscribe calls.
fn auto_reply(frame: &Value, state: &MockState) -> Option<Value> {
    let id = frame.get("id")?;
    match frame.get("method")?.as_str()? {
        "subscribe" => {
            let feed = frame["params"]["feed"].as_str()?;
            if state.held.lock().iter().any(|held| held == feed) {
                return None;
            }
            let refused = state
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if refused {
                return Some(json!({"id": id, "error": {"code": -32000, "message": "subscribe refused"}}));
            }
            Some(json!({"id": id, "result": format!("sub-{feed}")}))
        }
        "unsubscribe" => Some(json!({"id": id, "result": true})),
        _ => None,
    }
}
