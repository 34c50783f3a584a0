//! # In-process Mock Servers
//!
//! Stand-ins for the scheduling service used by the integration tests in
//! `tests/`. The server binds `127.0.0.1:0`, so tests can run in parallel.
//!
//! - [`MockRealtimeServer`] speaks the `/ws/realtime` protocol: it
//!   acknowledges each connection with `client-<n>`, confirms or rejects
//!   subscribe/unsubscribe requests, answers pings, records every frame per
//!   connection, and can push frames or drop the socket on demand.
//!
//! REST tests use `wiremock` directly.

#![forbid(unsafe_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lib_realtime::{ConnectionEvent, SubscriptionKey};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// How the mock answers.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Send `connection_established` after the handshake.
    pub acknowledge: bool,
    /// Wait this long before acknowledging.
    pub ack_delay: Duration,
    /// Answer subscribe/unsubscribe with a confirmation.
    pub confirm: bool,
    /// Subscribe requests for these keys get a correlated `error` frame.
    pub reject: Vec<SubscriptionKey>,
    /// Written in the same flush as the acknowledgement on every connection
    /// after the first.
    pub after_reconnect_ack: Vec<Value>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            acknowledge: true,
            ack_delay: Duration::ZERO,
            confirm: true,
            reject: Vec::new(),
            after_reconnect_ack: Vec::new(),
        }
    }
}

enum Control {
    Push(Value),
    Drop,
    Close,
}

struct Shared {
    behavior: MockBehavior,
    accepted: AtomicUsize,
    frames: Mutex<Vec<Vec<Value>>>,
    controls: Mutex<Vec<mpsc::UnboundedSender<Control>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A `/ws/realtime` server on a random local port.
pub struct MockRealtimeServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl MockRealtimeServer {
    /// Starts a server with the default behavior.
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::default()).await
    }

    /// Starts a server with `behavior`.
    pub async fn start_with(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let shared = Arc::new(Shared {
            behavior,
            accepted: AtomicUsize::new(0),
            frames: Mutex::new(Vec::new()),
            controls: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_shared = Arc::clone(&accept_shared);
                let handle = tokio::spawn(serve_socket(stream, conn_shared));
                accept_shared.tasks.lock().unwrap().push(handle);
            }
        });

        Self {
            addr,
            shared,
            accept_task: Mutex::new(Some(accept_task)),
        }
    }

    /// Listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` base URL for [`RealtimeConfig::endpoint`](lib_realtime::RealtimeConfig).
    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// WebSocket connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Frames received on connection `index` (0-based).
    pub fn frames(&self, index: usize) -> Vec<Value> {
        self.shared
            .frames
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Frames of one `type` received on connection `index`.
    pub fn frames_of_type(&self, index: usize, frame_type: &str) -> Vec<Value> {
        self.frames(index)
            .into_iter()
            .filter(|f| f.get("type").and_then(Value::as_str) == Some(frame_type))
            .collect()
    }

    /// Sends `frame` on the newest connection.
    pub fn push(&self, frame: Value) {
        self.control(Control::Push(frame));
    }

    /// Drops the newest connection without a close handshake.
    pub fn drop_current(&self) {
        self.control(Control::Drop);
    }

    /// Closes the newest connection with a close frame.
    pub fn close_current(&self) {
        self.control(Control::Close);
    }

    /// Stops listening and kills every connection. Later connects are refused.
    pub async fn shutdown(&self) {
        let accept = self.accept_task.lock().unwrap().take();
        if let Some(handle) = accept {
            handle.abort();
            let _ = handle.await;
        }
        let tasks: Vec<JoinHandle<()>> = self.shared.tasks.lock().unwrap().drain(..).collect();
        for handle in tasks {
            handle.abort();
            let _ = handle.await;
        }
    }

    fn control(&self, msg: Control) {
        if let Some(tx) = self.shared.controls.lock().unwrap().last() {
            let _ = tx.send(msg);
        }
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        if let Some(handle) = self.accept_task.lock().unwrap().take() {
            handle.abort();
        }
        for handle in self.shared.tasks.lock().unwrap().iter() {
            handle.abort();
        }
    }
}

async fn serve_socket(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let index = {
        let mut frames = shared.frames.lock().unwrap();
        frames.push(Vec::new());
        shared.controls.lock().unwrap().push(tx);
        frames.len() - 1
    };
    shared.accepted.fetch_add(1, Ordering::SeqCst);

    if shared.behavior.acknowledge {
        if !shared.behavior.ack_delay.is_zero() {
            tokio::time::sleep(shared.behavior.ack_delay).await;
        }
        let ack = json!({
            "type": "connection_established",
            "client_id": format!("client-{}", index + 1),
            "message": "Connected to real-time updates",
        });
        if ws.feed(Message::text(ack.to_string())).await.is_err() {
            return;
        }
        if index > 0 {
            for frame in &shared.behavior.after_reconnect_ack {
                if ws.feed(Message::text(frame.to_string())).await.is_err() {
                    return;
                }
            }
        }
        if ws.flush().await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    shared.frames.lock().unwrap()[index].push(frame.clone());
                    if let Some(reply) = reply_for(&shared.behavior, &frame) {
                        if ws.send(Message::text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            ctl = rx.recv() => match ctl {
                Some(Control::Push(frame)) => {
                    if ws.send(Message::text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Control::Close) => {
                    let _ = ws.close(None).await;
                    break;
                }
                Some(Control::Drop) | None => break,
            },
        }
    }
}

fn reply_for(behavior: &MockBehavior, frame: &Value) -> Option<Value> {
    let frame_type = frame.get("type")?.as_str()?;
    match frame_type {
        "ping" => Some(json!({
            "type": "pong",
            "timestamp": frame.get("timestamp").cloned().unwrap_or(Value::Null),
        })),
        "subscribe" | "unsubscribe" => {
            let collection = frame.get("collection")?.as_str()?;
            let entity_id = frame.get("entity_id")?.as_str()?;
            let rejected = behavior
                .reject
                .iter()
                .any(|k| k.collection == collection && k.entity_id == entity_id);
            if frame_type == "subscribe" && rejected {
                return Some(json!({
                    "type": "error",
                    "message": "Subscription rejected",
                    "collection": collection,
                    "entity_id": entity_id,
                    "request_type": "subscribe",
                }));
            }
            if !behavior.confirm {
                return None;
            }
            let confirmed = if frame_type == "subscribe" {
                "subscription_confirmed"
            } else {
                "unsubscription_confirmed"
            };
            Some(json!({
                "type": confirmed,
                "collection": collection,
                "entity_id": entity_id,
            }))
        }
        _ => None,
    }
}

/// Polls `condition` every 10ms until it holds or `limit` passes.
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Waits up to five seconds for the first event matching `pred`.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    pred: F,
) -> ConnectionEvent
where
    F: Fn(&ConnectionEvent) -> bool,
{
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for connection event")
}

/// Runs `fut` with a five-second ceiling.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation timed out")
}
