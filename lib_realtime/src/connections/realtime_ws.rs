//! # Real-time WebSocket Connection Task
//!
//! The event loop behind [`RealtimeClient`](crate::client::RealtimeClient).
//!
//! One spawned task exclusively owns the socket, the subscription registry,
//! the pending handshakes and the reconnect timer. Client handles talk to it
//! over an `mpsc` command channel and receive answers on `oneshot` channels,
//! so no lock guards the registry: commands, inbound frames and timers are
//! processed one at a time in arrival order. Opening a socket is one more
//! branch of that loop, never an inline await, so `disconnect()` can drop an
//! attempt that is still in flight.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --ack--> Connected
//!      ^                          |                  |
//!      |                        error           unexpected close
//!  disconnect()                   v                  v
//!      +------------------- Reconnecting <-----------+
//!                                 |
//!                        attempts > max
//!                                 v
//!                              Failed
//! ```
//!
//! The connection counts as established only when the server's
//! `connection_established` frame arrives. That is when the client id is set,
//! the attempt counter resets and every registered subscription is replayed,
//! before any later frame is routed.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::configs::RealtimeConfig;
use crate::core::{
    ConnectionEvent, ConnectionState, PendingHandshakes, ReconnectPolicy, RouteOutcome, Router,
    StatusSnapshot, SubscriptionRegistry, UpdateCallback,
};
use crate::core::pending::Responder;
use crate::error::{RealtimeError, Result};
use crate::models::{ClientFrame, HandshakeKind, SubscriptionKey};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OpenResult = std::result::Result<WsStream, String>;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 64;

/// Requests from the client handle to the connection task.
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<String>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        key: SubscriptionKey,
        callback: UpdateCallback,
        reply: Responder,
    },
    Unsubscribe {
        key: SubscriptionKey,
        reply: Responder,
    },
    ListSubscriptions {
        reply: oneshot::Sender<Vec<SubscriptionKey>>,
    },
    Shutdown,
}

/// The handle-side ends of a freshly spawned task.
pub(crate) struct TaskHandles {
    pub commands: mpsc::Sender<Command>,
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub events: broadcast::Sender<ConnectionEvent>,
}

/// Spawns the connection task on the current tokio runtime.
pub(crate) fn spawn(config: RealtimeConfig) -> Result<TaskHandles> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;
    let url = config.socket_url()?;
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let status = Arc::new(RwLock::new(StatusSnapshot::default()));

    let task = ConnectionTask {
        url,
        policy: config.reconnect_policy(),
        keepalive_period: config.keepalive_interval(),
        connect_timeout: config.connect_timeout(),
        router: Router::new(config.extraction.clone()),
        registry: SubscriptionRegistry::new(),
        pending: PendingHandshakes::new(),
        cmd_rx,
        status: Arc::clone(&status),
        events: events.clone(),
        ws: None,
        opening: None,
        state: ConnectionState::Disconnected,
        client_id: None,
        attempts: 0,
        connect_waiters: Vec::new(),
        reconnect_at: None,
        ack_deadline: None,
        keepalive: None,
    };
    runtime.spawn(task.run());

    Ok(TaskHandles {
        commands: cmd_tx,
        status,
        events,
    })
}

struct ConnectionTask {
    url: Url,
    policy: ReconnectPolicy,
    keepalive_period: Duration,
    connect_timeout: Duration,
    router: Router,
    registry: SubscriptionRegistry,
    pending: PendingHandshakes,
    cmd_rx: mpsc::Receiver<Command>,
    status: Arc<RwLock<StatusSnapshot>>,
    events: broadcast::Sender<ConnectionEvent>,

    ws: Option<WsStream>,
    /// In-flight socket open; dropping it cancels the attempt.
    opening: Option<BoxFuture<'static, OpenResult>>,
    state: ConnectionState,
    client_id: Option<String>,
    attempts: u32,
    connect_waiters: Vec<oneshot::Sender<Result<String>>>,
    reconnect_at: Option<Instant>,
    ack_deadline: Option<Instant>,
    keepalive: Option<Interval>,
}

impl ConnectionTask {
    async fn run(mut self) {
        log::debug!("Real-time connection task started for {}", self.url);
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                opened = open_opt(&mut self.opening) => {
                    self.opening = None;
                    self.on_socket_opened(opened).await;
                }
                msg = next_frame(&mut self.ws) => {
                    self.handle_socket(msg).await;
                }
                _ = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    log::info!("Reconnection attempt {}/{}", self.attempts, self.policy.max_attempts());
                    self.open_socket();
                }
                _ = sleep_until_opt(self.ack_deadline) => {
                    self.ack_deadline = None;
                    let reason = format!(
                        "no acknowledgement within {}ms",
                        self.connect_timeout.as_millis()
                    );
                    self.connection_lost(reason).await;
                }
                _ = tick_opt(&mut self.keepalive) => {
                    self.send_keepalive().await;
                }
            }
        }

        self.teardown().await;
        log::debug!("Real-time connection task stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => self.connect(reply).await,
            Command::Disconnect { reply } => {
                self.disconnect_now().await;
                let _ = reply.send(());
            }
            Command::Subscribe {
                key,
                callback,
                reply,
            } => {
                if !self.state.is_connected() {
                    let _ = reply.send(Err(RealtimeError::NotConnected));
                    return;
                }
                self.registry.insert(key.clone(), callback);
                self.request(HandshakeKind::Subscribe, key, reply).await;
            }
            Command::Unsubscribe { key, reply } => {
                self.registry.remove(&key);
                if !self.state.is_connected() {
                    let _ = reply.send(Err(RealtimeError::NotConnected));
                    return;
                }
                self.request(HandshakeKind::Unsubscribe, key, reply).await;
            }
            Command::ListSubscriptions { reply } => {
                let _ = reply.send(self.registry.keys());
            }
            // Intercepted by the run loop.
            Command::Shutdown => {}
        }
    }

    async fn connect(&mut self, reply: oneshot::Sender<Result<String>>) {
        match self.state {
            ConnectionState::Connected => {
                let id = self.client_id.clone().unwrap_or_default();
                let _ = reply.send(Ok(id));
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.connect_waiters.push(reply);
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.connect_waiters.push(reply);
                self.attempts = 0;
                self.state = ConnectionState::Connecting;
                self.publish().await;
                self.open_socket();
            }
        }
    }

    /// Registers a waiter and sends the matching request frame.
    async fn request(&mut self, kind: HandshakeKind, key: SubscriptionKey, reply: Responder) {
        let frame = match kind {
            HandshakeKind::Subscribe => ClientFrame::subscribe(&key),
            HandshakeKind::Unsubscribe => ClientFrame::unsubscribe(&key),
        };
        log::debug!("Sending {} for {}", kind, key);
        self.pending.register(kind, key, reply);
        if let Err(reason) = self.send_frame(&frame).await {
            self.connection_lost(reason).await;
        }
    }

    /// Starts opening the socket. The result arrives through the run loop,
    /// so commands keep being served meanwhile.
    fn open_socket(&mut self) {
        log::info!("Connecting to {}", self.url);
        let url = self.url.to_string();
        let limit = self.connect_timeout;
        self.opening = Some(
            async move {
                match time::timeout(limit, connect_async(url.as_str())).await {
                    Ok(Ok((stream, _response))) => Ok(stream),
                    Ok(Err(e)) => Err(format!("connect error: {}", e)),
                    Err(_) => Err(format!("connect timed out after {}ms", limit.as_millis())),
                }
            }
            .boxed(),
        );
    }

    async fn on_socket_opened(&mut self, opened: OpenResult) {
        match opened {
            Ok(stream) => {
                log::debug!("Socket open, awaiting acknowledgement");
                self.ws = Some(stream);
                self.ack_deadline = Some(Instant::now() + self.connect_timeout);
            }
            Err(reason) => self.connection_lost(reason).await,
        }
    }

    async fn handle_socket(&mut self, msg: Option<std::result::Result<Message, WsError>>) {
        match msg {
            Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
            Some(Ok(Message::Binary(bin))) => match std::str::from_utf8(&bin) {
                Ok(text) => self.handle_text(text).await,
                Err(_) => log::debug!("Dropping non-UTF-8 binary frame ({} bytes)", bin.len()),
            },
            Some(Ok(Message::Close(frame))) => {
                let reason = match frame {
                    Some(f) => format!("closed by server ({}): {}", f.code, f.reason),
                    None => "closed by server".to_string(),
                };
                self.connection_lost(reason).await;
            }
            // Protocol pings are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => self.connection_lost(format!("socket error: {}", e)).await,
            None => self.connection_lost("stream ended".to_string()).await,
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match self.router.route(text, &self.registry, &mut self.pending) {
            RouteOutcome::Established { client_id } => self.on_established(client_id).await,
            RouteOutcome::Rejected { message, .. } => {
                self.emit(ConnectionEvent::ServerError { message });
            }
            RouteOutcome::Pong => log::trace!("pong"),
            RouteOutcome::Resolved { .. }
            | RouteOutcome::Delivered(_)
            | RouteOutcome::Dropped(_) => {}
        }
    }

    async fn on_established(&mut self, client_id: String) {
        if self.ws.is_none() {
            return;
        }
        log::info!("Connected to real-time service as {}", client_id);
        self.ack_deadline = None;
        self.client_id = Some(client_id.clone());
        self.attempts = 0;
        self.state = ConnectionState::Connected;
        self.start_keepalive();
        self.publish().await;

        if !self.resubscribe_all().await {
            return;
        }

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(client_id.clone()));
        }
        self.emit(ConnectionEvent::Connected { client_id });
    }

    /// Replays every registered subscription without waiting for confirmations.
    /// Returns `false` if the socket failed midway.
    async fn resubscribe_all(&mut self) -> bool {
        let frames = self.registry.resubscribe_frames();
        if frames.is_empty() {
            return true;
        }
        log::info!("Resubscribing to {} subscription(s)", frames.len());
        for frame in &frames {
            if let Err(reason) = self.send_frame(frame).await {
                self.connection_lost(reason).await;
                return false;
            }
        }
        true
    }

    /// Handles every closure the caller did not ask for.
    async fn connection_lost(&mut self, reason: String) {
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            return;
        }
        log::warn!("Real-time connection lost: {}", reason);

        self.ws = None;
        self.opening = None;
        self.keepalive = None;
        self.ack_deadline = None;
        self.client_id = None;
        self.pending.fail_all(RealtimeError::ConnectionLost);
        let waiters = std::mem::take(&mut self.connect_waiters);
        self.emit(ConnectionEvent::ConnectionLost {
            reason: reason.clone(),
        });
        self.schedule_reconnect().await;

        // Answered after the new state is published.
        for waiter in waiters {
            let _ = waiter.send(Err(RealtimeError::ConnectFailed(reason.clone())));
        }
    }

    async fn schedule_reconnect(&mut self) {
        let attempt = self.attempts + 1;
        match self.policy.delay_for(attempt) {
            Some(delay) => {
                self.attempts = attempt;
                self.state = ConnectionState::Reconnecting;
                self.reconnect_at = Some(Instant::now() + delay);
                log::warn!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    self.policy.max_attempts()
                );
                self.publish().await;
                self.emit(ConnectionEvent::ReconnectScheduled { attempt, delay });
            }
            None => {
                let attempts = self.policy.max_attempts();
                self.attempts = attempts;
                self.state = ConnectionState::Failed;
                self.reconnect_at = None;
                log::error!(
                    "Giving up on the real-time service after {} reconnection attempt(s)",
                    attempts
                );
                self.publish().await;
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(RealtimeError::Exhausted(attempts)));
                }
                self.emit(ConnectionEvent::ReconnectExhausted { attempts });
            }
        }
    }

    /// Caller-requested close. Idempotent; cancels every timer.
    async fn disconnect_now(&mut self) {
        self.opening = None;
        self.reconnect_at = None;
        self.ack_deadline = None;
        self.keepalive = None;

        if let Some(mut ws) = self.ws.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "Client disconnected".into(),
            };
            if let Err(e) = ws.close(Some(frame)).await {
                log::debug!("Close handshake failed: {}", e);
            }
        }

        let was = self.state;
        self.client_id = None;
        self.attempts = 0;
        self.state = ConnectionState::Disconnected;
        self.publish().await;

        self.pending.fail_all(RealtimeError::ConnectionLost);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(RealtimeError::Disconnected));
        }
        if was != ConnectionState::Disconnected {
            log::info!("Disconnected from real-time service");
            self.emit(ConnectionEvent::Disconnected);
        }
    }

    async fn teardown(&mut self) {
        self.disconnect_now().await;
        self.registry.clear();
    }

    async fn send_keepalive(&mut self) {
        if let Err(reason) = self.send_frame(&ClientFrame::ping_now()).await {
            self.connection_lost(reason).await;
        }
    }

    fn start_keepalive(&mut self) {
        let mut interval = time::interval_at(Instant::now() + self.keepalive_period, self.keepalive_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(interval);
    }

    async fn send_frame(&mut self, frame: &ClientFrame) -> std::result::Result<(), String> {
        let Some(ws) = self.ws.as_mut() else {
            return Err("socket is not open".to_string());
        };
        let text = frame
            .to_text()
            .map_err(|e| format!("failed to encode frame: {}", e))?;
        ws.send(Message::text(text))
            .await
            .map_err(|e| format!("send failed: {}", e))
    }

    async fn publish(&mut self) {
        let mut status = self.status.write().await;
        status.state = self.state;
        status.client_id = self.client_id.clone();
        status.reconnect_attempts = self.attempts;
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

async fn next_frame(ws: &mut Option<WsStream>) -> Option<std::result::Result<Message, WsError>> {
    match ws {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn open_opt(opening: &mut Option<BoxFuture<'static, OpenResult>>) -> OpenResult {
    match opening {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => future::pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => future::pending().await,
    }
}
