//! # Real-time Client
//!
//! [`RealtimeClient`] is the public handle to one logical connection to the
//! scheduling service's `/ws/realtime` endpoint. It is cheap to clone; every
//! clone drives the same background connection task, and the task shuts
//! down when the last clone is dropped.
//!
//! ```no_run
//! use lib_realtime::{RealtimeClient, RealtimeConfig};
//!
//! # async fn demo() -> lib_realtime::Result<()> {
//! let client = RealtimeClient::new(RealtimeConfig::new("ws://localhost:8000"))?;
//! let client_id = client.connect().await?;
//! log::info!("connected as {}", client_id);
//!
//! client
//!     .subscribe("time_slots", "CSE101", |event| {
//!         log::info!("{} on time slot: {}", event.operation, event.payload);
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

use crate::configs::RealtimeConfig;
use crate::connections::realtime_ws::{self, Command};
use crate::core::{Confirmation, ConnectionEvent, ConnectionState, StatusSnapshot};
use crate::error::{RealtimeError, Result};
use crate::models::{SubscriptionKey, UpdateEvent};

/// Handle to the real-time connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RealtimeConfig,
    commands: mpsc::Sender<Command>,
    status: Arc<RwLock<StatusSnapshot>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let _ = self.commands.try_send(Command::Shutdown);
    }
}

impl RealtimeClient {
    /// Validates `config` and spawns the connection task.
    ///
    /// Must be called from within a tokio runtime, otherwise it fails with
    /// [`RealtimeError::NoRuntime`]. No socket is opened until
    /// [`connect`](Self::connect).
    pub fn new(config: RealtimeConfig) -> Result<Self> {
        config.validate()?;
        let handles = realtime_ws::spawn(config.clone())?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                commands: handles.commands,
                status: handles.status,
                events: handles.events,
            }),
        })
    }

    /// Opens the connection and resolves with the server-issued client id once
    /// the server acknowledges it.
    ///
    /// Concurrent calls share one socket and all observe the same id. If
    /// already connected, resolves immediately with the current id. A socket
    /// that fails before the acknowledgement rejects with
    /// [`RealtimeError::ConnectFailed`] and the reconnect loop takes over.
    pub async fn connect(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply }).await?;
        rx.await.map_err(|_| RealtimeError::TaskGone)?
    }

    /// Closes the connection with a normal close code and cancels any
    /// scheduled reconnect and the keepalive. Idempotent.
    ///
    /// Subscriptions stay registered and are replayed by the next `connect()`.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply }).await?;
        rx.await.map_err(|_| RealtimeError::TaskGone)
    }

    /// Subscribes `callback` to updates of one entity.
    ///
    /// Requires the `Connected` state. The mapping is recorded before the
    /// request is sent and replaces any earlier callback for the same pair;
    /// a request is sent every time. Resolves when the server confirms, and
    /// rejects on a matching `error` frame, on connection loss, or after the
    /// configured request timeout.
    ///
    /// An empty collection or entity id fails with
    /// [`RealtimeError::InvalidKey`] before anything is sent.
    ///
    /// The callback runs on the connection task. It must not block, and a
    /// panic inside it is caught and logged.
    pub async fn subscribe<F>(
        &self,
        collection: impl Into<String>,
        entity_id: impl Into<String>,
        callback: F,
    ) -> Result<Confirmation>
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let key = complete_key(collection, entity_id)?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            key,
            callback: Arc::new(callback),
            reply,
        })
        .await?;
        self.await_confirmation(rx).await
    }

    /// Removes the mapping for one entity and asks the server to stop sending
    /// its updates.
    ///
    /// The local mapping is removed even when not connected; in that case the
    /// call then fails with [`RealtimeError::NotConnected`].
    pub async fn unsubscribe(
        &self,
        collection: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Result<Confirmation> {
        let key = complete_key(collection, entity_id)?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { key, reply }).await?;
        self.await_confirmation(rx).await
    }

    /// Registered subscriptions, sorted.
    pub async fn subscriptions(&self) -> Result<Vec<SubscriptionKey>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListSubscriptions { reply }).await?;
        rx.await.map_err(|_| RealtimeError::TaskGone)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.status.read().await.state
    }

    /// The server-issued id; `Some` only while connected.
    pub async fn client_id(&self) -> Option<String> {
        self.inner.status.read().await.client_id.clone()
    }

    /// Reconnect attempts since the last acknowledged connection.
    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.status.read().await.reconnect_attempts
    }

    /// `true` while acknowledged by the server.
    pub async fn is_connected(&self) -> bool {
        self.state().await.is_connected()
    }

    /// A consistent copy of state, id and attempt counter.
    pub async fn status(&self) -> StatusSnapshot {
        self.inner.status.read().await.clone()
    }

    /// Subscribes to lifecycle events emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Follows schedule changes of one student, connecting first if needed.
    pub async fn subscribe_to_schedule_updates<F>(
        &self,
        student_id: &str,
        callback: F,
    ) -> Result<Confirmation>
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.ensure_connected().await?;
        self.subscribe("schedules", student_id, callback).await
    }

    /// Follows time-slot changes of one course, connecting first if needed.
    pub async fn subscribe_to_time_slot_updates<F>(
        &self,
        course_id: &str,
        callback: F,
    ) -> Result<Confirmation>
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.ensure_connected().await?;
        self.subscribe("time_slots", course_id, callback).await
    }

    /// Follows enrollment changes of one student, connecting first if needed.
    pub async fn subscribe_to_enrollment_updates<F>(
        &self,
        student_id: &str,
        callback: F,
    ) -> Result<Confirmation>
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.ensure_connected().await?;
        self.subscribe("enrollments", student_id, callback).await
    }

    /// Follows changes of one course, connecting first if needed.
    pub async fn subscribe_to_course_updates<F>(
        &self,
        course_id: &str,
        callback: F,
    ) -> Result<Confirmation>
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.ensure_connected().await?;
        self.subscribe("courses", course_id, callback).await
    }

    async fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected().await {
            self.connect().await?;
        }
        Ok(())
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.inner
            .commands
            .send(cmd)
            .await
            .map_err(|_| RealtimeError::TaskGone)
    }

    async fn await_confirmation(
        &self,
        rx: oneshot::Receiver<Result<Confirmation>>,
    ) -> Result<Confirmation> {
        let limit = self.inner.config.request_timeout();
        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RealtimeError::TaskGone),
            Err(_) => Err(RealtimeError::Timeout(limit)),
        }
    }
}

fn complete_key(collection: impl Into<String>, entity_id: impl Into<String>) -> Result<SubscriptionKey> {
    let key = SubscriptionKey::new(collection, entity_id);
    if key.is_complete() {
        Ok(key)
    } else {
        Err(RealtimeError::InvalidKey(key))
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("endpoint", &self.inner.config.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_client_starts_disconnected() {
        let client = RealtimeClient::new(RealtimeConfig::new("ws://127.0.0.1:9")).unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(client.client_id().await, None);
        assert_eq!(client.reconnect_attempts().await, 0);
        assert!(client.subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribe_requires_a_connection() {
        let client = RealtimeClient::new(RealtimeConfig::new("ws://127.0.0.1:9")).unwrap();
        let err = client
            .subscribe("schedules", "S1", |_| {})
            .await
            .unwrap_err();
        assert_eq!(err, RealtimeError::NotConnected);
        assert!(client.subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_ids_are_refused_before_sending() {
        let client = RealtimeClient::new(RealtimeConfig::new("ws://127.0.0.1:9")).unwrap();
        let err = client.subscribe("schedules", "", |_| {}).await.unwrap_err();
        assert_eq!(err, RealtimeError::InvalidKey(SubscriptionKey::new("schedules", "")));
        let err = client.unsubscribe(" ", "S1").await.unwrap_err();
        assert!(matches!(err, RealtimeError::InvalidKey(_)));
    }

    #[test]
    fn new_outside_a_runtime_is_an_error() {
        let err = RealtimeClient::new(RealtimeConfig::new("ws://127.0.0.1:9")).unwrap_err();
        assert_eq!(err, RealtimeError::NoRuntime);
    }

    #[tokio::test]
    async fn rejects_invalid_configuration() {
        let err = RealtimeClient::new(RealtimeConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, RealtimeError::Config(_)));
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let client = RealtimeClient::new(RealtimeConfig::new("ws://127.0.0.1:9")).unwrap();
        let mut events = client.events();
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(events.try_recv().is_err());
    }
}
