//! # Error Types
//!
//! Every fallible operation of the real-time client returns [`RealtimeError`].
//! The variants follow the failure taxonomy of the client:
//!
//! - connection-level failures (`ConnectFailed`, `ConnectionLost`, `Exhausted`)
//!   are recovered locally by the reconnect loop and only reach callers that
//!   were waiting on the affected connection;
//! - protocol-level failures (`Server`) are the server's `error` frame for a
//!   specific subscribe/unsubscribe request;
//! - caller misuse (`NotConnected`, `InvalidKey`, `NoRuntime`) and local bookkeeping (`Superseded`,
//!   `Timeout`, `TaskGone`).
//!
//! Malformed inbound frames and panicking subscriber callbacks never produce
//! an error value; they are logged and swallowed by the router.

use std::time::Duration;

use thiserror::Error;

use crate::configs::ConfigError;
use crate::models::{HandshakeKind, SubscriptionKey};

/// Errors surfaced by the real-time client.
///
/// The type is `Clone` because one failure (for example a socket that errors
/// before the acknowledgement frame) is fanned out to every caller that was
/// waiting on the same connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// The operation requires an acknowledged connection.
    #[error("WebSocket is not connected")]
    NotConnected,

    /// The socket closed before the server answered the request.
    #[error("Connection lost before the server answered")]
    ConnectionLost,

    /// `disconnect()` was called while the caller was waiting to connect.
    #[error("Client disconnected")]
    Disconnected,

    /// The socket could not be opened or failed before the acknowledgement frame.
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    /// The reconnect loop gave up after the configured number of attempts.
    #[error("Reconnection attempts exhausted after {0} attempt(s)")]
    Exhausted(u32),

    /// The server answered the request with an `error` frame.
    #[error("Server rejected request: {0}")]
    Server(String),

    /// A newer request of the same kind for the same subscription replaced this one.
    #[error("Superseded by a newer {0} request for the same subscription")]
    Superseded(HandshakeKind),

    /// No confirmation arrived within the request timeout.
    #[error("No confirmation within {0:?}")]
    Timeout(Duration),

    /// The background connection task has stopped.
    #[error("Connection task is not running")]
    TaskGone,

    /// The collection or entity id is empty; nothing was sent.
    #[error("Collection and entity id must be non-empty, got {0:?}")]
    InvalidKey(SubscriptionKey),

    /// `RealtimeClient::new` was called outside a tokio runtime.
    #[error("No tokio runtime to run the connection task on")]
    NoRuntime,

    /// The client configuration was rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<ConfigError> for RealtimeError {
    fn from(err: ConfigError) -> Self {
        RealtimeError::Config(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RealtimeError>;
