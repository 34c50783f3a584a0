//! # Connection State
//!
//! Lifecycle states of the single logical connection, the snapshot the
//! client handle reads, and the events broadcast on every transition.

use std::fmt;
use std::time::Duration;

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket, nothing scheduled. Initial state and the result of `disconnect()`.
    #[default]
    Disconnected,
    /// First socket of a `connect()` call is opening or awaiting acknowledgement.
    Connecting,
    /// Acknowledged by the server; a client identifier is assigned.
    Connected,
    /// Lost unexpectedly; a retry is scheduled or in flight.
    Reconnecting,
    /// Terminal disconnected state after the retry ceiling was passed.
    Failed,
}

impl ConnectionState {
    /// `true` only while acknowledged.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the client handle can observe without a round trip to the task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Server-issued identifier; `Some` only while `Connected`.
    pub client_id: Option<String>,
    /// Reconnect attempts since the last acknowledged connection.
    pub reconnect_attempts: u32,
}

/// Lifecycle notifications, broadcast to every `events()` receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The server acknowledged a (re)connection.
    Connected {
        /// Identifier issued by the server.
        client_id: String,
    },
    /// The socket failed or closed without the caller asking for it.
    ConnectionLost {
        /// Transport-level reason.
        reason: String,
    },
    /// A retry is scheduled.
    ReconnectScheduled {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// The retry ceiling was passed; the client is now `Failed`.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// `disconnect()` closed the connection.
    Disconnected,
    /// The server sent an `error` frame.
    ServerError {
        /// The server's message.
        message: String,
    },
}
