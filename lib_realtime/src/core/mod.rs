//! # Core Module
//!
//! The transport-independent pieces of the real-time client. Everything here
//! is plain data and logic that the connection task drives; none of it
//! touches a socket, which keeps it unit-testable.
//!
//! ## Core Components:
//!
//! - **`backoff`**: the capped exponential reconnect schedule.
//! - **`state`**: connection lifecycle states, the published status snapshot
//!   and the broadcast lifecycle events.
//! - **`registry`**: the connection-agnostic set of desired subscriptions and
//!   their callbacks, replayed after every reconnection.
//! - **`pending`**: subscribe/unsubscribe requests waiting for the server's
//!   confirmation or error frame.
//! - **`router`**: inbound frame classification and isolated callback dispatch.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Capped exponential backoff schedule.
pub mod backoff;
/// Pending subscribe/unsubscribe handshakes.
pub mod pending;
/// Subscription registry keyed by `(collection, entity_id)`.
pub mod registry;
/// Inbound frame classification and dispatch.
pub mod router;
/// Lifecycle states and events.
pub mod state;

// --- Public API Re-exports ---
pub use backoff::ReconnectPolicy;
pub use pending::{Confirmation, PendingHandshakes};
pub use registry::{SubscriptionRegistry, UpdateCallback};
pub use router::{Delivery, Inbound, RouteOutcome, Router};
pub use state::{ConnectionEvent, ConnectionState, StatusSnapshot};
