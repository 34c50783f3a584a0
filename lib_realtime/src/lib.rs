//! # lib_realtime
//!
//! Real-time subscription client for the course-scheduling dashboards.
//!
//! A [`RealtimeClient`] keeps one WebSocket connection to the scheduling
//! service, reconnects with capped exponential backoff when it drops,
//! replays every registered subscription after each reconnection, and routes
//! pushed change events to the callback registered for their
//! `(collection, entity_id)` pair.
//!
//! Optional features:
//! - `retrieve`: REST client for the `/api/v1/` collections.
//! - `loggers`: `fern` console + file logging for binaries.

#![forbid(unsafe_code)]

/// The public client handle.
pub mod client;
/// Client configuration and entity-id extraction rules.
pub mod configs;
/// The background connection task.
pub mod connections;
/// Backoff, state, registry, pending handshakes and routing.
pub mod core;
/// Error types.
pub mod error;
/// Wire frames and keys.
pub mod models;

#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "retrieve")]
pub mod retrieve;

// --- Public API Re-exports ---
pub use client::RealtimeClient;
pub use configs::{ConfigError, ExtractionRules, RealtimeConfig};
pub use crate::core::{Confirmation, ConnectionEvent, ConnectionState, StatusSnapshot};
pub use error::{RealtimeError, Result};
pub use models::{Operation, SubscriptionKey, UpdateEvent};
