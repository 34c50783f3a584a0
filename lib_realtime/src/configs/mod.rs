//! # Configuration Modules
//!
//! This module aggregates the settings of the real-time client: the
//! connection and backoff parameters, and the table that maps update frames
//! to subscriptions.

/// Connection, backoff and timeout settings loaded from JSON.
pub mod config_realtime;

/// Collection → entity-id field table used by the router.
pub mod extraction;

pub use config_realtime::{ConfigError, RealtimeConfig};
pub use extraction::ExtractionRules;
