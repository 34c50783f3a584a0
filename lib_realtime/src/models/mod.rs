//! # Models Module
//!
//! Typed views of the real-time wire protocol: the structured subscription
//! key, outbound client frames, and the inbound update and error frames the
//! router hands to the rest of the client.

/// Outbound frames and typed views of inbound frames.
pub mod frames;
/// The `(collection, entity_id)` composite key.
pub mod subscription_key;

// --- Public API Re-exports ---
pub use frames::{
    scalar_to_string, ClientFrame, HandshakeKind, Operation, ServerErrorFrame, UpdateEvent,
};
pub use subscription_key::{ParseKeyError, SubscriptionKey};
