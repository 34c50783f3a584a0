//! # Message Router
//!
//! Classifies every inbound text frame and dispatches it.
//!
//! The frame shape is owned by the server, so classification is lenient:
//! anything that does not match a known shape becomes
//! [`Inbound::Unrecognized`] and is dropped with a debug log by the caller.
//!
//! ## Dispatch rules
//!
//! - `connection_established` carries the client identifier. The router only
//!   reports it; the connection task owns the state transition and the
//!   resubscription that must follow it.
//! - `subscription_confirmed` / `unsubscription_confirmed` resolve the
//!   matching pending handshake.
//! - `error` rejects the pending handshake(s) for the key it names, or is
//!   logged as unmatched when it names none.
//! - a frame with `collection` and `operation` is a data update. The entity
//!   id is extracted with [`ExtractionRules`], and the registered callback is
//!   invoked synchronously. Each invocation runs under `catch_unwind`, so a
//!   panicking subscriber is logged and the router keeps going.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::configs::ExtractionRules;
use crate::core::pending::PendingHandshakes;
use crate::core::registry::SubscriptionRegistry;
use crate::error::RealtimeError;
use crate::models::{scalar_to_string, HandshakeKind, ServerErrorFrame, SubscriptionKey, UpdateEvent};

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `connection_established`.
    Established {
        /// Identifier issued by the server.
        client_id: String,
    },
    /// `subscription_confirmed` or `unsubscription_confirmed`.
    Confirmed {
        /// Which request was confirmed.
        kind: HandshakeKind,
        /// The subscription it concerned.
        key: SubscriptionKey,
    },
    /// `error`.
    ServerError(ServerErrorFrame),
    /// `pong`, the answer to a keepalive.
    Pong,
    /// A data-update frame.
    Update(UpdateEvent),
    /// Anything else; the string says why.
    Unrecognized(String),
}

/// What happened to a data update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// No extraction rule matched, so the update has no target.
    NoEntityId,
    /// Nobody is subscribed to the derived key.
    NoSubscriber(SubscriptionKey),
    /// The callback ran to completion.
    Delivered(SubscriptionKey),
    /// The callback panicked; the panic was contained.
    CallbackPanicked(SubscriptionKey),
}

/// Result of routing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The connection was acknowledged.
    Established {
        /// Identifier issued by the server.
        client_id: String,
    },
    /// A confirmation arrived; `matched` is `false` when nobody was waiting.
    Resolved {
        /// Whether a pending handshake was completed.
        matched: bool,
    },
    /// An error frame arrived.
    Rejected {
        /// The server's message.
        message: String,
        /// Number of pending handshakes it failed.
        matched: usize,
    },
    /// Keepalive answer.
    Pong,
    /// A data update was routed.
    Delivered(Delivery),
    /// The frame was ignored.
    Dropped(String),
}

/// Stateless frame classifier plus update dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Router {
    rules: ExtractionRules,
}

impl Router {
    /// Creates a router using `rules` to find the entity id of updates.
    pub fn new(rules: ExtractionRules) -> Self {
        Self { rules }
    }

    /// The extraction table in use.
    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }

    /// Classifies one text frame.
    pub fn classify(&self, text: &str) -> Inbound {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return Inbound::Unrecognized(format!("invalid JSON: {}", e)),
        };
        let Some(obj) = value.as_object() else {
            return Inbound::Unrecognized("frame is not a JSON object".to_string());
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("connection_established") => {
                match obj.get("client_id").and_then(scalar_to_string) {
                    Some(client_id) => Inbound::Established { client_id },
                    None => Inbound::Unrecognized("acknowledgement without client_id".to_string()),
                }
            }
            Some("subscription_confirmed") => confirmed(HandshakeKind::Subscribe, &value),
            Some("unsubscription_confirmed") => confirmed(HandshakeKind::Unsubscribe, &value),
            Some("error") => Inbound::ServerError(error_frame(&value)),
            Some("pong") => Inbound::Pong,
            _ if obj.contains_key("collection") && obj.contains_key("operation") => {
                match UpdateEvent::from_value(value) {
                    Some(event) => Inbound::Update(event),
                    None => Inbound::Unrecognized("update with unknown operation".to_string()),
                }
            }
            Some(other) => Inbound::Unrecognized(format!("unknown frame type '{}'", other)),
            None => Inbound::Unrecognized("frame without type".to_string()),
        }
    }

    /// Classifies `text` and applies it to the pending handshakes and the
    /// registry. Connection-level consequences are left to the caller.
    pub fn route(
        &self,
        text: &str,
        registry: &SubscriptionRegistry,
        pending: &mut PendingHandshakes,
    ) -> RouteOutcome {
        match self.classify(text) {
            Inbound::Established { client_id } => RouteOutcome::Established { client_id },
            Inbound::Confirmed { kind, key } => {
                let matched = pending.resolve(kind, &key);
                if matched {
                    log::debug!("{} confirmed for {}", kind, key);
                } else {
                    log::debug!("Unsolicited {} confirmation for {}", kind, key);
                }
                RouteOutcome::Resolved { matched }
            }
            Inbound::ServerError(frame) => {
                let err = RealtimeError::Server(frame.message.clone());
                let matched = match (frame.key(), frame.request_type) {
                    (Some(key), Some(kind)) => usize::from(pending.reject(kind, &key, err)),
                    (Some(key), None) => pending.reject_key(&key, err),
                    (None, _) => 0,
                };
                if matched == 0 {
                    log::warn!("Unmatched server error: {}", frame.message);
                }
                RouteOutcome::Rejected {
                    message: frame.message,
                    matched,
                }
            }
            Inbound::Pong => RouteOutcome::Pong,
            Inbound::Update(event) => RouteOutcome::Delivered(self.deliver(&event, registry)),
            Inbound::Unrecognized(reason) => {
                log::debug!("Dropping frame ({}): {}", reason, text);
                RouteOutcome::Dropped(reason)
            }
        }
    }

    /// Invokes the callback subscribed to the update's target, if any.
    pub fn deliver(&self, event: &UpdateEvent, registry: &SubscriptionRegistry) -> Delivery {
        let Some(entity_id) = self.rules.entity_id(event) else {
            log::debug!(
                "No entity id for {} {} update; dropping",
                event.collection,
                event.operation
            );
            return Delivery::NoEntityId;
        };
        let key = SubscriptionKey::new(event.collection.as_str(), entity_id);

        let Some(callback) = registry.get(&key) else {
            log::debug!("No subscriber for {}", key);
            return Delivery::NoSubscriber(key);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(()) => Delivery::Delivered(key),
            Err(cause) => {
                let reason = cause
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| cause.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_string());
                log::warn!("Subscriber callback for {} panicked: {}", key, reason);
                Delivery::CallbackPanicked(key)
            }
        }
    }
}

fn confirmed(kind: HandshakeKind, value: &Value) -> Inbound {
    let collection = value.get("collection").and_then(Value::as_str);
    let entity_id = value.get("entity_id").and_then(scalar_to_string);
    match (collection, entity_id) {
        (Some(collection), Some(entity_id)) => Inbound::Confirmed {
            kind,
            key: SubscriptionKey::new(collection, entity_id),
        },
        _ => Inbound::Unrecognized(format!("{} confirmation without key", kind)),
    }
}

fn error_frame(value: &Value) -> ServerErrorFrame {
    let request_type = match value.get("request_type").and_then(Value::as_str) {
        Some("subscribe") => Some(HandshakeKind::Subscribe),
        Some("unsubscribe") => Some(HandshakeKind::Unsubscribe),
        _ => None,
    };
    ServerErrorFrame {
        message: value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown server error")
            .to_string(),
        collection: value
            .get("collection")
            .and_then(Value::as_str)
            .map(str::to_string),
        entity_id: value.get("entity_id").and_then(scalar_to_string),
        request_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::UpdateCallback;
    use crate::core::pending::Confirmation;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    fn counting(counter: &Arc<AtomicUsize>) -> UpdateCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &UpdateEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn classifies_acknowledgement() {
        let router = Router::default();
        assert_eq!(
            router.classify(r#"{"type":"connection_established","client_id":"abc","message":"hi"}"#),
            Inbound::Established {
                client_id: "abc".to_string()
            }
        );
        assert!(matches!(
            router.classify(r#"{"type":"connection_established"}"#),
            Inbound::Unrecognized(_)
        ));
    }

    #[test]
    fn malformed_frames_are_unrecognized() {
        let router = Router::default();
        for text in ["not json", "[1,2]", r#"{"type":"mystery"}"#, r#"{"hello":1}"#] {
            assert!(
                matches!(router.classify(text), Inbound::Unrecognized(_)),
                "{text}"
            );
        }
        assert!(matches!(
            router.classify(r#"{"collection":"courses","operation":"truncate"}"#),
            Inbound::Unrecognized(_)
        ));
    }

    #[test]
    fn delivers_the_exact_payload_once() {
        let router = Router::default();
        let mut registry = SubscriptionRegistry::new();
        let mut pending = PendingHandshakes::new();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let sink = Arc::clone(&seen);
        registry.insert(
            SubscriptionKey::new("time_slots", "CSE101"),
            Arc::new(move |event: &UpdateEvent| {
                sink.lock().unwrap().push(event.payload.clone());
            }),
        );

        let text = r#"{"collection":"time_slots","operation":"update","document":{"course_id":"CSE101"},"updated_fields":{"room_id":"B202"}}"#;
        let outcome = router.route(text, &registry, &mut pending);

        assert_eq!(
            outcome,
            RouteOutcome::Delivered(Delivery::Delivered(SubscriptionKey::new(
                "time_slots",
                "CSE101"
            )))
        );
        let expected: Value = serde_json::from_str(text).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![expected]);
    }

    #[test]
    fn routes_by_student_only_to_matching_subscriber() {
        let router = Router::default();
        let mut registry = SubscriptionRegistry::new();
        let mut pending = PendingHandshakes::new();
        let s1 = Arc::new(AtomicUsize::new(0));
        let s2 = Arc::new(AtomicUsize::new(0));
        registry.insert(SubscriptionKey::new("schedules", "S1"), counting(&s1));
        registry.insert(SubscriptionKey::new("schedules", "S2"), counting(&s2));

        router.route(
            r#"{"collection":"schedules","operation":"insert","document":{"student_id":"S1"}}"#,
            &registry,
            &mut pending,
        );

        assert_eq!(s1.load(Ordering::SeqCst), 1);
        assert_eq!(s2.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let router = Router::default();
        let mut registry = SubscriptionRegistry::new();
        let mut pending = PendingHandshakes::new();
        let healthy = Arc::new(AtomicUsize::new(0));
        registry.insert(
            SubscriptionKey::new("courses", "BAD1"),
            Arc::new(|_: &UpdateEvent| panic!("subscriber bug")),
        );
        registry.insert(SubscriptionKey::new("courses", "GOOD1"), counting(&healthy));

        let bad = router.route(
            r#"{"collection":"courses","operation":"replace","document":{"course_id":"BAD1"}}"#,
            &registry,
            &mut pending,
        );
        let good = router.route(
            r#"{"collection":"courses","operation":"replace","document":{"course_id":"GOOD1"}}"#,
            &registry,
            &mut pending,
        );

        assert_eq!(
            bad,
            RouteOutcome::Delivered(Delivery::CallbackPanicked(SubscriptionKey::new(
                "courses", "BAD1"
            )))
        );
        assert!(matches!(good, RouteOutcome::Delivered(Delivery::Delivered(_))));
        assert_eq!(healthy.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn confirmation_resolves_the_waiter() {
        let router = Router::default();
        let registry = SubscriptionRegistry::new();
        let mut pending = PendingHandshakes::new();
        let key = SubscriptionKey::new("enrollments", "S9");
        let (tx, mut rx) = oneshot::channel();
        pending.register(HandshakeKind::Unsubscribe, key.clone(), tx);

        let outcome = router.route(
            r#"{"type":"unsubscription_confirmed","collection":"enrollments","entity_id":"S9"}"#,
            &registry,
            &mut pending,
        );

        assert_eq!(outcome, RouteOutcome::Resolved { matched: true });
        assert_eq!(
            rx.try_recv().unwrap(),
            Ok(Confirmation {
                kind: HandshakeKind::Unsubscribe,
                key
            })
        );
    }

    #[test]
    fn error_frame_rejects_by_key_and_kind() {
        let router = Router::default();
        let registry = SubscriptionRegistry::new();
        let mut pending = PendingHandshakes::new();
        let key = SubscriptionKey::new("rooms", "R1");
        let (sub_tx, mut sub_rx) = oneshot::channel();
        let (unsub_tx, mut unsub_rx) = oneshot::channel();
        pending.register(HandshakeKind::Subscribe, key.clone(), sub_tx);
        pending.register(HandshakeKind::Unsubscribe, key.clone(), unsub_tx);

        let outcome = router.route(
            r#"{"type":"error","message":"nope","collection":"rooms","entity_id":"R1","request_type":"subscribe"}"#,
            &registry,
            &mut pending,
        );

        assert_eq!(
            outcome,
            RouteOutcome::Rejected {
                message: "nope".to_string(),
                matched: 1
            }
        );
        assert_eq!(
            sub_rx.try_recv().unwrap(),
            Err(RealtimeError::Server("nope".to_string()))
        );
        assert!(unsub_rx.try_recv().is_err());
        assert!(pending.contains(HandshakeKind::Unsubscribe, &key));
    }

    #[test]
    fn uncorrelated_error_leaves_waiters_alone() {
        let router = Router::default();
        let registry = SubscriptionRegistry::new();
        let mut pending = PendingHandshakes::new();
        let (tx, _rx) = oneshot::channel();
        pending.register(HandshakeKind::Subscribe, SubscriptionKey::new("rooms", "R1"), tx);

        let outcome = router.route(
            r#"{"type":"error","message":"Invalid subscription request"}"#,
            &registry,
            &mut pending,
        );

        assert_eq!(
            outcome,
            RouteOutcome::Rejected {
                message: "Invalid subscription request".to_string(),
                matched: 0
            }
        );
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn update_without_rule_is_dropped() {
        let router = Router::new(ExtractionRules::empty());
        let registry = SubscriptionRegistry::new();
        assert_eq!(
            router.deliver(
                &UpdateEvent::from_value(serde_json::json!({
                    "collection": "departments", "operation": "delete"
                }))
                .unwrap(),
                &registry
            ),
            Delivery::NoEntityId
        );
    }
}
