//! # Pending Handshakes
//!
//! In-flight subscribe/unsubscribe requests waiting for their confirmation
//! or error frame, keyed by `(kind, collection, entity_id)`.
//!
//! There is at most one waiter per kind per key. A newer request replaces the
//! older one, and the older caller is told so with
//! [`RealtimeError::Superseded`].

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::{RealtimeError, Result};
use crate::models::{HandshakeKind, SubscriptionKey};

/// The server's acknowledgement of a subscribe or unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Which request was confirmed.
    pub kind: HandshakeKind,
    /// The subscription it concerned.
    pub key: SubscriptionKey,
}

/// Reply channel of one waiting caller.
pub type Responder = oneshot::Sender<Result<Confirmation>>;

/// Table of waiting callers.
#[derive(Debug, Default)]
pub struct PendingHandshakes {
    waiting: HashMap<(HandshakeKind, SubscriptionKey), Responder>,
}

impl PendingHandshakes {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter, superseding any earlier one of the same kind and key.
    pub fn register(&mut self, kind: HandshakeKind, key: SubscriptionKey, responder: Responder) {
        if let Some(previous) = self.waiting.insert((kind, key.clone()), responder) {
            log::debug!("Superseding pending {} for {}", kind, key);
            let _ = previous.send(Err(RealtimeError::Superseded(kind)));
        }
    }

    /// Completes the waiter for `(kind, key)` successfully.
    /// Returns `false` when nobody was waiting.
    pub fn resolve(&mut self, kind: HandshakeKind, key: &SubscriptionKey) -> bool {
        match self.waiting.remove(&(kind, key.clone())) {
            Some(responder) => {
                let _ = responder.send(Ok(Confirmation {
                    kind,
                    key: key.clone(),
                }));
                true
            }
            None => false,
        }
    }

    /// Fails the waiter for `(kind, key)`. Returns `false` when nobody was waiting.
    pub fn reject(&mut self, kind: HandshakeKind, key: &SubscriptionKey, err: RealtimeError) -> bool {
        match self.waiting.remove(&(kind, key.clone())) {
            Some(responder) => {
                let _ = responder.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Fails every waiter for `key`, whatever its kind. Returns how many were failed.
    pub fn reject_key(&mut self, key: &SubscriptionKey, err: RealtimeError) -> usize {
        [HandshakeKind::Subscribe, HandshakeKind::Unsubscribe]
            .into_iter()
            .filter(|kind| self.reject(*kind, key, err.clone()))
            .count()
    }

    /// Fails every waiter. Used when the socket goes away.
    pub fn fail_all(&mut self, err: RealtimeError) -> usize {
        let failed = self.waiting.len();
        for (_, responder) in self.waiting.drain() {
            let _ = responder.send(Err(err.clone()));
        }
        failed
    }

    /// Whether `(kind, key)` has a waiter.
    pub fn contains(&self, kind: HandshakeKind, key: &SubscriptionKey) -> bool {
        self.waiting.contains_key(&(kind, key.clone()))
    }

    /// Number of waiters.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    /// `true` when nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
