//! # Subscription Registry
//!
//! The desired set of subscriptions, independent of connection churn.
//! Entries are added optimistically on `subscribe()`, removed only by
//! `unsubscribe()` (or teardown), and replayed after every acknowledged
//! reconnection.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::models::{ClientFrame, SubscriptionKey, UpdateEvent};

/// Subscriber callback. Invoked synchronously on the connection task.
pub type UpdateCallback = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Subscriptions keyed by `(collection, entity_id)`, kept in key order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: BTreeMap<SubscriptionKey, UpdateCallback>,
}

impl SubscriptionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `callback` for `key`, replacing any earlier one.
    /// Returns `true` if an entry was replaced.
    pub fn insert(&mut self, key: SubscriptionKey, callback: UpdateCallback) -> bool {
        let replaced = self.subscriptions.insert(key.clone(), callback).is_some();
        if replaced {
            log::debug!("Replacing callback for {}", key);
        }
        replaced
    }

    /// Forgets `key`. Returns `true` if it was registered.
    pub fn remove(&mut self, key: &SubscriptionKey) -> bool {
        self.subscriptions.remove(key).is_some()
    }

    /// Callback for `key`, cloned out so the caller may invoke it without
    /// holding a borrow of the registry.
    pub fn get(&self, key: &SubscriptionKey) -> Option<UpdateCallback> {
        self.subscriptions.get(key).cloned()
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.subscriptions.contains_key(key)
    }

    /// Registered keys in key order.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// One subscribe frame per registered key. The keys are snapshotted
    /// first, so sending them cannot race with later mutations.
    pub fn resubscribe_frames(&self) -> Vec<ClientFrame> {
        self.keys().iter().map(ClientFrame::subscribe).collect()
    }

    /// Forgets every subscription.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> UpdateCallback {
        Arc::new(|_: &UpdateEvent| {})
    }

    #[test]
    fn later_subscribe_replaces_the_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::new("schedules", "S1");

        assert!(!registry.insert(key.clone(), noop()));
        let counter = Arc::clone(&hits);
        assert!(registry.insert(
            key.clone(),
            Arc::new(move |_: &UpdateEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        ));
        assert_eq!(registry.len(), 1);

        let event = UpdateEvent::from_value(serde_json::json!({
            "collection": "schedules", "operation": "delete"
        }))
        .unwrap();
        (registry.get(&key).unwrap())(&event);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resubscribe_emits_one_frame_per_key() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(SubscriptionKey::new("time_slots", "CSE101"), noop());
        registry.insert(SubscriptionKey::new("schedules", "S1"), noop());
        registry.insert(SubscriptionKey::new("schedules", "S1"), noop());

        let frames = registry.resubscribe_frames();
        assert_eq!(
            frames,
            vec![
                ClientFrame::subscribe(&SubscriptionKey::new("schedules", "S1")),
                ClientFrame::subscribe(&SubscriptionKey::new("time_slots", "CSE101")),
            ]
        );
    }

    #[test]
    fn remove_reports_membership() {
        let mut registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::new("courses", "CSE101");
        registry.insert(key.clone(), noop());
        assert!(registry.remove(&key));
        assert!(!registry.remove(&key));
        assert!(registry.is_empty());
    }
}
