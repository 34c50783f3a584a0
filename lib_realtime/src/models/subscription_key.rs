use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Subscription Key
///
/// Identifies one subscription by its `(collection, entity_id)` pair.
///
/// The pair is kept structured end to end, so an entity identifier that
/// contains a delimiter character can never collide with another key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// Collection name, e.g. `"schedules"` or `"time_slots"`.
    pub collection: String,
    /// Entity identifier within the collection, e.g. a student or course id.
    pub entity_id: String,
}

impl SubscriptionKey {
    /// Builds a key from anything string-like.
    pub fn new(collection: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            entity_id: entity_id.into(),
        }
    }

    /// `false` when either half is empty or only whitespace. The server
    /// cannot correlate its answer to such a request.
    pub fn is_complete(&self) -> bool {
        !self.collection.trim().is_empty() && !self.entity_id.trim().is_empty()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.entity_id)
    }
}

/// Returned when a `collection/entity_id` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected `collection/entity_id`, got {0:?}")]
pub struct ParseKeyError(pub String);

impl FromStr for SubscriptionKey {
    type Err = ParseKeyError;

    /// Splits on the first `/`; the entity id may itself contain `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((collection, entity_id)) if !collection.is_empty() && !entity_id.is_empty() => {
                Ok(SubscriptionKey::new(collection, entity_id))
            }
            _ => Err(ParseKeyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let key = SubscriptionKey::new("schedules", "S1");
        assert_eq!(key.to_string(), "schedules/S1");
        assert_eq!("schedules/S1".parse::<SubscriptionKey>().unwrap(), key);
    }

    #[test]
    fn entity_id_may_contain_the_delimiter() {
        let key: SubscriptionKey = "courses/CSE/101:A".parse().unwrap();
        assert_eq!(key.collection, "courses");
        assert_eq!(key.entity_id, "CSE/101:A");
    }

    #[test]
    fn delimiter_inside_ids_does_not_collide() {
        // "a:b" + "c" and "a" + "b:c" were the same string key in a flat map.
        let left = SubscriptionKey::new("a:b", "c");
        let right = SubscriptionKey::new("a", "b:c");
        assert_ne!(left, right);
    }

    #[test]
    fn rejects_missing_parts() {
        assert!("schedules".parse::<SubscriptionKey>().is_err());
        assert!("/S1".parse::<SubscriptionKey>().is_err());
        assert!("schedules/".parse::<SubscriptionKey>().is_err());
    }
}
