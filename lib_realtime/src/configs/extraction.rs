//! # Entity-ID Extraction Rules
//!
//! A data-update frame names its collection but not the subscription it
//! belongs to. The entity identifier has to be read from the changed
//! document, and which field holds it depends on the collection (a `users`
//! document may carry `user_id`, `student_id` or `instructor_id`).
//!
//! The mapping is configuration, not code: a table from collection name to
//! an ordered list of candidate fields. The default table mirrors the
//! server's own notifier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{scalar_to_string, UpdateEvent};

/// Collection name → candidate field names, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionRules {
    rules: BTreeMap<String, Vec<String>>,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        ExtractionRules::empty()
            .with_rule("enrollments", ["student_id"])
            .with_rule("schedules", ["student_id"])
            .with_rule("time_slots", ["course_id"])
            .with_rule("users", ["user_id", "student_id", "instructor_id"])
            .with_rule("courses", ["course_id"])
    }
}

impl ExtractionRules {
    /// A table with no collections; every update is dropped until rules are added.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Builder form of [`ExtractionRules::set_rule`].
    pub fn with_rule<I, S>(mut self, collection: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_rule(collection, fields);
        self
    }

    /// Replaces the candidate list for `collection`.
    pub fn set_rule<I, S>(&mut self, collection: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.insert(
            collection.to_string(),
            fields.into_iter().map(Into::into).collect(),
        );
    }

    /// Candidate fields for `collection`, if it has a rule.
    pub fn fields_for(&self, collection: &str) -> Option<&[String]> {
        self.rules.get(collection).map(Vec::as_slice)
    }

    /// Collections that have a rule.
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Derives the entity identifier of an update.
    ///
    /// `document` is searched first, then `updated_fields`; within each, the
    /// candidates are tried in order and the first non-empty string or number
    /// wins.
    pub fn entity_id(&self, event: &UpdateEvent) -> Option<String> {
        let fields = self.fields_for(&event.collection)?;
        let sources = [event.document.as_ref(), event.updated_fields.as_ref()];

        sources.into_iter().flatten().find_map(|source| {
            fields
                .iter()
                .find_map(|field| source.get(field).and_then(scalar_to_string))
        })
    }
}
