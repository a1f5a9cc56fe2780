//! Events, filters and outbound envelopes
//!
//! The registry treats these as collaborators: a [`Filter`] is the match
//! predicate stored with each listener, an [`Event`] is what gets published,
//! and an [`EventEnvelope`] is what gets written to a matching connection.

pub mod envelope;
pub mod filter;

use serde::{Deserialize, Serialize};

pub use envelope::EventEnvelope;
pub use filter::Filter;

/// A published event
///
/// Validation (ids, signatures) happens before an event reaches the relay core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event id (hex)
    pub id: String,
    /// Author public key (hex)
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Tags, each `[name, value, ...]`
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    /// Event content
    #[serde(default)]
    pub content: String,
    /// Signature (hex)
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Create an event with no tags, content or signature
    pub fn new(
        id: impl Into<String>,
        pubkey: impl Into<String>,
        kind: u16,
        created_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags: Vec::new(),
            content: String::new(),
            sig: String::new(),
        }
    }

    /// Add a tag
    pub fn with_tag<I, S>(mut self, tag: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(tag.into_iter().map(Into::into).collect());
        self
    }

    /// Set the content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Check whether any `[name, value, ...]` tag has a value in `values`
    pub fn has_tag_value(&self, name: &str, values: &[String]) -> bool {
        self.tags.iter().any(|tag| {
            tag.len() >= 2 && tag[0] == name && values.iter().any(|v| *v == tag[1])
        })
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(kind {})", self.id, self.kind)
    }
}
