//! Subscription filters
//!
//! A filter is a conjunction of optional constraints. Absent constraints match
//! everything; present ones must all hold for [`Filter::matches`] to succeed.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::Event;

/// Match predicate attached to a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Accepted event ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Accepted event kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Accepted authors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Tag constraints keyed as `#<name>`
    ///
    /// Other unknown keys (such as `search`) are dropped when parsing.
    #[serde(flatten, deserialize_with = "tag_constraints")]
    pub tags: BTreeMap<String, Vec<String>>,

    /// Lower bound on `created_at` (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Upper bound on `created_at` (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Result limit for stored-event queries; ignored when matching live events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Create a filter that matches every event
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given ids
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given kinds
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Restrict to the given authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    /// Require a `[name, value]` tag with one of `values`
    pub fn tag<I, S>(mut self, name: char, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.insert(
            format!("#{name}"),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Set the lower time bound
    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the upper time bound
    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    /// Set the result limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether `event` satisfies every constraint of this filter
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref ids) = self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if let Some(ref authors) = self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }

        for (key, values) in &self.tags {
            if let Some(name) = key.strip_prefix('#') {
                if !event.has_tag_value(name, values) {
                    return false;
                }
            }
        }

        if matches!(self.since, Some(since) if event.created_at < since) {
            return false;
        }

        if matches!(self.until, Some(until) if event.created_at > until) {
            return false;
        }

        true
    }
}

/// Keep `#x` keys, which must hold string arrays, and skip everything else
fn tag_constraints<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let extra = BTreeMap::<String, Value>::deserialize(deserializer)?;
    let mut tags = BTreeMap::new();

    for (key, value) in extra {
        if !key.starts_with('#') {
            continue;
        }
        let values = Vec::<String>::deserialize(value)
            .map_err(|e| D::Error::custom(format!("tag constraint {key}: {e}")))?;
        tags.insert(key, values);
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event::new("id1", "alice", 1, 100).with_tag(["t", "rust"])
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(Filter::new().matches(&event()));
    }

    #[test]
    fn test_kinds() {
        assert!(Filter::new().kinds([1, 2]).matches(&event()));
        assert!(!Filter::new().kinds([2]).matches(&event()));
        // An explicitly empty list matches nothing
        assert!(!Filter::new().kinds(Vec::new()).matches(&event()));
    }

    #[test]
    fn test_ids_and_authors() {
        assert!(Filter::new().ids(["id1"]).authors(["alice"]).matches(&event()));
        assert!(!Filter::new().ids(["id2"]).matches(&event()));
        assert!(!Filter::new().authors(["bob"]).matches(&event()));
    }

    #[test]
    fn test_tags() {
        assert!(Filter::new().tag('t', ["rust", "go"]).matches(&event()));
        assert!(!Filter::new().tag('t', ["go"]).matches(&event()));
        assert!(!Filter::new().tag('e', ["rust"]).matches(&event()));
    }

    #[test]
    fn test_time_bounds() {
        assert!(Filter::new().since(100).until(100).matches(&event()));
        assert!(!Filter::new().since(101).matches(&event()));
        assert!(!Filter::new().until(99).matches(&event()));
    }

    #[test]
    fn test_limit_ignored() {
        assert!(Filter::new().limit(0).matches(&event()));
    }

    #[test]
    fn test_json_tag_keys() {
        let filter: Filter =
            serde_json::from_str(r##"{"kinds":[1],"#t":["rust"],"since":50}"##).unwrap();

        assert_eq!(filter, Filter::new().kinds([1]).tag('t', ["rust"]).since(50));
        assert!(filter.matches(&event()));

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["#t"][0], "rust");
        assert!(json.get("ids").is_none());
    }

    #[test]
    fn test_json_unknown_keys_skipped() {
        let filter: Filter =
            serde_json::from_str(r#"{"kinds":[1],"search":"rust","extra":{"x":1}}"#).unwrap();

        assert_eq!(filter, Filter::new().kinds([1]));
        assert!(filter.matches(&event()));
    }

    #[test]
    fn test_json_bad_tag_values() {
        let err = serde_json::from_str::<Filter>(r##"{"#t":[1]}"##).unwrap_err();
        assert!(err.to_string().contains("#t"));
    }
}
