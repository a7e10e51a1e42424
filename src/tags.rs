//! Resource tags and tag filters
//!
//! A [`TagFilter`] maps each tag key to one or more acceptable values and is
//! the selection mechanism for bulk operations. Filters come from a JSON
//! object on the command line (single quotes tolerated) or an interactive
//! prompt; see [`crate::input`].

use anyhow::{bail, Result};
use serde_json::Value;

/// A single key/value tag on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One predicate of a tag filter: the tag under `key` must have one of
/// `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPredicate {
    pub key: String,
    pub values: Vec<String>,
}

/// An ordered set of tag predicates. A resource matches when every predicate
/// is satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    predicates: Vec<TagPredicate>,
}

impl TagFilter {
    /// Parse a filter from a JSON object string. Values may be a single
    /// string or an array of strings. Single quotes are normalized to double
    /// quotes before parsing; anything else is a hard failure.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.replace('\'', "\"");
        let value: Value = serde_json::from_str(&normalized)
            .map_err(|e| anyhow::anyhow!("Invalid tag filter '{raw}': {e}"))?;
        let Value::Object(map) = value else {
            bail!("Invalid tag filter '{raw}': expected a JSON object");
        };

        let mut filter = TagFilter::default();
        for (key, val) in map {
            let values = match val {
                Value::String(s) => vec![s],
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(s) => out.push(s),
                            other => bail!(
                                "Invalid tag filter value for '{key}': expected string, got {other}"
                            ),
                        }
                    }
                    out
                }
                other => bail!(
                    "Invalid tag filter value for '{key}': expected string or array, got {other}"
                ),
            };
            filter.insert(key, values);
        }
        Ok(filter)
    }

    /// Add a predicate, merging values if the key is already present.
    pub fn insert(&mut self, key: String, mut values: Vec<String>) {
        if let Some(existing) = self.predicates.iter_mut().find(|p| p.key == key) {
            existing.values.append(&mut values);
        } else {
            self.predicates.push(TagPredicate { key, values });
        }
    }

    pub fn predicates(&self) -> &[TagPredicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Whether a resource's tags satisfy every predicate.
    pub fn matches(&self, tags: &[Tag]) -> bool {
        self.predicates.iter().all(|p| {
            tags.iter()
                .any(|t| t.key == p.key && p.values.contains(&t.value))
        })
    }
}

/// Convert EC2 SDK tags into plain tags, dropping entries without both key
/// and value.
pub fn from_ec2_tags(tags: &[aws_sdk_ec2::types::Tag]) -> Vec<Tag> {
    tags.iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(k), Some(v)) => Some(Tag::new(k, v)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_multi_valued_keys() {
        let filter = TagFilter::parse(r#"{"Team": "A", "Env": ["dev", "qa"]}"#).unwrap();
        let team = filter.predicates().iter().find(|p| p.key == "Team").unwrap();
        let env = filter.predicates().iter().find(|p| p.key == "Env").unwrap();
        assert_eq!(team.values, vec!["A"]);
        assert_eq!(env.values, vec!["dev", "qa"]);
    }

    #[test]
    fn normalizes_single_quotes() {
        let filter = TagFilter::parse("{'Team': 'A'}").unwrap();
        assert_eq!(filter.predicates()[0].key, "Team");
        assert_eq!(filter.predicates()[0].values, vec!["A"]);
    }

    #[test]
    fn rejects_non_object_input() {
        assert!(TagFilter::parse("[1, 2]").is_err());
        assert!(TagFilter::parse("not json").is_err());
    }

    #[test]
    fn rejects_non_string_values() {
        assert!(TagFilter::parse(r#"{"Team": 42}"#).is_err());
        assert!(TagFilter::parse(r#"{"Env": ["dev", 1]}"#).is_err());
    }

    #[test]
    fn matches_requires_every_predicate() {
        let filter = TagFilter::parse(r#"{"Team": "A", "Env": ["dev", "qa"]}"#).unwrap();
        let tagged = vec![Tag::new("Team", "A"), Tag::new("Env", "qa")];
        let wrong_env = vec![Tag::new("Team", "A"), Tag::new("Env", "prod")];
        let missing_key = vec![Tag::new("Team", "A")];
        assert!(filter.matches(&tagged));
        assert!(!filter.matches(&wrong_env));
        assert!(!filter.matches(&missing_key));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = TagFilter::default();
        assert!(filter.matches(&[]));
        assert!(filter.matches(&[Tag::new("Team", "A")]));
    }

    #[test]
    fn insert_merges_duplicate_keys() {
        let mut filter = TagFilter::default();
        filter.insert("Env".into(), vec!["dev".into()]);
        filter.insert("Env".into(), vec!["qa".into()]);
        assert_eq!(filter.predicates().len(), 1);
        assert_eq!(filter.predicates()[0].values, vec!["dev", "qa"]);
    }
}
