use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Error;

/// Tag with note count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

/// In-memory mapping from tag name to usage count for one session.
///
/// Keys are unique and carry no intrinsic order; ordering is a view concern
/// (see [`TagRegistry::ordered`]). The registry starts empty, is fully
/// replaced by each applied fetch response, and is discarded at session end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagRegistry {
    amounts: HashMap<String, i64>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a backend response, enforcing the invariants:
    /// tag names must be non-empty and counts non-negative. A response that
    /// violates either is rejected wholesale so the previous registry can be
    /// kept untouched.
    pub fn from_amounts(amounts: HashMap<String, i64>) -> Result<Self, Error> {
        for (name, count) in &amounts {
            if name.trim().is_empty() {
                return Err(Error::BackendRejected("empty tag name in response".into()));
            }
            if *count < 0 {
                return Err(Error::BackendRejected(format!(
                    "negative count {} for tag \"{}\"",
                    count, name
                )));
            }
        }
        Ok(Self { amounts })
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.amounts.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.amounts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.amounts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn clear(&mut self) {
        self.amounts.clear();
    }

    /// Display order for the tag list: count descending, then name ascending.
    ///
    /// A pure function of the registry snapshot. Names compare by Unicode
    /// code point, which keeps the order reproducible across environments.
    pub fn ordered(&self) -> Vec<TagCount> {
        let mut tags: Vec<TagCount> = self
            .amounts
            .iter()
            .map(|(name, count)| TagCount {
                name: name.clone(),
                count: *count,
            })
            .collect();
        tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        tags
    }
}

/// Trim a user-supplied tag name, rejecting empty results.
pub fn normalize_tag(raw: &str) -> Result<String, Error> {
    let tag = raw.trim();
    if tag.is_empty() {
        return Err(Error::Validation("tag name cannot be empty".into()));
    }
    Ok(tag.to_string())
}
