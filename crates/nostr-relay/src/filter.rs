//! Subscription filters (NIP-01 `REQ` selectors), including the dynamic
//! `#<tag>` map.

use std::collections::BTreeMap;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A set of optional selectors a relay must match with logical AND
/// across selectors and logical OR within a selector's list.
///
/// Equality and hashing are value-based over every selector, including
/// the dynamic single-letter tag map, so two filters built independently
/// but describing the same query compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    pub ids: Vec<String>,
    pub authors: Vec<String>,
    pub kinds: Vec<u32>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<u32>,
    /// Keyed by the tag letter (`e`, `p`, or any other `a`-`z`/`A`-`Z`
    /// single character), value is the list of allowed values for `#x`.
    pub tags: BTreeMap<char, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.ids = ids.into_iter().collect();
        self
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = String>) -> Self {
        self.authors = authors.into_iter().collect();
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn tag(mut self, letter: char, values: impl IntoIterator<Item = String>) -> Self {
        self.tags.insert(letter, values.into_iter().collect());
        self
    }

    fn tag_key(letter: char) -> String {
        format!("#{letter}")
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut len = 0;
        if !self.ids.is_empty() {
            len += 1;
        }
        if !self.authors.is_empty() {
            len += 1;
        }
        if !self.kinds.is_empty() {
            len += 1;
        }
        if self.since.is_some() {
            len += 1;
        }
        if self.until.is_some() {
            len += 1;
        }
        if self.limit.is_some() {
            len += 1;
        }
        len += self.tags.len();

        let mut map = serializer.serialize_map(Some(len))?;
        if !self.ids.is_empty() {
            map.serialize_entry("ids", &self.ids)?;
        }
        if !self.authors.is_empty() {
            map.serialize_entry("authors", &self.authors)?;
        }
        if !self.kinds.is_empty() {
            map.serialize_entry("kinds", &self.kinds)?;
        }
        if let Some(since) = self.since {
            map.serialize_entry("since", &since)?;
        }
        if let Some(until) = self.until {
            map.serialize_entry("until", &until)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        for (letter, values) in &self.tags {
            map.serialize_entry(&Self::tag_key(*letter), values)?;
        }
        map.end()
    }
}

struct FilterVisitor;

impl<'de> Visitor<'de> for FilterVisitor {
    type Value = Filter;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a Nostr filter object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Filter, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut filter = Filter::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "ids" => filter.ids = map.next_value()?,
                "authors" => filter.authors = map.next_value()?,
                "kinds" => filter.kinds = map.next_value()?,
                "since" => filter.since = Some(map.next_value()?),
                "until" => filter.until = Some(map.next_value()?),
                "limit" => filter.limit = Some(map.next_value()?),
                k if k.starts_with('#') && k.chars().count() == 2 => {
                    let letter = k.chars().nth(1).unwrap();
                    let values: Vec<String> = map.next_value()?;
                    filter.tags.insert(letter, values);
                }
                _ => {
                    let _ignored: serde::de::IgnoredAny = map.next_value()?;
                }
            }
        }
        Ok(filter)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FilterVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_absent_selectors() {
        let filter = Filter::new().kinds([1]).limit(10);
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"kinds":[1],"limit":10}"#);
    }

    #[test]
    fn roundtrip_with_tag_selectors() {
        let filter = Filter::new()
            .kinds([1])
            .tag('e', ["abc".to_string()])
            .tag('p', vec![]);
        let json = serde_json::to_string(&filter).unwrap();
        let parsed: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, filter);
        // empty tag lists must round-trip, not be dropped
        assert_eq!(parsed.tags.get(&'p'), Some(&vec![]));
    }

    #[test]
    fn unknown_tag_letters_pass_through() {
        let filter = Filter::new().tag('x', ["anything".to_string()]);
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"#x":["anything"]}"#);
        let parsed: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tags.get(&'x'), Some(&vec!["anything".to_string()]));
    }

    #[test]
    fn multi_character_tag_keys_do_not_collide() {
        let json = r#"{"#e":["one"],"#ee":["two"]}"#;
        let parsed: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.tags.get(&'e'), Some(&vec!["one".to_string()]));
        assert_eq!(parsed.tags.len(), 1, "unrecognized multi-char tag key should be ignored, not merged into '#e'");
    }

    #[test]
    fn equality_is_value_based() {
        let a = Filter::new().kinds([1, 2]).tag('e', ["x".to_string()]);
        let b = Filter::new().kinds([1, 2]).tag('e', ["x".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn unrecognized_keys_are_ignored_on_decode() {
        let json = r#"{"kinds":[1],"future_field":"ignored"}"#;
        let filter: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(filter.kinds, vec![1]);
    }
}
