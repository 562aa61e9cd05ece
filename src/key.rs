//! Cache key, attribute fingerprint and lock stripe derivation.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use xxhash_rust::xxh32::xxh32;
use xxhash_rust::xxh64::xxh64;

/// Filtered user attributes, ordered by attribute key.
pub type Attributes = BTreeMap<String, Value>;

/// Builder for decision cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build the cache key for a `(user, rule)` pair.
    ///
    /// Format: `"<len(user_id)>-<user_id>-<rule_id>"`. The length prefix keeps
    /// keys unique when the user id itself contains `-`.
    pub fn build(user_id: &str, rule_id: &str) -> String {
        format!("{}-{}-{}", user_id.len(), user_id, rule_id)
    }

    /// Split a key back into `(user_id, rule_id)`.
    pub fn parse(key: &str) -> Option<(&str, &str)> {
        let (len, rest) = key.split_once('-')?;
        let len: usize = len.parse().ok()?;
        let user_id = rest.get(..len)?;
        let rule_id = rest.get(len..)?.strip_prefix('-')?;
        Some((user_id, rule_id))
    }
}

/// Order-independent fingerprint of the attributes relevant to a rule.
///
/// The map is serialized as canonical JSON and hashed with xxh64. Object keys
/// are sorted at every depth, whatever order `serde_json::Map` keeps them in.
/// Returned as 16 lowercase hex digits.
pub fn hash_attributes(attributes: &Attributes) -> String {
    let canonical: BTreeMap<&str, Canonical<'_>> = attributes
        .iter()
        .map(|(key, value)| (key.as_str(), Canonical(value)))
        .collect();
    // String keys and JSON values always serialize
    let json = serde_json::to_string(&canonical).unwrap_or_default();
    format!("{:016x}", xxh64(json.as_bytes(), 0))
}

/// JSON value serialized with sorted object keys.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Canonical(value))?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(&Canonical(item))?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

/// Index of the lock stripe guarding `(user_id, rule_id)`.
pub fn stripe_index(user_id: &str, rule_id: &str, stripes: usize) -> usize {
    debug_assert!(stripes > 0);
    let mut input = String::with_capacity(user_id.len() + rule_id.len());
    input.push_str(user_id);
    input.push_str(rule_id);
    xxh32(input.as_bytes(), 0) as usize % stripes
}
