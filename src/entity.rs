//! Value types flowing through the decision cache.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A variation assignment produced by the prediction service.
///
/// Created fresh on every remote fetch and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub variation_id: String,
    pub cmab_uuid: String,
}

/// What the cache keeps for a `(user, rule)` pair.
///
/// `attributes_hash` is the fingerprint of the attributes the decision was
/// fetched with; a mismatch on a later lookup invalidates the entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub attributes_hash: String,
    pub variation_id: String,
    pub cmab_uuid: String,
}

impl CacheEntry {
    pub fn new(attributes_hash: String, decision: &Decision) -> Self {
        CacheEntry {
            attributes_hash,
            variation_id: decision.variation_id.clone(),
            cmab_uuid: decision.cmab_uuid.clone(),
        }
    }

    pub fn to_decision(&self) -> Decision {
        Decision {
            variation_id: self.variation_id.clone(),
            cmab_uuid: self.cmab_uuid.clone(),
        }
    }
}

/// A decision together with the diagnostic trail that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionResponse {
    pub decision: Decision,
    /// One human-readable line per cache action taken.
    pub reasons: Vec<String>,
}

/// The user a decision is requested for.
///
/// Read-only input to the decision cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub attributes: HashMap<String, Value>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        UserContext {
            user_id: user_id.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add or replace one attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
