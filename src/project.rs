//! Project configuration as seen by the decision cache.
//!
//! The decision cache only needs two lookups from the project's
//! configuration: which attribute ids a CMAB rule consumes, and the key each
//! attribute id maps to. The `ProjectConfig` trait captures exactly that, so
//! any datafile model can plug in.
//!
//! `StaticProjectConfig` is a hand-assembled implementation for tests and
//! callers that build configuration in code.

use crate::entity::UserContext;
use crate::key::Attributes;
use std::collections::HashMap;

/// Read-only view of the project configuration.
pub trait ProjectConfig: Send + Sync {
    /// Attribute ids the rule's CMAB model consumes.
    ///
    /// `None` when the rule is unknown or has no CMAB configuration.
    fn cmab_attribute_ids(&self, rule_id: &str) -> Option<&[String]>;

    /// Attribute key for an attribute id.
    fn attribute_key(&self, attribute_id: &str) -> Option<&str>;

    /// Select the user attributes relevant to `rule_id`.
    ///
    /// Only attributes listed in the rule's CMAB configuration and present on
    /// the user are kept. Anything else is neither sent to the prediction
    /// service nor part of the cache fingerprint.
    fn filter_attributes(&self, user: &UserContext, rule_id: &str) -> Attributes {
        let mut filtered = Attributes::new();

        let Some(attribute_ids) = self.cmab_attribute_ids(rule_id) else {
            return filtered;
        };

        for attribute_id in attribute_ids {
            let Some(key) = self.attribute_key(attribute_id) else {
                continue;
            };
            if let Some(value) = user.attributes.get(key) {
                filtered.insert(key.to_string(), value.clone());
            }
        }

        filtered
    }
}

/// Experiment entry: `None` for rules without CMAB.
#[derive(Clone, Debug, Default)]
struct ExperimentEntry {
    cmab_attribute_ids: Option<Vec<String>>,
}

/// In-memory `ProjectConfig` assembled in code.
///
/// # Example
///
/// ```
/// use cmab_cache::project::{ProjectConfig, StaticProjectConfig};
///
/// let config = StaticProjectConfig::new()
///     .with_attribute("attr_1", "age")
///     .with_cmab_experiment("exp_1", ["attr_1"]);
///
/// assert_eq!(config.attribute_key("attr_1"), Some("age"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticProjectConfig {
    experiments: HashMap<String, ExperimentEntry>,
    attributes: HashMap<String, String>,
}

impl StaticProjectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule that uses CMAB with the given attribute ids.
    pub fn with_cmab_experiment<I, S>(mut self, rule_id: impl Into<String>, attribute_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = attribute_ids.into_iter().map(Into::into).collect();
        self.experiments.insert(
            rule_id.into(),
            ExperimentEntry {
                cmab_attribute_ids: Some(ids),
            },
        );
        self
    }

    /// Register a rule without CMAB configuration.
    pub fn with_experiment(mut self, rule_id: impl Into<String>) -> Self {
        self.experiments
            .insert(rule_id.into(), ExperimentEntry::default());
        self
    }

    /// Map an attribute id to its key.
    pub fn with_attribute(mut self, attribute_id: impl Into<String>, key: impl Into<String>) -> Self {
        self.attributes.insert(attribute_id.into(), key.into());
        self
    }
}

impl ProjectConfig for StaticProjectConfig {
    fn cmab_attribute_ids(&self, rule_id: &str) -> Option<&[String]> {
        self.experiments
            .get(rule_id)?
            .cmab_attribute_ids
            .as_deref()
    }

    fn attribute_key(&self, attribute_id: &str) -> Option<&str> {
        self.attributes.get(attribute_id).map(String::as_str)
    }
}
