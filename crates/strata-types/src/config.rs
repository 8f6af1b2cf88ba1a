use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Attribute sections: `section -> key -> value`.
pub type AttributeSections = BTreeMap<String, BTreeMap<String, Value>>;

/// Configuration of one named blob store.
///
/// Type-specific settings live in namespaced attribute sections, e.g. a
/// group keeps its member list under `group.members`. The registry treats
/// the attributes as opaque; each store type interprets its own section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlobStoreConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: String,
    #[serde(default)]
    pub attributes: AttributeSections,
}

impl BlobStoreConfiguration {
    /// Create a configuration with no attributes.
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            attributes: AttributeSections::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(
        mut self,
        section: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.set_attribute(section, key, value);
        self
    }

    /// A copy of this configuration under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// All keys of an attribute section.
    pub fn section(&self, section: &str) -> Option<&BTreeMap<String, Value>> {
        self.attributes.get(section)
    }

    /// A single raw attribute value.
    pub fn attribute(&self, section: &str, key: &str) -> Option<&Value> {
        self.attributes.get(section).and_then(|s| s.get(key))
    }

    /// Set (or replace) an attribute value, creating the section if needed.
    pub fn set_attribute(&mut self, section: &str, key: &str, value: impl Into<Value>) {
        self.attributes
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Remove an attribute. Empty sections are dropped.
    pub fn remove_attribute(&mut self, section: &str, key: &str) -> Option<Value> {
        let values = self.attributes.get_mut(section)?;
        let removed = values.remove(key);
        if values.is_empty() {
            self.attributes.remove(section);
        }
        removed
    }

    /// Read a string attribute. `Ok(None)` when unset or `null`.
    pub fn string_attribute(&self, section: &str, key: &str) -> Result<Option<String>, TypeError> {
        match self.attribute(section, key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(TypeError::InvalidAttribute {
                section: section.into(),
                key: key.into(),
                reason: format!("expected string, got {other}"),
            }),
        }
    }

    /// Read an ordered list of strings. `Ok(None)` when unset or `null`.
    pub fn string_list_attribute(
        &self,
        section: &str,
        key: &str,
    ) -> Result<Option<Vec<String>>, TypeError> {
        let invalid = |reason: String| TypeError::InvalidAttribute {
            section: section.into(),
            key: key.into(),
            reason,
        };
        match self.attribute(section, key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(invalid(format!("expected string element, got {other}"))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(invalid(format!("expected list, got {other}"))),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, TypeError> {
        serde_json::to_string(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, TypeError> {
        serde_json::from_str(json).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}
