//! # Records
//!
//! In-memory view of a persisted row: its model name, its field values and
//! any associations that were eager loaded alongside it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::Value;

/// A record of some model.
///
/// Associations are only present once they have been loaded. Condition
/// matching treats an association that was never loaded as empty, so load
/// every association a rule refers to before checking permissions in memory.
///
/// # Example
///
/// ```
/// use ability_rules::{Record, Value};
///
/// let child = Record::new("Child").with("name", "y");
/// let parent = Record::new("Parent")
///     .with("id", 1)
///     .with_related("children", vec![child]);
///
/// assert_eq!(parent.get("id"), &Value::Int(1));
/// assert_eq!(parent.related("children").len(), 1);
/// assert!(parent.get("missing").is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Model name (e.g. `"Parent"`).
    pub model: String,
    /// Field values by column name.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Loaded associations by association name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub associations: BTreeMap<String, Vec<Record>>,
}

static NULL: Value = Value::Null;

impl Record {
    /// Create an empty record of the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: BTreeMap::new(),
            associations: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style association assignment.
    pub fn with_related(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.set_related(name, records);
        self
    }

    /// Set a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Replace the loaded records of an association.
    pub fn set_related(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.associations.insert(name.into(), records);
    }

    /// Get a field value; missing fields read as `Null`.
    pub fn get(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Get the loaded records of an association; unloaded reads as empty.
    pub fn related(&self, name: &str) -> &[Record] {
        self.associations.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if an association has been loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.associations.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_association_is_empty() {
        let record = Record::new("Parent");
        assert!(record.related("children").is_empty());
        assert!(!record.is_loaded("children"));
    }

    #[test]
    fn test_loaded_empty_association() {
        let record = Record::new("Parent").with_related("children", Vec::new());
        assert!(record.is_loaded("children"));
        assert!(record.related("children").is_empty());
    }

    #[test]
    fn test_record_serializes_fields() {
        let record = Record::new("Parent").with("id", 3).with("name", "p");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["model"], "Parent");
        assert_eq!(json["fields"]["id"], 3);
        assert_eq!(json["fields"]["name"], "p");
        assert!(json.get("associations").is_none());
    }
}
