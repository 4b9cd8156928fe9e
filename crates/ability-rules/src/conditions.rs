//! # Conditions
//!
//! Conditions restrict which records a rule covers. They are an ordered
//! list of clauses, all of which must hold:
//!
//! ```text
//! name: "x"                     field equals a value
//! status: ["draft", "open"]     field is one of a set of values
//! children: { name: "y" }       association condition
//! not: { name: "x" }            negation of a sub-condition
//! ```
//!
//! ## Negation inside associations
//!
//! A `not` written directly inside an association condition is hoisted to
//! the association: `children: { not: { name: "x" }, name: "y" }` means
//! "some child is named y, and no child is named x". It is therefore
//! equivalent to `not: { children: { name: "x" } }, children: { name: "y" }`,
//! and the positive and negative parts are never required to hold for the
//! same child.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RuleError, RuleResult};
use crate::record::Record;
use crate::value::Value;

/// Reserved key introducing a negated sub-condition.
pub const NOT_KEY: &str = "not";

/// How a field value is matched.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Field equals the value (`Null` matches a null field).
    Eq(Value),
    /// Field equals any of the values. An empty set matches nothing.
    In(Vec<Value>),
}

impl Matcher {
    /// Check a field value against this matcher.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Matcher::Eq(expected) => value.matches(expected),
            Matcher::In(allowed) => allowed.iter().any(|expected| value.matches(expected)),
        }
    }
}

/// One clause of a [`Conditions`] list.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Constraint on a field of the record itself.
    Field {
        /// Column name.
        name: String,
        /// Expected value(s).
        matcher: Matcher,
    },
    /// Constraint on records reached through an association.
    Association {
        /// Association name.
        name: String,
        /// Conditions evaluated against the associated records.
        conditions: Conditions,
    },
    /// Records matching the inner conditions are excluded.
    Not(Conditions),
}

/// An ordered conjunction of clauses.
///
/// # Example
///
/// ```
/// use ability_rules::{Conditions, Record};
///
/// let conditions = Conditions::new()
///     .association("children", Conditions::new().eq("name", "y"))
///     .not(Conditions::new().association("children", Conditions::new().eq("name", "x")));
///
/// let only_y = Record::new("Parent")
///     .with_related("children", vec![Record::new("Child").with("name", "y")]);
/// let both = Record::new("Parent").with_related(
///     "children",
///     vec![
///         Record::new("Child").with("name", "x"),
///         Record::new("Child").with("name", "y"),
///     ],
/// );
///
/// assert!(conditions.matches(&only_y));
/// assert!(!conditions.matches(&both));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conditions {
    clauses: Vec<Clause>,
}

impl Conditions {
    /// Create empty conditions (matches every record).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a field to equal a value.
    pub fn eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Field {
            name: name.into(),
            matcher: Matcher::Eq(value.into()),
        });
        self
    }

    /// Require a field to equal one of several values.
    pub fn any_of<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.push(Clause::Field {
            name: name.into(),
            matcher: Matcher::In(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Require associated records to satisfy nested conditions.
    pub fn association(mut self, name: impl Into<String>, conditions: Conditions) -> Self {
        self.clauses.push(Clause::Association {
            name: name.into(),
            conditions,
        });
        self
    }

    /// Exclude records matching the given conditions.
    pub fn not(mut self, conditions: Conditions) -> Self {
        self.clauses.push(Clause::Not(conditions));
        self
    }

    /// Append a clause.
    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    /// The clauses, in definition order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Check if there are no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Separate top-level negations from the remaining clauses.
    ///
    /// Returns the positive clauses as their own `Conditions` and the inner
    /// conditions of every top-level `not`.
    pub fn split_negations(&self) -> (Conditions, Vec<&Conditions>) {
        let mut positive = Conditions::new();
        let mut negated = Vec::new();
        for clause in &self.clauses {
            match clause {
                Clause::Not(inner) => negated.push(inner),
                other => positive.push(other.clone()),
            }
        }
        (positive, negated)
    }

    /// Top-level scalar equalities (`field: value`), in definition order.
    pub fn scalar_attributes(&self) -> Vec<(&str, &Value)> {
        self.clauses
            .iter()
            .filter_map(|clause| match clause {
                Clause::Field {
                    name,
                    matcher: Matcher::Eq(value),
                } => Some((name.as_str(), value)),
                _ => None,
            })
            .collect()
    }

    /// Evaluate these conditions against a record and its loaded associations.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }

    /// Parse conditions from their JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidConditions`] when the value is not an
    /// object, a set contains non-scalar values, or `not` is not an object
    /// (or an array of objects).
    ///
    /// # Example
    ///
    /// ```
    /// use ability_rules::Conditions;
    /// use serde_json::json;
    ///
    /// let parsed = Conditions::from_json(&json!({
    ///     "status": ["draft", "published"],
    ///     "children": { "not": { "name": "x" }, "name": "y" }
    /// }))
    /// .unwrap();
    /// assert_eq!(parsed.clauses().len(), 2);
    /// ```
    pub fn from_json(value: &serde_json::Value) -> RuleResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            RuleError::InvalidConditions(format!("expected an object, found {value}"))
        })?;

        let mut conditions = Conditions::new();
        for (key, value) in object {
            if key == NOT_KEY {
                match value {
                    serde_json::Value::Array(items) => {
                        for item in items {
                            conditions.push(Clause::Not(Conditions::from_json(item)?));
                        }
                    }
                    other => conditions.push(Clause::Not(Conditions::from_json(other)?)),
                }
                continue;
            }

            let clause = match value {
                serde_json::Value::Object(_) => Clause::Association {
                    name: key.clone(),
                    conditions: Conditions::from_json(value)?,
                },
                serde_json::Value::Array(items) => {
                    let values = items
                        .iter()
                        .map(|item| {
                            Value::from_json(item).ok_or_else(|| {
                                RuleError::InvalidConditions(format!(
                                    "set for `{key}` may only contain scalars, found {item}"
                                ))
                            })
                        })
                        .collect::<RuleResult<Vec<_>>>()?;
                    Clause::Field {
                        name: key.clone(),
                        matcher: Matcher::In(values),
                    }
                }
                scalar => Clause::Field {
                    name: key.clone(),
                    matcher: Matcher::Eq(Value::from_json(scalar).unwrap_or_default()),
                },
            };
            conditions.push(clause);
        }
        Ok(conditions)
    }

    /// Render these conditions in their JSON form.
    ///
    /// Several `not` clauses at one level are rendered as an array.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        let mut negated = Vec::new();
        for clause in &self.clauses {
            match clause {
                Clause::Field { name, matcher } => {
                    let value = match matcher {
                        Matcher::Eq(value) => value.to_json(),
                        Matcher::In(values) => {
                            serde_json::Value::Array(values.iter().map(Value::to_json).collect())
                        }
                    };
                    object.insert(name.clone(), value);
                }
                Clause::Association { name, conditions } => {
                    object.insert(name.clone(), conditions.to_json());
                }
                Clause::Not(inner) => negated.push(inner.to_json()),
            }
        }
        match negated.len() {
            0 => {}
            1 => {
                object.insert(NOT_KEY.to_string(), negated.remove(0));
            }
            _ => {
                object.insert(NOT_KEY.to_string(), serde_json::Value::Array(negated));
            }
        }
        serde_json::Value::Object(object)
    }
}

impl Clause {
    /// Evaluate a single clause against a record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Clause::Field { name, matcher } => matcher.matches(record.get(name)),
            Clause::Not(inner) => !inner.matches(record),
            Clause::Association { name, conditions } => {
                let related = record.related(name);
                let (positive, negated) = conditions.split_negations();

                let positive_holds = if positive.is_empty() && !negated.is_empty() {
                    true
                } else {
                    related.iter().any(|other| positive.matches(other))
                };

                positive_holds
                    && negated
                        .iter()
                        .all(|inner| !related.iter().any(|other| inner.matches(other)))
            }
        }
    }
}

impl Serialize for Conditions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Conditions::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn child(name: &str) -> Record {
        Record::new("Child").with("name", name)
    }

    fn parent_with(children: &[&str]) -> Record {
        Record::new("Parent").with_related("children", children.iter().map(|n| child(n)).collect())
    }

    #[test]
    fn test_empty_conditions_match_everything() {
        assert!(Conditions::new().matches(&Record::new("Parent")));
    }

    #[test]
    fn test_eq_and_null() {
        let named = Record::new("Parent").with("name", "a");
        let unnamed = Record::new("Parent");

        assert!(Conditions::new().eq("name", "a").matches(&named));
        assert!(!Conditions::new().eq("name", "b").matches(&named));
        assert!(Conditions::new().eq("name", Value::Null).matches(&unnamed));
        assert!(!Conditions::new().eq("name", "a").matches(&unnamed));
    }

    #[test]
    fn test_any_of() {
        let record = Record::new("Article").with("status", "published");
        assert!(Conditions::new().any_of("status", ["draft", "published"]).matches(&record));
        assert!(!Conditions::new().any_of("status", ["draft"]).matches(&record));
        assert!(!Conditions::new().any_of("status", Vec::<Value>::new()).matches(&record));
    }

    #[test]
    fn test_negated_field() {
        let conditions = Conditions::new().not(Conditions::new().eq("name", "x"));
        assert!(!conditions.matches(&Record::new("Parent").with("name", "x")));
        assert!(conditions.matches(&Record::new("Parent").with("name", "y")));
        assert!(conditions.matches(&Record::new("Parent")));
    }

    #[test]
    fn test_not_inside_association_is_hoisted() {
        let inline = Conditions::new().association(
            "children",
            Conditions::new().not(Conditions::new().eq("name", "x")).eq("name", "y"),
        );
        let split = Conditions::new()
            .not(Conditions::new().association("children", Conditions::new().eq("name", "x")))
            .association("children", Conditions::new().eq("name", "y"));

        for conditions in [&inline, &split] {
            assert!(!conditions.matches(&parent_with(&["x", "y"])));
            assert!(!conditions.matches(&parent_with(&["x"])));
            assert!(conditions.matches(&parent_with(&["y"])));
            assert!(!conditions.matches(&parent_with(&[])));
        }
    }

    #[test]
    fn test_only_negated_association_allows_childless_records() {
        let conditions = Conditions::new()
            .association("children", Conditions::new().not(Conditions::new().eq("name", "x")));
        assert!(conditions.matches(&parent_with(&[])));
        assert!(conditions.matches(&parent_with(&["y"])));
        assert!(!conditions.matches(&parent_with(&["y", "x"])));
    }

    #[test]
    fn test_empty_association_requires_a_related_record() {
        let conditions = Conditions::new().association("children", Conditions::new());
        assert!(conditions.matches(&parent_with(&["z"])));
        assert!(!conditions.matches(&parent_with(&[])));
    }

    #[test]
    fn test_from_json_shapes() {
        let parsed = Conditions::from_json(&json!({
            "name": "a",
            "status": ["draft", null],
            "children": {"name": "y"},
            "not": [{"name": "b"}, {"name": "c"}]
        }))
        .unwrap();

        let negations = parsed
            .clauses()
            .iter()
            .filter(|c| matches!(c, Clause::Not(_)))
            .count();
        assert_eq!(negations, 2);
        assert!(parsed.clauses().contains(&Clause::Field {
            name: "status".into(),
            matcher: Matcher::In(vec![Value::Text("draft".into()), Value::Null]),
        }));
        assert!(parsed.clauses().contains(&Clause::Association {
            name: "children".into(),
            conditions: Conditions::new().eq("name", "y"),
        }));
    }

    #[test]
    fn test_from_json_rejects_invalid_shapes() {
        assert!(Conditions::from_json(&json!("name")).is_err());
        assert!(Conditions::from_json(&json!({"status": [["nested"]]})).is_err());
        assert!(Conditions::from_json(&json!({"not": 1})).is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_meaning() {
        let conditions = Conditions::new()
            .eq("name", "a")
            .not(Conditions::new().eq("name", "b"))
            .not(Conditions::new().eq("name", "c"));
        let json = serde_json::to_value(&conditions).unwrap();
        assert_eq!(json["not"], json!([{"name": "b"}, {"name": "c"}]));

        let back: Conditions = serde_json::from_value(json).unwrap();
        let record = Record::new("Parent").with("name", "a");
        assert_eq!(back.matches(&record), conditions.matches(&record));
    }

    #[test]
    fn test_scalar_attributes() {
        let conditions = Conditions::new()
            .eq("owner_id", 7)
            .any_of("status", ["a", "b"])
            .association("children", Conditions::new().eq("name", "y"));
        assert_eq!(conditions.scalar_attributes(), vec![("owner_id", &Value::Int(7))]);
    }
}
