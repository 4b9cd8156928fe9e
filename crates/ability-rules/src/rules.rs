//! # Rules
//!
//! A rule grants (`can`) or denies (`cannot`) a set of actions on a set of
//! subjects, optionally restricted by conditions.
//!
//! ```text
//! Rule = Behavior + Actions + Subjects [+ Conditions | Predicate]
//!
//! Examples:
//!   can    read   Article                       - every article
//!   can    read   Article  status: published    - published articles
//!   cannot update Article  locked: true         - never locked ones
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::actions::Action;
use crate::conditions::Conditions;
use crate::error::{RuleError, RuleResult};
use crate::record::Record;
use crate::subjects::Subject;

/// Whether a rule grants or denies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Grants the actions.
    Can,
    /// Denies the actions.
    Cannot,
}

impl Behavior {
    /// `true` for [`Behavior::Can`].
    pub fn is_can(&self) -> bool {
        matches!(self, Behavior::Can)
    }
}

/// Record predicate used by rules that cannot be expressed as conditions.
pub type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// What restricts a rule to a subset of records.
#[derive(Clone)]
pub enum Constraint {
    /// Declarative conditions; empty means unconditional.
    Conditions(Conditions),
    /// Arbitrary predicate. Usable for in-memory checks only.
    Predicate(Predicate),
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Conditions(conditions) => {
                f.debug_tuple("Conditions").field(conditions).finish()
            }
            Constraint::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A single permission rule.
///
/// # Example
///
/// ```
/// use ability_rules::{Action, Conditions, Record, Rule};
///
/// let rule = Rule::can([Action::Read], ["Article"])
///     .with_conditions(Conditions::new().eq("status", "published"));
///
/// assert!(rule.is_relevant(Action::Show, "Article"));
/// assert!(rule.matches(&Record::new("Article").with("status", "published")));
/// assert!(!rule.matches(&Record::new("Article").with("status", "draft")));
/// ```
#[derive(Debug, Clone)]
pub struct Rule {
    /// Grant or deny.
    pub behavior: Behavior,
    /// Actions covered by the rule.
    pub actions: Vec<Action>,
    /// Subjects covered by the rule.
    pub subjects: Vec<Subject>,
    /// Restriction on the covered records.
    pub constraint: Constraint,
}

impl Rule {
    /// Create an unconditional rule.
    pub fn new<A, S>(behavior: Behavior, actions: A, subjects: S) -> Self
    where
        A: IntoIterator<Item = Action>,
        S: IntoIterator,
        S::Item: Into<Subject>,
    {
        Self {
            behavior,
            actions: actions.into_iter().collect(),
            subjects: subjects.into_iter().map(Into::into).collect(),
            constraint: Constraint::Conditions(Conditions::new()),
        }
    }

    /// Create an unconditional granting rule.
    pub fn can<A, S>(actions: A, subjects: S) -> Self
    where
        A: IntoIterator<Item = Action>,
        S: IntoIterator,
        S::Item: Into<Subject>,
    {
        Self::new(Behavior::Can, actions, subjects)
    }

    /// Create an unconditional denying rule.
    pub fn cannot<A, S>(actions: A, subjects: S) -> Self
    where
        A: IntoIterator<Item = Action>,
        S: IntoIterator,
        S::Item: Into<Subject>,
    {
        Self::new(Behavior::Cannot, actions, subjects)
    }

    /// Restrict the rule with conditions.
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.constraint = Constraint::Conditions(conditions);
        self
    }

    /// Restrict the rule with a predicate.
    ///
    /// Predicate rules cannot be turned into queries; asking for the
    /// accessible records of a model with a relevant predicate rule fails.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.constraint = Constraint::Predicate(Arc::new(predicate));
        self
    }

    /// The declarative conditions, unless this is a predicate rule.
    pub fn conditions(&self) -> Option<&Conditions> {
        match &self.constraint {
            Constraint::Conditions(conditions) => Some(conditions),
            Constraint::Predicate(_) => None,
        }
    }

    /// Check if the rule applies to every record of its subjects.
    pub fn is_unconditional(&self) -> bool {
        matches!(&self.constraint, Constraint::Conditions(c) if c.is_empty())
    }

    /// Check if the rule answers `action` checks on `model`.
    pub fn is_relevant(&self, action: Action, model: &str) -> bool {
        self.actions.iter().any(|granted| granted.covers(action))
            && self.subjects.iter().any(|subject| subject.matches(model))
    }

    /// Check if the rule's constraint holds for a record.
    pub fn matches(&self, record: &Record) -> bool {
        match &self.constraint {
            Constraint::Conditions(conditions) => conditions.matches(record),
            Constraint::Predicate(predicate) => predicate(record),
        }
    }
}

/// Serializable form of a conditions-based rule.
///
/// ```json
/// { "behavior": "can", "actions": ["read"], "subjects": ["Article"],
///   "conditions": { "status": ["draft", "published"] } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDefinition {
    /// Grant or deny (defaults to `can`).
    #[serde(default = "default_behavior")]
    pub behavior: Behavior,
    /// Action names (aliases accepted).
    pub actions: Vec<String>,
    /// Subject names; `"all"` for every model.
    pub subjects: Vec<Subject>,
    /// Optional conditions.
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

fn default_behavior() -> Behavior {
    Behavior::Can
}

impl RuleDefinition {
    /// Convert into a rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownAction`] for unrecognised action names and
    /// [`RuleError::IncompleteRule`] when actions or subjects are empty.
    pub fn into_rule(self) -> RuleResult<Rule> {
        if self.actions.is_empty() || self.subjects.is_empty() {
            return Err(RuleError::IncompleteRule(
                "a rule needs at least one action and one subject".to_string(),
            ));
        }
        let actions = self
            .actions
            .iter()
            .map(|name| Action::parse(name).ok_or_else(|| RuleError::UnknownAction(name.clone())))
            .collect::<RuleResult<Vec<_>>>()?;

        Ok(Rule {
            behavior: self.behavior,
            actions,
            subjects: self.subjects,
            constraint: Constraint::Conditions(self.conditions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_uses_action_implication() {
        let rule = Rule::can([Action::Manage], [Subject::All]);
        assert!(rule.is_relevant(Action::Delete, "Article"));
        assert!(rule.is_relevant(Action::Read, "Comment"));

        let read = Rule::can([Action::Read], ["Article"]);
        assert!(read.is_relevant(Action::List, "Article"));
        assert!(!read.is_relevant(Action::Update, "Article"));
        assert!(!read.is_relevant(Action::Read, "Comment"));
    }

    #[test]
    fn test_multiple_subjects() {
        let rule = Rule::can([Action::Read], ["Article", "Comment"]);
        assert!(rule.is_relevant(Action::Read, "Article"));
        assert!(rule.is_relevant(Action::Read, "Comment"));
        assert!(!rule.is_relevant(Action::Read, "User"));
    }

    #[test]
    fn test_unconditional() {
        assert!(Rule::can([Action::Read], ["Article"]).is_unconditional());
        assert!(!Rule::can([Action::Read], ["Article"])
            .with_conditions(Conditions::new().eq("id", 1))
            .is_unconditional());
        assert!(!Rule::can([Action::Read], ["Article"])
            .with_predicate(|_| true)
            .is_unconditional());
    }

    #[test]
    fn test_predicate_rule() {
        let rule = Rule::can([Action::Read], ["Article"])
            .with_predicate(|record| record.get("title").as_str().is_some_and(|t| t.len() > 3));
        assert!(rule.matches(&Record::new("Article").with("title", "long title")));
        assert!(!rule.matches(&Record::new("Article").with("title", "ab")));
        assert!(rule.conditions().is_none());
    }

    #[test]
    fn test_definition_into_rule() {
        let definition: RuleDefinition = serde_json::from_value(serde_json::json!({
            "actions": ["index", "update"],
            "subjects": ["Article"],
            "conditions": {"status": "draft"}
        }))
        .unwrap();
        let rule = definition.into_rule().unwrap();
        assert_eq!(rule.behavior, Behavior::Can);
        assert_eq!(rule.actions, vec![Action::List, Action::Update]);
        assert_eq!(rule.subjects, vec![Subject::model("Article")]);
        assert!(!rule.is_unconditional());
    }

    #[test]
    fn test_definition_errors() {
        let unknown = RuleDefinition {
            behavior: Behavior::Cannot,
            actions: vec!["fly".into()],
            subjects: vec![Subject::All],
            conditions: Conditions::new(),
        };
        assert!(matches!(unknown.into_rule(), Err(RuleError::UnknownAction(a)) if a == "fly"));

        let empty = RuleDefinition {
            behavior: Behavior::Can,
            actions: vec![],
            subjects: vec![Subject::All],
            conditions: Conditions::new(),
        };
        assert!(matches!(empty.into_rule(), Err(RuleError::IncompleteRule(_))));
    }
}
