//! # Ability
//!
//! The collection of rules granted to one actor.
//!
//! Rules are kept in definition order. When several rules are relevant to a
//! check, the most recently defined one whose constraint matches decides;
//! when none matches, access is denied. For a single model this is the
//! recurrence
//!
//! ```text
//! E0 = false
//! Ei = ci OR Ei-1          (rule i is `can`)
//! Ei = NOT ci AND Ei-1     (rule i is `cannot`)
//! ```
//!
//! so granted conditions accumulate as OR, and denied conditions apply as
//! AND NOT against everything granted before them.

use std::collections::BTreeMap;

use crate::actions::Action;
use crate::conditions::Conditions;
use crate::error::{AccessDenied, RuleResult};
use crate::record::Record;
use crate::rules::{Behavior, Rule, RuleDefinition};
use crate::subjects::Subject;
use crate::value::Value;

/// A mutable set of permission rules.
///
/// # Example
///
/// ```
/// use ability_rules::{Ability, Action, Conditions, Record};
///
/// let mut ability = Ability::new();
/// ability.can(Action::Read, "Article", Conditions::new());
/// ability.cannot(Action::Read, "Article", Conditions::new().eq("hidden", true));
///
/// assert!(ability.permits(Action::Read, &Record::new("Article").with("hidden", false)));
/// assert!(!ability.permits(Action::Read, &Record::new("Article").with("hidden", true)));
/// assert!(!ability.permits(Action::Update, &Record::new("Article")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Ability {
    rules: Vec<Rule>,
}

impl Ability {
    /// Create an ability with no rules (denies everything).
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Grant `action` on `subject` for records matching `conditions`.
    ///
    /// Empty conditions grant the action on every record of the subject.
    pub fn can(
        &mut self,
        action: Action,
        subject: impl Into<Subject>,
        conditions: Conditions,
    ) -> &mut Self {
        self.add_rule(Rule::can([action], [subject.into()]).with_conditions(conditions))
    }

    /// Deny `action` on `subject` for records matching `conditions`.
    pub fn cannot(
        &mut self,
        action: Action,
        subject: impl Into<Subject>,
        conditions: Conditions,
    ) -> &mut Self {
        self.add_rule(Rule::cannot([action], [subject.into()]).with_conditions(conditions))
    }

    /// Append a rule. Later rules take precedence over earlier ones.
    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        tracing::trace!(
            behavior = ?rule.behavior,
            actions = ?rule.actions,
            subjects = ?rule.subjects,
            "rule added"
        );
        self.rules.push(rule);
        self
    }

    /// All rules in definition order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no rules are defined.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules relevant to `action` on `model`, in definition order.
    pub fn relevant_rules(&self, action: Action, model: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.is_relevant(action, model))
            .collect()
    }

    /// Check whether `action` is permitted on a record.
    ///
    /// Associations referenced by conditions must already be loaded on the
    /// record; unloaded associations are treated as empty.
    pub fn permits(&self, action: Action, record: &Record) -> bool {
        let decision = self
            .relevant_rules(action, &record.model)
            .into_iter()
            .rev()
            .find(|rule| rule.matches(record));

        tracing::trace!(
            action = %action,
            model = %record.model,
            matched = decision.is_some(),
            "permission check"
        );
        decision.is_some_and(|rule| rule.behavior.is_can())
    }

    /// Check whether `action` is permitted on a model as a whole.
    ///
    /// The newest relevant unconditional rule decides. A conditional `can`
    /// grants the model-level check (some records may be accessible); a
    /// conditional `cannot` is skipped since it may not cover every record.
    pub fn permits_model(&self, action: Action, model: &str) -> bool {
        for rule in self.relevant_rules(action, model).into_iter().rev() {
            match rule.behavior {
                Behavior::Can => return true,
                Behavior::Cannot if rule.is_unconditional() => return false,
                Behavior::Cannot => continue,
            }
        }
        false
    }

    /// Like [`permits`](Self::permits) but returns an error when denied.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied`] when the action is not permitted.
    pub fn authorize(&self, action: Action, record: &Record) -> Result<(), AccessDenied> {
        if self.permits(action, record) {
            Ok(())
        } else {
            Err(AccessDenied::new(action, record.model.clone()))
        }
    }

    /// Like [`permits_model`](Self::permits_model) but returns an error when denied.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied`] when the action is not permitted.
    pub fn authorize_model(&self, action: Action, model: &str) -> Result<(), AccessDenied> {
        if self.permits_model(action, model) {
            Ok(())
        } else {
            Err(AccessDenied::new(action, model))
        }
    }

    /// Attribute values implied by relevant `can` rules.
    ///
    /// Only top-level equality conditions contribute; newer rules override
    /// older ones. Useful to pre-fill a new record so it satisfies the rules.
    ///
    /// # Example
    ///
    /// ```
    /// use ability_rules::{Ability, Action, Conditions, Value};
    ///
    /// let mut ability = Ability::new();
    /// ability.can(Action::Create, "Article", Conditions::new().eq("owner_id", 7));
    ///
    /// let attributes = ability.attributes_for(Action::New, "Article");
    /// assert_eq!(attributes.get("owner_id"), Some(&Value::Int(7)));
    /// ```
    pub fn attributes_for(&self, action: Action, model: &str) -> BTreeMap<String, Value> {
        let mut attributes = BTreeMap::new();
        for rule in self.relevant_rules(action, model) {
            if !rule.behavior.is_can() {
                continue;
            }
            if let Some(conditions) = rule.conditions() {
                for (name, value) in conditions.scalar_attributes() {
                    attributes.insert(name.to_string(), value.clone());
                }
            }
        }
        attributes
    }

    /// Append another ability's rules; they take precedence over ours.
    pub fn merge(&mut self, other: &Ability) -> &mut Self {
        self.rules.extend(other.rules.iter().cloned());
        self
    }

    /// Build an ability from rule definitions.
    ///
    /// # Errors
    ///
    /// Fails on the first definition that cannot be converted.
    pub fn from_definitions<I>(definitions: I) -> RuleResult<Self>
    where
        I: IntoIterator<Item = RuleDefinition>,
    {
        let mut ability = Ability::new();
        for definition in definitions {
            ability.add_rule(definition.into_rule()?);
        }
        Ok(ability)
    }

    /// Build an ability from a JSON array of rule definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Json`](crate::RuleError::Json) for malformed input
    /// and definition errors otherwise.
    pub fn from_json_str(json: &str) -> RuleResult<Self> {
        let definitions: Vec<RuleDefinition> = serde_json::from_str(json)?;
        Self::from_definitions(definitions)
    }
}

impl FromIterator<Rule> for Ability {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        let mut ability = Ability::new();
        for rule in iter {
            ability.add_rule(rule);
        }
        ability
    }
}
