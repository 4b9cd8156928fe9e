//! # Ability Rules
//!
//! Rule-based authorization: an [`Ability`] collects rules granting or
//! denying actions on record models, optionally restricted by conditions.
//!
//! ## Overview
//!
//! The ability-rules crate handles:
//! - **Actions**: Operations a rule covers, with broad actions covering narrow ones
//! - **Subjects**: The models a rule applies to (or all of them)
//! - **Conditions**: Field equality, value sets, association conditions and negation
//! - **Rules**: `can` / `cannot` + actions + subjects + conditions
//! - **Abilities**: Ordered rule sets answering permission checks on records
//!
//! ## Architecture
//!
//! ```text
//! Rule = Behavior + Actions + Subjects [+ Conditions]
//!
//! Examples:
//!   can    read   Parent  children: { name: "y" }
//!   cannot read   Parent  children: { name: "x" }
//!   can    manage all
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use ability_rules::{Ability, Action, Conditions, Record};
//!
//! let mut ability = Ability::new();
//! ability.can(
//!     Action::Read,
//!     "Parent",
//!     Conditions::new()
//!         .association("children", Conditions::new().eq("name", "y"))
//!         .not(Conditions::new().association("children", Conditions::new().eq("name", "x"))),
//! );
//!
//! let parent = Record::new("Parent")
//!     .with("id", 3)
//!     .with_related("children", vec![Record::new("Child").with("name", "y")]);
//!
//! assert!(ability.permits(Action::Read, &parent));
//! assert!(ability.permits(Action::List, &parent)); // read covers list
//! ```
//!
//! ## Database queries
//!
//! The `ability-sql` crate translates the same rules into SQL so the
//! records an ability permits can be enumerated directly in the database.

pub mod ability;
pub mod actions;
pub mod conditions;
pub mod error;
pub mod record;
pub mod rules;
pub mod subjects;
pub mod value;

// Re-export main types for convenience
pub use ability::Ability;
pub use actions::Action;
pub use conditions::{Clause, Conditions, Matcher};
pub use error::{AccessDenied, RuleError, RuleResult};
pub use record::Record;
pub use rules::{Behavior, Constraint, Predicate, Rule, RuleDefinition};
pub use subjects::Subject;
pub use value::Value;
