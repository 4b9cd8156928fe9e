//! # Actions
//!
//! Defines the actions a rule can grant or deny.
//! Broad actions cover narrower ones, so a single `Read` rule also answers
//! `List` and `Show` checks.

use serde::{Deserialize, Serialize};

/// Actions that rules grant or deny on subjects.
///
/// - **Read**: covers `List` and `Show`
/// - **Create**: covers `New`
/// - **Update**: covers `Edit`
/// - **Delete**, **Export**, **Share**: stand-alone actions
/// - **Manage**: covers every action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read/view records.
    Read,

    /// Enumerate a collection of records.
    List,

    /// Display a single record.
    Show,

    /// Persist a new record.
    Create,

    /// Build a new record before it is persisted.
    New,

    /// Modify an existing record.
    Update,

    /// Open an existing record for modification.
    Edit,

    /// Remove a record.
    Delete,

    /// Export record data.
    Export,

    /// Share a record with other actors.
    Share,

    /// Any action at all.
    ///
    /// A `Manage` rule is relevant for every action check.
    Manage,
}

impl Action {
    /// Get the string representation of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::List => "list",
            Action::Show => "show",
            Action::Create => "create",
            Action::New => "new",
            Action::Update => "update",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Export => "export",
            Action::Share => "share",
            Action::Manage => "manage",
        }
    }

    /// Parse action from string representation.
    ///
    /// # Arguments
    ///
    /// * `s` - String to parse (case-insensitive, supports aliases)
    ///
    /// # Returns
    ///
    /// `Some(Action)` if valid, `None` otherwise
    ///
    /// # Example
    ///
    /// ```
    /// use ability_rules::actions::Action;
    ///
    /// assert_eq!(Action::parse("read"), Some(Action::Read));
    /// assert_eq!(Action::parse("index"), Some(Action::List));
    /// assert_eq!(Action::parse("destroy"), Some(Action::Delete));
    /// assert_eq!(Action::parse("invalid"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" | "view" | "get" => Some(Action::Read),
            "list" | "index" | "browse" => Some(Action::List),
            "show" => Some(Action::Show),
            "create" | "add" => Some(Action::Create),
            "new" => Some(Action::New),
            "update" | "write" | "modify" | "put" | "patch" => Some(Action::Update),
            "edit" => Some(Action::Edit),
            "delete" | "remove" | "destroy" => Some(Action::Delete),
            "export" | "download" => Some(Action::Export),
            "share" => Some(Action::Share),
            "manage" | "admin" => Some(Action::Manage),
            _ => None,
        }
    }

    /// Get all actions.
    pub fn all() -> Vec<Self> {
        vec![
            Action::Read,
            Action::List,
            Action::Show,
            Action::Create,
            Action::New,
            Action::Update,
            Action::Edit,
            Action::Delete,
            Action::Export,
            Action::Share,
            Action::Manage,
        ]
    }

    /// Check if this action implies another action.
    ///
    /// - `Manage` implies all other actions
    /// - `Read` implies `List` and `Show`
    /// - `Create` implies `New`
    /// - `Update` implies `Edit`
    ///
    /// # Example
    ///
    /// ```
    /// use ability_rules::actions::Action;
    ///
    /// assert!(Action::Manage.implies(Action::Delete));
    /// assert!(Action::Read.implies(Action::List));
    /// assert!(!Action::Update.implies(Action::Read));
    /// ```
    pub fn implies(&self, other: Action) -> bool {
        match self {
            Action::Manage => other != Action::Manage,
            Action::Read => matches!(other, Action::List | Action::Show),
            Action::Create => other == Action::New,
            Action::Update => other == Action::Edit,
            _ => false,
        }
    }

    /// Check if a rule granted for this action answers a check for `other`.
    pub fn covers(&self, other: Action) -> bool {
        *self == other || self.implies(other)
    }

    /// Check if this is a read-only action.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Action::Read | Action::List | Action::Show | Action::Export)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
