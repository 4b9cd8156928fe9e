//! Error types for rule definitions and authorization checks.

use thiserror::Error;

use crate::actions::Action;

/// Errors raised while building abilities from definitions.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Conditions have a shape that cannot be interpreted.
    #[error("Invalid conditions: {0}")]
    InvalidConditions(String),

    /// Unknown action name in a rule definition.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// A rule definition names no actions or no subjects.
    #[error("Incomplete rule: {0}")]
    IncompleteRule(String),

    /// Rule definitions could not be decoded.
    #[error("Malformed rule definitions: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;

impl RuleError {
    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuleError::InvalidConditions(_) => "INVALID_CONDITIONS",
            RuleError::UnknownAction(_) => "UNKNOWN_ACTION",
            RuleError::IncompleteRule(_) => "INCOMPLETE_RULE",
            RuleError::Json(_) => "MALFORMED_RULES",
        }
    }
}

/// Returned by [`Ability::authorize`](crate::Ability::authorize) when the
/// action is not permitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AccessDenied {
    /// The action that was checked.
    pub action: Action,
    /// The model the check was made against.
    pub subject: String,
    /// Human readable explanation.
    pub message: String,
}

impl AccessDenied {
    /// Create a denial with the default message.
    pub fn new(action: Action, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        let message = format!("You are not authorized to {action} this {subject}.");
        Self {
            action,
            subject,
            message,
        }
    }

    /// Replace the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        403
    }
}
