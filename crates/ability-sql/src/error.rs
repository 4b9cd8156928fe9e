//! Error types for query translation and record storage
//!
//! This module defines the errors raised while turning rules into SQL,
//! validating schemas and talking to the database.

use ability_rules::{Action, RuleError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the SQL layer.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The database driver reported a failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rule definitions could not be built
    #[error("Rule error: {0}")]
    Rules(#[from] RuleError),

    /// The model is not registered in the schema
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Conditions or ordering name a column the model does not have
    #[error("Unknown column `{column}` on {model}")]
    UnknownColumn {
        /// Model name.
        model: String,
        /// Column name.
        column: String,
    },

    /// Conditions or includes name an association the model does not have
    #[error("Unknown association `{association}` on {model}")]
    UnknownAssociation {
        /// Model name.
        model: String,
        /// Association name.
        association: String,
    },

    /// A value is not one of the names (or stored integers) of an enum column
    #[error("Unknown value {value} for enum column `{column}` on {model}")]
    UnknownEnumValue {
        /// Model name.
        model: String,
        /// Column name.
        column: String,
        /// The offending value.
        value: String,
    },

    /// A value does not fit the column type
    #[error("Type mismatch for `{column}` on {model}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Model name.
        model: String,
        /// Column name.
        column: String,
        /// Expected column type.
        expected: &'static str,
        /// The offending value.
        found: String,
    },

    /// A predicate rule is relevant, so the records cannot be selected in SQL
    #[error("Cannot build a query for {action} on {model}: a relevant rule uses a predicate")]
    UntranslatableRule {
        /// Action being queried.
        action: Action,
        /// Model being queried.
        model: String,
    },

    /// The schema is inconsistent
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A statement could not be built
    #[error("Query build error: {0}")]
    Query(String),
}

/// Result type for SQL operations.
pub type SqlResult<T> = Result<T, SqlError>;

impl SqlError {
    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            SqlError::Database(_) => "DATABASE_ERROR",
            SqlError::Config(_) => "CONFIG_ERROR",
            SqlError::Rules(err) => err.error_code(),
            SqlError::UnknownModel(_) => "UNKNOWN_MODEL",
            SqlError::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            SqlError::UnknownAssociation { .. } => "UNKNOWN_ASSOCIATION",
            SqlError::UnknownEnumValue { .. } => "UNKNOWN_ENUM_VALUE",
            SqlError::TypeMismatch { .. } => "TYPE_MISMATCH",
            SqlError::UntranslatableRule { .. } => "UNTRANSLATABLE_RULE",
            SqlError::InvalidSchema(_) => "INVALID_SCHEMA",
            SqlError::Query(_) => "QUERY_ERROR",
        }
    }

    /// Check if this is a server error (5xx) rather than a usage error.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            SqlError::Database(_) | SqlError::Config(_) | SqlError::InvalidSchema(_)
        )
    }

    pub(crate) fn unknown_column(model: &str, column: &str) -> Self {
        SqlError::UnknownColumn {
            model: model.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn unknown_association(model: &str, association: &str) -> Self {
        SqlError::UnknownAssociation {
            model: model.to_string(),
            association: association.to_string(),
        }
    }
}

impl From<sea_query::error::Error> for SqlError {
    fn from(err: sea_query::error::Error) -> Self {
        SqlError::Query(err.to_string())
    }
}
