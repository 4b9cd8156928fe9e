//! # Subjects
//!
//! A subject names what a rule applies to: one record model, or every model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Subject of a rule.
///
/// Models are identified by name (e.g. `"Article"`), matching the name
/// records carry in [`Record::model`](crate::record::Record::model).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Every model.
    All,
    /// A single model, by name.
    Model(String),
}

impl Subject {
    /// Create a subject for a single model.
    pub fn model(name: impl Into<String>) -> Self {
        Subject::Model(name.into())
    }

    /// Parse a subject; `"all"` (case-insensitive) is [`Subject::All`].
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") {
            Subject::All
        } else {
            Subject::Model(s.to_string())
        }
    }

    /// Get the string representation of the subject.
    pub fn as_str(&self) -> &str {
        match self {
            Subject::All => "all",
            Subject::Model(name) => name,
        }
    }

    /// Check if this subject covers the named model.
    ///
    /// # Example
    ///
    /// ```
    /// use ability_rules::subjects::Subject;
    ///
    /// assert!(Subject::All.matches("Article"));
    /// assert!(Subject::model("Article").matches("Article"));
    /// assert!(!Subject::model("Article").matches("Comment"));
    /// ```
    pub fn matches(&self, model: &str) -> bool {
        match self {
            Subject::All => true,
            Subject::Model(name) => name == model,
        }
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Subject::parse(s)
    }
}

impl From<String> for Subject {
    fn from(s: String) -> Self {
        Subject::parse(&s)
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Subject {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Subject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Subject::parse(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_is_case_insensitive() {
        assert_eq!(Subject::parse("all"), Subject::All);
        assert_eq!(Subject::parse("ALL"), Subject::All);
        assert_eq!(Subject::parse("Article"), Subject::model("Article"));
    }

    #[test]
    fn test_model_names_are_case_sensitive() {
        assert!(!Subject::model("Article").matches("article"));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&vec![Subject::All, Subject::model("Parent")]).unwrap();
        assert_eq!(json, r#"["all","Parent"]"#);

        let parsed: Vec<Subject> = serde_json::from_str(r#"["Child","all"]"#).unwrap();
        assert_eq!(parsed, vec![Subject::model("Child"), Subject::All]);
    }
}
