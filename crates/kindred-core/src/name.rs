//! Name normalization shared by plugin and command names.
//!
//! One fixed policy applies everywhere: trim surrounding whitespace, then
//! lowercase. A normalized name is never empty and never contains
//! whitespace.

use std::borrow::Borrow;
use std::fmt;

use crate::error::DefinitionError;

/// Applies the normalization policy without validating the result.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A validated, normalized plugin or command name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    /// Normalizes and validates `raw`.
    pub fn new(raw: &str) -> Result<Self, DefinitionError> {
        let normalized = normalize(raw);
        if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
            return Err(DefinitionError::InvalidName(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    /// Returns the normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_trimmed_and_lowercased() {
        let name = Name::new("  RuNes \t").unwrap();
        assert_eq!(name, "runes");
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            Name::new("   "),
            Err(DefinitionError::InvalidName(_))
        ));
    }

    #[test]
    fn test_inner_whitespace_rejected() {
        assert!(Name::new("two words").is_err());
    }

    #[test]
    fn test_borrow_lookup_matches_str() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(Name::new("Pros").unwrap(), 1);
        assert_eq!(map.get("pros"), Some(&1));
    }
}
