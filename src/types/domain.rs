//! Validated domain names.
//!
//! A domain is a named namespace inside the store: an independent key map
//! with its own subscriber set and its own durable file. Because the name is
//! used to derive that file's path, it is validated on entry to the system:
//! it must be non-empty, consist only of ASCII letters, digits, `_` and `.`,
//! and must not be exactly `_` (reserved).

use crate::error::{CometDictError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated domain name, safe for use as a file name.
///
/// ```
/// use comet_dict::types::DomainName;
///
/// let d = DomainName::new("chat_room.7").unwrap();
/// assert_eq!(d.as_str(), "chat_room.7");
///
/// assert!(DomainName::new("../etc").is_err());
/// assert!(DomainName::new("_").is_err());
/// assert!(DomainName::new("").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Validate and wrap a domain name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name != "_"
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        // dot-only names like "." and ".." are not usable file stems
        if valid && !name.chars().all(|c| c == '.') {
            Ok(DomainName(name))
        } else {
            Err(CometDictError::BadDomain(name))
        }
    }

    /// The validated name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DomainName {
    type Error = CometDictError;

    fn try_from(value: String) -> Result<Self> {
        DomainName::new(value)
    }
}

impl From<DomainName> for String {
    fn from(value: DomainName) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_word_characters() {
        for name in ["d1", "chat", "Room_2", "a.b.c", "_private", "7"] {
            assert!(DomainName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in ["", "_", "..", "...", "a/b", "a b", "über", "a\\b", "d:1"] {
            assert!(DomainName::new(name).is_err(), "{name} should be invalid");
        }
    }

    #[test]
    fn test_display_round_trip() {
        let d = DomainName::new("notes").unwrap();
        assert_eq!(d.to_string(), "notes");
    }
}
