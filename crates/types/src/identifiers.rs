//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier as assigned by the server under test.
///
/// Mastodon serializes ids as decimal strings, but nothing here relies on
/// that; the value is passed through to request paths untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Create an account id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Status (post) identifier returned by `POST /api/v1/statuses`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub String);

impl StatusId {
    /// Create a status id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StatusId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_raw_value() {
        assert_eq!(AccountId::new("109").to_string(), "109");
        assert_eq!(StatusId::from("1138").to_string(), "1138");
    }

    #[test]
    fn test_status_id_deserializes_from_plain_string() {
        let id: StatusId = serde_json::from_str("\"110321\"").unwrap();
        assert_eq!(id, StatusId::new("110321"));
    }
}
