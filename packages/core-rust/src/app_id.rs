//! Application identifier newtype.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Longest identifier accepted. Real identifiers are well below this.
pub const MAX_APP_ID_LEN: usize = 64;

/// Reasons an application identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidAppId {
    #[error("application id is empty")]
    Empty,
    #[error("application id is longer than {MAX_APP_ID_LEN} characters")]
    TooLong,
    #[error("application id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Identifier of a tenant application.
///
/// Opaque to everything except the fallback resolver, which inspects its
/// suffix to pick a region. Only ASCII letters, digits, `-` and `_` are
/// accepted so the identifier can be embedded in host names and cache keys
/// without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Validates and wraps an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAppId`] if the identifier is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidAppId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidAppId::Empty);
        }
        if raw.len() > MAX_APP_ID_LEN {
            return Err(InvalidAppId::TooLong);
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(InvalidAppId::InvalidChar(c));
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used as the leading host label of fallback URLs.
    #[must_use]
    pub fn host_label(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AppId {
    type Err = InvalidAppId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AppId {
    type Error = InvalidAppId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.0
    }
}

impl AsRef<str> for AppId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_region_suffixed_ids() {
        let id = AppId::parse("abc123-MdYXbMMI").unwrap();
        assert_eq!(id.as_str(), "abc123-MdYXbMMI");
        assert_eq!(id.host_label(), "abc123-mdyxbmmi");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(AppId::parse(""), Err(InvalidAppId::Empty));
    }

    #[test]
    fn rejects_host_breaking_characters() {
        assert_eq!(AppId::parse("abc.def"), Err(InvalidAppId::InvalidChar('.')));
        assert_eq!(AppId::parse("abc/def"), Err(InvalidAppId::InvalidChar('/')));
    }

    #[test]
    fn rejects_overlong() {
        let raw = "a".repeat(MAX_APP_ID_LEN + 1);
        assert_eq!(AppId::parse(raw), Err(InvalidAppId::TooLong));
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: AppId = serde_json::from_str("\"app-1\"").unwrap();
        assert_eq!(ok.as_str(), "app-1");
        assert!(serde_json::from_str::<AppId>("\"bad id\"").is_err());
    }
}
