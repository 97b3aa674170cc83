//! Platform credentials: the owner's personal domain and the auth token.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The owner's personal platform address, e.g. `mary.hubofallthings.net`.
///
/// Stored as a bare lowercase host: no scheme, no path, no port.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phata(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhataError {
    #[error("phata must not be empty")]
    Empty,
    #[error("phata must be a bare host, not {0:?}")]
    NotBareHost(String),
}

impl Phata {
    pub fn new(value: impl AsRef<str>) -> Result<Self, PhataError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(PhataError::Empty);
        }
        let lowered = value.to_ascii_lowercase();
        let bare = lowered
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !bare || !lowered.contains('.') {
            return Err(PhataError::NotBareHost(value.to_string()));
        }
        Ok(Self(lowered))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Phata {
    type Error = PhataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Phata> for String {
    fn from(value: Phata) -> Self {
        value.0
    }
}

impl fmt::Debug for Phata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phata({})", self.0)
    }
}

impl fmt::Display for Phata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform auth token carried in the `x-auth-token` header.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthToken(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("auth token must not be empty")]
pub struct AuthTokenError;

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Result<Self, AuthTokenError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(AuthTokenError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AuthToken {
    type Error = AuthTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AuthToken> for String {
    fn from(value: AuthToken) -> Self {
        value.0
    }
}

// Manual Debug impl to prevent leaking tokens in logs.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phata_normalizes_case() {
        let phata = Phata::new("Mary.HubOfAllThings.net").unwrap();
        assert_eq!(phata.as_str(), "mary.hubofallthings.net");
    }

    #[test]
    fn phata_rejects_urls() {
        assert_eq!(
            Phata::new("https://mary.hubofallthings.net"),
            Err(PhataError::NotBareHost(
                "https://mary.hubofallthings.net".to_string()
            ))
        );
        assert!(Phata::new("mary.example.net/api").is_err());
        assert!(Phata::new("   ").is_err());
        assert!(Phata::new("localhost").is_err());
    }

    #[test]
    fn token_rejects_empty() {
        assert!(AuthToken::new("").is_err());
        assert!(AuthToken::new("   ").is_err());
        assert!(AuthToken::new("eyJ0eXAi").is_ok());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::new("super-secret").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
