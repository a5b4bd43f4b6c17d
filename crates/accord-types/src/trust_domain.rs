//! Trust domains and the trust-domain name grammar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::MAX_TRUST_DOMAIN_NAME_LEN;

/// Errors produced when validating a trust-domain name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustDomainNameError {
    /// The name was empty.
    #[error("trust domain name is missing")]
    Empty,

    /// The name exceeds [`MAX_TRUST_DOMAIN_NAME_LEN`].
    #[error("trust domain name is {0} bytes long, maximum is {MAX_TRUST_DOMAIN_NAME_LEN}")]
    TooLong(usize),

    /// The name contains a character outside `[a-z0-9._-]`.
    #[error("trust domain name contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A validated trust-domain name such as `td-a.org`.
///
/// Names are lowercase ASCII letters, digits, `.`, `-` and `_`, between 1
/// and 255 bytes. Once constructed, a `TrustDomainName` is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrustDomainName(String);

impl TrustDomainName {
    /// Validates and wraps a trust-domain name.
    ///
    /// # Errors
    ///
    /// Returns [`TrustDomainNameError`] if the name is empty, too long, or
    /// contains a character outside the allowed set.
    pub fn new(name: impl Into<String>) -> Result<Self, TrustDomainNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TrustDomainNameError::Empty);
        }
        if name.len() > MAX_TRUST_DOMAIN_NAME_LEN {
            return Err(TrustDomainNameError::TooLong(name.len()));
        }
        if let Some(c) = name.chars().find(|c| !is_name_char(*c)) {
            return Err(TrustDomainNameError::InvalidCharacter(c));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_')
}

impl std::fmt::Display for TrustDomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TrustDomainName {
    type Err = TrustDomainNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TrustDomainName {
    type Error = TrustDomainNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrustDomainName> for String {
    fn from(name: TrustDomainName) -> Self {
        name.0
    }
}

impl AsRef<str> for TrustDomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An administratively independent identity namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustDomain {
    /// Assigned on creation; `None` until persisted.
    pub id: Option<Uuid>,
    /// Natural external identifier. Immutable once created.
    pub name: TrustDomainName,
    /// Free-form operator description.
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TrustDomain {
    /// Creates an unpersisted trust domain with the given name.
    pub fn new(name: TrustDomainName) -> Self {
        Self {
            id: None,
            name,
            description: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
