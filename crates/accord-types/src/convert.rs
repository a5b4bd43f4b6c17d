//! Parsing of stored text columns into typed values.
//!
//! Storage rows carry identifiers, timestamps and statuses as text. These
//! helpers are the single place where that text is parsed back, and they
//! never fall back to a default: a column that does not parse is a
//! [`ConversionError`].

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::relationship::{ConsentStatus, ParseConsentStatusError};
use crate::trust_domain::TrustDomainNameError;

/// A stored column could not be converted into its typed form.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// A column did not hold a valid UUID.
    #[error("column {column} holds invalid identifier {value:?}: {source}")]
    InvalidId {
        column: &'static str,
        value: String,
        source: uuid::Error,
    },

    /// A column did not hold an RFC 3339 timestamp.
    #[error("column {column} holds invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        column: &'static str,
        value: String,
        source: chrono::ParseError,
    },

    /// A column did not hold a known consent status.
    #[error("column {column} holds invalid status: {source}")]
    InvalidStatus {
        column: &'static str,
        source: ParseConsentStatusError,
    },

    /// The stored trust-domain name violates the name grammar.
    #[error("column name holds invalid trust domain name: {0}")]
    InvalidName(#[from] TrustDomainNameError),
}

/// Parses a hyphenated UUID stored in `column`.
pub fn parse_id(column: &'static str, value: &str) -> Result<Uuid, ConversionError> {
    Uuid::parse_str(value).map_err(|source| ConversionError::InvalidId {
        column,
        value: value.to_string(),
        source,
    })
}

/// Parses an RFC 3339 timestamp stored in `column`, normalised to UTC.
pub fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, ConversionError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| ConversionError::InvalidTimestamp {
            column,
            value: value.to_string(),
            source,
        })
}

/// Parses a consent status label stored in `column`.
pub fn parse_consent(column: &'static str, value: &str) -> Result<ConsentStatus, ConversionError> {
    value
        .parse()
        .map_err(|source| ConversionError::InvalidStatus { column, source })
}

/// Formats a timestamp in the canonical storage form.
///
/// The output has fixed microsecond precision and a `Z` suffix, so the
/// lexical order of two formatted timestamps is their chronological order.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}
