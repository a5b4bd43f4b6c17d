//! Shared entity types for the Accord federation control plane.
//!
//! This crate defines the canonical in-memory shape of every entity the
//! datastore persists: trust domains, bilateral relationships with per-side
//! consent, join tokens and signed bundles. It also carries the parsing
//! helpers used to turn stored text columns back into typed values.
//!
//! Nothing here performs I/O. Storage lives in `accord-db` and
//! `accord-datastore`; both depend on this crate and on nothing else for
//! cross-cutting type definitions.
//!
//! # Identity of persisted entities
//!
//! Every entity carries `id: Option<Uuid>`. `None` means "not yet
//! persisted" and is the only signal the datastore uses to choose between
//! create and update. Timestamps follow the same convention: the datastore
//! fills `created_at`/`updated_at` on create when they are `None`.

mod bundle;
mod convert;
mod join_token;
mod relationship;
mod trust_domain;

pub use bundle::Bundle;
pub use convert::{format_timestamp, parse_consent, parse_id, parse_timestamp, ConversionError};
pub use join_token::JoinToken;
pub use relationship::{ConsentStatus, ParseConsentStatusError, Relationship};
pub use trust_domain::{TrustDomain, TrustDomainName, TrustDomainNameError};

/// Maximum length of a trust-domain name, in bytes.
pub const MAX_TRUST_DOMAIN_NAME_LEN: usize = 255;
