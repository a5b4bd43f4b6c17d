//! Signed trust bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Signed trust material published by a trust domain.
///
/// Logically a trust domain has one active bundle; the storage layer does
/// not enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: Option<Uuid>,
    pub trust_domain_id: Uuid,
    pub data: Vec<u8>,
    /// SHA-256 of `data`. Filled in by the datastore when left empty.
    pub digest: Vec<u8>,
    pub signature: Vec<u8>,
    pub signing_certificate: Vec<u8>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Bundle {
    /// Creates an unpersisted bundle with an empty digest.
    pub fn new(
        trust_domain_id: Uuid,
        data: Vec<u8>,
        signature: Vec<u8>,
        signing_certificate: Vec<u8>,
    ) -> Self {
        Self {
            id: None,
            trust_domain_id,
            data,
            digest: Vec::new(),
            signature,
            signing_certificate,
            created_at: None,
            updated_at: None,
        }
    }

    /// Computes the SHA-256 digest of `data`.
    pub fn compute_digest(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}
