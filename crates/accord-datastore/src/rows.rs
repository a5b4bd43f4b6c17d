//! Storage rows and write parameters.
//!
//! Rows are what a querier hands back: identifiers, timestamps and statuses
//! as text, in the canonical formats of [`accord_types::format_timestamp`]
//! and hyphenated UUIDs. Parameters are what a querier is given to write,
//! already typed. Converting a row into an entity is the only place stored
//! text is trusted, and it never falls back to a default.

use accord_types::{
    parse_consent, parse_id, parse_timestamp, Bundle, ConsentStatus, ConversionError, JoinToken,
    Relationship, TrustDomain, TrustDomainName,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EntityKind;

/// A storage row that converts into an entity.
pub trait EntityRow {
    type Entity;

    const KIND: EntityKind;

    /// The row identifier as stored, for error reporting.
    fn row_id(&self) -> &str;

    fn into_entity(self) -> Result<Self::Entity, ConversionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDomainRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRow for TrustDomainRow {
    type Entity = TrustDomain;

    const KIND: EntityKind = EntityKind::TrustDomain;

    fn row_id(&self) -> &str {
        &self.id
    }

    fn into_entity(self) -> Result<TrustDomain, ConversionError> {
        Ok(TrustDomain {
            id: Some(parse_id("id", &self.id)?),
            name: TrustDomainName::new(self.name)?,
            description: self.description,
            created_at: Some(parse_timestamp("created_at", &self.created_at)?),
            updated_at: Some(parse_timestamp("updated_at", &self.updated_at)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRow {
    pub id: String,
    pub trust_domain_a_id: String,
    pub trust_domain_b_id: String,
    pub trust_domain_a_consent: String,
    pub trust_domain_b_consent: String,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRow for RelationshipRow {
    type Entity = Relationship;

    const KIND: EntityKind = EntityKind::Relationship;

    fn row_id(&self) -> &str {
        &self.id
    }

    fn into_entity(self) -> Result<Relationship, ConversionError> {
        Ok(Relationship {
            id: Some(parse_id("id", &self.id)?),
            trust_domain_a_id: parse_id("trust_domain_a_id", &self.trust_domain_a_id)?,
            trust_domain_b_id: parse_id("trust_domain_b_id", &self.trust_domain_b_id)?,
            trust_domain_a_consent: parse_consent(
                "trust_domain_a_consent",
                &self.trust_domain_a_consent,
            )?,
            trust_domain_b_consent: parse_consent(
                "trust_domain_b_consent",
                &self.trust_domain_b_consent,
            )?,
            created_at: Some(parse_timestamp("created_at", &self.created_at)?),
            updated_at: Some(parse_timestamp("updated_at", &self.updated_at)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTokenRow {
    pub id: String,
    pub trust_domain_id: String,
    pub token: String,
    pub used: bool,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRow for JoinTokenRow {
    type Entity = JoinToken;

    const KIND: EntityKind = EntityKind::JoinToken;

    fn row_id(&self) -> &str {
        &self.id
    }

    fn into_entity(self) -> Result<JoinToken, ConversionError> {
        Ok(JoinToken {
            id: Some(parse_id("id", &self.id)?),
            trust_domain_id: parse_id("trust_domain_id", &self.trust_domain_id)?,
            token: self.token,
            used: self.used,
            expires_at: parse_timestamp("expires_at", &self.expires_at)?,
            created_at: Some(parse_timestamp("created_at", &self.created_at)?),
            updated_at: Some(parse_timestamp("updated_at", &self.updated_at)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRow {
    pub id: String,
    pub trust_domain_id: String,
    pub data: Vec<u8>,
    pub digest: Vec<u8>,
    pub signature: Vec<u8>,
    pub signing_certificate: Vec<u8>,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRow for BundleRow {
    type Entity = Bundle;

    const KIND: EntityKind = EntityKind::Bundle;

    fn row_id(&self) -> &str {
        &self.id
    }

    fn into_entity(self) -> Result<Bundle, ConversionError> {
        Ok(Bundle {
            id: Some(parse_id("id", &self.id)?),
            trust_domain_id: parse_id("trust_domain_id", &self.trust_domain_id)?,
            data: self.data,
            digest: self.digest,
            signature: self.signature,
            signing_certificate: self.signing_certificate,
            created_at: Some(parse_timestamp("created_at", &self.created_at)?),
            updated_at: Some(parse_timestamp("updated_at", &self.updated_at)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewTrustDomain {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TrustDomainUpdate {
    pub id: Uuid,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub id: Uuid,
    pub trust_domain_a_id: Uuid,
    pub trust_domain_b_id: Uuid,
    pub trust_domain_a_consent: ConsentStatus,
    pub trust_domain_b_consent: ConsentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RelationshipUpdate {
    pub id: Uuid,
    pub trust_domain_a_consent: ConsentStatus,
    pub trust_domain_b_consent: ConsentStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJoinToken {
    pub id: Uuid,
    pub trust_domain_id: Uuid,
    pub token: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JoinTokenUpdate {
    pub id: Uuid,
    pub used: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBundle {
    pub id: Uuid,
    pub trust_domain_id: Uuid,
    pub data: Vec<u8>,
    pub digest: Vec<u8>,
    pub signature: Vec<u8>,
    pub signing_certificate: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BundleUpdate {
    pub id: Uuid,
    pub data: Vec<u8>,
    pub digest: Vec<u8>,
    pub signature: Vec<u8>,
    pub signing_certificate: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "6f1c2d0e-8a7b-4c3d-9e2f-1a2b3c4d5e6f";
    const TS: &str = "2024-01-02T03:04:05.000006Z";

    fn relationship_row() -> RelationshipRow {
        RelationshipRow {
            id: ID.to_string(),
            trust_domain_a_id: "00000000-0000-0000-0000-00000000000a".to_string(),
            trust_domain_b_id: "00000000-0000-0000-0000-00000000000b".to_string(),
            trust_domain_a_consent: "approved".to_string(),
            trust_domain_b_consent: "pending".to_string(),
            created_at: TS.to_string(),
            updated_at: TS.to_string(),
        }
    }

    #[test]
    fn well_formed_relationship_converts() {
        let rel = relationship_row().into_entity().expect("should convert");
        assert_eq!(rel.id.map(|id| id.to_string()).as_deref(), Some(ID));
        assert_eq!(rel.trust_domain_a_consent, ConsentStatus::Approved);
        assert_eq!(rel.trust_domain_b_consent, ConsentStatus::Pending);
        assert_eq!(
            rel.created_at.map(accord_types::format_timestamp).as_deref(),
            Some(TS)
        );
    }

    #[test]
    fn unknown_status_is_not_defaulted() {
        let mut row = relationship_row();
        row.trust_domain_b_consent = "maybe".to_string();
        assert!(matches!(
            row.into_entity(),
            Err(ConversionError::InvalidStatus {
                column: "trust_domain_b_consent",
                ..
            })
        ));
    }

    #[test]
    fn corrupt_identifier_and_timestamp_fail() {
        let row = TrustDomainRow {
            id: "not-a-uuid".to_string(),
            name: "td-a.org".to_string(),
            description: None,
            created_at: TS.to_string(),
            updated_at: TS.to_string(),
        };
        assert_eq!(row.row_id(), "not-a-uuid");
        assert!(matches!(
            row.into_entity(),
            Err(ConversionError::InvalidId { column: "id", .. })
        ));

        let row = JoinTokenRow {
            id: ID.to_string(),
            trust_domain_id: ID.to_string(),
            token: "secret".to_string(),
            used: false,
            expires_at: "tomorrow".to_string(),
            created_at: TS.to_string(),
            updated_at: TS.to_string(),
        };
        assert!(matches!(
            row.into_entity(),
            Err(ConversionError::InvalidTimestamp {
                column: "expires_at",
                ..
            })
        ));
    }

    #[test]
    fn stored_name_must_still_be_valid() {
        let row = TrustDomainRow {
            id: ID.to_string(),
            name: "Not Valid".to_string(),
            description: Some("desc".to_string()),
            created_at: TS.to_string(),
            updated_at: TS.to_string(),
        };
        assert!(matches!(
            row.into_entity(),
            Err(ConversionError::InvalidName(_))
        ));
    }
}
