//! Bilateral relationships and per-side consent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-side approval state of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    /// The side has not decided yet. Default for new relationships.
    #[default]
    Pending,
    /// The side agreed to federate.
    Approved,
    /// The side refused to federate.
    Denied,
}

impl ConsentStatus {
    /// Returns the canonical storage label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConsentStatus {
    type Err = ParseConsentStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            _ => Err(ParseConsentStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown consent status label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consent status: {0:?}")]
pub struct ParseConsentStatusError(pub String);

/// A federation link between trust domain A and trust domain B.
///
/// Each side consents independently. Nothing at this layer propagates a
/// change on one side to the other, and no transition is forbidden: moving
/// from `Approved` back to `Pending` is a plain update. Transition policy
/// belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Option<Uuid>,
    pub trust_domain_a_id: Uuid,
    pub trust_domain_b_id: Uuid,
    pub trust_domain_a_consent: ConsentStatus,
    pub trust_domain_b_consent: ConsentStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Relationship {
    /// Creates an unpersisted relationship with both sides pending.
    pub fn new(trust_domain_a_id: Uuid, trust_domain_b_id: Uuid) -> Self {
        Self {
            id: None,
            trust_domain_a_id,
            trust_domain_b_id,
            trust_domain_a_consent: ConsentStatus::Pending,
            trust_domain_b_consent: ConsentStatus::Pending,
            created_at: None,
            updated_at: None,
        }
    }

    /// True when both sides have approved.
    pub fn is_established(&self) -> bool {
        self.trust_domain_a_consent == ConsentStatus::Approved
            && self.trust_domain_b_consent == ConsentStatus::Approved
    }

    /// Returns the consent of the side owned by `trust_domain_id`, or `None`
    /// if that trust domain is not a party to this relationship.
    pub fn consent_for(&self, trust_domain_id: Uuid) -> Option<ConsentStatus> {
        if trust_domain_id == self.trust_domain_a_id {
            Some(self.trust_domain_a_consent)
        } else if trust_domain_id == self.trust_domain_b_id {
            Some(self.trust_domain_b_consent)
        } else {
            None
        }
    }

    /// Returns the identifier of the other party, or `None` if
    /// `trust_domain_id` is not a party.
    pub fn counterpart(&self, trust_domain_id: Uuid) -> Option<Uuid> {
        if trust_domain_id == self.trust_domain_a_id {
            Some(self.trust_domain_b_id)
        } else if trust_domain_id == self.trust_domain_b_id {
            Some(self.trust_domain_a_id)
        } else {
            None
        }
    }
}
