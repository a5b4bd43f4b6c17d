//! Onboarding join tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single-use, time-limited bearer secret for onboarding a trust domain.
///
/// The datastore stores the token and toggles `used`; it never checks
/// expiry or prior use when reading. Use [`JoinToken::is_redeemable_at`]
/// in the component that redeems tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinToken {
    pub id: Option<Uuid>,
    pub trust_domain_id: Uuid,
    /// Opaque secret. Left empty, the datastore generates one on create.
    pub token: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl JoinToken {
    /// Creates an unpersisted, unused token for `trust_domain_id` with a
    /// freshly generated secret.
    pub fn new(trust_domain_id: Uuid, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            trust_domain_id,
            token: Self::generate_token(),
            used: false,
            expires_at,
            created_at: None,
            updated_at: None,
        }
    }

    /// Generates a new secret from operating-system randomness.
    pub fn generate_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// True once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True when the token has not been used and has not expired.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn generated_tokens_are_distinct() {
        let a = JoinToken::generate_token();
        let b = JoinToken::generate_token();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn redeemable_until_used_or_expired() {
        let now = Utc::now();
        let mut token = JoinToken::new(Uuid::new_v4(), now + Duration::hours(1));
        assert!(token.is_redeemable_at(now));
        assert!(!token.is_redeemable_at(now + Duration::hours(1)));

        token.used = true;
        assert!(!token.is_redeemable_at(now));
    }
}
