//! The public datastore.
//!
//! [`Datastore`] chooses between create and update by the presence of an
//! identifier, turns absence into `Ok(None)`, converts rows into entities
//! and wraps every failure with the operation and entity it concerned.

use std::sync::Arc;

use accord_types::{Bundle, JoinToken, Relationship, TrustDomain, TrustDomainName};
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::config::{Backend, DatastoreConfig};
use crate::context::Context;
use crate::criteria::{
    self, ListBundlesCriteria, ListJoinTokensCriteria, ListRelationshipsCriteria,
    ListTrustDomainsCriteria,
};
use crate::error::{DatastoreError, EntityKind, OpenError, Operation, QueryError, ValidationError};
use crate::querier::{PostgresQuerier, Querier, SqliteQuerier};
use crate::rows::{
    BundleUpdate, EntityRow, JoinTokenUpdate, NewBundle, NewJoinToken, NewRelationship,
    NewTrustDomain, RelationshipUpdate, TrustDomainUpdate,
};

/// Handle to the federation datastore. Cheap to clone; clones share the
/// pool.
#[derive(Clone)]
pub struct Datastore {
    querier: Arc<dyn Querier>,
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("backend", &self.querier.backend())
            .finish()
    }
}

/// Current time at the precision both backends store.
fn now() -> DateTime<Utc> {
    storage_precision(Utc::now())
}

/// Truncates to microseconds so both backends read back the same instant.
fn storage_precision(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

fn convert<R: EntityRow>(row: R) -> Result<R::Entity, DatastoreError> {
    let id = row.row_id().to_string();
    row.into_entity()
        .map_err(|source| DatastoreError::Conversion {
            entity: R::KIND,
            id,
            source,
        })
}

fn convert_all<R: EntityRow>(rows: Vec<R>) -> Result<Vec<R::Entity>, DatastoreError> {
    rows.into_iter().map(convert).collect()
}

fn fail(
    op: Operation,
    entity: EntityKind,
    id: Option<String>,
) -> impl FnOnce(QueryError) -> DatastoreError {
    move |source| DatastoreError::Persistence {
        op,
        entity,
        id,
        source,
    }
}

fn non_empty(description: &Option<String>) -> Option<String> {
    description.clone().filter(|d| !d.is_empty())
}

fn digest_for(data: &[u8], digest: &[u8]) -> Vec<u8> {
    if digest.is_empty() {
        Bundle::compute_digest(data)
    } else {
        digest.to_vec()
    }
}

impl Datastore {
    /// Opens the configured backend, validates and migrates its schema and
    /// prepares every statement. Nothing is returned half-open.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::Open`] if any of those steps fail.
    pub async fn open(config: &DatastoreConfig) -> Result<Self, DatastoreError> {
        let settings = config.runtime_settings();
        let querier: Arc<dyn Querier> = match config.backend {
            Backend::Sqlite => {
                let path = config.connection_string.clone();
                let querier = tokio::task::spawn_blocking(move || SqliteQuerier::open(&path, settings))
                    .await
                    .map_err(OpenError::from)??;
                Arc::new(querier)
            }
            Backend::Postgres => {
                Arc::new(PostgresQuerier::open(&config.connection_string, settings).await?)
            }
        };
        Ok(Self { querier })
    }

    /// Wraps an already-constructed querier.
    pub fn from_querier(querier: Arc<dyn Querier>) -> Self {
        Self { querier }
    }

    pub fn backend(&self) -> Backend {
        self.querier.backend()
    }

    /// Checks that the backend answers. Not tied to any entity, so the
    /// querier error is returned as is.
    pub async fn ping(&self, ctx: &Context) -> Result<(), QueryError> {
        self.querier.ping(ctx).await
    }

    /// Releases the connection pool. Every later call fails.
    pub async fn close(&self) {
        self.querier.close().await;
    }

    // Trust domains.

    /// Creates the trust domain when `id` is `None`, otherwise updates its
    /// description.
    pub async fn create_or_update_trust_domain(
        &self,
        ctx: &Context,
        trust_domain: &TrustDomain,
    ) -> Result<TrustDomain, DatastoreError> {
        let description = non_empty(&trust_domain.description);
        let row = match trust_domain.id {
            None => {
                let now = now();
                let params = NewTrustDomain {
                    id: Uuid::new_v4(),
                    name: trust_domain.name.as_str().to_string(),
                    description,
                    created_at: trust_domain.created_at.map(storage_precision).unwrap_or(now),
                    updated_at: trust_domain.updated_at.map(storage_precision).unwrap_or(now),
                };
                let id = params.id;
                let row = self
                    .querier
                    .create_trust_domain(ctx, params)
                    .await
                    .map_err(fail(Operation::Create, EntityKind::TrustDomain, Some(trust_domain.name.to_string())))?;
                tracing::debug!(id = %id, name = %trust_domain.name, "trust domain created");
                row
            }
            Some(id) => {
                let params = TrustDomainUpdate {
                    id,
                    description,
                    updated_at: now(),
                };
                let row = self
                    .querier
                    .update_trust_domain(ctx, params)
                    .await
                    .and_then(|row| row.ok_or(QueryError::NoRows))
                    .map_err(fail(Operation::Update, EntityKind::TrustDomain, Some(id.to_string())))?;
                tracing::debug!(id = %id, "trust domain updated");
                row
            }
        };
        convert(row)
    }

    pub async fn find_trust_domain_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<TrustDomain>, DatastoreError> {
        self.querier
            .find_trust_domain_by_id(ctx, id)
            .await
            .map_err(fail(Operation::Find, EntityKind::TrustDomain, Some(id.to_string())))?
            .map(convert)
            .transpose()
    }

    pub async fn find_trust_domain_by_name(
        &self,
        ctx: &Context,
        name: &TrustDomainName,
    ) -> Result<Option<TrustDomain>, DatastoreError> {
        self.querier
            .find_trust_domain_by_name(ctx, name.as_str())
            .await
            .map_err(fail(Operation::Find, EntityKind::TrustDomain, Some(name.to_string())))?
            .map(convert)
            .transpose()
    }

    pub async fn list_trust_domains(
        &self,
        ctx: &Context,
        criteria: Option<&ListTrustDomainsCriteria>,
    ) -> Result<Vec<TrustDomain>, DatastoreError> {
        let query = criteria::build(criteria)?;
        let rows = self
            .querier
            .list_trust_domains(ctx, &query)
            .await
            .map_err(fail(Operation::List, EntityKind::TrustDomain, None))?;
        convert_all(rows)
    }

    /// Deletes the trust domain. Deleting a missing one succeeds; deleting
    /// one still referenced by a relationship, join token or bundle fails
    /// with a constraint violation.
    pub async fn delete_trust_domain(&self, ctx: &Context, id: Uuid) -> Result<(), DatastoreError> {
        let affected = self
            .querier
            .delete_trust_domain(ctx, id)
            .await
            .map_err(fail(Operation::Delete, EntityKind::TrustDomain, Some(id.to_string())))?;
        tracing::debug!(id = %id, affected, "trust domain deleted");
        Ok(())
    }

    // Relationships.

    /// Creates the relationship when `id` is `None`, otherwise writes both
    /// consents. Consents are stored as given; no transition is enforced.
    pub async fn create_or_update_relationship(
        &self,
        ctx: &Context,
        relationship: &Relationship,
    ) -> Result<Relationship, DatastoreError> {
        let row = match relationship.id {
            None => {
                if relationship.trust_domain_a_id == relationship.trust_domain_b_id {
                    return Err(
                        ValidationError::SelfRelationship(relationship.trust_domain_a_id).into(),
                    );
                }
                let now = now();
                let params = NewRelationship {
                    id: Uuid::new_v4(),
                    trust_domain_a_id: relationship.trust_domain_a_id,
                    trust_domain_b_id: relationship.trust_domain_b_id,
                    trust_domain_a_consent: relationship.trust_domain_a_consent,
                    trust_domain_b_consent: relationship.trust_domain_b_consent,
                    created_at: relationship.created_at.map(storage_precision).unwrap_or(now),
                    updated_at: relationship.updated_at.map(storage_precision).unwrap_or(now),
                };
                let id = params.id;
                let row = self
                    .querier
                    .create_relationship(ctx, params)
                    .await
                    .map_err(fail(Operation::Create, EntityKind::Relationship, Some(id.to_string())))?;
                tracing::debug!(
                    id = %id,
                    trust_domain_a = %relationship.trust_domain_a_id,
                    trust_domain_b = %relationship.trust_domain_b_id,
                    "relationship created"
                );
                row
            }
            Some(id) => {
                let params = RelationshipUpdate {
                    id,
                    trust_domain_a_consent: relationship.trust_domain_a_consent,
                    trust_domain_b_consent: relationship.trust_domain_b_consent,
                    updated_at: now(),
                };
                let row = self
                    .querier
                    .update_relationship(ctx, params)
                    .await
                    .and_then(|row| row.ok_or(QueryError::NoRows))
                    .map_err(fail(Operation::Update, EntityKind::Relationship, Some(id.to_string())))?;
                tracing::debug!(
                    id = %id,
                    a_consent = %relationship.trust_domain_a_consent,
                    b_consent = %relationship.trust_domain_b_consent,
                    "relationship updated"
                );
                row
            }
        };
        convert(row)
    }

    pub async fn find_relationship_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<Relationship>, DatastoreError> {
        self.querier
            .find_relationship_by_id(ctx, id)
            .await
            .map_err(fail(Operation::Find, EntityKind::Relationship, Some(id.to_string())))?
            .map(convert)
            .transpose()
    }

    /// Every relationship in which the trust domain is side A or side B.
    pub async fn find_relationships_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<Relationship>, DatastoreError> {
        let rows = self
            .querier
            .find_relationships_by_trust_domain_id(ctx, trust_domain_id)
            .await
            .map_err(fail(
                Operation::Find,
                EntityKind::Relationship,
                Some(trust_domain_id.to_string()),
            ))?;
        convert_all(rows)
    }

    pub async fn list_relationships(
        &self,
        ctx: &Context,
        criteria: Option<&ListRelationshipsCriteria>,
    ) -> Result<Vec<Relationship>, DatastoreError> {
        let query = criteria::build(criteria)?;
        let rows = self
            .querier
            .list_relationships(ctx, &query)
            .await
            .map_err(fail(Operation::List, EntityKind::Relationship, None))?;
        convert_all(rows)
    }

    pub async fn delete_relationship(&self, ctx: &Context, id: Uuid) -> Result<(), DatastoreError> {
        let affected = self
            .querier
            .delete_relationship(ctx, id)
            .await
            .map_err(fail(Operation::Delete, EntityKind::Relationship, Some(id.to_string())))?;
        tracing::debug!(id = %id, affected, "relationship deleted");
        Ok(())
    }

    // Join tokens.

    /// Creates the token when `id` is `None` (generating a secret if
    /// `token` is empty), otherwise writes `used`.
    pub async fn create_or_update_join_token(
        &self,
        ctx: &Context,
        join_token: &JoinToken,
    ) -> Result<JoinToken, DatastoreError> {
        match join_token.id {
            None => {
                let now = now();
                let token = if join_token.token.is_empty() {
                    JoinToken::generate_token()
                } else {
                    join_token.token.clone()
                };
                let params = NewJoinToken {
                    id: Uuid::new_v4(),
                    trust_domain_id: join_token.trust_domain_id,
                    token,
                    used: join_token.used,
                    expires_at: storage_precision(join_token.expires_at),
                    created_at: join_token.created_at.map(storage_precision).unwrap_or(now),
                    updated_at: join_token.updated_at.map(storage_precision).unwrap_or(now),
                };
                let id = params.id;
                let row = self
                    .querier
                    .create_join_token(ctx, params)
                    .await
                    .map_err(fail(Operation::Create, EntityKind::JoinToken, Some(id.to_string())))?;
                tracing::debug!(
                    id = %id,
                    trust_domain_id = %join_token.trust_domain_id,
                    expires_at = %join_token.expires_at,
                    "join token created"
                );
                convert(row)
            }
            Some(id) => self.update_join_token(ctx, id, join_token.used).await,
        }
    }

    /// Sets `used` on the token. Nothing else about the token changes.
    pub async fn update_join_token(
        &self,
        ctx: &Context,
        id: Uuid,
        used: bool,
    ) -> Result<JoinToken, DatastoreError> {
        let params = JoinTokenUpdate {
            id,
            used,
            updated_at: now(),
        };
        let row = self
            .querier
            .update_join_token(ctx, params)
            .await
            .and_then(|row| row.ok_or(QueryError::NoRows))
            .map_err(fail(Operation::Update, EntityKind::JoinToken, Some(id.to_string())))?;
        tracing::debug!(id = %id, used, "join token updated");
        convert(row)
    }

    pub async fn find_join_token_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<JoinToken>, DatastoreError> {
        self.querier
            .find_join_token_by_id(ctx, id)
            .await
            .map_err(fail(Operation::Find, EntityKind::JoinToken, Some(id.to_string())))?
            .map(convert)
            .transpose()
    }

    /// Looks a token up by its secret value. Expired and used tokens are
    /// returned as stored.
    pub async fn find_join_token(
        &self,
        ctx: &Context,
        token: &str,
    ) -> Result<Option<JoinToken>, DatastoreError> {
        // The secret itself never goes into an error.
        self.querier
            .find_join_token_by_token(ctx, token)
            .await
            .map_err(fail(Operation::Find, EntityKind::JoinToken, None))?
            .map(convert)
            .transpose()
    }

    pub async fn find_join_tokens_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<JoinToken>, DatastoreError> {
        let rows = self
            .querier
            .find_join_tokens_by_trust_domain_id(ctx, trust_domain_id)
            .await
            .map_err(fail(
                Operation::Find,
                EntityKind::JoinToken,
                Some(trust_domain_id.to_string()),
            ))?;
        convert_all(rows)
    }

    pub async fn list_join_tokens(
        &self,
        ctx: &Context,
        criteria: Option<&ListJoinTokensCriteria>,
    ) -> Result<Vec<JoinToken>, DatastoreError> {
        let query = criteria::build(criteria)?;
        let rows = self
            .querier
            .list_join_tokens(ctx, &query)
            .await
            .map_err(fail(Operation::List, EntityKind::JoinToken, None))?;
        convert_all(rows)
    }

    pub async fn delete_join_token(&self, ctx: &Context, id: Uuid) -> Result<(), DatastoreError> {
        let affected = self
            .querier
            .delete_join_token(ctx, id)
            .await
            .map_err(fail(Operation::Delete, EntityKind::JoinToken, Some(id.to_string())))?;
        tracing::debug!(id = %id, affected, "join token deleted");
        Ok(())
    }

    // Bundles.

    /// Creates the bundle when `id` is `None`, otherwise replaces its
    /// content. An empty digest is filled with the SHA-256 of `data`.
    pub async fn create_or_update_bundle(
        &self,
        ctx: &Context,
        bundle: &Bundle,
    ) -> Result<Bundle, DatastoreError> {
        let digest = digest_for(&bundle.data, &bundle.digest);
        let row = match bundle.id {
            None => {
                let now = now();
                let params = NewBundle {
                    id: Uuid::new_v4(),
                    trust_domain_id: bundle.trust_domain_id,
                    data: bundle.data.clone(),
                    digest,
                    signature: bundle.signature.clone(),
                    signing_certificate: bundle.signing_certificate.clone(),
                    created_at: bundle.created_at.map(storage_precision).unwrap_or(now),
                    updated_at: bundle.updated_at.map(storage_precision).unwrap_or(now),
                };
                let id = params.id;
                let row = self
                    .querier
                    .create_bundle(ctx, params)
                    .await
                    .map_err(fail(Operation::Create, EntityKind::Bundle, Some(id.to_string())))?;
                tracing::debug!(id = %id, trust_domain_id = %bundle.trust_domain_id, "bundle created");
                row
            }
            Some(id) => {
                let params = BundleUpdate {
                    id,
                    data: bundle.data.clone(),
                    digest,
                    signature: bundle.signature.clone(),
                    signing_certificate: bundle.signing_certificate.clone(),
                    updated_at: now(),
                };
                let row = self
                    .querier
                    .update_bundle(ctx, params)
                    .await
                    .and_then(|row| row.ok_or(QueryError::NoRows))
                    .map_err(fail(Operation::Update, EntityKind::Bundle, Some(id.to_string())))?;
                tracing::debug!(id = %id, "bundle updated");
                row
            }
        };
        convert(row)
    }

    pub async fn find_bundle_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<Bundle>, DatastoreError> {
        self.querier
            .find_bundle_by_id(ctx, id)
            .await
            .map_err(fail(Operation::Find, EntityKind::Bundle, Some(id.to_string())))?
            .map(convert)
            .transpose()
    }

    /// The most recently created bundle of the trust domain.
    pub async fn find_bundle_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Option<Bundle>, DatastoreError> {
        self.querier
            .find_bundle_by_trust_domain_id(ctx, trust_domain_id)
            .await
            .map_err(fail(
                Operation::Find,
                EntityKind::Bundle,
                Some(trust_domain_id.to_string()),
            ))?
            .map(convert)
            .transpose()
    }

    pub async fn list_bundles(
        &self,
        ctx: &Context,
        criteria: Option<&ListBundlesCriteria>,
    ) -> Result<Vec<Bundle>, DatastoreError> {
        let query = criteria::build(criteria)?;
        let rows = self
            .querier
            .list_bundles(ctx, &query)
            .await
            .map_err(fail(Operation::List, EntityKind::Bundle, None))?;
        convert_all(rows)
    }

    pub async fn delete_bundle(&self, ctx: &Context, id: Uuid) -> Result<(), DatastoreError> {
        let affected = self
            .querier
            .delete_bundle(ctx, id)
            .await
            .map_err(fail(Operation::Delete, EntityKind::Bundle, Some(id.to_string())))?;
        tracing::debug!(id = %id, affected, "bundle deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest_is_computed() {
        let digest = digest_for(b"bundle", &[]);
        assert_eq!(digest, Bundle::compute_digest(b"bundle"));
        assert_eq!(digest_for(b"bundle", &[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn empty_description_is_stored_as_null() {
        assert_eq!(non_empty(&Some(String::new())), None);
        assert_eq!(non_empty(&Some("x".to_string())), Some("x".to_string()));
    }

    #[test]
    fn now_has_microsecond_precision() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn caller_timestamps_drop_sub_microsecond_digits() {
        let t = DateTime::parse_from_rfc3339("2024-05-01T12:00:00.123456789Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(storage_precision(t).timestamp_subsec_nanos(), 123_456_000);
    }
}
