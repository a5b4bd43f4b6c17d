//! Backend queriers.
//!
//! A [`Querier`] owns a connection pool and the statements for one SQL
//! engine. Every operation takes a [`Context`] and reports failures as a
//! driver-agnostic [`QueryError`]. Lookups return `Ok(None)` on absence;
//! updates return `Ok(None)` when the identifier matched nothing.

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Backend;
use crate::context::Context;
use crate::error::QueryError;
use crate::query::ListQuery;
use crate::rows::{
    BundleRow, BundleUpdate, JoinTokenRow, JoinTokenUpdate, NewBundle, NewJoinToken,
    NewRelationship, NewTrustDomain, RelationshipRow, RelationshipUpdate, TrustDomainRow,
    TrustDomainUpdate,
};

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresQuerier;
pub use sqlite::SqliteQuerier;

#[async_trait]
pub trait Querier: Send + Sync {
    fn backend(&self) -> Backend;

    async fn create_trust_domain(
        &self,
        ctx: &Context,
        params: NewTrustDomain,
    ) -> Result<TrustDomainRow, QueryError>;

    async fn update_trust_domain(
        &self,
        ctx: &Context,
        params: TrustDomainUpdate,
    ) -> Result<Option<TrustDomainRow>, QueryError>;

    async fn find_trust_domain_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<TrustDomainRow>, QueryError>;

    async fn find_trust_domain_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Option<TrustDomainRow>, QueryError>;

    async fn list_trust_domains(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<TrustDomainRow>, QueryError>;

    async fn delete_trust_domain(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError>;

    async fn create_relationship(
        &self,
        ctx: &Context,
        params: NewRelationship,
    ) -> Result<RelationshipRow, QueryError>;

    async fn update_relationship(
        &self,
        ctx: &Context,
        params: RelationshipUpdate,
    ) -> Result<Option<RelationshipRow>, QueryError>;

    async fn find_relationship_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<RelationshipRow>, QueryError>;

    async fn find_relationships_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<RelationshipRow>, QueryError>;

    async fn list_relationships(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<RelationshipRow>, QueryError>;

    async fn delete_relationship(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError>;

    async fn create_join_token(
        &self,
        ctx: &Context,
        params: NewJoinToken,
    ) -> Result<JoinTokenRow, QueryError>;

    async fn update_join_token(
        &self,
        ctx: &Context,
        params: JoinTokenUpdate,
    ) -> Result<Option<JoinTokenRow>, QueryError>;

    async fn find_join_token_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<JoinTokenRow>, QueryError>;

    async fn find_join_token_by_token(
        &self,
        ctx: &Context,
        token: &str,
    ) -> Result<Option<JoinTokenRow>, QueryError>;

    async fn find_join_tokens_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<JoinTokenRow>, QueryError>;

    async fn list_join_tokens(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<JoinTokenRow>, QueryError>;

    async fn delete_join_token(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError>;

    async fn create_bundle(&self, ctx: &Context, params: NewBundle)
        -> Result<BundleRow, QueryError>;

    async fn update_bundle(
        &self,
        ctx: &Context,
        params: BundleUpdate,
    ) -> Result<Option<BundleRow>, QueryError>;

    async fn find_bundle_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<BundleRow>, QueryError>;

    /// The most recently created bundle of the trust domain.
    async fn find_bundle_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Option<BundleRow>, QueryError>;

    async fn list_bundles(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<BundleRow>, QueryError>;

    async fn delete_bundle(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError>;

    /// Round-trips a trivial statement.
    async fn ping(&self, ctx: &Context) -> Result<(), QueryError>;

    /// Releases the pool. Later calls fail with [`QueryError::Pool`].
    async fn close(&self);
}
