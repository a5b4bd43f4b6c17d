//! PostgreSQL querier on `sqlx`.
//!
//! Cancellation drops the in-flight future, which returns the connection
//! to the pool with the statement abandoned.

use accord_db::{create_pg_pool, run_pg_migrations, DbRuntimeSettings};
use accord_types::format_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Executor, FromRow};
use uuid::Uuid;

use crate::config::Backend;
use crate::context::Context;
use crate::error::{OpenError, QueryError};
use crate::query::{Arg, ListQuery};
use crate::querier::Querier;
use crate::render::{render_list, Dialect};
use crate::rows::{
    BundleRow, BundleUpdate, JoinTokenRow, JoinTokenUpdate, NewBundle, NewJoinToken,
    NewRelationship, NewTrustDomain, RelationshipRow, RelationshipUpdate, TrustDomainRow,
    TrustDomainUpdate,
};

pub mod statements;

use statements as sql;

pub struct PostgresQuerier {
    pool: PgPool,
}

impl PostgresQuerier {
    /// Connects to `url`, applies pending migrations and prepares every
    /// statement.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError`] if the server is unreachable, the schema is
    /// unknown to this build or fails to migrate, or a statement does not
    /// prepare against it.
    pub async fn open(url: &str, settings: DbRuntimeSettings) -> Result<Self, OpenError> {
        let pool = create_pg_pool(url, settings).await?;
        let applied = run_pg_migrations(&pool).await?;

        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| OpenError::Connection(Box::new(e)))?;
        let listings = sql::LIST_BASES
            .iter()
            .map(|(name, base)| (*name, render_list(base, &ListQuery::all(), Dialect::Postgres)));
        let fixed = sql::ALL.iter().map(|(name, s)| (*name, (*s).to_string()));
        for (name, statement) in fixed.chain(listings) {
            (&mut *conn)
                .prepare(&statement)
                .await
                .map_err(|e| OpenError::Prepare {
                    name,
                    source: Box::new(e),
                })?;
        }
        drop(conn);

        tracing::info!(applied, "postgres datastore opened");

        Ok(Self { pool })
    }

    async fn list<P, R>(
        &self,
        ctx: &Context,
        base: &'static str,
        query: &ListQuery,
    ) -> Result<Vec<R>, QueryError>
    where
        P: for<'r> FromRow<'r, PgRow> + Send + Unpin,
        R: From<P> + Send,
    {
        let statement = render_list(base, query, Dialect::Postgres);
        ctx.run(async {
            let mut q = sqlx::query_as::<_, P>(&statement);
            for arg in &query.args {
                q = match arg {
                    Arg::Id(id) => q.bind(*id),
                    Arg::Text(text) => q.bind(text.clone()),
                    Arg::Bool(flag) => q.bind(*flag),
                    Arg::Int(n) => q.bind(*n),
                };
            }
            q.fetch_all(&self.pool)
                .await
                .map(|rows| rows.into_iter().map(R::from).collect())
                .map_err(map_error)
        })
        .await
    }

    async fn delete(&self, ctx: &Context, statement: &'static str, id: Uuid) -> Result<u64, QueryError> {
        ctx.run(async {
            sqlx::query(statement)
                .bind(id)
                .execute(&self.pool)
                .await
                .map(|done| done.rows_affected())
                .map_err(map_error)
        })
        .await
    }
}

fn map_error(err: sqlx::Error) -> QueryError {
    let constraint = matches!(
        &err,
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
    );
    if constraint {
        return QueryError::Constraint(Box::new(err));
    }
    match err {
        sqlx::Error::RowNotFound => QueryError::NoRows,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => QueryError::Pool(Box::new(err)),
        other => QueryError::Backend(Box::new(other)),
    }
}

#[derive(FromRow)]
struct PgTrustDomain {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PgTrustDomain> for TrustDomainRow {
    fn from(row: PgTrustDomain) -> Self {
        Self {
            id: row.id.to_string(),
            name: row.name,
            description: row.description,
            created_at: format_timestamp(row.created_at),
            updated_at: format_timestamp(row.updated_at),
        }
    }
}

#[derive(FromRow)]
struct PgRelationship {
    id: Uuid,
    trust_domain_a_id: Uuid,
    trust_domain_b_id: Uuid,
    trust_domain_a_consent: String,
    trust_domain_b_consent: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PgRelationship> for RelationshipRow {
    fn from(row: PgRelationship) -> Self {
        Self {
            id: row.id.to_string(),
            trust_domain_a_id: row.trust_domain_a_id.to_string(),
            trust_domain_b_id: row.trust_domain_b_id.to_string(),
            trust_domain_a_consent: row.trust_domain_a_consent,
            trust_domain_b_consent: row.trust_domain_b_consent,
            created_at: format_timestamp(row.created_at),
            updated_at: format_timestamp(row.updated_at),
        }
    }
}

#[derive(FromRow)]
struct PgJoinToken {
    id: Uuid,
    trust_domain_id: Uuid,
    token: String,
    used: bool,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PgJoinToken> for JoinTokenRow {
    fn from(row: PgJoinToken) -> Self {
        Self {
            id: row.id.to_string(),
            trust_domain_id: row.trust_domain_id.to_string(),
            token: row.token,
            used: row.used,
            expires_at: format_timestamp(row.expires_at),
            created_at: format_timestamp(row.created_at),
            updated_at: format_timestamp(row.updated_at),
        }
    }
}

#[derive(FromRow)]
struct PgBundle {
    id: Uuid,
    trust_domain_id: Uuid,
    data: Vec<u8>,
    digest: Vec<u8>,
    signature: Vec<u8>,
    signing_certificate: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PgBundle> for BundleRow {
    fn from(row: PgBundle) -> Self {
        Self {
            id: row.id.to_string(),
            trust_domain_id: row.trust_domain_id.to_string(),
            data: row.data,
            digest: row.digest,
            signature: row.signature,
            signing_certificate: row.signing_certificate,
            created_at: format_timestamp(row.created_at),
            updated_at: format_timestamp(row.updated_at),
        }
    }
}

#[async_trait]
impl Querier for PostgresQuerier {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn create_trust_domain(
        &self,
        ctx: &Context,
        p: NewTrustDomain,
    ) -> Result<TrustDomainRow, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgTrustDomain>(sql::CREATE_TRUST_DOMAIN)
                .bind(p.id)
                .bind(&p.name)
                .bind(&p.description)
                .bind(p.created_at)
                .bind(p.updated_at)
                .fetch_one(&self.pool)
                .await
                .map(TrustDomainRow::from)
                .map_err(map_error)
        })
        .await
    }

    async fn update_trust_domain(
        &self,
        ctx: &Context,
        p: TrustDomainUpdate,
    ) -> Result<Option<TrustDomainRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgTrustDomain>(sql::UPDATE_TRUST_DOMAIN)
                .bind(p.id)
                .bind(&p.description)
                .bind(p.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(TrustDomainRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_trust_domain_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<TrustDomainRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgTrustDomain>(sql::FIND_TRUST_DOMAIN_BY_ID)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(TrustDomainRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_trust_domain_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Option<TrustDomainRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgTrustDomain>(sql::FIND_TRUST_DOMAIN_BY_NAME)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(TrustDomainRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn list_trust_domains(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<TrustDomainRow>, QueryError> {
        self.list::<PgTrustDomain, _>(ctx, sql::LIST_TRUST_DOMAINS, query)
            .await
    }

    async fn delete_trust_domain(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError> {
        self.delete(ctx, sql::DELETE_TRUST_DOMAIN, id).await
    }

    async fn create_relationship(
        &self,
        ctx: &Context,
        p: NewRelationship,
    ) -> Result<RelationshipRow, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgRelationship>(sql::CREATE_RELATIONSHIP)
                .bind(p.id)
                .bind(p.trust_domain_a_id)
                .bind(p.trust_domain_b_id)
                .bind(p.trust_domain_a_consent.as_str())
                .bind(p.trust_domain_b_consent.as_str())
                .bind(p.created_at)
                .bind(p.updated_at)
                .fetch_one(&self.pool)
                .await
                .map(RelationshipRow::from)
                .map_err(map_error)
        })
        .await
    }

    async fn update_relationship(
        &self,
        ctx: &Context,
        p: RelationshipUpdate,
    ) -> Result<Option<RelationshipRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgRelationship>(sql::UPDATE_RELATIONSHIP)
                .bind(p.id)
                .bind(p.trust_domain_a_consent.as_str())
                .bind(p.trust_domain_b_consent.as_str())
                .bind(p.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(RelationshipRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_relationship_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<RelationshipRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgRelationship>(sql::FIND_RELATIONSHIP_BY_ID)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(RelationshipRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_relationships_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<RelationshipRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgRelationship>(sql::FIND_RELATIONSHIPS_BY_TRUST_DOMAIN_ID)
                .bind(trust_domain_id)
                .fetch_all(&self.pool)
                .await
                .map(|rows| rows.into_iter().map(RelationshipRow::from).collect())
                .map_err(map_error)
        })
        .await
    }

    async fn list_relationships(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<RelationshipRow>, QueryError> {
        self.list::<PgRelationship, _>(ctx, sql::LIST_RELATIONSHIPS, query)
            .await
    }

    async fn delete_relationship(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError> {
        self.delete(ctx, sql::DELETE_RELATIONSHIP, id).await
    }

    async fn create_join_token(
        &self,
        ctx: &Context,
        p: NewJoinToken,
    ) -> Result<JoinTokenRow, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgJoinToken>(sql::CREATE_JOIN_TOKEN)
                .bind(p.id)
                .bind(p.trust_domain_id)
                .bind(&p.token)
                .bind(p.used)
                .bind(p.expires_at)
                .bind(p.created_at)
                .bind(p.updated_at)
                .fetch_one(&self.pool)
                .await
                .map(JoinTokenRow::from)
                .map_err(map_error)
        })
        .await
    }

    async fn update_join_token(
        &self,
        ctx: &Context,
        p: JoinTokenUpdate,
    ) -> Result<Option<JoinTokenRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgJoinToken>(sql::UPDATE_JOIN_TOKEN)
                .bind(p.id)
                .bind(p.used)
                .bind(p.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(JoinTokenRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_join_token_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<JoinTokenRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgJoinToken>(sql::FIND_JOIN_TOKEN_BY_ID)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(JoinTokenRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_join_token_by_token(
        &self,
        ctx: &Context,
        token: &str,
    ) -> Result<Option<JoinTokenRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgJoinToken>(sql::FIND_JOIN_TOKEN_BY_TOKEN)
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(JoinTokenRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_join_tokens_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<JoinTokenRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgJoinToken>(sql::FIND_JOIN_TOKENS_BY_TRUST_DOMAIN_ID)
                .bind(trust_domain_id)
                .fetch_all(&self.pool)
                .await
                .map(|rows| rows.into_iter().map(JoinTokenRow::from).collect())
                .map_err(map_error)
        })
        .await
    }

    async fn list_join_tokens(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<JoinTokenRow>, QueryError> {
        self.list::<PgJoinToken, _>(ctx, sql::LIST_JOIN_TOKENS, query)
            .await
    }

    async fn delete_join_token(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError> {
        self.delete(ctx, sql::DELETE_JOIN_TOKEN, id).await
    }

    async fn create_bundle(&self, ctx: &Context, p: NewBundle) -> Result<BundleRow, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgBundle>(sql::CREATE_BUNDLE)
                .bind(p.id)
                .bind(p.trust_domain_id)
                .bind(&p.data)
                .bind(&p.digest)
                .bind(&p.signature)
                .bind(&p.signing_certificate)
                .bind(p.created_at)
                .bind(p.updated_at)
                .fetch_one(&self.pool)
                .await
                .map(BundleRow::from)
                .map_err(map_error)
        })
        .await
    }

    async fn update_bundle(
        &self,
        ctx: &Context,
        p: BundleUpdate,
    ) -> Result<Option<BundleRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgBundle>(sql::UPDATE_BUNDLE)
                .bind(p.id)
                .bind(&p.data)
                .bind(&p.digest)
                .bind(&p.signature)
                .bind(&p.signing_certificate)
                .bind(p.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(BundleRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_bundle_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<BundleRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgBundle>(sql::FIND_BUNDLE_BY_ID)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(BundleRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn find_bundle_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Option<BundleRow>, QueryError> {
        ctx.run(async {
            sqlx::query_as::<_, PgBundle>(sql::FIND_BUNDLE_BY_TRUST_DOMAIN_ID)
                .bind(trust_domain_id)
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(BundleRow::from))
                .map_err(map_error)
        })
        .await
    }

    async fn list_bundles(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<BundleRow>, QueryError> {
        self.list::<PgBundle, _>(ctx, sql::LIST_BUNDLES, query).await
    }

    async fn delete_bundle(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError> {
        self.delete(ctx, sql::DELETE_BUNDLE, id).await
    }

    async fn ping(&self, ctx: &Context) -> Result<(), QueryError> {
        ctx.run(async {
            sqlx::query_scalar::<_, i32>(sql::PING)
                .fetch_one(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_error)
        })
        .await
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::info!("postgres datastore closed");
        }
    }
}
