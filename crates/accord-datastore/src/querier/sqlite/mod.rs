//! SQLite querier.
//!
//! `rusqlite` is blocking, so every call runs on the blocking thread pool
//! with a pooled connection. The async side races that work against the
//! [`Context`]; when the context wins, the statement still running on the
//! connection is stopped through its interrupt handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use accord_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use accord_types::format_timestamp;
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, InterruptHandle, OptionalExtension, Row};
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

pub struct SqliteQuerier {
    /// `None` once closed.
    pool: Mutex<Option<DbPool>>,
}

/// Interrupt handle of the connection a call is using, shared between the
/// blocking task and the caller.
#[derive(Default)]
struct Inflight {
    handle: Option<InterruptHandle>,
    abandoned: bool,
}

fn lock(inflight: &Mutex<Inflight>) -> MutexGuard<'_, Inflight> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SqliteQuerier {
    /// Opens the database at `path`, applies pending migrations and
    /// prepares every statement. Blocking.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError`] if the pool cannot be built, the schema is
    /// unknown to this build or fails to migrate, or a statement does not
    /// prepare against it.
    pub fn open(path: &str, settings: DbRuntimeSettings) -> Result<Self, OpenError> {
        let pool = create_pool(path, settings)?;
        let conn = pool
            .get()
            .map_err(|e| OpenError::Connection(Box::new(e)))?;
        let applied = run_migrations(&conn)?;
        prepare_all(&conn)?;
        drop(conn);

        tracing::info!(path, applied, "sqlite datastore opened");

        Ok(Self {
            pool: Mutex::new(Some(pool)),
        })
    }

    async fn with_conn<T, F>(&self, ctx: &Context, f: F) -> Result<T, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| QueryError::Pool("datastore is closed".into()))?;
        ctx.check()?;

        let inflight = Arc::new(Mutex::new(Inflight::default()));
        let task_inflight = Arc::clone(&inflight);

        let task = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| QueryError::Pool(Box::new(e)))?;
            {
                let mut slot = lock(&task_inflight);
                if slot.abandoned {
                    return Err(QueryError::Cancelled);
                }
                slot.handle = Some(conn.get_interrupt_handle());
            }
            let result = f(&conn).map_err(map_error);
            lock(&task_inflight).handle = None;
            result
        });

        let result = ctx
            .run(async move {
                match task.await {
                    Ok(result) => result,
                    Err(e) => Err(QueryError::Backend(Box::new(e))),
                }
            })
            .await;

        if matches!(
            result,
            Err(QueryError::Cancelled | QueryError::DeadlineExceeded)
        ) {
            let mut slot = lock(&inflight);
            slot.abandoned = true;
            if let Some(handle) = slot.handle.take() {
                tracing::debug!("interrupting sqlite statement");
                handle.interrupt();
            }
        }

        result
    }

    async fn list<R, M>(
        &self,
        ctx: &Context,
        base: &'static str,
        query: &ListQuery,
        map: M,
    ) -> Result<Vec<R>, QueryError>
    where
        R: Send + 'static,
        M: Fn(&Row<'_>) -> rusqlite::Result<R> + Send + 'static,
    {
        let statement = render_list(base, query, Dialect::Sqlite);
        let values: Vec<Value> = query.args.iter().map(to_value).collect();
        self.with_conn(ctx, move |conn| {
            let mut stmt = conn.prepare_cached(&statement)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), map)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn delete(&self, ctx: &Context, statement: &'static str, id: Uuid) -> Result<u64, QueryError> {
        self.with_conn(ctx, move |conn| {
            let mut stmt = conn.prepare_cached(statement)?;
            let affected = stmt.execute([id.to_string()])?;
            Ok(affected as u64)
        })
        .await
    }
}

fn prepare_all(conn: &Connection) -> Result<(), OpenError> {
    let listings = sql::LIST_BASES
        .iter()
        .map(|(name, base)| (*name, render_list(base, &ListQuery::all(), Dialect::Sqlite)));
    let fixed = sql::ALL.iter().map(|(name, s)| (*name, (*s).to_string()));

    for (name, statement) in fixed.chain(listings) {
        conn.prepare_cached(&statement)
            .map_err(|e| OpenError::Prepare {
                name,
                source: Box::new(e),
            })?;
    }
    Ok(())
}

fn map_error(err: rusqlite::Error) -> QueryError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => QueryError::Constraint(Box::new(err)),
        Some(ErrorCode::OperationInterrupted) => QueryError::Cancelled,
        _ => match err {
            rusqlite::Error::QueryReturnedNoRows => QueryError::NoRows,
            other => QueryError::Backend(Box::new(other)),
        },
    }
}

fn to_value(arg: &Arg) -> Value {
    match arg {
        Arg::Id(id) => Value::Text(id.to_string()),
        Arg::Text(text) => Value::Text(text.clone()),
        Arg::Bool(flag) => Value::Integer(i64::from(*flag)),
        Arg::Int(n) => Value::Integer(*n),
    }
}

fn trust_domain_row(row: &Row<'_>) -> rusqlite::Result<TrustDomainRow> {
    Ok(TrustDomainRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn relationship_row(row: &Row<'_>) -> rusqlite::Result<RelationshipRow> {
    Ok(RelationshipRow {
        id: row.get(0)?,
        trust_domain_a_id: row.get(1)?,
        trust_domain_b_id: row.get(2)?,
        trust_domain_a_consent: row.get(3)?,
        trust_domain_b_consent: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn join_token_row(row: &Row<'_>) -> rusqlite::Result<JoinTokenRow> {
    Ok(JoinTokenRow {
        id: row.get(0)?,
        trust_domain_id: row.get(1)?,
        token: row.get(2)?,
        used: row.get(3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn bundle_row(row: &Row<'_>) -> rusqlite::Result<BundleRow> {
    Ok(BundleRow {
        id: row.get(0)?,
        trust_domain_id: row.get(1)?,
        data: row.get(2)?,
        digest: row.get(3)?,
        signature: row.get(4)?,
        signing_certificate: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[async_trait]
impl Querier for SqliteQuerier {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn create_trust_domain(
        &self,
        ctx: &Context,
        p: NewTrustDomain,
    ) -> Result<TrustDomainRow, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::CREATE_TRUST_DOMAIN)?.query_row(
                params![
                    p.id.to_string(),
                    p.name,
                    p.description,
                    format_timestamp(p.created_at),
                    format_timestamp(p.updated_at),
                ],
                trust_domain_row,
            )
        })
        .await
    }

    async fn update_trust_domain(
        &self,
        ctx: &Context,
        p: TrustDomainUpdate,
    ) -> Result<Option<TrustDomainRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::UPDATE_TRUST_DOMAIN)?
                .query_row(
                    params![p.id.to_string(), p.description, format_timestamp(p.updated_at)],
                    trust_domain_row,
                )
                .optional()
        })
        .await
    }

    async fn find_trust_domain_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<TrustDomainRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::FIND_TRUST_DOMAIN_BY_ID)?
                .query_row([id.to_string()], trust_domain_row)
                .optional()
        })
        .await
    }

    async fn find_trust_domain_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Option<TrustDomainRow>, QueryError> {
        let name = name.to_string();
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::FIND_TRUST_DOMAIN_BY_NAME)?
                .query_row([name], trust_domain_row)
                .optional()
        })
        .await
    }

    async fn list_trust_domains(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<TrustDomainRow>, QueryError> {
        self.list(ctx, sql::LIST_TRUST_DOMAINS, query, trust_domain_row)
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
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::CREATE_RELATIONSHIP)?.query_row(
                params![
                    p.id.to_string(),
                    p.trust_domain_a_id.to_string(),
                    p.trust_domain_b_id.to_string(),
                    p.trust_domain_a_consent.as_str(),
                    p.trust_domain_b_consent.as_str(),
                    format_timestamp(p.created_at),
                    format_timestamp(p.updated_at),
                ],
                relationship_row,
            )
        })
        .await
    }

    async fn update_relationship(
        &self,
        ctx: &Context,
        p: RelationshipUpdate,
    ) -> Result<Option<RelationshipRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::UPDATE_RELATIONSHIP)?
                .query_row(
                    params![
                        p.id.to_string(),
                        p.trust_domain_a_consent.as_str(),
                        p.trust_domain_b_consent.as_str(),
                        format_timestamp(p.updated_at),
                    ],
                    relationship_row,
                )
                .optional()
        })
        .await
    }

    async fn find_relationship_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<RelationshipRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::FIND_RELATIONSHIP_BY_ID)?
                .query_row([id.to_string()], relationship_row)
                .optional()
        })
        .await
    }

    async fn find_relationships_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<RelationshipRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            let mut stmt = conn.prepare_cached(sql::FIND_RELATIONSHIPS_BY_TRUST_DOMAIN_ID)?;
            let rows = stmt
                .query_map([trust_domain_id.to_string()], relationship_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_relationships(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<RelationshipRow>, QueryError> {
        self.list(ctx, sql::LIST_RELATIONSHIPS, query, relationship_row)
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
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::CREATE_JOIN_TOKEN)?.query_row(
                params![
                    p.id.to_string(),
                    p.trust_domain_id.to_string(),
                    p.token,
                    p.used,
                    format_timestamp(p.expires_at),
                    format_timestamp(p.created_at),
                    format_timestamp(p.updated_at),
                ],
                join_token_row,
            )
        })
        .await
    }

    async fn update_join_token(
        &self,
        ctx: &Context,
        p: JoinTokenUpdate,
    ) -> Result<Option<JoinTokenRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::UPDATE_JOIN_TOKEN)?
                .query_row(
                    params![p.id.to_string(), p.used, format_timestamp(p.updated_at)],
                    join_token_row,
                )
                .optional()
        })
        .await
    }

    async fn find_join_token_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<JoinTokenRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::FIND_JOIN_TOKEN_BY_ID)?
                .query_row([id.to_string()], join_token_row)
                .optional()
        })
        .await
    }

    async fn find_join_token_by_token(
        &self,
        ctx: &Context,
        token: &str,
    ) -> Result<Option<JoinTokenRow>, QueryError> {
        let token = token.to_string();
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::FIND_JOIN_TOKEN_BY_TOKEN)?
                .query_row([token], join_token_row)
                .optional()
        })
        .await
    }

    async fn find_join_tokens_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Vec<JoinTokenRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            let mut stmt = conn.prepare_cached(sql::FIND_JOIN_TOKENS_BY_TRUST_DOMAIN_ID)?;
            let rows = stmt
                .query_map([trust_domain_id.to_string()], join_token_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_join_tokens(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<JoinTokenRow>, QueryError> {
        self.list(ctx, sql::LIST_JOIN_TOKENS, query, join_token_row)
            .await
    }

    async fn delete_join_token(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError> {
        self.delete(ctx, sql::DELETE_JOIN_TOKEN, id).await
    }

    async fn create_bundle(&self, ctx: &Context, p: NewBundle) -> Result<BundleRow, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::CREATE_BUNDLE)?.query_row(
                params![
                    p.id.to_string(),
                    p.trust_domain_id.to_string(),
                    p.data,
                    p.digest,
                    p.signature,
                    p.signing_certificate,
                    format_timestamp(p.created_at),
                    format_timestamp(p.updated_at),
                ],
                bundle_row,
            )
        })
        .await
    }

    async fn update_bundle(
        &self,
        ctx: &Context,
        p: BundleUpdate,
    ) -> Result<Option<BundleRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::UPDATE_BUNDLE)?
                .query_row(
                    params![
                        p.id.to_string(),
                        p.data,
                        p.digest,
                        p.signature,
                        p.signing_certificate,
                        format_timestamp(p.updated_at),
                    ],
                    bundle_row,
                )
                .optional()
        })
        .await
    }

    async fn find_bundle_by_id(
        &self,
        ctx: &Context,
        id: Uuid,
    ) -> Result<Option<BundleRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::FIND_BUNDLE_BY_ID)?
                .query_row([id.to_string()], bundle_row)
                .optional()
        })
        .await
    }

    async fn find_bundle_by_trust_domain_id(
        &self,
        ctx: &Context,
        trust_domain_id: Uuid,
    ) -> Result<Option<BundleRow>, QueryError> {
        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(sql::FIND_BUNDLE_BY_TRUST_DOMAIN_ID)?
                .query_row([trust_domain_id.to_string()], bundle_row)
                .optional()
        })
        .await
    }

    async fn list_bundles(
        &self,
        ctx: &Context,
        query: &ListQuery,
    ) -> Result<Vec<BundleRow>, QueryError> {
        self.list(ctx, sql::LIST_BUNDLES, query, bundle_row).await
    }

    async fn delete_bundle(&self, ctx: &Context, id: Uuid) -> Result<u64, QueryError> {
        self.delete(ctx, sql::DELETE_BUNDLE, id).await
    }

    async fn ping(&self, ctx: &Context) -> Result<(), QueryError> {
        self.with_conn(ctx, |conn| {
            conn.prepare_cached(sql::PING)?
                .query_row([], |row| row.get::<_, i64>(0))
                .map(|_| ())
        })
        .await
    }

    async fn close(&self) {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pool) = pool {
            // Calls still running hold their own clone; idle connections close here.
            drop(pool);
            tracing::info!("sqlite datastore closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_db::SQLITE_MEMORY;
    use chrono::Utc;

    fn open_memory() -> SqliteQuerier {
        SqliteQuerier::open(SQLITE_MEMORY, DbRuntimeSettings::default())
            .expect("in-memory querier should open")
    }

    #[tokio::test]
    async fn update_of_unknown_id_matches_nothing() {
        let querier = open_memory();
        let row = querier
            .update_trust_domain(
                &Context::background(),
                TrustDomainUpdate {
                    id: Uuid::new_v4(),
                    description: None,
                    updated_at: Utc::now(),
                },
            )
            .await
            .expect("update should not fail");
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_constraint_error() {
        let querier = open_memory();
        let ctx = Context::background();
        let new = |id| NewTrustDomain {
            id,
            name: "td-a.org".to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        querier
            .create_trust_domain(&ctx, new(Uuid::new_v4()))
            .await
            .expect("first create should succeed");
        let err = querier
            .create_trust_domain(&ctx, new(Uuid::new_v4()))
            .await
            .expect_err("duplicate name should fail");
        assert!(matches!(err, QueryError::Constraint(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn closed_querier_refuses_work() {
        let querier = open_memory();
        querier.ping(&Context::background()).await.expect("ping");
        querier.close().await;
        let err = querier
            .ping(&Context::background())
            .await
            .expect_err("closed querier should fail");
        assert!(matches!(err, QueryError::Pool(_)));
    }

    #[tokio::test]
    async fn close_releases_the_pool() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("accord.db");
        let querier = SqliteQuerier::open(
            path.to_str().expect("utf-8 path"),
            DbRuntimeSettings::default(),
        )
        .expect("querier should open");

        let pool = querier
            .pool
            .lock()
            .expect("lock")
            .clone()
            .expect("open querier should hold a pool");
        assert!(pool.state().connections > 0);

        querier.close().await;
        querier.close().await;
        assert!(querier.pool.lock().expect("lock").is_none());
        assert!(pool.state().connections > 0, "clones taken before close stay usable");
    }

    #[test]
    fn booleans_bind_as_integers() {
        assert_eq!(to_value(&Arg::Bool(true)), Value::Integer(1));
        assert_eq!(
            to_value(&Arg::Id(Uuid::nil())),
            Value::Text("00000000-0000-0000-0000-000000000000".to_string())
        );
    }
}
