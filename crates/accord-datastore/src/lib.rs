//! Persistence for the Accord federation control plane.
//!
//! [`Datastore`] maps trust domains, relationships, join tokens and bundles
//! onto SQLite or PostgreSQL behind one async API. Every call takes a
//! [`Context`] carrying cancellation and an optional deadline.
//!
//! # Design decisions
//!
//! - **Identifier presence picks create or update**: an entity with
//!   `id: None` is inserted under a fresh v4 UUID; one with `Some(id)` is
//!   updated in place, and an unknown id is a `NoRows` persistence error.
//! - **Absence is not an error**: lookups return `Ok(None)` and deletes of
//!   missing rows succeed.
//! - **One criteria builder, two dialects**: listing filters lower into a
//!   dialect-neutral [`query::ListQuery`] that each querier renders with its
//!   own placeholders. Values are always bound, never spliced into SQL.
//! - **Fail at open, not at first use**: migrations are validated and
//!   applied, and every statement is prepared, before a `Datastore` is
//!   returned.
//! - **No policy**: consent transitions and join-token expiry are stored
//!   as given. Deciding whether they are allowed belongs to callers.

pub mod config;
pub mod context;
pub mod criteria;
mod datastore;
pub mod error;
pub mod querier;
pub mod query;
pub mod render;
pub mod rows;

pub use config::{Backend, DatastoreConfig};
pub use context::Context;
pub use criteria::{
    BundleFilter, Criteria, JoinTokenFilter, ListBundlesCriteria, ListJoinTokensCriteria,
    ListRelationshipsCriteria, ListTrustDomainsCriteria, RelationshipFilter, TrustDomainFilter,
};
pub use datastore::Datastore;
pub use error::{DatastoreError, EntityKind, OpenError, Operation, QueryError, ValidationError};
pub use query::OrderDirection;
