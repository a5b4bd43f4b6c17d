//! Error types for the datastore.
//!
//! Absence is never an error: lookups return `Ok(None)` when nothing
//! matches. Every error that does escape carries the operation, the entity
//! kind and, where there is one, the identifier it concerned.

use accord_types::ConversionError;
use thiserror::Error;
use uuid::Uuid;

/// Boxed driver error, so that no driver type appears in the public API.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which entity an operation concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    TrustDomain,
    Relationship,
    JoinToken,
    Bundle,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrustDomain => "trust domain",
            Self::Relationship => "relationship",
            Self::JoinToken => "join token",
            Self::Bundle => "bundle",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The datastore operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Find,
    List,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Find => "find",
            Self::List => "list",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input rejected before any statement was issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Two different values were supplied for the same exact-match filter.
    #[error("conflicting {field} filters: {first} and {second}")]
    ConflictingFilters {
        field: &'static str,
        first: String,
        second: String,
    },

    /// A filter value that must not be empty was empty.
    #[error("{field} filter must not be empty")]
    EmptyFilter { field: &'static str },

    /// Page number or page size out of range.
    #[error("invalid pagination: {0}")]
    Pagination(String),

    /// Both sides of a relationship name the same trust domain.
    #[error("relationship cannot link trust domain {0} to itself")]
    SelfRelationship(Uuid),
}

/// Driver-agnostic failure reported by a querier.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A statement that must affect one row affected none.
    #[error("no row matched")]
    NoRows,

    /// A unique, foreign-key or check constraint rejected the statement.
    #[error("constraint violation: {0}")]
    Constraint(#[source] BoxError),

    /// The context deadline passed before the statement finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The context was cancelled before the statement finished.
    #[error("operation cancelled")]
    Cancelled,

    /// No pooled connection could be obtained.
    #[error("connection pool: {0}")]
    Pool(#[source] BoxError),

    /// Any other engine or I/O failure.
    #[error("{0}")]
    Backend(#[source] BoxError),
}

/// Construction of a datastore failed; it is never returned half-open.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Pool(#[from] accord_db::PoolError),

    #[error(transparent)]
    Migration(#[from] accord_db::MigrationError),

    /// A statement failed to prepare against the migrated schema.
    #[error("failed to prepare statement {name}: {source}")]
    Prepare {
        name: &'static str,
        #[source]
        source: BoxError,
    },

    /// No connection could be checked out for initialisation.
    #[error("failed to acquire connection: {0}")]
    Connection(#[source] BoxError),

    /// The blocking initialisation task panicked or was aborted.
    #[error("initialisation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors returned by [`crate::Datastore`].
#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// A stored row could not be parsed into its entity.
    #[error("failed converting {entity} {id} from storage: {source}")]
    Conversion {
        entity: EntityKind,
        id: String,
        #[source]
        source: ConversionError,
    },

    /// Any backend failure other than absence.
    #[error("failed to {op} {entity}{}: {source}", display_id(.id))]
    Persistence {
        op: Operation,
        entity: EntityKind,
        id: Option<String>,
        #[source]
        source: QueryError,
    },

    #[error("failed to open datastore: {0}")]
    Open(#[from] OpenError),
}

fn display_id(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" {id:?}"),
        None => String::new(),
    }
}

impl DatastoreError {
    /// True when a unique, foreign-key or check constraint rejected a write.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Persistence {
                source: QueryError::Constraint(_),
                ..
            }
        )
    }

    /// The underlying query error, for persistence failures.
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            Self::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }
}
