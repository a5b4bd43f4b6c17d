//! Dialect-neutral listing query.
//!
//! The criteria builder produces a [`ListQuery`]; the queriers render it
//! with their own placeholder syntax. Argument references are 1-based
//! positions into [`ListQuery::args`], so one argument can appear in more
//! than one predicate.

use uuid::Uuid;

/// A filterable column. Only these names ever reach rendered SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Name,
    TrustDomainId,
    TrustDomainAId,
    TrustDomainBId,
    TrustDomainAConsent,
    TrustDomainBConsent,
    Used,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::TrustDomainId => "trust_domain_id",
            Self::TrustDomainAId => "trust_domain_a_id",
            Self::TrustDomainBId => "trust_domain_b_id",
            Self::TrustDomainAConsent => "trust_domain_a_consent",
            Self::TrustDomainBConsent => "trust_domain_b_consent",
            Self::Used => "used",
        }
    }
}

/// A bound value. Identifiers stay typed so each backend can choose text
/// or native binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Id(Uuid),
    Text(String),
    Bool(bool),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `column = $n`
    Eq(Column, usize),
    /// `column LIKE $n ESCAPE '\'`
    Like(Column, usize),
    /// Disjunction of the inner predicates.
    Any(Vec<Predicate>),
    /// Conjunction of the inner predicates.
    All(Vec<Predicate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Argument positions of the `LIMIT` and `OFFSET` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageArgs {
    pub limit: usize,
    pub offset: usize,
}

/// A listing: predicates AND-ed together, the values they reference, the
/// `created_at` direction and optional paging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    pub predicates: Vec<Predicate>,
    pub args: Vec<Arg>,
    pub order: OrderDirection,
    pub page: Option<PageArgs>,
}

impl ListQuery {
    /// An unfiltered, unpaged listing, newest first.
    pub fn all() -> Self {
        Self::default()
    }
}

/// Accumulates arguments and hands out their positions.
#[derive(Debug, Default)]
pub struct ArgList {
    args: Vec<Arg>,
}

impl ArgList {
    pub fn push(&mut self, arg: Arg) -> usize {
        self.args.push(arg);
        self.args.len()
    }

    pub fn into_vec(self) -> Vec<Arg> {
        self.args
    }
}
