//! Structured listing filters.
//!
//! A [`Criteria`] is a bag of filters in whatever order the caller added
//! them, plus optional paging and sort direction. [`build`] turns it into a
//! [`ListQuery`] whose predicates always come out in the same canonical
//! order, so equal filter sets render identical SQL. Contradictory input is
//! rejected here, before any querier is involved.

use std::fmt::Display;

use accord_types::{ConsentStatus, TrustDomainName};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::query::{Arg, ArgList, Column, ListQuery, OrderDirection, PageArgs, Predicate};

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Page selection. `page_number` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page_number: u32,
    pub page_size: u32,
}

/// Filters, paging and ordering for one entity listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria<F> {
    filters: Vec<F>,
    pagination: Option<Pagination>,
    order: OrderDirection,
}

impl<F> Default for Criteria<F> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            pagination: None,
            order: OrderDirection::Desc,
        }
    }
}

impl<F> Criteria<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: F) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn paginate(mut self, page_number: u32, page_size: u32) -> Self {
        self.pagination = Some(Pagination {
            page_number,
            page_size,
        });
        self
    }

    pub fn order_by_created_at(mut self, order: OrderDirection) -> Self {
        self.order = order;
        self
    }

    pub fn filters(&self) -> &[F] {
        &self.filters
    }
}

pub type ListTrustDomainsCriteria = Criteria<TrustDomainFilter>;
pub type ListRelationshipsCriteria = Criteria<RelationshipFilter>;
pub type ListJoinTokensCriteria = Criteria<JoinTokenFilter>;
pub type ListBundlesCriteria = Criteria<BundleFilter>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDomainFilter {
    /// Exact name match.
    Name(TrustDomainName),
    /// Case-insensitive substring of the name.
    NameContains(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipFilter {
    /// The trust domain is either side of the relationship.
    TrustDomainId(Uuid),
    /// At least one side has this consent. Combined with `TrustDomainId`,
    /// the side owned by that trust domain has it.
    ConsentStatus(ConsentStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTokenFilter {
    TrustDomainId(Uuid),
    Used(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleFilter {
    TrustDomainId(Uuid),
}

/// A filter family that knows how to lower itself into predicates.
pub trait Filter: Sized {
    fn predicates(filters: &[Self], args: &mut ArgList) -> Result<Vec<Predicate>, ValidationError>;
}

/// Lowers optional criteria into a listing query.
///
/// # Errors
///
/// Returns [`ValidationError`] for conflicting exact-match filters, empty
/// name fragments, or out-of-range paging.
pub fn build<F: Filter>(criteria: Option<&Criteria<F>>) -> Result<ListQuery, ValidationError> {
    let Some(criteria) = criteria else {
        return Ok(ListQuery::all());
    };

    let mut args = ArgList::default();
    let predicates = F::predicates(&criteria.filters, &mut args)?;

    let page = match criteria.pagination {
        Some(p) => {
            if p.page_number == 0 {
                return Err(ValidationError::Pagination(
                    "page number starts at 1".to_string(),
                ));
            }
            if p.page_size == 0 || p.page_size > MAX_PAGE_SIZE {
                return Err(ValidationError::Pagination(format!(
                    "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                    p.page_size
                )));
            }
            let offset = i64::from(p.page_number - 1) * i64::from(p.page_size);
            Some(PageArgs {
                limit: args.push(Arg::Int(i64::from(p.page_size))),
                offset: args.push(Arg::Int(offset)),
            })
        }
        None => None,
    };

    Ok(ListQuery {
        predicates,
        args: args.into_vec(),
        order: criteria.order,
        page,
    })
}

/// Collapses repeated exact-match values, failing when two differ.
fn single<T, I>(field: &'static str, values: I) -> Result<Option<T>, ValidationError>
where
    T: PartialEq + Display,
    I: IntoIterator<Item = T>,
{
    let mut chosen: Option<T> = None;
    for value in values {
        match &chosen {
            Some(existing) if *existing != value => {
                return Err(ValidationError::ConflictingFilters {
                    field,
                    first: existing.to_string(),
                    second: value.to_string(),
                });
            }
            Some(_) => {}
            None => chosen = Some(value),
        }
    }
    Ok(chosen)
}

/// Lowercases a name fragment and escapes LIKE metacharacters.
fn like_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars().flat_map(char::to_lowercase) {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Filter for TrustDomainFilter {
    fn predicates(filters: &[Self], args: &mut ArgList) -> Result<Vec<Predicate>, ValidationError> {
        let name = single(
            "name",
            filters.iter().filter_map(|f| match f {
                Self::Name(name) => Some(name),
                _ => None,
            }),
        )?;

        let mut fragments = Vec::new();
        for filter in filters {
            if let Self::NameContains(fragment) = filter {
                if fragment.is_empty() {
                    return Err(ValidationError::EmptyFilter {
                        field: "name_contains",
                    });
                }
                fragments.push(like_pattern(fragment));
            }
        }
        fragments.sort();
        fragments.dedup();

        let mut predicates = Vec::new();
        if let Some(name) = name {
            let n = args.push(Arg::Text(name.as_str().to_string()));
            predicates.push(Predicate::Eq(Column::Name, n));
        }
        for pattern in fragments {
            let n = args.push(Arg::Text(pattern));
            predicates.push(Predicate::Like(Column::Name, n));
        }
        Ok(predicates)
    }
}

impl Filter for RelationshipFilter {
    fn predicates(filters: &[Self], args: &mut ArgList) -> Result<Vec<Predicate>, ValidationError> {
        let trust_domain_id = single(
            "trust_domain_id",
            filters.iter().filter_map(|f| match f {
                Self::TrustDomainId(id) => Some(*id),
                _ => None,
            }),
        )?;
        let consent = single(
            "consent_status",
            filters.iter().filter_map(|f| match f {
                Self::ConsentStatus(status) => Some(*status),
                _ => None,
            }),
        )?;

        let predicate = match (trust_domain_id, consent) {
            (None, None) => return Ok(Vec::new()),
            (Some(id), None) => {
                let n = args.push(Arg::Id(id));
                Predicate::Any(vec![
                    Predicate::Eq(Column::TrustDomainAId, n),
                    Predicate::Eq(Column::TrustDomainBId, n),
                ])
            }
            (None, Some(status)) => {
                let n = args.push(Arg::Text(status.as_str().to_string()));
                Predicate::Any(vec![
                    Predicate::Eq(Column::TrustDomainAConsent, n),
                    Predicate::Eq(Column::TrustDomainBConsent, n),
                ])
            }
            (Some(id), Some(status)) => {
                let id = args.push(Arg::Id(id));
                let status = args.push(Arg::Text(status.as_str().to_string()));
                Predicate::Any(vec![
                    Predicate::All(vec![
                        Predicate::Eq(Column::TrustDomainAId, id),
                        Predicate::Eq(Column::TrustDomainAConsent, status),
                    ]),
                    Predicate::All(vec![
                        Predicate::Eq(Column::TrustDomainBId, id),
                        Predicate::Eq(Column::TrustDomainBConsent, status),
                    ]),
                ])
            }
        };
        Ok(vec![predicate])
    }
}

impl Filter for JoinTokenFilter {
    fn predicates(filters: &[Self], args: &mut ArgList) -> Result<Vec<Predicate>, ValidationError> {
        let trust_domain_id = single(
            "trust_domain_id",
            filters.iter().filter_map(|f| match f {
                Self::TrustDomainId(id) => Some(*id),
                _ => None,
            }),
        )?;
        let used = single(
            "used",
            filters.iter().filter_map(|f| match f {
                Self::Used(used) => Some(*used),
                _ => None,
            }),
        )?;

        let mut predicates = Vec::new();
        if let Some(id) = trust_domain_id {
            let n = args.push(Arg::Id(id));
            predicates.push(Predicate::Eq(Column::TrustDomainId, n));
        }
        if let Some(used) = used {
            let n = args.push(Arg::Bool(used));
            predicates.push(Predicate::Eq(Column::Used, n));
        }
        Ok(predicates)
    }
}

impl Filter for BundleFilter {
    fn predicates(filters: &[Self], args: &mut ArgList) -> Result<Vec<Predicate>, ValidationError> {
        let trust_domain_id = single(
            "trust_domain_id",
            filters.iter().map(|Self::TrustDomainId(id)| *id),
        )?;

        Ok(trust_domain_id
            .map(|id| {
                let n = args.push(Arg::Id(id));
                vec![Predicate::Eq(Column::TrustDomainId, n)]
            })
            .unwrap_or_default())
    }
}
