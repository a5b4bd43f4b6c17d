//! Renders a [`ListQuery`] into SQL for one dialect.
//!
//! Only constant column names, keywords and placeholders are concatenated;
//! every value travels as a bound argument.

use std::fmt::Write;

use crate::query::{ListQuery, Predicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `?1`, `?2`, ...
    Sqlite,
    /// `$1`, `$2`, ...
    Postgres,
}

impl Dialect {
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Sqlite => format!("?{n}"),
            Self::Postgres => format!("${n}"),
        }
    }
}

/// Appends `WHERE`, `ORDER BY` and paging clauses to `base`, a
/// `SELECT ... FROM table` statement.
pub fn render_list(base: &str, query: &ListQuery, dialect: Dialect) -> String {
    let mut sql = String::from(base);

    if !query.predicates.is_empty() {
        sql.push_str(" WHERE ");
        let clauses: Vec<String> = query
            .predicates
            .iter()
            .map(|p| render_predicate(p, dialect))
            .collect();
        sql.push_str(&clauses.join(" AND "));
    }

    let dir = query.order.as_sql();
    let _ = write!(sql, " ORDER BY created_at {dir}, id {dir}");

    if let Some(page) = query.page {
        let _ = write!(
            sql,
            " LIMIT {} OFFSET {}",
            dialect.placeholder(page.limit),
            dialect.placeholder(page.offset)
        );
    }

    sql
}

fn render_predicate(predicate: &Predicate, dialect: Dialect) -> String {
    match predicate {
        Predicate::Eq(column, n) => format!("{} = {}", column.as_str(), dialect.placeholder(*n)),
        Predicate::Like(column, n) => format!(
            "{} LIKE {} ESCAPE '\\'",
            column.as_str(),
            dialect.placeholder(*n)
        ),
        Predicate::Any(inner) => group(inner, " OR ", dialect),
        Predicate::All(inner) => group(inner, " AND ", dialect),
    }
}

fn group(inner: &[Predicate], sep: &str, dialect: Dialect) -> String {
    let parts: Vec<String> = inner.iter().map(|p| render_predicate(p, dialect)).collect();
    format!("({})", parts.join(sep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{
        build, ListJoinTokensCriteria, ListRelationshipsCriteria, ListTrustDomainsCriteria,
        JoinTokenFilter, RelationshipFilter, TrustDomainFilter,
    };
    use crate::query::OrderDirection;
    use accord_types::{ConsentStatus, TrustDomainName};
    use uuid::Uuid;

    const BASE: &str = "SELECT id FROM relationships";

    #[test]
    fn unfiltered_listing_orders_newest_first() {
        assert_eq!(
            render_list(BASE, &ListQuery::all(), Dialect::Sqlite),
            "SELECT id FROM relationships ORDER BY created_at DESC, id DESC"
        );
    }

    #[test]
    fn relationship_filters_render_per_dialect() {
        let criteria = ListRelationshipsCriteria::new()
            .filter(RelationshipFilter::ConsentStatus(ConsentStatus::Approved))
            .filter(RelationshipFilter::TrustDomainId(Uuid::nil()));
        let query = build(Some(&criteria)).expect("should build");

        assert_eq!(
            render_list(BASE, &query, Dialect::Sqlite),
            "SELECT id FROM relationships WHERE \
             ((trust_domain_a_id = ?1 AND trust_domain_a_consent = ?2) OR \
             (trust_domain_b_id = ?1 AND trust_domain_b_consent = ?2)) \
             ORDER BY created_at DESC, id DESC"
        );
        assert_eq!(
            render_list(BASE, &query, Dialect::Postgres),
            "SELECT id FROM relationships WHERE \
             ((trust_domain_a_id = $1 AND trust_domain_a_consent = $2) OR \
             (trust_domain_b_id = $1 AND trust_domain_b_consent = $2)) \
             ORDER BY created_at DESC, id DESC"
        );
    }

    #[test]
    fn any_supply_order_renders_identical_sql() {
        let forward = ListJoinTokensCriteria::new()
            .filter(JoinTokenFilter::TrustDomainId(Uuid::nil()))
            .filter(JoinTokenFilter::Used(true))
            .paginate(2, 10)
            .order_by_created_at(OrderDirection::Asc);
        let backward = ListJoinTokensCriteria::new()
            .order_by_created_at(OrderDirection::Asc)
            .paginate(2, 10)
            .filter(JoinTokenFilter::Used(true))
            .filter(JoinTokenFilter::TrustDomainId(Uuid::nil()));

        for dialect in [Dialect::Sqlite, Dialect::Postgres] {
            let a = render_list(BASE, &build(Some(&forward)).expect("build"), dialect);
            let b = render_list(BASE, &build(Some(&backward)).expect("build"), dialect);
            assert_eq!(a, b);
        }

        let sql = render_list(
            "SELECT id FROM join_tokens",
            &build(Some(&forward)).expect("build"),
            Dialect::Postgres,
        );
        assert_eq!(
            sql,
            "SELECT id FROM join_tokens WHERE trust_domain_id = $1 AND used = $2 \
             ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4"
        );
    }

    #[test]
    fn name_filters_use_like_with_escape() {
        let name = TrustDomainName::new("td-a.org").expect("valid name");
        let criteria = ListTrustDomainsCriteria::new()
            .filter(TrustDomainFilter::NameContains("a_".to_string()))
            .filter(TrustDomainFilter::Name(name));
        let query = build(Some(&criteria)).expect("should build");

        assert_eq!(
            render_list("SELECT id FROM trust_domains", &query, Dialect::Sqlite),
            "SELECT id FROM trust_domains WHERE name = ?1 AND name LIKE ?2 ESCAPE '\\' \
             ORDER BY created_at DESC, id DESC"
        );
    }
}
