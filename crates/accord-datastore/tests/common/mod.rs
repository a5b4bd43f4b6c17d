//! Scenarios shared by the SQLite and PostgreSQL suites.
//!
//! Every scenario creates its own uniquely named trust domains and scopes
//! its listings to them, so the suites can run against a database that
//! already holds rows.

#![allow(dead_code)]

use accord_datastore::{
    Context, Datastore, DatastoreError, JoinTokenFilter, ListJoinTokensCriteria,
    ListRelationshipsCriteria, QueryError, RelationshipFilter,
};
use accord_types::{
    Bundle, ConsentStatus, JoinToken, Relationship, TrustDomain, TrustDomainName,
};
use chrono::{Duration, SubsecRound, Utc};
use uuid::Uuid;

pub fn unique_name(prefix: &str) -> TrustDomainName {
    TrustDomainName::new(format!("{prefix}-{}.org", Uuid::new_v4().simple()))
        .expect("generated name should be valid")
}

pub async fn create_trust_domain(ds: &Datastore, prefix: &str) -> TrustDomain {
    ds.create_or_update_trust_domain(&Context::background(), &TrustDomain::new(unique_name(prefix)))
        .await
        .expect("failed to create trust domain")
}

pub fn id_of<T>(id: Option<Uuid>, what: T) -> Uuid
where
    T: std::fmt::Display,
{
    id.unwrap_or_else(|| panic!("{what} should have an id"))
}

pub async fn trust_domain_round_trip(ds: &Datastore) {
    let ctx = Context::background();
    let created = ds
        .create_or_update_trust_domain(
            &ctx,
            &TrustDomain::new(unique_name("td-a")).with_description("first domain"),
        )
        .await
        .expect("failed to create trust domain");

    let id = id_of(created.id, "trust domain");
    assert!(created.created_at.is_some());
    assert_eq!(created.created_at, created.updated_at);
    assert_eq!(created.description.as_deref(), Some("first domain"));

    let by_id = ds
        .find_trust_domain_by_id(&ctx, id)
        .await
        .expect("find by id should succeed");
    assert_eq!(by_id.as_ref(), Some(&created));

    let by_name = ds
        .find_trust_domain_by_name(&ctx, &created.name)
        .await
        .expect("find by name should succeed");
    assert_eq!(by_name.as_ref(), Some(&created));

    let mut changed = created.clone();
    changed.description = Some(String::new());
    let updated = ds
        .create_or_update_trust_domain(&ctx, &changed)
        .await
        .expect("update should succeed");
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, created.name);
    assert_eq!(updated.description, None, "empty description is cleared");
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
}

pub async fn not_found_is_none(ds: &Datastore) {
    let ctx = Context::background();
    let missing = Uuid::new_v4();

    assert!(ds
        .find_trust_domain_by_id(&ctx, missing)
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(ds
        .find_trust_domain_by_name(&ctx, &unique_name("missing"))
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(ds
        .find_relationship_by_id(&ctx, missing)
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(ds
        .find_join_token_by_id(&ctx, missing)
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(ds
        .find_join_token(&ctx, "no-such-token")
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(ds
        .find_bundle_by_id(&ctx, missing)
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(ds
        .find_bundle_by_trust_domain_id(&ctx, missing)
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(ds
        .find_relationships_by_trust_domain_id(&ctx, missing)
        .await
        .expect("lookup should succeed")
        .is_empty());
}

pub async fn delete_is_idempotent(ds: &Datastore) {
    let ctx = Context::background();
    let td = create_trust_domain(ds, "td-gone").await;
    let id = id_of(td.id, "trust domain");

    ds.delete_trust_domain(&ctx, id)
        .await
        .expect("first delete should succeed");
    ds.delete_trust_domain(&ctx, id)
        .await
        .expect("second delete should also succeed");
    assert!(ds
        .find_trust_domain_by_id(&ctx, id)
        .await
        .expect("lookup should succeed")
        .is_none());

    for result in [
        ds.delete_relationship(&ctx, Uuid::new_v4()).await,
        ds.delete_join_token(&ctx, Uuid::new_v4()).await,
        ds.delete_bundle(&ctx, Uuid::new_v4()).await,
    ] {
        result.expect("deleting a missing row should succeed");
    }
}

pub async fn update_of_unknown_id_is_no_rows(ds: &Datastore) {
    let ctx = Context::background();
    let mut td = TrustDomain::new(unique_name("td-ghost"));
    td.id = Some(Uuid::new_v4());

    let err = ds
        .create_or_update_trust_domain(&ctx, &td)
        .await
        .expect_err("update of an unknown id should fail");
    assert!(
        matches!(err.query_error(), Some(QueryError::NoRows)),
        "unexpected error: {err}"
    );

    let err = ds
        .update_join_token(&ctx, Uuid::new_v4(), true)
        .await
        .expect_err("update of an unknown token should fail");
    assert!(matches!(err.query_error(), Some(QueryError::NoRows)));
}

/// td-a and td-b start `{pending, pending}`; A approves; the filtered
/// listing for (approved, td-a) returns exactly that relationship.
pub async fn consent_scenario(ds: &Datastore) {
    let ctx = Context::background();
    let a = create_trust_domain(ds, "td-a").await;
    let b = create_trust_domain(ds, "td-b").await;
    let a_id = id_of(a.id, "td-a");
    let b_id = id_of(b.id, "td-b");

    let created = ds
        .create_or_update_relationship(&ctx, &Relationship::new(a_id, b_id))
        .await
        .expect("failed to create relationship");
    assert_eq!(created.trust_domain_a_consent, ConsentStatus::Pending);
    assert_eq!(created.trust_domain_b_consent, ConsentStatus::Pending);
    assert!(!created.is_established());

    let mut approve = created.clone();
    approve.trust_domain_a_consent = ConsentStatus::Approved;
    let updated = ds
        .create_or_update_relationship(&ctx, &approve)
        .await
        .expect("failed to update relationship");
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.trust_domain_a_consent, ConsentStatus::Approved);
    assert_eq!(
        updated.trust_domain_b_consent,
        ConsentStatus::Pending,
        "approving side A leaves side B untouched"
    );

    let approved_by_a = ListRelationshipsCriteria::new()
        .filter(RelationshipFilter::ConsentStatus(ConsentStatus::Approved))
        .filter(RelationshipFilter::TrustDomainId(a_id));
    let listed = ds
        .list_relationships(&ctx, Some(&approved_by_a))
        .await
        .expect("listing should succeed");
    assert_eq!(listed, vec![updated.clone()]);

    let approved_by_b = ListRelationshipsCriteria::new()
        .filter(RelationshipFilter::TrustDomainId(b_id))
        .filter(RelationshipFilter::ConsentStatus(ConsentStatus::Approved));
    assert!(ds
        .list_relationships(&ctx, Some(&approved_by_b))
        .await
        .expect("listing should succeed")
        .is_empty());

    let for_b = ds
        .find_relationships_by_trust_domain_id(&ctx, b_id)
        .await
        .expect("lookup should succeed");
    assert_eq!(for_b, vec![updated]);
}

/// A token for td-a expiring in an hour is unused; marking it used keeps
/// its expiry.
pub async fn join_token_scenario(ds: &Datastore) {
    let ctx = Context::background();
    let td = create_trust_domain(ds, "td-a").await;
    let td_id = id_of(td.id, "trust domain");
    let expires_at = (Utc::now() + Duration::hours(1)).trunc_subsecs(6);

    let created = ds
        .create_or_update_join_token(&ctx, &JoinToken::new(td_id, expires_at))
        .await
        .expect("failed to create join token");
    let id = id_of(created.id, "join token");
    assert!(!created.used);
    assert_eq!(created.expires_at, expires_at);
    assert!(created.is_redeemable_at(Utc::now()));

    let used = ds
        .update_join_token(&ctx, id, true)
        .await
        .expect("failed to mark token used");
    assert!(used.used);
    assert_eq!(used.expires_at, expires_at);
    assert_eq!(used.token, created.token);

    let by_token = ds
        .find_join_token(&ctx, &created.token)
        .await
        .expect("lookup should succeed");
    assert_eq!(by_token, Some(used.clone()));

    let for_td = ds
        .find_join_tokens_by_trust_domain_id(&ctx, td_id)
        .await
        .expect("lookup should succeed");
    assert_eq!(for_td, vec![used.clone()]);

    let unused = ListJoinTokensCriteria::new()
        .filter(JoinTokenFilter::TrustDomainId(td_id))
        .filter(JoinTokenFilter::Used(false));
    assert!(ds
        .list_join_tokens(&ctx, Some(&unused))
        .await
        .expect("listing should succeed")
        .is_empty());

    let mut empty_secret = JoinToken::new(td_id, expires_at);
    empty_secret.token.clear();
    let generated = ds
        .create_or_update_join_token(&ctx, &empty_secret)
        .await
        .expect("failed to create join token");
    assert!(!generated.token.is_empty(), "empty secret is generated");
}

pub async fn bundle_scenario(ds: &Datastore) {
    let ctx = Context::background();
    let td = create_trust_domain(ds, "td-a").await;
    let td_id = id_of(td.id, "trust domain");

    let mut first = Bundle::new(td_id, b"bundle-1".to_vec(), b"sig-1".to_vec(), b"cert".to_vec());
    first.created_at = Some((Utc::now() - Duration::minutes(5)).trunc_subsecs(6));
    let first = ds
        .create_or_update_bundle(&ctx, &first)
        .await
        .expect("failed to create bundle");
    assert_eq!(first.digest, Bundle::compute_digest(b"bundle-1"));

    let second = ds
        .create_or_update_bundle(
            &ctx,
            &Bundle::new(td_id, b"bundle-2".to_vec(), b"sig-2".to_vec(), b"cert".to_vec()),
        )
        .await
        .expect("failed to create bundle");

    let latest = ds
        .find_bundle_by_trust_domain_id(&ctx, td_id)
        .await
        .expect("lookup should succeed");
    assert_eq!(latest, Some(second));

    let mut replace = first.clone();
    replace.data = b"bundle-1b".to_vec();
    replace.digest.clear();
    let replaced = ds
        .create_or_update_bundle(&ctx, &replace)
        .await
        .expect("failed to update bundle");
    assert_eq!(replaced.id, first.id);
    assert_eq!(replaced.data, b"bundle-1b".to_vec());
    assert_eq!(replaced.digest, Bundle::compute_digest(b"bundle-1b"));
    assert_eq!(replaced.created_at, first.created_at);
}

pub async fn referenced_trust_domain_delete_is_rejected(ds: &Datastore) {
    let ctx = Context::background();
    let a = create_trust_domain(ds, "td-a").await;
    let b = create_trust_domain(ds, "td-b").await;
    let a_id = id_of(a.id, "td-a");
    let b_id = id_of(b.id, "td-b");

    let relationship = ds
        .create_or_update_relationship(&ctx, &Relationship::new(a_id, b_id))
        .await
        .expect("failed to create relationship");

    let err = ds
        .delete_trust_domain(&ctx, a_id)
        .await
        .expect_err("referenced trust domain should not be deletable");
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    assert!(ds
        .find_trust_domain_by_id(&ctx, a_id)
        .await
        .expect("lookup should succeed")
        .is_some());

    ds.delete_relationship(&ctx, id_of(relationship.id, "relationship"))
        .await
        .expect("failed to delete relationship");
    ds.delete_trust_domain(&ctx, a_id)
        .await
        .expect("unreferenced trust domain should delete");
}

pub async fn create_against_unknown_trust_domain_is_rejected(ds: &Datastore) {
    let ctx = Context::background();
    let a = create_trust_domain(ds, "td-a").await;

    let err = ds
        .create_or_update_relationship(
            &ctx,
            &Relationship::new(id_of(a.id, "td-a"), Uuid::new_v4()),
        )
        .await
        .expect_err("foreign key should reject an unknown trust domain");
    assert_failure_names_new_row(&err);

    let err = ds
        .create_or_update_join_token(&ctx, &JoinToken::new(Uuid::new_v4(), Utc::now()))
        .await
        .expect_err("foreign key should reject an unknown trust domain");
    assert_failure_names_new_row(&err);

    let err = ds
        .create_or_update_bundle(
            &ctx,
            &Bundle::new(Uuid::new_v4(), b"bundle".to_vec(), b"sig".to_vec(), b"cert".to_vec()),
        )
        .await
        .expect_err("foreign key should reject an unknown trust domain");
    assert_failure_names_new_row(&err);
}

/// A failed create reports the id the row would have had.
fn assert_failure_names_new_row(err: &DatastoreError) {
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    let DatastoreError::Persistence { id: Some(id), .. } = err else {
        panic!("create failure should carry an id: {err}");
    };
    Uuid::parse_str(id).expect("id should be the generated uuid");
    assert!(err.to_string().contains(id.as_str()), "message lacks id: {err}");
}

pub async fn caller_timestamps_are_stored_at_microsecond_precision(ds: &Datastore) {
    let ctx = Context::background();
    let td = create_trust_domain(ds, "td-precise").await;
    let td_id = id_of(td.id, "trust domain");

    let at = Utc::now() - Duration::hours(1);
    let precise = at.trunc_subsecs(6);

    let mut token = JoinToken::new(td_id, at + Duration::hours(2));
    token.created_at = Some(at);
    token.updated_at = Some(at);
    let token = ds
        .create_or_update_join_token(&ctx, &token)
        .await
        .expect("failed to create join token");
    assert_eq!(token.created_at, Some(precise));
    assert_eq!(token.updated_at, Some(precise));
    assert_eq!(token.expires_at, (at + Duration::hours(2)).trunc_subsecs(6));

    let mut domain = TrustDomain::new(unique_name("td-dated"));
    domain.created_at = Some(at);
    let domain = ds
        .create_or_update_trust_domain(&ctx, &domain)
        .await
        .expect("failed to create trust domain");
    assert_eq!(domain.created_at, Some(precise));
    let found = ds
        .find_trust_domain_by_id(&ctx, id_of(domain.id, "trust domain"))
        .await
        .expect("find should succeed");
    assert_eq!(found.and_then(|d| d.created_at), Some(precise));
}

pub async fn self_relationship_is_invalid(ds: &Datastore) {
    let td = create_trust_domain(ds, "td-self").await;
    let id = id_of(td.id, "trust domain");

    let err = ds
        .create_or_update_relationship(&Context::background(), &Relationship::new(id, id))
        .await
        .expect_err("self relationship should be rejected");
    assert!(matches!(err, DatastoreError::Validation(_)));
}

pub async fn cancelled_and_expired_contexts_fail(ds: &Datastore) {
    let cancelled = Context::background();
    cancelled.cancel();
    let err = ds
        .find_trust_domain_by_id(&cancelled, Uuid::new_v4())
        .await
        .expect_err("cancelled context should fail");
    assert!(matches!(err.query_error(), Some(QueryError::Cancelled)));

    let err = ds
        .create_or_update_trust_domain(&cancelled, &TrustDomain::new(unique_name("td-x")))
        .await
        .expect_err("cancelled context should fail");
    assert!(matches!(err.query_error(), Some(QueryError::Cancelled)));

    let expired = Context::with_timeout(std::time::Duration::ZERO);
    let err = ds
        .list_trust_domains(&expired, None)
        .await
        .expect_err("expired context should fail");
    assert!(matches!(err.query_error(), Some(QueryError::DeadlineExceeded)));
}
