//! Runs the shared scenarios against PostgreSQL.
//!
//! Skipped unless `ACCORD_TEST_POSTGRES_URL` points at a database the
//! tests may migrate and write to.

mod common;

use accord_datastore::{Backend, Datastore, DatastoreConfig};

async fn open() -> Option<Datastore> {
    let Ok(url) = std::env::var("ACCORD_TEST_POSTGRES_URL") else {
        eprintln!("ACCORD_TEST_POSTGRES_URL not set, skipping postgres test");
        return None;
    };
    let ds = Datastore::open(&DatastoreConfig::postgres(url))
        .await
        .expect("failed to open postgres datastore");
    assert_eq!(ds.backend(), Backend::Postgres);
    Some(ds)
}

macro_rules! postgres_scenario {
    ($($name:ident),* $(,)?) => {
        $(
            #[tokio::test]
            async fn $name() {
                if let Some(ds) = open().await {
                    common::$name(&ds).await;
                }
            }
        )*
    };
}

postgres_scenario!(
    trust_domain_round_trip,
    not_found_is_none,
    delete_is_idempotent,
    update_of_unknown_id_is_no_rows,
    consent_scenario,
    join_token_scenario,
    bundle_scenario,
    referenced_trust_domain_delete_is_rejected,
    create_against_unknown_trust_domain_is_rejected,
    self_relationship_is_invalid,
    cancelled_and_expired_contexts_fail,
    caller_timestamps_are_stored_at_microsecond_precision,
);
