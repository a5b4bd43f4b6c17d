//! PostgreSQL statements. Placeholders are `$N`; identifiers and
//! timestamps bind as native `uuid` and `timestamptz`.

pub const CREATE_TRUST_DOMAIN: &str = "INSERT INTO trust_domains (id, name, description, created_at, updated_at)
     VALUES ($1, $2, $3, $4, $5)
     RETURNING id, name, description, created_at, updated_at";

pub const UPDATE_TRUST_DOMAIN: &str = "UPDATE trust_domains SET description = $2, updated_at = $3 WHERE id = $1
     RETURNING id, name, description, created_at, updated_at";

pub const FIND_TRUST_DOMAIN_BY_ID: &str =
    "SELECT id, name, description, created_at, updated_at FROM trust_domains WHERE id = $1";

pub const FIND_TRUST_DOMAIN_BY_NAME: &str =
    "SELECT id, name, description, created_at, updated_at FROM trust_domains WHERE name = $1";

pub const LIST_TRUST_DOMAINS: &str =
    "SELECT id, name, description, created_at, updated_at FROM trust_domains";

pub const DELETE_TRUST_DOMAIN: &str = "DELETE FROM trust_domains WHERE id = $1";

pub const CREATE_RELATIONSHIP: &str = "INSERT INTO relationships (id, trust_domain_a_id, trust_domain_b_id,
         trust_domain_a_consent, trust_domain_b_consent, created_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7)
     RETURNING id, trust_domain_a_id, trust_domain_b_id, trust_domain_a_consent,
         trust_domain_b_consent, created_at, updated_at";

pub const UPDATE_RELATIONSHIP: &str = "UPDATE relationships
     SET trust_domain_a_consent = $2, trust_domain_b_consent = $3, updated_at = $4
     WHERE id = $1
     RETURNING id, trust_domain_a_id, trust_domain_b_id, trust_domain_a_consent,
         trust_domain_b_consent, created_at, updated_at";

pub const FIND_RELATIONSHIP_BY_ID: &str = "SELECT id, trust_domain_a_id, trust_domain_b_id, trust_domain_a_consent,
         trust_domain_b_consent, created_at, updated_at
     FROM relationships WHERE id = $1";

pub const FIND_RELATIONSHIPS_BY_TRUST_DOMAIN_ID: &str = "SELECT id, trust_domain_a_id, trust_domain_b_id, trust_domain_a_consent,
         trust_domain_b_consent, created_at, updated_at
     FROM relationships WHERE trust_domain_a_id = $1 OR trust_domain_b_id = $1
     ORDER BY created_at DESC, id DESC";

pub const LIST_RELATIONSHIPS: &str = "SELECT id, trust_domain_a_id, trust_domain_b_id, trust_domain_a_consent,
         trust_domain_b_consent, created_at, updated_at
     FROM relationships";

pub const DELETE_RELATIONSHIP: &str = "DELETE FROM relationships WHERE id = $1";

pub const CREATE_JOIN_TOKEN: &str = "INSERT INTO join_tokens (id, trust_domain_id, token, used, expires_at, created_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7)
     RETURNING id, trust_domain_id, token, used, expires_at, created_at, updated_at";

pub const UPDATE_JOIN_TOKEN: &str = "UPDATE join_tokens SET used = $2, updated_at = $3 WHERE id = $1
     RETURNING id, trust_domain_id, token, used, expires_at, created_at, updated_at";

pub const FIND_JOIN_TOKEN_BY_ID: &str = "SELECT id, trust_domain_id, token, used, expires_at, created_at, updated_at
     FROM join_tokens WHERE id = $1";

pub const FIND_JOIN_TOKEN_BY_TOKEN: &str = "SELECT id, trust_domain_id, token, used, expires_at, created_at, updated_at
     FROM join_tokens WHERE token = $1";

pub const FIND_JOIN_TOKENS_BY_TRUST_DOMAIN_ID: &str = "SELECT id, trust_domain_id, token, used, expires_at, created_at, updated_at
     FROM join_tokens WHERE trust_domain_id = $1
     ORDER BY created_at DESC, id DESC";

pub const LIST_JOIN_TOKENS: &str = "SELECT id, trust_domain_id, token, used, expires_at, created_at, updated_at
     FROM join_tokens";

pub const DELETE_JOIN_TOKEN: &str = "DELETE FROM join_tokens WHERE id = $1";

pub const CREATE_BUNDLE: &str = "INSERT INTO bundles (id, trust_domain_id, data, digest, signature, signing_certificate,
         created_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
     RETURNING id, trust_domain_id, data, digest, signature, signing_certificate,
         created_at, updated_at";

pub const UPDATE_BUNDLE: &str = "UPDATE bundles
     SET data = $2, digest = $3, signature = $4, signing_certificate = $5, updated_at = $6
     WHERE id = $1
     RETURNING id, trust_domain_id, data, digest, signature, signing_certificate,
         created_at, updated_at";

pub const FIND_BUNDLE_BY_ID: &str = "SELECT id, trust_domain_id, data, digest, signature, signing_certificate,
         created_at, updated_at
     FROM bundles WHERE id = $1";

pub const FIND_BUNDLE_BY_TRUST_DOMAIN_ID: &str = "SELECT id, trust_domain_id, data, digest, signature, signing_certificate,
         created_at, updated_at
     FROM bundles WHERE trust_domain_id = $1
     ORDER BY created_at DESC, id DESC LIMIT 1";

pub const LIST_BUNDLES: &str = "SELECT id, trust_domain_id, data, digest, signature, signing_certificate,
         created_at, updated_at
     FROM bundles";

pub const DELETE_BUNDLE: &str = "DELETE FROM bundles WHERE id = $1";

pub const PING: &str = "SELECT 1";

/// Every fixed statement, prepared on open.
pub const ALL: &[(&str, &str)] = &[
    ("create_trust_domain", CREATE_TRUST_DOMAIN),
    ("update_trust_domain", UPDATE_TRUST_DOMAIN),
    ("find_trust_domain_by_id", FIND_TRUST_DOMAIN_BY_ID),
    ("find_trust_domain_by_name", FIND_TRUST_DOMAIN_BY_NAME),
    ("delete_trust_domain", DELETE_TRUST_DOMAIN),
    ("create_relationship", CREATE_RELATIONSHIP),
    ("update_relationship", UPDATE_RELATIONSHIP),
    ("find_relationship_by_id", FIND_RELATIONSHIP_BY_ID),
    (
        "find_relationships_by_trust_domain_id",
        FIND_RELATIONSHIPS_BY_TRUST_DOMAIN_ID,
    ),
    ("delete_relationship", DELETE_RELATIONSHIP),
    ("create_join_token", CREATE_JOIN_TOKEN),
    ("update_join_token", UPDATE_JOIN_TOKEN),
    ("find_join_token_by_id", FIND_JOIN_TOKEN_BY_ID),
    ("find_join_token_by_token", FIND_JOIN_TOKEN_BY_TOKEN),
    (
        "find_join_tokens_by_trust_domain_id",
        FIND_JOIN_TOKENS_BY_TRUST_DOMAIN_ID,
    ),
    ("delete_join_token", DELETE_JOIN_TOKEN),
    ("create_bundle", CREATE_BUNDLE),
    ("update_bundle", UPDATE_BUNDLE),
    ("find_bundle_by_id", FIND_BUNDLE_BY_ID),
    ("find_bundle_by_trust_domain_id", FIND_BUNDLE_BY_TRUST_DOMAIN_ID),
    ("delete_bundle", DELETE_BUNDLE),
    ("ping", PING),
];

/// `SELECT ... FROM table` bases the listing renderer extends.
pub const LIST_BASES: &[(&str, &str)] = &[
    ("list_trust_domains", LIST_TRUST_DOMAINS),
    ("list_relationships", LIST_RELATIONSHIPS),
    ("list_join_tokens", LIST_JOIN_TOKENS),
    ("list_bundles", LIST_BUNDLES),
];
