//! PostgreSQL schema
//!
//! Single source of truth for the derived-view tables. Versioned; see
//! `migrations.rs` for how upgrades apply.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS did_handles (
    did TEXT PRIMARY KEY,
    handle TEXT NOT NULL UNIQUE,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS profiles (
    did TEXT PRIMARY KEY,
    display_name TEXT,
    default_nick TEXT,
    status TEXT,
    avatar_cid TEXT,
    avatar_mime TEXT,
    color BIGINT,
    record_cid TEXT,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS channels (
    uri TEXT PRIMARY KEY,
    cid TEXT NOT NULL,
    did TEXT NOT NULL,
    host TEXT NOT NULL,
    title TEXT NOT NULL,
    topic TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS channels_created_at_idx ON channels (created_at DESC);

CREATE TABLE IF NOT EXISTS signets (
    uri TEXT PRIMARY KEY,
    issuer_did TEXT NOT NULL,
    author_handle TEXT NOT NULL,
    channel_uri TEXT NOT NULL,
    message_id BIGINT NOT NULL,
    cid TEXT NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (channel_uri, message_id)
);

CREATE INDEX IF NOT EXISTS signets_author_handle_idx ON signets (author_handle, started_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    uri TEXT PRIMARY KEY,
    did TEXT NOT NULL,
    cid TEXT NOT NULL,
    signet_uri TEXT NOT NULL,
    body TEXT NOT NULL,
    nick TEXT,
    color BIGINT,
    posted_at TIMESTAMPTZ NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS messages_signet_uri_idx ON messages (signet_uri);

CREATE TABLE IF NOT EXISTS images (
    uri TEXT PRIMARY KEY,
    did TEXT NOT NULL,
    cid TEXT NOT NULL,
    signet_uri TEXT NOT NULL,
    blob_cid TEXT,
    blob_mime TEXT,
    alt TEXT NOT NULL DEFAULT '',
    nick TEXT,
    color BIGINT,
    width BIGINT,
    height BIGINT,
    posted_at TIMESTAMPTZ NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS images_did_blob_cid_idx ON images (did, blob_cid);

CREATE TABLE IF NOT EXISTS oauth_requests (
    state TEXT PRIMARY KEY,
    did TEXT NOT NULL,
    pds_url TEXT NOT NULL,
    authserver_iss TEXT NOT NULL,
    token_endpoint TEXT NOT NULL,
    pkce_verifier TEXT NOT NULL,
    dpop_authserver_nonce TEXT NOT NULL,
    dpop_private_multibase TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS oauth_sessions (
    did TEXT NOT NULL,
    session_id TEXT NOT NULL UNIQUE,
    pds_url TEXT NOT NULL,
    authserver_iss TEXT NOT NULL,
    token_endpoint TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    dpop_private_multibase TEXT NOT NULL,
    dpop_authserver_nonce TEXT NOT NULL DEFAULT '',
    dpop_pds_nonce TEXT NOT NULL DEFAULT '',
    scopes TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (did, session_id)
);

CREATE TABLE IF NOT EXISTS bans (
    id BIGSERIAL PRIMARY KEY,
    did TEXT NOT NULL,
    reason TEXT,
    until_at TIMESTAMPTZ,
    banned_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS bans_did_idx ON bans (did);
"#;
