// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for logging targets and identifiers)
pub const APP_NAME_LOWER: &str = "transmitter";

// =============================================================================
// Environment Variables
// =============================================================================

/// Log level/filter
pub const ENV_LOG: &str = "TRANSMITTER_LOG";

/// Server bind host
pub const ENV_HOST: &str = "TRANSMITTER_HOST";

/// Server bind port
pub const ENV_PORT: &str = "TRANSMITTER_PORT";

/// Firehose websocket endpoint
pub const ENV_JETSTREAM: &str = "JS_SERVER_ADDR";

/// The backend's own handle
pub const ENV_IDENTITY: &str = "MY_IDENTITY";

/// App password for the backend's own repo
pub const ENV_APP_PASSWORD: &str = "MY_SECRET";

/// Multibase-encoded OAuth client private key
pub const ENV_CLIENT_SECRET_KEY: &str = "CLIENT_SECRET_KEY";

/// Key id advertised in the JWKS for the client key
pub const ENV_CLIENT_SECRET_KEY_ID: &str = "CLIENT_SECRET_KEY_ID";

/// HMAC key for the session cookie
pub const ENV_SESSION_KEY: &str = "SESSION_KEY";

/// HMAC secret for LRC authorship nonces
pub const ENV_LRCD_SECRET: &str = "LRCD_SECRET";

/// DID allowed to administer bans and channel deletion
pub const ENV_ADMIN_DID: &str = "ADMIN_DID";

/// External moderation endpoint notified on ban
pub const ENV_BAN_ENDPOINT: &str = "BAN_ENDPOINT";

/// Display name advertised in OAuth client metadata
pub const ENV_CLIENT_NAME: &str = "MY_NAME";

pub const ENV_METADATA_PATH: &str = "MY_METADATA_PATH";
pub const ENV_TOS_PATH: &str = "MY_TOS_PATH";
pub const ENV_POLICY_PATH: &str = "MY_POLICY_PATH";
pub const ENV_JWKS_PATH: &str = "MY_JWKS_PATH";
pub const ENV_OAUTH_CALLBACK_PATH: &str = "MY_OAUTH_CALLBACK";
pub const ENV_LOGO_PATH: &str = "MY_LOGO_PATH";

pub const ENV_POSTGRES_USER: &str = "POSTGRES_USER";
pub const ENV_POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const ENV_POSTGRES_DB: &str = "POSTGRES_DB";
pub const ENV_POSTGRES_PORT: &str = "POSTGRES_PORT";
pub const ENV_POSTGRES_HOST: &str = "POSTGRES_HOST";

// =============================================================================
// Defaults
// =============================================================================

/// Default server bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server bind port
pub const DEFAULT_PORT: u16 = 8080;

/// Default firehose endpoint
pub const DEFAULT_JETSTREAM: &str = "wss://jetstream.atproto.tools/subscribe";

/// Public directory endpoint for handle resolution
pub const PUBLIC_API_URL: &str = "https://public.api.bsky.app";

/// DID plc directory
pub const PLC_DIRECTORY_URL: &str = "https://plc.directory";

// =============================================================================
// Record Collections
// =============================================================================

pub const COLLECTION_PROFILE: &str = "org.xcvr.actor.profile";
pub const COLLECTION_CHANNEL: &str = "org.xcvr.feed.channel";
pub const COLLECTION_MESSAGE: &str = "org.xcvr.lrc.message";
pub const COLLECTION_SIGNET: &str = "org.xcvr.lrc.signet";
pub const COLLECTION_MEDIA: &str = "org.xcvr.lrc.media";

/// Collections requested from the firehose, in subscription order.
pub const WANTED_COLLECTIONS: [&str; 5] = [
    COLLECTION_PROFILE,
    COLLECTION_CHANNEL,
    COLLECTION_MESSAGE,
    COLLECTION_SIGNET,
    COLLECTION_MEDIA,
];

// =============================================================================
// Sessions & Cookies
// =============================================================================

/// Session cookie name
pub const SESSION_COOKIE_NAME: &str = "oauthsession";

/// Session cookie lifetime while logged in (seconds)
pub const SESSION_COOKIE_MAX_AGE: i64 = 604_800;

/// Session cookie lifetime during the auth flow (seconds)
pub const AUTH_FLOW_COOKIE_MAX_AGE: i64 = 300;

/// OAuth scopes the client requests; callback must return exactly these.
pub const OAUTH_SCOPES: [&str; 2] = ["atproto", "transition:generic"];

/// Refresh a session when it expires within this window (seconds)
pub const SESSION_REFRESH_WINDOW_SECS: i64 = 300;

// =============================================================================
// Intervals & Timeouts
// =============================================================================

/// Outgoing HTTP request timeout (seconds)
pub const HTTP_TIMEOUT_SECS: u64 = 5;

/// Idle channel sweep interval (seconds)
pub const IDLE_SWEEP_INTERVAL_SECS: u64 = 300;

/// Session map cleanup interval (seconds)
pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Lexicon stream subscriber queue capacity
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 10;

/// Lexicon stream ping interval (seconds)
pub const SUBSCRIBER_PING_INTERVAL_SECS: u64 = 15;

/// Firehose replay window on (re)connect (seconds)
pub const FIREHOSE_REPLAY_WINDOW_SECS: i64 = 60;

/// Graceful shutdown deadline for background tasks (seconds)
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Validation Bounds
// =============================================================================

/// Channel title: graphemes / UTF-16 units
pub const TITLE_MAX_GRAPHEMES: usize = 64;
pub const TITLE_MAX_UTF16: usize = 640;

/// Channel topic
pub const TOPIC_MAX_GRAPHEMES: usize = 256;
pub const TOPIC_MAX_UTF16: usize = 2560;

/// Message body
pub const BODY_MAX_GRAPHEMES: usize = 2000;
pub const BODY_MAX_UTF16: usize = 20_000;

/// Nickname (UTF-16 units only)
pub const NICK_MAX_UTF16: usize = 16;

/// Profile status
pub const STATUS_MAX_GRAPHEMES: usize = 640;
pub const STATUS_MAX_UTF16: usize = 6400;

/// 24-bit RGB ceiling
pub const COLOR_MAX: u64 = 0xFF_FF_FF;

/// Message listing page size bounds
pub const MESSAGES_MIN_LIMIT: i64 = 1;
pub const MESSAGES_MAX_LIMIT: i64 = 100;
pub const MESSAGES_DEFAULT_LIMIT: i64 = 50;

// =============================================================================
// Profile Defaults
// =============================================================================

/// Default nick stamped on a first login
pub const DEFAULT_PROFILE_NICK: &str = "wanderer";

/// Default status stamped on a first login
pub const DEFAULT_PROFILE_STATUS: &str = "just setting up my xcvr";

/// Default profile color
pub const DEFAULT_PROFILE_COLOR: u64 = 3_702_605;
