// =============================================================================
// PingU Backend Constants
// =============================================================================
// This file contains all constants used throughout the backend to enable
// easy tuning and configuration from a single location.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP port when PORT is not set
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Wall-clock bound on a whole inbound request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Requests a single client address may make per rate limit window
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// DATABASE
// =============================================================================

/// Default size of the Postgres connection pool
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Idle connections are closed after this long
pub const DEFAULT_DB_MAX_IDLE_TIME_SECS: u64 = 15 * 60;

/// Bound on every individual storage round-trip
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 5;

/// Unique constraint names declared in the users migration
pub const USERS_USERNAME_CONSTRAINT: &str = "users_username_key";
pub const USERS_EMAIL_CONSTRAINT: &str = "users_email_key";

// =============================================================================
// ACCOUNTS
// =============================================================================

/// How long an invitation token stays valid
pub const DEFAULT_INVITATION_EXPIRY_HOURS: i64 = 72;

pub const USERNAME_MAX_LEN: usize = 35;
pub const EMAIL_MAX_LEN: usize = 255;
pub const PASSWORD_MIN_LEN: usize = 6;
/// Longer inputs are rejected rather than silently truncated by the hasher
pub const PASSWORD_MAX_LEN: usize = 72;

// =============================================================================
// SEEDING
// =============================================================================

pub const DEFAULT_SEED_USER_COUNT: usize = 100;

/// Password given to every seeded account
pub const SEED_PASSWORD: &str = "password123";
