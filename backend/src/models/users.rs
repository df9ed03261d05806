use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Storage-assigned identity of a user row. Ordering is the canonical
/// row-acquisition order for multi-row updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic-concurrency token. Strictly increases on every committed
/// mutation of the row it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Version(pub i64);

impl Version {
    pub const INITIAL: Version = Version(1);

    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    /// Set when the partner sent a ping this user has not acknowledged yet.
    pub pinged: bool,
    pub last_pinged_at: Option<DateTime<Utc>>,
    pub verified: bool,
    /// Pings this user has sent to its partner since the pairing began.
    pub pinged_partner_count: i64,
    pub partner_id: Option<UserId>,
    pub version: Version,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_paired(&self) -> bool {
        self.partner_id.is_some()
    }

    pub fn is_partnered_with(&self, other: UserId) -> bool {
        self.partner_id == Some(other)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserInvitation {
    /// SHA-256 hex digest of the token handed to the user.
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}
