use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::constants::{USERS_EMAIL_CONSTRAINT, USERS_USERNAME_CONSTRAINT};
use crate::db::unit_of_work::UnitOfWork;
use crate::models::{NewUser, User, UserId, UserInvitation, Version};

/// Columns that carry a uniqueness constraint on `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    pub fn from_constraint(name: &str) -> Option<Self> {
        match name {
            USERS_USERNAME_CONSTRAINT => Some(Self::Username),
            USERS_EMAIL_CONSTRAINT => Some(Self::Email),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user {0} not found")]
    NotFound(UserId),

    /// The row exists but its version moved past the one the caller read.
    #[error("user {id} was modified concurrently (expected {expected}, found {actual})")]
    VersionConflict {
        id: UserId,
        expected: Version,
        actual: Version,
    },

    #[error("a user with that {0} already exists")]
    DuplicateKey(UniqueField),

    /// The row is still linked to a partner, on either side of the link.
    #[error("user {0} is still linked to a partner")]
    StillReferenced(UserId),

    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A change to a single user row. Applied only when the row's version
/// still matches the one the caller observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetPartner(UserId),
    /// Drops the partner link and resets the ping sub-state.
    ClearPairing,
    IncrementPingCount,
    MarkPinged { at: DateTime<Utc> },
    Acknowledge,
    UpdateProfile { username: String, email: String },
}

impl Mutation {
    /// In-memory application of the mutation. The version and `updated_at`
    /// are owned by the store and are not touched here.
    pub fn apply(&self, user: &mut User) {
        match self {
            Mutation::SetPartner(partner_id) => {
                user.partner_id = Some(*partner_id);
            }
            Mutation::ClearPairing => {
                user.partner_id = None;
                user.pinged = false;
                user.pinged_partner_count = 0;
            }
            Mutation::IncrementPingCount => {
                user.pinged_partner_count += 1;
            }
            Mutation::MarkPinged { at } => {
                user.pinged = true;
                user.last_pinged_at = Some(*at);
            }
            Mutation::Acknowledge => {
                user.pinged = false;
            }
            Mutation::UpdateProfile { username, email } => {
                user.username = username.clone();
                user.email = email.clone();
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::SetPartner(_) => "set_partner",
            Mutation::ClearPairing => "clear_pairing",
            Mutation::IncrementPingCount => "increment_ping_count",
            Mutation::MarkPinged { .. } => "mark_pinged",
            Mutation::Acknowledge => "acknowledge",
            Mutation::UpdateProfile { .. } => "update_profile",
        }
    }
}

/// Fetch / compare-and-update access to user rows, keyed by [`Version`].
///
/// Implementations never retry and never swallow failures: every error is
/// classified into a [`StoreError`] and handed back to the caller.
pub trait VersionedStore: Send + Sync {
    fn get(&self, id: UserId) -> impl Future<Output = StoreResult<User>> + Send;

    /// Inserts a new, unpaired user. Identity, version and timestamps are
    /// assigned by the store.
    fn create(&self, new_user: NewUser) -> impl Future<Output = StoreResult<User>> + Send;

    /// Inserts every user or none of them.
    fn create_batch(&self, new_users: Vec<NewUser>) -> impl Future<Output = StoreResult<Vec<User>>> + Send;

    /// Inserts the user and its invitation in one transaction.
    fn create_and_invite(
        &self,
        new_user: NewUser,
        token_hash: String,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<(User, UserInvitation)>> + Send;

    /// Deletes the row only if it is at `expected` and no partner link
    /// touches it in either direction.
    fn delete(&self, id: UserId, expected: Version) -> impl Future<Output = StoreResult<()>> + Send;

    /// Applies every step of `unit` in canonical row order, all or nothing.
    /// Returns the updated rows in that same order.
    fn atomically(&self, unit: UnitOfWork) -> impl Future<Output = StoreResult<Vec<User>>> + Send;

    fn compare_and_update(
        &self,
        id: UserId,
        expected: Version,
        mutation: Mutation,
    ) -> impl Future<Output = StoreResult<User>> + Send {
        async move {
            let mut unit = UnitOfWork::new();
            unit.update(id, expected, mutation);
            let mut rows = self.atomically(unit).await?;
            rows.pop().ok_or(StoreError::NotFound(id))
        }
    }
}
