use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::db::store::{Mutation, StoreError, StoreResult, UniqueField, VersionedStore};
use crate::db::unit_of_work::{Step, UnitOfWork};
use crate::models::{NewUser, User, UserId, UserInvitation, Version};

macro_rules! user_columns {
    () => {
        "id, username, email, password_hash, pinged, last_pinged_at, verified, \
         pinged_partner_count, partner_id, version, updated_at, created_at"
    };
}

// $1 = id, $2 = expected version, further parameters depend on the mutation.
macro_rules! conditional_update {
    ($assignments:literal) => {
        concat!(
            "UPDATE users SET ",
            $assignments,
            ", version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING ",
            user_columns!()
        )
    };
}

const SELECT_USER: &str = concat!("SELECT ", user_columns!(), " FROM users WHERE id = $1");

const INSERT_USER: &str = concat!(
    "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING ",
    user_columns!()
);

const INSERT_INVITATION: &str = "INSERT INTO user_invitations (token, user_id, expires_at) \
                                 VALUES ($1, $2, $3) \
                                 RETURNING token, user_id, expires_at";

const SELECT_VERSION: &str = "SELECT version FROM users WHERE id = $1";

// Refuses rows linked from either side so no partner is left dangling.
const DELETE_USER: &str = "DELETE FROM users \
                           WHERE id = $1 AND version = $2 AND partner_id IS NULL \
                           AND NOT EXISTS (SELECT 1 FROM users p WHERE p.partner_id = $1)";

fn update_sql(mutation: &Mutation) -> &'static str {
    match mutation {
        Mutation::SetPartner(_) => conditional_update!("partner_id = $3"),
        Mutation::ClearPairing => {
            conditional_update!("partner_id = NULL, pinged = FALSE, pinged_partner_count = 0")
        }
        Mutation::IncrementPingCount => {
            conditional_update!("pinged_partner_count = pinged_partner_count + 1")
        }
        Mutation::MarkPinged { .. } => conditional_update!("pinged = TRUE, last_pinged_at = $3"),
        Mutation::Acknowledge => conditional_update!("pinged = FALSE"),
        Mutation::UpdateProfile { .. } => conditional_update!("username = $3, email = $4"),
    }
}

/// Maps driver errors onto the store taxonomy. Uniqueness violations are
/// recognised by constraint name, not by message text.
fn classify(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            if let Some(field) = db_err.constraint().and_then(UniqueField::from_constraint) {
                return StoreError::DuplicateKey(field);
            }
        }
    }
    StoreError::Database(err)
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_foreign_key_violation())
}

/// [`VersionedStore`] over the `users` table.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(StoreError::Timeout(self.query_timeout)),
        }
    }

    /// Commits on success, rolls back on failure. A dropped transaction is
    /// rolled back by sqlx as well, which covers cancellation of the caller.
    async fn finish<T>(&self, tx: Transaction<'static, Postgres>, result: StoreResult<T>) -> StoreResult<T> {
        match result {
            Ok(value) => {
                self.bounded(tx.commit()).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.bounded(tx.rollback()).await {
                    warn!("Rollback after '{}' failed: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn insert_user(&self, conn: &mut PgConnection, new_user: &NewUser) -> StoreResult<User> {
        self.bounded(
            sqlx::query_as::<_, User>(INSERT_USER)
                .bind(new_user.username.as_str())
                .bind(new_user.email.as_str())
                .bind(new_user.password_hash.as_str())
                .fetch_one(&mut *conn),
        )
        .await
    }

    async fn apply_step(&self, conn: &mut PgConnection, step: Step) -> StoreResult<User> {
        let Step {
            id,
            expected,
            mutation,
        } = step;

        let query = sqlx::query_as::<_, User>(update_sql(&mutation))
            .bind(id)
            .bind(expected);
        let query = match &mutation {
            Mutation::SetPartner(partner_id) => query.bind(*partner_id),
            Mutation::MarkPinged { at } => query.bind(*at),
            Mutation::UpdateProfile { username, email } => {
                query.bind(username.as_str()).bind(email.as_str())
            }
            Mutation::ClearPairing | Mutation::IncrementPingCount | Mutation::Acknowledge => query,
        };

        if let Some(user) = self.bounded(query.fetch_optional(&mut *conn)).await? {
            return Ok(user);
        }

        // Nothing matched: tell a vanished row apart from a moved version.
        match self.read_version(conn, id).await? {
            None => Err(StoreError::NotFound(id)),
            Some(actual) => {
                warn!(user_id = %id, %expected, %actual, mutation = mutation.name(), "Version conflict");
                Err(StoreError::VersionConflict {
                    id,
                    expected,
                    actual,
                })
            }
        }
    }

    async fn read_version(&self, conn: &mut PgConnection, id: UserId) -> StoreResult<Option<Version>> {
        self.bounded(
            sqlx::query_scalar::<_, Version>(SELECT_VERSION)
                .bind(id)
                .fetch_optional(&mut *conn),
        )
        .await
    }
}

impl VersionedStore for PgUserStore {
    async fn get(&self, id: UserId) -> StoreResult<User> {
        self.bounded(
            sqlx::query_as::<_, User>(SELECT_USER)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        let mut conn = self.bounded(self.pool.acquire()).await?;
        self.insert_user(&mut conn, &new_user).await
    }

    async fn create_batch(&self, new_users: Vec<NewUser>) -> StoreResult<Vec<User>> {
        let mut tx = self.bounded(self.pool.begin()).await?;

        let result = async {
            let mut created = Vec::with_capacity(new_users.len());
            for new_user in &new_users {
                created.push(self.insert_user(&mut tx, new_user).await?);
            }
            Ok(created)
        }
        .await;

        self.finish(tx, result).await
    }

    async fn create_and_invite(
        &self,
        new_user: NewUser,
        token_hash: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<(User, UserInvitation)> {
        let mut tx = self.bounded(self.pool.begin()).await?;

        let result = async {
            let user = self.insert_user(&mut tx, &new_user).await?;
            let invitation = self
                .bounded(
                    sqlx::query_as::<_, UserInvitation>(INSERT_INVITATION)
                        .bind(token_hash.as_str())
                        .bind(user.id)
                        .bind(expires_at)
                        .fetch_one(&mut *tx),
                )
                .await?;
            Ok((user, invitation))
        }
        .await;

        self.finish(tx, result).await
    }

    async fn delete(&self, id: UserId, expected: Version) -> StoreResult<()> {
        let mut tx = self.bounded(self.pool.begin()).await?;

        let result = async {
            let deleted = self
                .bounded(sqlx::query(DELETE_USER).bind(id).bind(expected).execute(&mut *tx))
                .await
                .map_err(|err| match err {
                    // A link written after the NOT EXISTS check still hits the FK.
                    StoreError::Database(db) if is_foreign_key_violation(&db) => StoreError::StillReferenced(id),
                    other => other,
                })?;

            if deleted.rows_affected() > 0 {
                return Ok(());
            }
            // Same row at the same version means a partner link blocked it.
            Err(match self.read_version(&mut tx, id).await? {
                None => StoreError::NotFound(id),
                Some(actual) if actual != expected => StoreError::VersionConflict { id, expected, actual },
                Some(_) => StoreError::StillReferenced(id),
            })
        }
        .await;

        self.finish(tx, result).await
    }

    async fn atomically(&self, unit: UnitOfWork) -> StoreResult<Vec<User>> {
        if unit.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.bounded(self.pool.begin()).await?;
        let capacity = unit.len();

        let result = async {
            let mut updated = Vec::with_capacity(capacity);
            for step in unit.ordered_steps() {
                updated.push(self.apply_step(&mut tx, step).await?);
            }
            Ok(updated)
        }
        .await;

        self.finish(tx, result).await
    }
}
