use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::db::store::{Mutation, StoreError, StoreResult, UniqueField, VersionedStore};
use crate::db::unit_of_work::UnitOfWork;
use crate::models::{NewUser, User, UserId, UserInvitation, Version};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    invitations: Vec<UserInvitation>,
    last_id: i64,
}

fn check_unique<'a>(
    rows: impl Iterator<Item = &'a User>,
    username: &str,
    email: &str,
    except: Option<UserId>,
) -> StoreResult<()> {
    for other in rows.filter(|u| Some(u.id) != except) {
        if other.username == username {
            return Err(StoreError::DuplicateKey(UniqueField::Username));
        }
        if other.email == email {
            return Err(StoreError::DuplicateKey(UniqueField::Email));
        }
    }
    Ok(())
}

impl Tables {
    fn insert_user(&mut self, new_user: NewUser) -> StoreResult<User> {
        check_unique(self.users.values(), &new_user.username, &new_user.email, None)?;

        self.last_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId(self.last_id),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            pinged: false,
            last_pinged_at: None,
            verified: false,
            pinged_partner_count: 0,
            partner_id: None,
            version: Version::INITIAL,
            updated_at: now,
            created_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }
}

/// In-process [`VersionedStore`] with the same isolation guarantees as the
/// Postgres store: conditional updates, unique usernames and emails, and
/// all-or-nothing units. Clones share the same tables.
///
/// The mutex plays the role of the database's row locking; nothing above
/// the store holds a lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn invitations_for(&self, id: UserId) -> Vec<UserInvitation> {
        self.lock()
            .invitations
            .iter()
            .filter(|inv| inv.user_id == id)
            .cloned()
            .collect()
    }
}

impl VersionedStore for MemoryUserStore {
    async fn get(&self, id: UserId) -> StoreResult<User> {
        self.lock()
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        self.lock().insert_user(new_user)
    }

    async fn create_batch(&self, new_users: Vec<NewUser>) -> StoreResult<Vec<User>> {
        let mut tables = self.lock();
        let (users_before, last_id_before) = (tables.users.clone(), tables.last_id);

        let mut created = Vec::with_capacity(new_users.len());
        for new_user in new_users {
            match tables.insert_user(new_user) {
                Ok(user) => created.push(user),
                Err(err) => {
                    tables.users = users_before;
                    tables.last_id = last_id_before;
                    return Err(err);
                }
            }
        }
        Ok(created)
    }

    async fn create_and_invite(
        &self,
        new_user: NewUser,
        token_hash: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<(User, UserInvitation)> {
        let mut tables = self.lock();
        let user = tables.insert_user(new_user)?;
        let invitation = UserInvitation {
            token: token_hash,
            user_id: user.id,
            expires_at,
        };
        tables.invitations.push(invitation.clone());
        Ok((user, invitation))
    }

    async fn delete(&self, id: UserId, expected: Version) -> StoreResult<()> {
        let mut tables = self.lock();
        let row = tables.users.get(&id).ok_or(StoreError::NotFound(id))?;

        if row.version != expected {
            return Err(StoreError::VersionConflict {
                id,
                expected,
                actual: row.version,
            });
        }

        // Mirrors the partner_id foreign key.
        let referenced = tables.users.values().any(|u| u.partner_id == Some(id));
        if row.is_paired() || referenced {
            return Err(StoreError::StillReferenced(id));
        }

        tables.users.remove(&id);
        tables.invitations.retain(|inv| inv.user_id != id);
        Ok(())
    }

    async fn atomically(&self, unit: UnitOfWork) -> StoreResult<Vec<User>> {
        let mut tables = self.lock();
        let mut staged: BTreeMap<UserId, User> = BTreeMap::new();
        let mut updated = Vec::with_capacity(unit.len());

        // Work on copies; the tables are only written once every step passed.
        for step in unit.ordered_steps() {
            let mut row = match staged.get(&step.id) {
                Some(row) => row.clone(),
                None => tables
                    .users
                    .get(&step.id)
                    .cloned()
                    .ok_or(StoreError::NotFound(step.id))?,
            };

            if row.version != step.expected {
                return Err(StoreError::VersionConflict {
                    id: step.id,
                    expected: step.expected,
                    actual: row.version,
                });
            }

            if let Mutation::UpdateProfile { username, email } = &step.mutation {
                // Earlier steps of this unit are visible to later ones.
                let current = tables
                    .users
                    .values()
                    .map(|u| staged.get(&u.id).unwrap_or(u));
                check_unique(current, username, email, Some(step.id))?;
            }

            step.mutation.apply(&mut row);
            row.version = row.version.next();
            row.updated_at = Utc::now();

            updated.push(row.clone());
            staged.insert(step.id, row);
        }

        tables.users.extend(staged);
        Ok(updated)
    }
}
