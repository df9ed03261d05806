use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::db::{StoreError, UniqueField, VersionedStore};
use crate::models::{NewUser, User};
use crate::utils::validation::{validate_email, validate_password, validate_username, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("a user with that {0} already exists")]
    DuplicateKey(UniqueField),

    #[error("failed to hash password: {0}")]
    Hashing(String),

    #[error("internal storage failure: {0}")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(field) => RegistrationError::DuplicateKey(field),
            other => RegistrationError::Internal(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registered {
    pub user: User,
    /// Plain invitation token. Only its digest is stored.
    pub invitation_token: String,
    pub invitation_expires_at: DateTime<Utc>,
}

pub fn hash_password(password: &str) -> Result<String, RegistrationError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RegistrationError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

pub fn digest_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

/// Returns `(plain, digest)` for a fresh invitation.
pub fn new_invitation_token() -> (String, String) {
    let plain = Uuid::new_v4().to_string();
    let digest = digest_token(&plain);
    (plain, digest)
}

/// Validates the request, hashes the password off the async runtime, and
/// stores the user together with its invitation.
pub async fn register<S: VersionedStore>(
    store: &S,
    registration: Registration,
    invitation_ttl: chrono::Duration,
) -> Result<Registered, RegistrationError> {
    let Registration {
        username,
        email,
        password,
    } = registration;

    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&password)?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| RegistrationError::Hashing(e.to_string()))??;

    let (plain, digest) = new_invitation_token();
    let expires_at = Utc::now() + invitation_ttl;

    let (user, invitation) = store
        .create_and_invite(
            NewUser {
                username,
                email,
                password_hash,
            },
            digest,
            expires_at,
        )
        .await?;

    info!(user_id = %user.id, "User registered");

    Ok(Registered {
        user,
        invitation_token: plain,
        invitation_expires_at: invitation.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryUserStore;

    fn alice() -> Registration {
        Registration {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not a phc string"));
    }

    #[test]
    fn invitation_digest_matches_plain_token() {
        let (plain, digest) = new_invitation_token();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_token(&plain));
        assert_ne!(plain, digest);
    }

    #[tokio::test]
    async fn register_stores_user_and_invitation_digest() {
        let store = MemoryUserStore::new();

        let registered = register(&store, alice(), chrono::Duration::hours(72)).await.unwrap();

        assert_eq!(registered.user.username, "alice");
        assert!(verify_password("correct horse", &registered.user.password_hash));
        let invitations = store.invitations_for(registered.user.id);
        assert_eq!(invitations.len(), 1);
        assert_eq!(invitations[0].token, digest_token(&registered.invitation_token));
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let store = MemoryUserStore::new();
        register(&store, alice(), chrono::Duration::hours(1)).await.unwrap();

        let mut again = alice();
        again.username = "alice2".to_string();
        let err = register(&store, again, chrono::Duration::hours(1)).await.unwrap_err();

        assert!(matches!(err, RegistrationError::DuplicateKey(UniqueField::Email)));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_the_store() {
        let store = MemoryUserStore::new();
        let mut bad = alice();
        bad.password = "short".to_string();

        let err = register(&store, bad, chrono::Duration::hours(1)).await.unwrap_err();

        assert!(matches!(err, RegistrationError::Invalid(ValidationError::Password)));
        assert_eq!(store.user_count(), 0);
    }
}
