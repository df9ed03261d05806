use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::db::{Mutation, StoreError, UniqueField, UnitOfWork, VersionedStore};
use crate::models::{User, UserId, Version};

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("user {0} not found")]
    NotFound(UserId),

    #[error("partner not found")]
    PartnerNotFound,

    #[error("user {0} was modified concurrently, re-fetch and retry")]
    VersionConflict(UserId),

    #[error("a user with that {0} already exists")]
    DuplicateKey(UniqueField),

    #[error("a user cannot partner with themselves")]
    SelfPartner,

    #[error("user {0} already has a partner")]
    AlreadyPartnered(UserId),

    #[error("user must unpartner before the account can be deleted")]
    StillPartnered,

    #[error("internal storage failure: {0}")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for PairingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PairingError::NotFound(id),
            StoreError::VersionConflict { id, .. } => PairingError::VersionConflict(id),
            StoreError::DuplicateKey(field) => PairingError::DuplicateKey(field),
            StoreError::StillReferenced(_) => PairingError::StillPartnered,
            other @ (StoreError::Timeout(_) | StoreError::Database(_)) => PairingError::Internal(other),
        }
    }
}

/// Both rows of a pair as committed by a two-row operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paired {
    pub user: User,
    pub partner: User,
}

impl Paired {
    fn from_rows(user_id: UserId, rows: Vec<User>) -> Result<Self, PairingError> {
        let (mut mine, theirs): (Vec<_>, Vec<_>) = rows.into_iter().partition(|u| u.id == user_id);
        match (mine.pop(), theirs.into_iter().next()) {
            (Some(user), Some(partner)) => Ok(Self { user, partner }),
            _ => Err(PairingError::NotFound(user_id)),
        }
    }
}

/// The partner relationship state machine.
///
/// Every operation takes the caller's snapshot of the user row and issues
/// its writes against the versions in that snapshot, so a stale snapshot
/// fails with [`PairingError::VersionConflict`] instead of overwriting a
/// concurrent change. Multi-row operations go through a single
/// [`UnitOfWork`]. Nothing is retried here.
#[derive(Debug, Clone)]
pub struct PairingEngine<S> {
    store: S,
}

impl<S: VersionedStore> PairingEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, PairingError> {
        Ok(self.store.get(id).await?)
    }

    /// Links `user` and `candidate` to each other.
    #[instrument(skip_all, fields(user_id = %user.id, candidate_id = %candidate.id))]
    pub async fn partner(&self, user: &User, candidate: &User) -> Result<Paired, PairingError> {
        if user.id == candidate.id {
            return Err(PairingError::SelfPartner);
        }

        // A link to a third user would leave that user pointing at a row
        // that no longer points back.
        for (side, other) in [(user, candidate), (candidate, user)] {
            if side.partner_id.is_some_and(|current| current != other.id) {
                return Err(PairingError::AlreadyPartnered(side.id));
            }
        }

        let mut unit = UnitOfWork::new();
        unit.update(user.id, user.version, Mutation::SetPartner(candidate.id))
            .update(candidate.id, candidate.version, Mutation::SetPartner(user.id));

        let rows = self.store.atomically(unit).await.inspect_err(log_conflict)?;
        debug!("Users partnered");
        Paired::from_rows(user.id, rows)
    }

    /// Breaks the pair and resets the ping state on both sides.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn unpartner(&self, user: &User) -> Result<Paired, PairingError> {
        let partner_id = user.partner_id.ok_or(PairingError::PartnerNotFound)?;
        let partner = self.store.get(partner_id).await?;

        let mut unit = UnitOfWork::new();
        unit.update(user.id, user.version, Mutation::ClearPairing);

        let points_back = partner.is_partnered_with(user.id);
        if points_back {
            unit.update(partner.id, partner.version, Mutation::ClearPairing);
        } else {
            warn!(partner_id = %partner.id, "Partner row does not link back, clearing one side");
        }

        let rows = self.store.atomically(unit).await.inspect_err(log_conflict)?;
        debug!("Users unpartnered");

        if points_back {
            return Paired::from_rows(user.id, rows);
        }
        let user = rows.into_iter().next().ok_or(PairingError::NotFound(user.id))?;
        Ok(Paired { user, partner })
    }

    /// Counts a ping on the caller's row and flags the partner as pinged.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn ping(&self, user: &User) -> Result<Paired, PairingError> {
        let partner_id = user.partner_id.ok_or(PairingError::PartnerNotFound)?;
        let partner = match self.store.get(partner_id).await {
            Ok(partner) => partner,
            Err(StoreError::NotFound(_)) => return Err(PairingError::PartnerNotFound),
            Err(err) => return Err(err.into()),
        };
        if !partner.is_partnered_with(user.id) {
            return Err(PairingError::PartnerNotFound);
        }

        let mut unit = UnitOfWork::new();
        unit.update(user.id, user.version, Mutation::IncrementPingCount)
            .update(partner.id, partner.version, Mutation::MarkPinged { at: Utc::now() });

        let rows = self.store.atomically(unit).await.inspect_err(log_conflict)?;
        debug!(partner_id = %partner.id, "Partner pinged");
        Paired::from_rows(user.id, rows)
    }

    /// Acknowledges a ping received from the partner. Only the caller's own
    /// flag is cleared; the partner's ping count is left alone.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn pong(&self, user: &User) -> Result<User, PairingError> {
        if !user.is_paired() {
            return Err(PairingError::PartnerNotFound);
        }

        let user = self
            .store
            .compare_and_update(user.id, user.version, Mutation::Acknowledge)
            .await
            .inspect_err(log_conflict)?;
        debug!("Ping acknowledged");
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        id: UserId,
        expected: Version,
        username: String,
        email: String,
    ) -> Result<User, PairingError> {
        let user = self
            .store
            .compare_and_update(id, expected, Mutation::UpdateProfile { username, email })
            .await
            .inspect_err(log_conflict)?;
        Ok(user)
    }

    /// Deletes an unpaired account. Paired accounts must unpartner first so
    /// the former partner is not left with a dangling link. The delete is
    /// conditional on the snapshot's version, so a pairing committed after
    /// the snapshot was read makes it fail instead of orphaning the partner.
    pub async fn delete_account(&self, user: &User) -> Result<(), PairingError> {
        if user.is_paired() {
            return Err(PairingError::StillPartnered);
        }
        self.store
            .delete(user.id, user.version)
            .await
            .inspect_err(log_conflict)?;
        debug!(user_id = %user.id, "Account deleted");
        Ok(())
    }
}

fn log_conflict(err: &StoreError) {
    if let StoreError::VersionConflict { id, expected, actual } = err {
        warn!(user_id = %id, %expected, %actual, "Stale snapshot, operation aborted");
    }
}
