use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;

use crate::services::{PairingError, RegistrationError};
use crate::utils::ValidationError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Transport mapping for engine and registration failures.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(cause: &dyn std::error::Error) -> Self {
        tracing::error!("Internal error: {}", cause);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "the server encountered a problem and could not process your request",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<PairingError> for ApiError {
    fn from(err: PairingError) -> Self {
        let status = match &err {
            PairingError::NotFound(_) | PairingError::PartnerNotFound => StatusCode::NOT_FOUND,
            PairingError::VersionConflict(_)
            | PairingError::AlreadyPartnered(_)
            | PairingError::StillPartnered => StatusCode::CONFLICT,
            PairingError::SelfPartner | PairingError::DuplicateKey(_) => StatusCode::BAD_REQUEST,
            PairingError::Internal(_) => return Self::internal(&err),
        };
        Self::new(status, err.to_string())
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match &err {
            RegistrationError::Invalid(_) | RegistrationError::DuplicateKey(_) => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            RegistrationError::Hashing(_) | RegistrationError::Internal(_) => Self::internal(&err),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{StoreError, UniqueField};
    use crate::models::UserId;

    #[test]
    fn pairing_failures_map_to_statuses() {
        let cases = [
            (PairingError::NotFound(UserId(1)), StatusCode::NOT_FOUND),
            (PairingError::PartnerNotFound, StatusCode::NOT_FOUND),
            (PairingError::VersionConflict(UserId(1)), StatusCode::CONFLICT),
            (PairingError::AlreadyPartnered(UserId(1)), StatusCode::CONFLICT),
            (PairingError::StillPartnered, StatusCode::CONFLICT),
            (PairingError::SelfPartner, StatusCode::BAD_REQUEST),
            (PairingError::DuplicateKey(UniqueField::Email), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn internal_cause_is_not_leaked() {
        let err = PairingError::Internal(StoreError::Timeout(std::time::Duration::from_secs(5)));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("timed out"));
    }
}
