use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::db::VersionedStore;
use crate::handlers::{AppState, error::ApiError};
use crate::services::registration::{self, Registered, Registration};

#[derive(Debug, Deserialize)]
pub struct RegisterUserPayload {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn register_user<S: VersionedStore + Clone + 'static>(
    State((engine, config)): State<AppState<S>>,
    Json(payload): Json<RegisterUserPayload>,
) -> Result<(StatusCode, Json<Registered>), ApiError> {
    let registered = registration::register(
        engine.store(),
        Registration {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        },
        config.invitation_expiry,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(registered)))
}
