use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::db::VersionedStore;
use crate::handlers::{AppState, error::ApiError};
use crate::models::{User, UserId, Version};
use crate::services::Paired;
use crate::utils::validation::{validate_email, validate_username};

#[derive(Debug, Deserialize)]
pub struct UpdateUserPayload {
    pub username: Option<String>,
    pub email: Option<String>,
    /// Version the client last saw. When absent the current row is used.
    pub version: Option<Version>,
}

pub async fn get_user<S: VersionedStore + Clone + 'static>(
    State((engine, _config)): State<AppState<S>>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(engine.get_user(id).await?))
}

pub async fn update_user<S: VersionedStore + Clone + 'static>(
    State((engine, _config)): State<AppState<S>>,
    Path(id): Path<UserId>,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<Json<User>, ApiError> {
    if let Some(username) = &payload.username {
        validate_username(username)?;
    }
    if let Some(email) = &payload.email {
        validate_email(email)?;
    }

    let current = engine.get_user(id).await?;
    let expected = payload.version.unwrap_or(current.version);
    let user = engine
        .update_profile(
            id,
            expected,
            payload.username.unwrap_or(current.username),
            payload.email.unwrap_or(current.email),
        )
        .await?;

    Ok(Json(user))
}

pub async fn delete_user<S: VersionedStore + Clone + 'static>(
    State((engine, _config)): State<AppState<S>>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    let user = engine.get_user(id).await?;
    engine.delete_account(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn partner_user<S: VersionedStore + Clone + 'static>(
    State((engine, _config)): State<AppState<S>>,
    Path((id, partner_id)): Path<(UserId, UserId)>,
) -> Result<Json<Paired>, ApiError> {
    let user = engine.get_user(id).await?;
    let candidate = engine.get_user(partner_id).await?;
    Ok(Json(engine.partner(&user, &candidate).await?))
}

pub async fn unpartner_user<S: VersionedStore + Clone + 'static>(
    State((engine, _config)): State<AppState<S>>,
    Path(id): Path<UserId>,
) -> Result<Json<Paired>, ApiError> {
    let user = engine.get_user(id).await?;
    Ok(Json(engine.unpartner(&user).await?))
}

pub async fn ping_partner<S: VersionedStore + Clone + 'static>(
    State((engine, _config)): State<AppState<S>>,
    Path(id): Path<UserId>,
) -> Result<Json<Paired>, ApiError> {
    let user = engine.get_user(id).await?;
    Ok(Json(engine.ping(&user).await?))
}

pub async fn pong_partner<S: VersionedStore + Clone + 'static>(
    State((engine, _config)): State<AppState<S>>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    let user = engine.get_user(id).await?;
    Ok(Json(engine.pong(&user).await?))
}
