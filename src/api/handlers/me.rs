//! Authenticated self-service: profile and password updates.
//!
//! Flow Overview:
//! 1) The route guard has already decoded the token; handlers receive the
//!    identity from request extensions.
//! 2) Apply allow-listed updates against the current database row.
//! 3) The client refreshes its token (`PATCH /session`) to pick up changes;
//!    until then the old snapshot stays valid (staleness window).

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;

use super::auth::identity::Identity;
use super::auth::types::MessageResponse;
use super::auth::validate::validate_new_password;
use super::auth::{password, storage};
use super::error::ApiError;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub message: String,
    pub user: Identity,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PasswordUpdateRequest {
    pub current_password: Option<String>,
    pub new_password: String,
    pub confirm_new_password: String,
}

#[utoipa::path(
    post,
    path = "/profile",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid input or email already in use", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 404, description = "Identity no longer exists", body = MessageResponse)
    ),
    tag = "me"
)]
pub async fn update_profile(
    Extension(identity): Extension<Identity>,
    pool: Extension<PgPool>,
    payload: Option<Json<ProfileUpdateRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload").into_response();
    };

    let name = normalize_optional(request.name);
    let email = normalize_optional(request.email);

    if name.is_none() && email.is_none() {
        return ApiError::Validation("No updates provided").into_response();
    }
    if let Some(email) = &email {
        if !super::auth::validate::valid_email(email) {
            return ApiError::Validation("Invalid email").into_response();
        }
        // Pre-write check; the unique index still decides races.
        match storage::email_taken_by_other(&pool, email, identity.id).await {
            Ok(true) => return ApiError::Conflict("Email already in use").into_response(),
            Ok(false) => {}
            Err(err) => return ApiError::Unexpected(err).into_response(),
        }
    }

    match storage::update_profile(&pool, identity.id, name.as_deref(), email.as_deref()).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(ProfileResponse {
                message: "Profile updated successfully".to_string(),
                user: record.into_identity(),
            }),
        )
            .into_response(),
        Ok(None) => ApiError::NotFound.into_response(),
        Err(err) if storage::is_unique_violation_anyhow(&err) => {
            ApiError::Conflict("Email already in use").into_response()
        }
        Err(err) => ApiError::Unexpected(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/profile/password",
    request_body = PasswordUpdateRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Validation failure or wrong current password", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 404, description = "Identity no longer exists", body = MessageResponse)
    ),
    tag = "me"
)]
pub async fn update_password(
    Extension(identity): Extension<Identity>,
    pool: Extension<PgPool>,
    payload: Option<Json<PasswordUpdateRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload").into_response();
    };

    if let Err(message) =
        validate_new_password(&request.new_password, &request.confirm_new_password)
    {
        return ApiError::Validation(message).into_response();
    }

    let record = match storage::find_user_by_id(&pool, identity.id).await {
        Ok(Some(record)) => record,
        Ok(None) => return ApiError::NotFound.into_response(),
        Err(err) => return ApiError::Unexpected(err).into_response(),
    };

    // A stored hash means the current password must be presented and match.
    // OAuth-only identities set their first password without one.
    if let Some(stored_hash) = record.hash() {
        let Some(current) = request.current_password.as_deref() else {
            return ApiError::Validation("Current password is required").into_response();
        };
        match password::matches(current, stored_hash) {
            Ok(true) => {}
            Ok(false) => {
                return ApiError::Validation("Current password is incorrect").into_response()
            }
            Err(err) => return ApiError::Unexpected(err).into_response(),
        }
    }

    let new_hash = match password::hash(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => return ApiError::Unexpected(err).into_response(),
    };

    match storage::set_password_hash(&pool, identity.id, &new_hash).await {
        Ok(true) => (
            StatusCode::OK,
            Json(MessageResponse::new("Password updated successfully")),
        )
            .into_response(),
        Ok(false) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Unexpected(err).into_response(),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
