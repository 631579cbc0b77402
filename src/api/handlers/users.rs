//! Admin user management endpoints.
//!
//! Flow Overview:
//! 1) The route guard bounces anyone without the admin role before these run.
//! 2) Handlers still re-check the role from the decoded identity at the seam.
//! 3) Responses may carry specific messages; the caller is privileged.
//!
//! Role edits take effect in tokens only on the holder's next refresh or
//! sign-in (no revocation).

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::identity::{Identity, Role};
use super::auth::validate::validate_new_password;
use super::auth::{password, storage};
use super::error::ApiError;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserView {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub has_password: bool,
    pub email_verified: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RoleUpdateRequest {
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AdminPasswordRequest {
    pub new_password: String,
    pub confirm_new_password: String,
}

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All users, newest first", body = [AdminUserView]),
        (status = 303, description = "Not signed in as an admin (redirected)")
    ),
    tag = "admin"
)]
pub async fn list_users(
    Extension(identity): Extension<Identity>,
    pool: Extension<PgPool>,
) -> Response {
    if let Err(response) = ensure_admin(&identity) {
        return response;
    }

    match storage::list_users(&pool).await {
        Ok(users) => {
            let views: Vec<AdminUserView> = users
                .into_iter()
                .map(|(record, created_at)| AdminUserView {
                    id: record.id.to_string(),
                    role: record.role,
                    has_password: record.has_password(),
                    email_verified: record.email_verified,
                    name: record.name,
                    email: record.email,
                    created_at,
                })
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => ApiError::Unexpected(err).into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/admin/users/{id}",
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated"),
        (status = 400, description = "Invalid user id or unknown role"),
        (status = 404, description = "User not found")
    ),
    tag = "admin"
)]
pub async fn set_role(
    Path(id): Path<String>,
    Extension(identity): Extension<Identity>,
    pool: Extension<PgPool>,
    payload: Option<Json<RoleUpdateRequest>>,
) -> Response {
    if let Err(response) = ensure_admin(&identity) {
        return response;
    }
    let user_id = match parse_user_id(&id) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload").into_response();
    };
    let Ok(role) = request.role.trim().to_lowercase().parse::<Role>() else {
        return ApiError::Validation("Unknown role").into_response();
    };

    match storage::set_role(&pool, user_id, role).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Unexpected(err).into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/admin/users/{id}/password",
    request_body = AdminPasswordRequest,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Invalid user id or password policy violation"),
        (status = 404, description = "User not found")
    ),
    tag = "admin"
)]
pub async fn reset_password(
    Path(id): Path<String>,
    Extension(identity): Extension<Identity>,
    pool: Extension<PgPool>,
    payload: Option<Json<AdminPasswordRequest>>,
) -> Response {
    if let Err(response) = ensure_admin(&identity) {
        return response;
    }
    let user_id = match parse_user_id(&id) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Password is required").into_response();
    };
    if let Err(message) =
        validate_new_password(&request.new_password, &request.confirm_new_password)
    {
        return ApiError::Validation(message).into_response();
    }

    let new_hash = match password::hash(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => return ApiError::Unexpected(err).into_response(),
    };

    match storage::set_password_hash(&pool, user_id, &new_hash).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Unexpected(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    responses(
        (status = 204, description = "User deleted; linked accounts cascade"),
        (status = 400, description = "Invalid user id"),
        (status = 404, description = "User not found")
    ),
    tag = "admin"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    Extension(identity): Extension<Identity>,
    pool: Extension<PgPool>,
) -> Response {
    if let Err(response) = ensure_admin(&identity) {
        return response;
    }
    let user_id = match parse_user_id(&id) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match storage::delete_user(&pool, user_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Unexpected(err).into_response(),
    }
}

fn ensure_admin(identity: &Identity) -> Result<(), Response> {
    if identity.role.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized.into_response())
    }
}

fn parse_user_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::Validation("Invalid user id").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: None,
            email: "admin@example.com".to_string(),
            role,
            has_password: true,
        }
    }

    #[test]
    fn non_admin_is_rejected_at_the_seam() {
        assert!(ensure_admin(&identity(Role::User)).is_err());
        assert!(ensure_admin(&identity(Role::Admin)).is_ok());
    }

    #[test]
    fn user_id_must_be_a_uuid() {
        assert!(parse_user_id("not-a-uuid").is_err());
        assert!(parse_user_id(&Uuid::new_v4().to_string()).is_ok());
        assert!(parse_user_id(&format!("  {}  ", Uuid::new_v4())).is_ok());
    }

    #[test]
    fn role_request_parses_case_insensitively() {
        let request = RoleUpdateRequest {
            role: " Admin ".to_string(),
        };
        assert_eq!(request.role.trim().to_lowercase().parse::<Role>(), Ok(Role::Admin));
    }
}
