//! OpenAPI document for the served routes.

use utoipa::OpenApi;

use super::handlers::{auth, health, me, root, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        root::root,
        health::health,
        auth::session::signin,
        auth::session::signup,
        auth::session::signout,
        auth::session::session,
        auth::session::refresh_session,
        auth::oauth::github_signin,
        auth::oauth::github_callback,
        me::update_profile,
        me::update_password,
        users::list_users,
        users::set_role,
        users::reset_password,
        users::delete_user,
    ),
    components(schemas(
        auth::identity::Identity,
        auth::identity::Role,
        auth::identity::SessionPatch,
        auth::types::SignInRequest,
        auth::types::SignUpRequest,
        auth::types::SessionResponse,
        auth::types::MessageResponse,
        me::ProfileUpdateRequest,
        me::ProfileResponse,
        me::PasswordUpdateRequest,
        users::AdminUserView,
        users::RoleUpdateRequest,
        users::AdminPasswordRequest,
    )),
    tags(
        (name = "auth", description = "Sign-in, sign-up, sessions, provider sign-in"),
        (name = "me", description = "Profile self-service"),
        (name = "admin", description = "Admin user management"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn document_lists_every_route() -> Result<()> {
        let doc = ApiDoc::openapi();
        let value = serde_json::to_value(&doc)?;
        let paths = value
            .get("paths")
            .and_then(serde_json::Value::as_object)
            .context("missing paths")?;
        for path in [
            "/",
            "/health",
            "/signin",
            "/signup",
            "/signout",
            "/session",
            "/signin/github",
            "/callback/github",
            "/profile",
            "/profile/password",
            "/admin/users",
            "/admin/users/{id}",
            "/admin/users/{id}/password",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        Ok(())
    }
}
