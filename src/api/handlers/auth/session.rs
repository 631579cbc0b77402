//! Session mediation: sign-in, sign-up, sign-out, and token refresh.
//!
//! The token travels in an HttpOnly cookie (or a bearer header for API
//! clients). Sign-out is purely client-side state removal; there is nothing
//! to clean up on the server.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Redirect, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, warn};

use super::super::error::ApiError;
use super::identity::SessionPatch;
use super::password;
use super::policy::{HOME_ROUTE, SIGNIN_ROUTE};
use super::state::AuthState;
use super::storage::{insert_user, SignupOutcome};
use super::token::TokenError;
use super::types::{MessageResponse, SessionResponse, SignInRequest, SignUpRequest};
use super::validate::validate_signup;
use super::verify::{verify, VerifyError};

pub(crate) const SESSION_COOKIE_NAME: &str = "janua_session";

#[utoipa::path(
    post,
    path = "/signin",
    request_body = SignInRequest,
    responses(
        (status = 303, description = "Signed in; session cookie set, redirect home"),
        (status = 401, description = "Invalid credentials", body = MessageResponse),
        (status = 400, description = "Missing payload", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn signin(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignInRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload").into_response();
    };

    let identity = match verify(&pool, &request.email, &request.password).await {
        Ok(identity) => identity,
        // Subtypes are logged distinctly but all collapse to one generic
        // message; never reveal whether the email exists.
        Err(VerifyError::Rejected(rejection)) => {
            warn!(reason = rejection.as_str(), "credential sign-in rejected");
            return ApiError::InvalidCredentials.into_response();
        }
        Err(VerifyError::Storage(err)) => return ApiError::Unexpected(err).into_response(),
    };

    issue_session(&auth_state, &identity, HOME_ROUTE)
}

#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = MessageResponse),
        (status = 400, description = "Validation failure or duplicate email", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn signup(
    pool: Extension<PgPool>,
    payload: Option<Json<SignUpRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload").into_response();
    };

    if let Err(message) = validate_signup(
        &request.name,
        &request.email,
        &request.password,
        &request.confirm_password,
    ) {
        return ApiError::Validation(message).into_response();
    }

    let password_hash = match password::hash(&request.password) {
        Ok(hash) => hash,
        Err(err) => return ApiError::Unexpected(err).into_response(),
    };

    // The unique index decides races; this insert maps 23505 to Conflict.
    match insert_user(&pool, request.name.trim(), &request.email, &password_hash).await {
        Ok(SignupOutcome::Created) => (
            StatusCode::CREATED,
            Json(MessageResponse::new("Account created successfully")),
        )
            .into_response(),
        Ok(SignupOutcome::Conflict) => ApiError::Conflict("Email already exists").into_response(),
        Err(err) => ApiError::Unexpected(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/signout",
    responses(
        (status = 303, description = "Session cookie cleared, redirect to sign-in")
    ),
    tag = "auth"
)]
pub async fn signout(auth_state: Extension<Arc<AuthState>>) -> Response {
    // Stateless sessions: discarding the cookie is the whole sign-out.
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&auth_state) {
        headers.insert(SET_COOKIE, cookie);
    }
    (headers, Redirect::to(SIGNIN_ROUTE)).into_response()
}

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 204, description = "No session (absent, expired, and tampered are indistinguishable)")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let Some(token) = presented_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match auth_state.codec().decode(&token) {
        Ok(identity) => (StatusCode::OK, Json(SessionResponse { user: identity })).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/session",
    request_body = SessionPatch,
    responses(
        (status = 200, description = "Token refreshed; cookie reset", body = SessionResponse),
        (status = 401, description = "No valid session to refresh", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn refresh_session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SessionPatch>>,
) -> Response {
    let patch = payload.map_or_else(SessionPatch::default, |Json(patch)| patch);

    let Some(token) = presented_token(&headers) else {
        return ApiError::Unauthorized.into_response();
    };

    // Id and role are carried forward from the existing token; the patch
    // cannot touch them.
    let refreshed = match auth_state.codec().refresh(&token, &patch) {
        Ok(refreshed) => refreshed,
        Err(TokenError::Invalid) => return ApiError::Unauthorized.into_response(),
        Err(TokenError::Encoding(err)) => {
            return ApiError::Unexpected(anyhow::anyhow!("token refresh failed: {err}"))
                .into_response()
        }
    };

    let identity = match auth_state.codec().decode(&refreshed) {
        Ok(identity) => identity,
        Err(_) => return ApiError::Unauthorized.into_response(),
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(&auth_state, &refreshed) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("failed to build session cookie: {err}");
            return ApiError::Unexpected(anyhow::anyhow!("invalid cookie value")).into_response();
        }
    }
    (
        StatusCode::OK,
        response_headers,
        Json(SessionResponse { user: identity }),
    )
        .into_response()
}

/// Mint a token for a verified identity, set the cookie, and redirect.
/// Shared by credential and provider sign-in.
pub(crate) fn issue_session(
    auth_state: &AuthState,
    identity: &super::identity::Identity,
    redirect_to: &str,
) -> Response {
    let token = match auth_state.codec().encode(identity) {
        Ok(token) => token,
        Err(err) => {
            return ApiError::Unexpected(anyhow::anyhow!("token issuance failed: {err:?}"))
                .into_response()
        }
    };
    let mut headers = HeaderMap::new();
    match session_cookie(auth_state, &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("failed to build session cookie: {err}");
            return ApiError::Unexpected(anyhow::anyhow!("invalid cookie value")).into_response();
        }
    }
    (headers, Redirect::to(redirect_to)).into_response()
}

/// Build the `HttpOnly` session cookie carrying the signed token.
pub(super) fn session_cookie(
    auth_state: &AuthState,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = auth_state.config().token_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if auth_state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_state: &AuthState) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if auth_state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Extract the raw token from the bearer header or the session cookie.
pub(crate) fn presented_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }
    cookie_value(headers, SESSION_COOKIE_NAME)
}

pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn auth_state(base_url: &str) -> AuthState {
        AuthState::new(super::super::state::AuthConfig::new(
            base_url.to_string(),
            SecretString::from("test-signing-secret".to_string()),
        ))
    }

    #[test]
    fn session_cookie_attributes() {
        let state = auth_state("http://localhost:8080");
        let cookie = session_cookie(&state, "tok").map(|v| v.to_str().map(str::to_string));
        let cookie = cookie.expect("valid header").expect("ascii");
        assert!(cookie.starts_with("janua_session=tok; "));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=43200"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn https_base_url_marks_cookie_secure() {
        let state = auth_state("https://auth.example.com");
        let cookie = session_cookie(&state, "tok").expect("valid header");
        assert!(cookie.to_str().expect("ascii").ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let state = auth_state("http://localhost:8080");
        let cookie = clear_session_cookie(&state).expect("valid header");
        assert!(cookie.to_str().expect("ascii").contains("Max-Age=0"));
    }

    #[test]
    fn presented_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(COOKIE, HeaderValue::from_static("janua_session=cookie-tok"));
        assert_eq!(presented_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn presented_token_reads_the_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; janua_session=cookie-tok; other=1"),
        );
        assert_eq!(presented_token(&headers).as_deref(), Some("cookie-tok"));
    }

    #[test]
    fn missing_and_empty_tokens_are_none() {
        assert_eq!(presented_token(&HeaderMap::new()), None);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(presented_token(&headers), None);
    }
}
