//! GitHub provider sign-in.
//!
//! Flow Overview:
//! 1) `/signin/github` sets a single-use state cookie and redirects to GitHub.
//! 2) `/callback/github` checks the state, exchanges the code, and fetches
//!    the provider identity.
//! 3) Find-or-create by linked account, never by email alone: an existing
//!    identity with the claimed email but no account link fails with
//!    `AccountNotLinked` instead of silently merging.

use axum::{
    extract::{Extension, Query},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, warn};
use url::Url;

use crate::APP_USER_AGENT;

use super::session::{cookie_value, issue_session};
use super::state::{AuthState, ProviderCredentials};
use super::storage::{find_linked_user, find_user_by_email, insert_oauth_user, UserRecord};

pub(crate) const PROVIDER: &str = "github";
const STATE_COOKIE_NAME: &str = "janua_oauth_state";
const STATE_COOKIE_TTL_SECONDS: i64 = 10 * 60;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

/// What the provider handshake yields on success.
#[derive(Debug)]
pub(crate) struct ProviderIdentity {
    pub(crate) provider_account_id: String,
    pub(crate) email: String,
    pub(crate) name: Option<String>,
}

#[derive(Debug)]
pub(crate) enum LinkOutcome {
    Linked(UserRecord),
    Created(UserRecord),
    /// An identity with this email exists through another method. Explicit
    /// failure; linking would be an account-takeover vector if the provider
    /// did not verify email ownership.
    NotLinked,
}

#[derive(Debug, Deserialize)]
pub struct CallbackArgs {
    code: Option<String>,
    state: Option<String>,
}

#[utoipa::path(
    get,
    path = "/signin/github",
    responses(
        (status = 303, description = "Redirect to the provider's authorize URL"),
        (status = 404, description = "Provider sign-in not configured")
    ),
    tag = "auth"
)]
pub async fn github_signin(auth_state: Extension<Arc<AuthState>>) -> Response {
    let Some(credentials) = auth_state.config().github() else {
        return (StatusCode::NOT_FOUND, "GitHub sign-in is not configured").into_response();
    };

    let state = match random_state() {
        Ok(state) => state,
        Err(err) => {
            error!("failed to generate oauth state: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let authorize = match authorize_url(credentials, auth_state.config().base_url(), &state) {
        Ok(authorize) => authorize,
        Err(err) => {
            error!("failed to build authorize url: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    match state_cookie(&auth_state, &state) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("failed to build state cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    (headers, Redirect::to(&authorize)).into_response()
}

#[utoipa::path(
    get,
    path = "/callback/github",
    responses(
        (status = 303, description = "Signed in (cookie set, redirect home) or bounced to /signin with an error code")
    ),
    tag = "auth"
)]
pub async fn github_callback(
    Query(args): Query<CallbackArgs>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let Some(credentials) = auth_state.config().github() else {
        return (StatusCode::NOT_FOUND, "GitHub sign-in is not configured").into_response();
    };

    let (Some(code), Some(state)) = (args.code, args.state) else {
        return signin_error("OAuthCallbackError", &auth_state);
    };

    // The state must match the single-use cookie set at the start of the
    // handshake; mismatch means CSRF or a stale flow.
    match cookie_value(&headers, STATE_COOKIE_NAME) {
        Some(expected) if expected == state => {}
        _ => {
            warn!("oauth state mismatch");
            return signin_error("OAuthCallbackError", &auth_state);
        }
    }

    let provider_identity =
        match fetch_provider_identity(credentials, &code, auth_state.config().base_url()).await {
            Ok(identity) => identity,
            Err(err) => {
                error!("github handshake failed: {err:#}");
                return signin_error("OAuthCallbackError", &auth_state);
            }
        };

    let record = match find_or_create(&pool, &provider_identity).await {
        Ok(LinkOutcome::Linked(record) | LinkOutcome::Created(record)) => record,
        Ok(LinkOutcome::NotLinked) => {
            warn!(
                provider = PROVIDER,
                "oauth sign-in for an existing unlinked email"
            );
            return signin_error("AccountNotLinked", &auth_state);
        }
        Err(err) => {
            error!("oauth account resolution failed: {err:#}");
            return signin_error("OAuthCallbackError", &auth_state);
        }
    };

    let identity = record.into_identity();
    // The state cookie is single-use; drop it alongside the session cookie.
    let mut response = issue_session(&auth_state, &identity, super::policy::HOME_ROUTE);
    if let Ok(cookie) = clear_state_cookie(&auth_state) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// Resolve a provider identity to a local one.
pub(crate) async fn find_or_create(
    pool: &PgPool,
    provider_identity: &ProviderIdentity,
) -> anyhow::Result<LinkOutcome> {
    if let Some(record) =
        find_linked_user(pool, PROVIDER, &provider_identity.provider_account_id).await?
    {
        return Ok(LinkOutcome::Linked(record));
    }

    if find_user_by_email(pool, &provider_identity.email)
        .await?
        .is_some()
    {
        return Ok(LinkOutcome::NotLinked);
    }

    let record = insert_oauth_user(
        pool,
        provider_identity.name.as_deref(),
        &provider_identity.email,
        PROVIDER,
        &provider_identity.provider_account_id,
    )
    .await?;
    Ok(LinkOutcome::Created(record))
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    name: Option<String>,
    login: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

async fn fetch_provider_identity(
    credentials: &ProviderCredentials,
    code: &str,
    base_url: &str,
) -> anyhow::Result<ProviderIdentity> {
    let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

    let redirect_uri = callback_url(base_url);
    let token: AccessTokenResponse = client
        .post(ACCESS_TOKEN_URL)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .send()
        .await?
        .json()
        .await?;
    let access_token = token
        .access_token
        .ok_or_else(|| anyhow::anyhow!("no access token in exchange response"))?;

    let user: GithubUser = client
        .get(USER_URL)
        .bearer_auth(&access_token)
        .send()
        .await?
        .json()
        .await?;

    let email = match user.email {
        Some(email) => email,
        // Email hidden on the profile; ask for the primary verified address.
        None => {
            let emails: Vec<GithubEmail> = client
                .get(EMAILS_URL)
                .bearer_auth(&access_token)
                .send()
                .await?
                .json()
                .await?;
            emails
                .into_iter()
                .find(|entry| entry.primary && entry.verified)
                .map(|entry| entry.email)
                .ok_or_else(|| anyhow::anyhow!("no verified primary email on provider account"))?
        }
    };

    Ok(ProviderIdentity {
        provider_account_id: user.id.to_string(),
        email,
        name: user.name.or(Some(user.login)),
    })
}

fn callback_url(base_url: &str) -> String {
    format!("{}/callback/github", base_url.trim_end_matches('/'))
}

/// Provider authorize URL with the query built through [`Url`], so the
/// redirect URI and state are percent-encoded.
fn authorize_url(
    credentials: &ProviderCredentials,
    base_url: &str,
    state: &str,
) -> anyhow::Result<String> {
    let mut url = Url::parse(AUTHORIZE_URL)?;
    url.query_pairs_mut()
        .append_pair("client_id", &credentials.client_id)
        .append_pair("redirect_uri", &callback_url(base_url))
        .append_pair("scope", "read:user user:email")
        .append_pair("state", state);
    Ok(url.into())
}

fn random_state() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| anyhow::anyhow!("failed to generate oauth state: {err}"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn state_cookie(
    auth_state: &AuthState,
    state: &str,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let mut cookie = format!(
        "{STATE_COOKIE_NAME}={state}; Path=/; HttpOnly; SameSite=Lax; Max-Age={STATE_COOKIE_TTL_SECONDS}"
    );
    if auth_state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_state_cookie(
    auth_state: &AuthState,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let mut cookie =
        format!("{STATE_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if auth_state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bounce to `/signin` with an error code and drop the state cookie.
fn signin_error(code: &str, auth_state: &AuthState) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = clear_state_cookie(auth_state) {
        headers.insert(SET_COOKIE, value);
    }
    (
        headers,
        Redirect::to(&format!("/signin?error={code}")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn callback_url_strips_trailing_slash() {
        assert_eq!(
            callback_url("http://localhost:8080/"),
            "http://localhost:8080/callback/github"
        );
        assert_eq!(
            callback_url("https://auth.example.com"),
            "https://auth.example.com/callback/github"
        );
    }

    #[test]
    fn state_is_url_safe_and_unique() -> Result<()> {
        let first = random_state()?;
        let second = random_state()?;
        assert_ne!(first, second);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        Ok(())
    }

    #[test]
    fn authorize_url_percent_encodes_the_redirect_uri() -> Result<()> {
        let credentials = ProviderCredentials {
            client_id: "client-id".to_string(),
            client_secret: secrecy::SecretString::from("client-secret".to_string()),
        };
        let authorize = authorize_url(&credentials, "http://localhost:8080", "st+ate")?;
        assert!(authorize.starts_with(AUTHORIZE_URL));
        assert!(authorize.contains("client_id=client-id"));
        assert!(
            authorize.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback%2Fgithub")
        );
        assert!(authorize.contains("scope=read%3Auser+user%3Aemail"));
        assert!(authorize.contains("state=st%2Bate"));
        Ok(())
    }

    #[test]
    fn clearing_the_state_cookie_expires_it() -> Result<()> {
        let state = AuthState::new(super::super::state::AuthConfig::new(
            "http://localhost:8080".to_string(),
            secrecy::SecretString::from("test-signing-secret".to_string()),
        ));
        let cookie = clear_state_cookie(&state)?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with("janua_oauth_state=;"));
        assert!(cookie.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn provider_user_json_shapes() -> Result<()> {
        let user: GithubUser = serde_json::from_str(
            r#"{"id": 42, "login": "octocat", "name": null, "email": null}"#,
        )?;
        assert_eq!(user.id, 42);
        assert_eq!(user.login, "octocat");

        let emails: Vec<GithubEmail> = serde_json::from_str(
            r#"[
                {"email": "private@example.com", "primary": false, "verified": true},
                {"email": "main@example.com", "primary": true, "verified": true}
            ]"#,
        )?;
        let primary = emails
            .into_iter()
            .find(|entry| entry.primary && entry.verified)
            .map(|entry| entry.email);
        assert_eq!(primary.as_deref(), Some("main@example.com"));
        Ok(())
    }
}
