//! Per-request route access policy.
//!
//! A flat, stateless classifier: given the request path and the decoded
//! identity (if any), decide whether to let the request through or bounce it.
//! Each evaluation is independent and idempotent for the same (path, token)
//! pair. Non-admins hitting the admin prefix are redirected to sign-in, not
//! shown a forbidden page.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use super::identity::Identity;
use super::session::presented_token;
use super::state::AuthState;

pub(crate) const HOME_ROUTE: &str = "/";
pub(crate) const SIGNIN_ROUTE: &str = "/signin";

/// Reachable by anyone, signed in or not.
const PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/health",
    "/session",
    "/signin/github",
    "/callback/github",
];

/// Served without auth so the docs stay reachable.
const PUBLIC_PREFIXES: &[&str] = &["/docs", "/api-docs"];

/// Reachable only by the unauthenticated; signed-in users are sent home.
const AUTH_ROUTES: &[&str] = &["/signin", "/signup"];

const ADMIN_PREFIX: &str = "/admin";

/// Disposition of a request after policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Allow,
    /// Signed-in user on an auth-only route.
    ToHome,
    /// Missing identity on a protected route, or insufficient role on an
    /// admin route.
    ToSignin,
}

/// Classify a path against the current identity. Every path belongs to at
/// most one of the explicit sets; anything not public or auth-only requires
/// authentication, and the admin prefix additionally requires the role.
pub(crate) fn evaluate(path: &str, identity: Option<&Identity>) -> Disposition {
    if PUBLIC_ROUTES.contains(&path)
        || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
    {
        return Disposition::Allow;
    }

    if AUTH_ROUTES.contains(&path) {
        return if identity.is_some() {
            Disposition::ToHome
        } else {
            Disposition::Allow
        };
    }

    let Some(identity) = identity else {
        return Disposition::ToSignin;
    };

    if path.starts_with(ADMIN_PREFIX) && !identity.role.is_admin() {
        return Disposition::ToSignin;
    }

    Disposition::Allow
}

/// Middleware applying [`evaluate`] to every request.
///
/// Decodes any presented token once, stashes the identity in request
/// extensions for handlers, and converts redirect dispositions into 303s.
/// An invalid or expired token is treated exactly like no token.
pub(crate) async fn route_guard(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = presented_token(request.headers())
        .and_then(|token| auth_state.codec().decode(&token).ok());

    let disposition = evaluate(request.uri().path(), identity.as_ref());

    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }

    match disposition {
        Disposition::Allow => next.run(request).await,
        Disposition::ToHome => Redirect::to(HOME_ROUTE).into_response(),
        Disposition::ToSignin => Redirect::to(SIGNIN_ROUTE).into_response(),
    }
}
