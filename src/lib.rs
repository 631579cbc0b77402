//! # Janua
//!
//! Stateless session authentication service: credential and GitHub OAuth
//! sign-in, signed client-held session tokens, and role-gated user
//! management.
//!
//! ## Sessions
//!
//! There is no server-side session store. A signed HS256 token carried in an
//! `HttpOnly` cookie (or bearer header) is the sole source of truth for "who
//! is logged in" on every request. Tokens embed an identity snapshot (id,
//! role, password-presence flag, name, email) plus issued-at/expiry.
//!
//! - **No revocation:** a token stays valid until natural expiry; admin-side
//!   changes surface on the holder's next refresh or sign-in.
//! - **Refresh allow-list:** only name, email, and the password-presence
//!   flag are update-eligible through the refresh path. Id and role are
//!   carried forward from the existing token unconditionally.
//!
//! ## Route policy
//!
//! Every request passes a flat, stateless classifier before any handler
//! runs: public routes are open to all, auth-only routes (`/signin`,
//! `/signup`) bounce the signed-in home, the `/admin` prefix requires the
//! admin role, and everything else requires authentication.
//!
//! ## Account linking
//!
//! Provider sign-in never links to an existing identity by email alone; an
//! unlinked match fails with `AccountNotLinked` instead of silently merging.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
