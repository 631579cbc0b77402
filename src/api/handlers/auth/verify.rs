//! Credential verification against stored password hashes.
//!
//! Read-only; there is no lockout or rate limiting here (documented backlog
//! item). Rejection reasons stay specific for server-side logs and collapse
//! to a single generic message at the session boundary.

use sqlx::PgPool;
use tracing::debug;

use super::identity::Identity;
use super::password;
use super::storage::{find_user_by_email, UserRecord};
use super::validate::validate_signin;

/// Why a credential pair was rejected. Never shown to the end user; the
/// sign-in handler surfaces all of these as "Invalid credentials".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// Schema validation failed before any storage access.
    Malformed,
    /// No identity with that email.
    NotFound,
    /// Identity exists but is OAuth-only (no password hash). Distinct from a
    /// wrong password in logs only.
    NoPassword,
    /// Hash comparison failed.
    WrongPassword,
}

impl Rejection {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::NotFound => "not_found",
            Self::NoPassword => "no_password",
            Self::WrongPassword => "wrong_password",
        }
    }
}

#[derive(Debug)]
pub(crate) enum VerifyError {
    Rejected(Rejection),
    Storage(anyhow::Error),
}

impl From<Rejection> for VerifyError {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

/// Pure check of a password against a fetched record. Split from the lookup
/// so it can be exercised without a database.
pub(crate) fn check_credentials(
    record: UserRecord,
    supplied_password: &str,
) -> Result<Identity, VerifyError> {
    let Some(stored_hash) = record.hash() else {
        return Err(Rejection::NoPassword.into());
    };
    if !password::matches(supplied_password, stored_hash).map_err(VerifyError::Storage)? {
        return Err(Rejection::WrongPassword.into());
    }
    Ok(record.into_identity())
}

/// Verify an email/password pair. Malformed input is rejected before the
/// lookup; the email is matched exactly as supplied.
pub(crate) async fn verify(
    pool: &PgPool,
    email: &str,
    supplied_password: &str,
) -> Result<Identity, VerifyError> {
    if let Err(reason) = validate_signin(email, supplied_password) {
        debug!("credential validation failed: {reason}");
        return Err(Rejection::Malformed.into());
    }

    let record = find_user_by_email(pool, email)
        .await
        .map_err(VerifyError::Storage)?
        .ok_or(Rejection::NotFound)?;

    check_credentials(record, supplied_password)
}
