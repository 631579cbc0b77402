//! Database helpers for identities and linked provider accounts.
//!
//! The unique index on `users.email` is the source of truth for uniqueness;
//! handlers only do a pre-write existence check and treat SQL state 23505 as
//! a conflict when they race.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::identity::{Identity, Role};

/// Outcome when attempting to create a new identity.
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created,
    Conflict,
}

/// A full user row as fetched for authentication and admin views. The
/// password hash never leaves this module except through [`UserRecord::hash`].
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) name: Option<String>,
    pub(crate) email: String,
    password_hash: Option<String>,
    pub(crate) role: Role,
    pub(crate) email_verified: bool,
}

impl UserRecord {
    #[cfg(test)]
    pub(crate) fn for_tests(
        id: Uuid,
        name: Option<String>,
        email: String,
        password_hash: Option<String>,
        role: Role,
    ) -> Self {
        Self {
            id,
            name,
            email,
            password_hash,
            role,
            email_verified: false,
        }
    }

    pub(crate) fn hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    pub(crate) fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Strip the hash and return the sanitized principal.
    pub(crate) fn into_identity(self) -> Identity {
        Identity {
            has_password: self.password_hash.is_some(),
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role,
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, email_verified";

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    Ok(UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse().map_err(|err| anyhow!("{err}"))?,
        email_verified: row.get("email_verified"),
    })
}

/// Look up a user by exact email (no normalization).
pub(crate) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by email")?;
    row.as_ref().map(record_from_row).transpose()
}

pub(crate) async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to look up user by id")?;
    row.as_ref().map(record_from_row).transpose()
}

/// Create a new credential-based identity. Role always starts as `user`.
pub(crate) async fn insert_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = r"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
    {
        Ok(_) => Ok(SignupOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// True when another identity already uses this email.
pub(crate) async fn email_taken_by_other(
    pool: &PgPool,
    email: &str,
    user_id: Uuid,
) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM users WHERE email = $1 AND id <> $2")
        .bind(email)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to check email availability")?;
    Ok(row.is_some())
}

/// Partial profile update; absent fields keep their current value.
pub(crate) async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET name = COALESCE($1, name), email = COALESCE($2, email)
        WHERE id = $3
        RETURNING {USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(name)
        .bind(email)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to update profile")?;
    row.as_ref().map(record_from_row).transpose()
}

/// Store a new password hash; returns false when the user is gone.
pub(crate) async fn set_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to set password hash")?;
    Ok(result.rows_affected() > 0)
}

/// Resolve a linked provider account to its identity, if any.
pub(crate) async fn find_linked_user(
    pool: &PgPool,
    provider: &str,
    provider_account_id: &str,
) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT u.id, u.name, u.email, u.password_hash, u.role, u.email_verified
        FROM users u
        JOIN accounts a ON a.user_id = u.id
        WHERE a.provider = $1 AND a.provider_account_id = $2
    ";
    let row = sqlx::query(query)
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(pool)
        .await
        .context("failed to look up linked account")?;
    row.as_ref().map(record_from_row).transpose()
}

/// Create an OAuth-only identity plus its account link in one transaction.
/// The provider vouched for the email, so it is marked verified.
pub(crate) async fn insert_oauth_user(
    pool: &PgPool,
    name: Option<&str>,
    email: &str,
    provider: &str,
    provider_account_id: &str,
) -> Result<UserRecord> {
    let mut tx = pool.begin().await.context("begin oauth signup transaction")?;

    let query = format!(
        r"
        INSERT INTO users (name, email, email_verified)
        VALUES ($1, $2, true)
        RETURNING {USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(name)
        .bind(email)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert oauth user")?;
    let record = record_from_row(&row)?;

    sqlx::query(
        r"
        INSERT INTO accounts (user_id, provider, provider_account_id)
        VALUES ($1, $2, $3)
        ",
    )
    .bind(record.id)
    .bind(provider)
    .bind(provider_account_id)
    .execute(&mut *tx)
    .await
    .context("failed to link provider account")?;

    tx.commit().await.context("commit oauth signup transaction")?;

    Ok(record)
}

/// List all users for the admin panel, newest first.
pub(crate) async fn list_users(pool: &PgPool) -> Result<Vec<(UserRecord, String)>> {
    let query = format!(
        r#"
        SELECT {USER_COLUMNS},
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
        FROM users
        ORDER BY created_at DESC
        "#
    );
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .await
        .context("failed to list users")?;
    rows.iter()
        .map(|row| Ok((record_from_row(row)?, row.get("created_at"))))
        .collect()
}

/// Assign a role; returns false when the user does not exist. This is the
/// only write path for `role`.
pub(crate) async fn set_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
        .bind(role.as_str())
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to set role")?;
    Ok(result.rows_affected() > 0)
}

/// Delete an identity; linked accounts cascade.
pub(crate) async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to delete user")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Same check through an `anyhow` chain (context-wrapped storage errors).
pub(crate) fn is_unique_violation_anyhow(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .is_some_and(is_unique_violation)
}

#[cfg(test)]
mod tests {
    use super::{is_unique_violation, is_unique_violation_anyhow};
    use anyhow::Context;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
        message: &'static str,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError {
            code,
            message: "duplicate key value violates unique constraint",
        }))
    }

    #[test]
    fn sqlstate_23505_is_a_unique_violation() {
        assert!(is_unique_violation(&db_error(Some("23505"))));
    }

    #[test]
    fn other_sqlstates_are_not_unique_violations() {
        assert!(!is_unique_violation(&db_error(Some("23503"))));
        assert!(!is_unique_violation(&db_error(None)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn unique_violation_survives_anyhow_context() {
        let wrapped = anyhow::Error::from(db_error(Some("23505")))
            .context("failed to update profile");
        assert!(is_unique_violation_anyhow(&wrapped));

        let other: Result<(), anyhow::Error> =
            Err(db_error(Some("40001")).into());
        let other = other.context("failed to update profile").unwrap_err();
        assert!(!is_unique_violation_anyhow(&other));
        assert!(!is_unique_violation_anyhow(&anyhow::anyhow!("not a db error")));
    }
}
