//! The authenticated principal and the allow-list of token-updatable fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role carried inside the session token. Defaults to `user` at creation and
/// is only ever changed through the admin endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Sanitized authenticated principal. Never carries the password hash; only
/// whether one exists (`has_password` is false for OAuth-only identities).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub has_password: bool,
}

/// Fields a client may overwrite through the session refresh path. Id and
/// role are absent by construction, so a refresh payload cannot express a
/// privilege escalation; extraneous fields in the payload are ignored while
/// the eligible ones still apply.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub has_password: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn role_round_trips_through_serde() -> Result<()> {
        assert_eq!(serde_json::to_value(Role::Admin)?, "admin");
        assert_eq!(serde_json::from_value::<Role>("user".into())?, Role::User);
        Ok(())
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(Role::default(), Role::User);
        assert!(!Role::default().is_admin());
    }

    #[test]
    fn session_patch_ignores_extraneous_fields() -> Result<()> {
        let raw = r#"{"name":"New Name","role":"admin","sub":"x"}"#;
        let patch: SessionPatch = serde_json::from_str(raw)?;
        assert_eq!(patch.name.as_deref(), Some("New Name"));
        assert!(patch.email.is_none());
        assert!(patch.has_password.is_none());
        Ok(())
    }
}
