//! Input validation for auth payloads, checked before any database access.

use regex::Regex;

pub(crate) const PASSWORD_MIN: usize = 8;
pub(crate) const PASSWORD_MAX: usize = 32;
const NAME_MAX: usize = 50;

/// Basic email format check. Lookups use the address exactly as supplied, no
/// normalization.
pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Password length policy (8-32 characters).
pub(crate) fn valid_password(password: &str) -> bool {
    (PASSWORD_MIN..=PASSWORD_MAX).contains(&password.chars().count())
}

/// Validate a credential sign-in payload. Returns the first violation so the
/// caller can reject without touching storage.
pub(crate) fn validate_signin(email: &str, password: &str) -> Result<(), &'static str> {
    if email.is_empty() || !valid_email(email) {
        return Err("Invalid email");
    }
    if !valid_password(password) {
        return Err("Password must be between 8 and 32 characters");
    }
    Ok(())
}

/// Validate a sign-up payload (name, email, password and its confirmation).
pub(crate) fn validate_signup(
    name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Name is required");
    }
    if name.chars().count() > NAME_MAX {
        return Err("Name must be less than 50 characters");
    }
    validate_signin(email, password)?;
    if password != confirm_password {
        return Err("Passwords don't match");
    }
    Ok(())
}

/// Validate a new password and its confirmation (profile and admin resets).
pub(crate) fn validate_new_password(
    new_password: &str,
    confirm_new_password: &str,
) -> Result<(), &'static str> {
    if !valid_password(new_password) {
        return Err("Password must be between 8 and 32 characters");
    }
    if new_password != confirm_new_password {
        return Err("Passwords don't match");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(valid_email("a@b.com"));
        assert!(valid_email("user+tag@example.co.uk"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!valid_email(""));
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("two@@example.com  "));
        assert!(!valid_email("spaces in@example.com"));
    }

    #[test]
    fn password_length_bounds() {
        assert!(!valid_password("short7!"));
        assert!(valid_password("password1"));
        assert!(valid_password(&"x".repeat(32)));
        assert!(!valid_password(&"x".repeat(33)));
    }

    #[test]
    fn signin_rejects_before_lookup() {
        assert!(validate_signin("a@b.com", "password1").is_ok());
        assert_eq!(validate_signin("not-an-email", "password1"), Err("Invalid email"));
        assert!(validate_signin("a@b.com", "short").is_err());
    }

    #[test]
    fn signup_checks_name_and_confirmation() {
        assert!(validate_signup("Alice", "a@b.com", "password1", "password1").is_ok());
        assert_eq!(
            validate_signup("", "a@b.com", "password1", "password1"),
            Err("Name is required")
        );
        assert_eq!(
            validate_signup("Alice", "a@b.com", "password1", "password2"),
            Err("Passwords don't match")
        );
        assert!(validate_signup(&"n".repeat(51), "a@b.com", "password1", "password1").is_err());
    }

    #[test]
    fn new_password_confirmation() {
        assert!(validate_new_password("password1", "password1").is_ok());
        assert!(validate_new_password("password1", "password2").is_err());
        assert!(validate_new_password("short", "short").is_err());
    }
}
