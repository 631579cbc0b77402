//! Session token codec: HS256-signed, client-held tokens.
//!
//! The token is the only session state; the server stores nothing. Claims
//! carry an identity snapshot plus issued-at/expiry. There is no revocation:
//! a token stays valid until natural expiry, so server-side changes (e.g. an
//! admin role edit) only surface on the next refresh or sign-in.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::{Identity, Role, SessionPatch};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TokenError {
    /// Signature failure, expiry, or malformed input. Callers must treat
    /// this identically to "no session" and never tell the client which.
    Invalid,
    /// Re-signing failed; an internal fault, not a client problem.
    Encoding(String),
}

/// Exactly the fields embedded in the token, nothing else.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    role: Role,
    /// Password-presence flag; false for OAuth-only identities.
    hsp: bool,
    name: Option<String>,
    email: String,
    iat: i64,
    exp: i64,
}

pub(crate) struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl TokenCodec {
    pub(crate) fn new(secret: &SecretString, ttl_seconds: i64) -> Self {
        let secret = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        // No leeway: expired means expired.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_seconds,
        }
    }

    pub(crate) const fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Mint a token for a verified identity. Only called after server-side
    /// verification; this is the sole path that sets id and role.
    pub(crate) fn encode(&self, identity: &Identity) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        self.sign(&Claims {
            sub: identity.id,
            role: identity.role,
            hsp: identity.has_password,
            name: identity.name.clone(),
            email: identity.email.clone(),
            iat: now,
            exp: now + self.ttl_seconds,
        })
    }

    /// Validate a presented token and return the identity snapshot it holds.
    /// Every failure collapses to [`TokenError::Invalid`].
    pub(crate) fn decode(&self, token: &str) -> Result<Identity, TokenError> {
        self.decode_claims(token).map(|claims| Identity {
            id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            has_password: claims.hsp,
        })
    }

    /// Apply a client-supplied patch to an existing token and re-sign it.
    ///
    /// Only name, email, and the password-presence flag are update-eligible.
    /// Id, role, and the timestamp pair are carried forward from the existing
    /// token unconditionally; the expiry is never extended on refresh.
    pub(crate) fn refresh(&self, token: &str, patch: &SessionPatch) -> Result<String, TokenError> {
        let mut claims = self.decode_claims(token)?;
        if let Some(name) = &patch.name {
            claims.name = Some(name.clone());
        }
        if let Some(email) = &patch.email {
            claims.email = email.clone();
        }
        if let Some(has_password) = patch.has_password {
            claims.hsp = has_password;
        }
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|err| TokenError::Encoding(err.to_string()))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    fn codec() -> TokenCodec {
        TokenCodec::new(&SecretString::from("test-signing-secret".to_string()), 3600)
    }

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: Some("Alice".to_string()),
            email: "alice@example.com".to_string(),
            role: Role::User,
            has_password: true,
        }
    }

    #[test]
    fn round_trip_preserves_every_field() -> Result<()> {
        let codec = codec();
        let identity = identity();
        let token = codec.encode(&identity).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let decoded = codec.decode(&token).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(decoded, identity);
        Ok(())
    }

    #[test]
    fn tampered_token_is_invalid() -> Result<()> {
        let codec = codec();
        let token = codec.encode(&identity()).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        // Flip one character in each segment of the token.
        let segment_starts: Vec<usize> = {
            let mut starts = vec![0];
            starts.extend(token.match_indices('.').map(|(index, _)| index + 1));
            starts
        };
        for start in segment_starts {
            let mut bytes = token.clone().into_bytes();
            bytes[start] = if bytes[start] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).context("tampered token not utf8")?;
            assert_eq!(codec.decode(&tampered), Err(TokenError::Invalid));
        }
        Ok(())
    }

    #[test]
    fn wrong_secret_is_invalid() -> Result<()> {
        let token = codec()
            .encode(&identity())
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let other = TokenCodec::new(&SecretString::from("another-secret".to_string()), 3600);
        assert_eq!(other.decode(&token), Err(TokenError::Invalid));
        Ok(())
    }

    #[test]
    fn expired_token_is_invalid() -> Result<()> {
        let expired = TokenCodec::new(&SecretString::from("test-signing-secret".to_string()), -60);
        let token = expired
            .encode(&identity())
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(expired.decode(&token), Err(TokenError::Invalid));
        Ok(())
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(codec().decode("not-a-token"), Err(TokenError::Invalid));
        assert_eq!(codec().decode(""), Err(TokenError::Invalid));
    }

    #[test]
    fn refresh_updates_only_eligible_fields() -> Result<()> {
        let codec = codec();
        let original = identity();
        let token = codec.encode(&original).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let patch = SessionPatch {
            name: Some("Alice Cooper".to_string()),
            email: Some("cooper@example.com".to_string()),
            has_password: Some(false),
        };
        let refreshed = codec
            .refresh(&token, &patch)
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let decoded = codec
            .decode(&refreshed)
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.role, original.role);
        assert_eq!(decoded.name.as_deref(), Some("Alice Cooper"));
        assert_eq!(decoded.email, "cooper@example.com");
        assert!(!decoded.has_password);
        Ok(())
    }

    #[test]
    fn refresh_does_not_extend_expiry() -> Result<()> {
        let codec = codec();
        let token = codec.encode(&identity()).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let original = codec.decode_claims(&token).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let refreshed = codec
            .refresh(&token, &SessionPatch::default())
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let claims = codec
            .decode_claims(&refreshed)
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(claims.exp, original.exp);
        assert_eq!(claims.iat, original.iat);
        Ok(())
    }

    #[test]
    fn refresh_of_invalid_token_fails() {
        let result = codec().refresh("junk", &SessionPatch::default());
        assert_eq!(result, Err(TokenError::Invalid));
    }

    #[test]
    fn patch_with_extraneous_role_still_applies_eligible_fields() -> Result<()> {
        // The patch type has no role or id field, so a refresh payload cannot
        // express an escalation; a payload carrying them anyway is not
        // rejected, the eligible fields still apply.
        let codec = codec();
        let original = identity();
        let token = codec.encode(&original).map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let patch: SessionPatch =
            serde_json::from_str(r#"{"name":"New Name","role":"admin","sub":"x"}"#)?;
        let refreshed = codec
            .refresh(&token, &patch)
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        let decoded = codec
            .decode(&refreshed)
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(decoded.name.as_deref(), Some("New Name"));
        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.role, original.role);
        assert_eq!(decoded.email, original.email);
        Ok(())
    }
}
