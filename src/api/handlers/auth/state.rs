//! Auth configuration and shared per-request state.

use secrecy::SecretString;
use url::Url;

use super::token::TokenCodec;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 12 * 60 * 60;

/// GitHub OAuth application credentials. Absent when provider sign-in is not
/// configured.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Clone)]
pub struct AuthConfig {
    base_url: String,
    token_secret: SecretString,
    token_ttl_seconds: i64,
    github: Option<ProviderCredentials>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String, token_secret: SecretString) -> Self {
        Self {
            base_url,
            token_secret,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            github: None,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_github(mut self, credentials: Option<ProviderCredentials>) -> Self {
        self.github = credentials;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    pub(crate) fn github(&self) -> Option<&ProviderCredentials> {
        self.github.as_ref()
    }

    /// Cookies are only marked Secure when the service is served over HTTPS.
    pub(crate) fn cookie_secure(&self) -> bool {
        Url::parse(&self.base_url).is_ok_and(|url| url.scheme() == "https")
    }
}

/// Shared auth state attached to the router: configuration plus the token
/// codec built from the signing secret.
pub struct AuthState {
    config: AuthConfig,
    codec: TokenCodec,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let codec = TokenCodec::new(&config.token_secret, config.token_ttl_seconds);
        Self { config, codec }
    }

    pub(crate) fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn codec(&self) -> &TokenCodec {
        &self.codec
    }
}
