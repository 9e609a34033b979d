//! Verifier configuration.
//!
//! A [`VerifierConfig`] names the key provider, the cache TTL, and the
//! optional legacy shared secret. Build one programmatically through
//! [`VerifierConfig::builder`] or from the environment through
//! [`VerifierConfig::from_env`].

use std::time::Duration;

use zeroize::Zeroizing;

use crate::{
    error::{AuthError, Result},
    fetcher::DEFAULT_FETCH_TIMEOUT,
    key_cache::DEFAULT_CACHE_TTL,
};

/// Base URL of the auth provider; the published-keys URL is derived from it.
pub const ENV_PROVIDER_URL: &str = "AUTH_PROVIDER_URL";
/// Explicit published-keys URL. Overrides the derived one when set.
pub const ENV_JWKS_URL: &str = "AUTH_JWKS_URL";
/// Key cache TTL in seconds.
pub const ENV_CACHE_TTL_SECS: &str = "AUTH_CACHE_TTL_SECS";
/// Shared secret for legacy HS256 tokens.
pub const ENV_LEGACY_SECRET: &str = "AUTH_LEGACY_SECRET";

/// Path under the provider base URL where keys are published.
const JWKS_WELL_KNOWN_PATH: &str = "/.well-known/jwks.json";

/// Settings for a [`TokenVerifier`](crate::TokenVerifier).
pub struct VerifierConfig {
    jwks_url: String,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    legacy_secret: Option<Zeroizing<String>>,
}

impl VerifierConfig {
    /// Starts a builder for the given provider base URL.
    ///
    /// The published-keys URL defaults to the provider's
    /// `/.well-known/jwks.json` endpoint.
    #[must_use]
    pub fn builder(provider_url: impl Into<String>) -> VerifierConfigBuilder {
        let base: String = provider_url.into();
        VerifierConfigBuilder {
            jwks_url: format!("{}{JWKS_WELL_KNOWN_PATH}", base.trim_end_matches('/')),
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            legacy_secret: None,
        }
    }

    /// Reads configuration from the process environment.
    ///
    /// Either [`ENV_PROVIDER_URL`] or [`ENV_JWKS_URL`] must be set; the
    /// explicit keys URL wins when both are. [`ENV_CACHE_TTL_SECS`] and
    /// [`ENV_LEGACY_SECRET`] are optional.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when no URL is configured or
    /// the TTL is not an integer number of seconds.
    pub fn from_env() -> Result<Self> {
        let provider = read_env(ENV_PROVIDER_URL);
        let jwks_override = read_env(ENV_JWKS_URL);

        let mut builder = match (&provider, &jwks_override) {
            (_, Some(url)) => {
                let mut b = Self::builder("");
                b.jwks_url = url.clone();
                b
            },
            (Some(base), None) => Self::builder(base.clone()),
            (None, None) => {
                return Err(AuthError::configuration(format!(
                    "either {ENV_PROVIDER_URL} or {ENV_JWKS_URL} must be set"
                )));
            },
        };

        if let Some(ttl) = read_env(ENV_CACHE_TTL_SECS) {
            let secs: u64 = ttl.parse().map_err(|_| {
                AuthError::configuration(format!(
                    "{ENV_CACHE_TTL_SECS} must be an integer number of seconds, got {ttl:?}"
                ))
            })?;
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }
        if let Some(secret) = read_env(ENV_LEGACY_SECRET) {
            builder = builder.legacy_secret(secret);
        }

        Ok(builder.build())
    }

    /// The URL keys are fetched from.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// How long a fetched key set is considered fresh.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Per-request timeout for key fetches.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Whether a legacy HS256 secret is configured.
    #[must_use]
    pub fn has_legacy_secret(&self) -> bool {
        self.legacy_secret.is_some()
    }

    pub(crate) fn into_parts(self) -> (Duration, Option<Zeroizing<String>>) {
        (self.cache_ttl, self.legacy_secret)
    }
}

impl std::fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("jwks_url", &self.jwks_url)
            .field("cache_ttl", &self.cache_ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("legacy_secret", &self.legacy_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Builder returned by [`VerifierConfig::builder`].
#[must_use]
pub struct VerifierConfigBuilder {
    jwks_url: String,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    legacy_secret: Option<Zeroizing<String>>,
}

impl VerifierConfigBuilder {
    /// Overrides the derived published-keys URL with an explicit one.
    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    /// Sets the key cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the key fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enables the legacy HS256 path with the given shared secret.
    pub fn legacy_secret(mut self, secret: impl Into<String>) -> Self {
        self.legacy_secret = Some(Zeroizing::new(secret.into()));
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> VerifierConfig {
        VerifierConfig {
            jwks_url: self.jwks_url,
            cache_ttl: self.cache_ttl,
            fetch_timeout: self.fetch_timeout,
            legacy_secret: self.legacy_secret,
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
