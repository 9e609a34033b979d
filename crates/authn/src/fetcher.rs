//! Fetching published keys from the provider.
//!
//! [`KeyFetcher`] is the seam between the cache and the network: the cache
//! only ever sees a list of raw [`Jwk`] descriptors, so tests inject a mock
//! fetcher and production wires up [`HttpKeyFetcher`] against the provider's
//! JWKS endpoint.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{AuthError, Result},
    jwks::{Jwk, JwkSet},
};

/// Bounded total timeout for one published-keys fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of published key descriptors.
///
/// Implementations perform exactly one fetch per call and never touch the
/// cache; staleness and retry policy live in
/// [`JwksCache`](crate::key_cache::JwksCache).
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetches the currently published key descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeysFetch`] on any transport failure, non-success
    /// status, or unparseable body.
    async fn fetch_keys(&self) -> Result<Vec<Jwk>>;
}

/// HTTP fetcher for the provider's JWKS endpoint.
///
/// One `GET {jwks_url}` per call with a bounded total timeout
/// ([`DEFAULT_FETCH_TIMEOUT`]). A timed-out or failed fetch is an error for
/// this call only; it does not poison anything the cache already holds.
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    jwks_url: String,
}

impl HttpKeyFetcher {
    /// Creates a fetcher for the given JWKS URL with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the underlying HTTP client
    /// cannot be constructed (e.g. no TLS backend available).
    pub fn new(jwks_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(jwks_url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a fetcher with an explicit total request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn with_timeout(jwks_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client, jwks_url: jwks_url.into() })
    }

    /// The JWKS URL this fetcher targets.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    #[tracing::instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch_keys(&self) -> Result<Vec<Jwk>> {
        let response = self.client.get(&self.jwks_url).send().await.map_err(|e| {
            AuthError::keys_fetch(format!("GET '{}' failed: {e}", self.jwks_url))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::keys_fetch(format!(
                "GET '{}' returned status {status}",
                self.jwks_url
            )));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            AuthError::keys_fetch(format!("invalid JWKS body from '{}': {e}", self.jwks_url))
        })?;

        tracing::debug!(key_count = jwks.keys.len(), "fetched published keys");
        Ok(jwks.keys)
    }
}
