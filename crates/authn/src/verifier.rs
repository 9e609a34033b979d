//! Bearer-token verification.
//!
//! [`TokenVerifier`] is the crate's entry point. It inspects a token's
//! header, dispatches on the declared algorithm, and checks the signature
//! and registered claims:
//!
//! - `ES256` tokens verify against the provider's published keys, served
//!   through the [`JwksCache`]. The header's `kid` is an ordering hint
//!   only; a token that fails against the hinted key is still tried against
//!   every other cached key, and against a freshly fetched set once, so
//!   tokens signed during a key rotation keep verifying.
//! - `HS256` tokens verify against the configured shared secret. This path
//!   exists for tokens minted before the ES256 migration and does no key
//!   fetching at all.
//!
//! Any other algorithm, including `none`, is rejected before any
//! cryptographic work happens.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::{
    claims::Claims,
    config::VerifierConfig,
    error::{AuthError, Result},
    fetcher::{HttpKeyFetcher, KeyFetcher},
    jwks::KeySet,
    key_cache::JwksCache,
};

/// The part of a JOSE header the dispatcher needs.
///
/// Decoded by hand rather than through [`jsonwebtoken::decode_header`] so
/// that an unrecognized `alg` value ends up classified as an unsupported
/// algorithm instead of a parse failure.
#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Parses the first segment of a compact JWT.
fn decode_header(token: &str) -> Result<TokenHeader> {
    let mut segments = token.split('.');
    let header_b64 = match segments.next() {
        Some(segment) if !segment.is_empty() => segment,
        _ => return Err(AuthError::malformed_token("empty token header segment")),
    };
    if segments.count() != 2 {
        return Err(AuthError::malformed_token("token must have exactly three segments"));
    }

    // Tolerate padded base64url even though RFC 7515 forbids the padding.
    let raw = URL_SAFE_NO_PAD
        .decode(header_b64.trim_end_matches('='))
        .map_err(|err| AuthError::malformed_token(format!("header is not base64url: {err}")))?;
    serde_json::from_slice(&raw)
        .map_err(|err| AuthError::malformed_token(format!("header is not valid JSON: {err}")))
}

/// Verifies bearer tokens against published keys and the legacy secret.
///
/// Cheap to share behind an `Arc`; all internal state is the key cache.
pub struct TokenVerifier {
    cache: JwksCache,
    legacy_secret: Option<Zeroizing<String>>,
}

impl TokenVerifier {
    /// Creates a verifier that fetches keys over HTTPS per the config.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(config: VerifierConfig) -> Result<Self> {
        let fetcher =
            HttpKeyFetcher::with_timeout(config.jwks_url().to_owned(), config.fetch_timeout())?;
        Ok(Self::with_fetcher(Arc::new(fetcher), config))
    }

    /// Creates a verifier over an arbitrary fetcher. Used by tests and by
    /// callers that already have a key source.
    #[must_use]
    pub fn with_fetcher(fetcher: Arc<dyn KeyFetcher>, config: VerifierConfig) -> Self {
        let (cache_ttl, legacy_secret) = config.into_parts();
        Self { cache: JwksCache::new(fetcher, cache_ttl), legacy_secret }
    }

    /// The underlying key cache, for warm-up and observability.
    #[must_use]
    pub fn cache(&self) -> &JwksCache {
        &self.cache
    }

    /// Verifies a compact JWT and returns its claims.
    ///
    /// When `expected_audience` is `Some`, the token must carry an `aud`
    /// claim matching it; when `None`, the audience claim is ignored
    /// entirely.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] when the token is not a three-part
    ///   JWT with a decodable header.
    /// - [`AuthError::UnsupportedAlgorithm`] for any `alg` other than
    ///   `ES256` or `HS256`.
    /// - [`AuthError::TokenExpired`] / [`AuthError::InvalidAudience`] when
    ///   the signature checked out but a registered claim did not.
    /// - [`AuthError::AllKeysFailed`] when no published key verifies the
    ///   signature, even after one forced refresh.
    /// - [`AuthError::Configuration`] for an `HS256` token with no shared
    ///   secret configured.
    /// - [`AuthError::KeysFetch`] when keys cannot be fetched and none are
    ///   cached.
    #[tracing::instrument(skip_all, fields(alg, kid))]
    pub async fn verify(&self, token: &str, expected_audience: Option<&str>) -> Result<Claims> {
        let header = decode_header(token)?;
        let span = tracing::Span::current();
        span.record("alg", header.alg.as_str());
        if let Some(kid) = header.kid.as_deref() {
            span.record("kid", kid);
        }

        match header.alg.as_str() {
            "ES256" => self.verify_es256(token, header.kid.as_deref(), expected_audience).await,
            "HS256" => self.verify_hs256(token, expected_audience),
            other => Err(AuthError::unsupported_algorithm(other)),
        }
    }

    /// Published-keys path. Tries the hinted key, then every other cached
    /// key, then refreshes once and tries the new set.
    async fn verify_es256(
        &self,
        token: &str,
        kid_hint: Option<&str>,
        expected_audience: Option<&str>,
    ) -> Result<Claims> {
        let validation = build_validation(Algorithm::ES256, expected_audience);
        let mut tried = 0usize;
        let mut last_error = String::from("no verification keys available");

        let set = self.cache.key_set().await?;
        if let Some(data) =
            try_key_set(token, &validation, &set, kid_hint, &mut tried, &mut last_error)?
        {
            return Ok(data.claims);
        }

        // The cached set may be one rotation behind the token. Refresh once;
        // concurrent failures collapse into a single fetch inside the cache.
        let refreshed = self.cache.force_refresh(&set).await?;
        if !Arc::ptr_eq(&refreshed, &set) {
            if let Some(data) =
                try_key_set(token, &validation, &refreshed, kid_hint, &mut tried, &mut last_error)?
            {
                tracing::info!("token verified against refreshed key set");
                return Ok(data.claims);
            }
        }

        Err(AuthError::all_keys_failed(tried, last_error))
    }

    /// Legacy shared-secret path.
    fn verify_hs256(&self, token: &str, expected_audience: Option<&str>) -> Result<Claims> {
        let secret = self.legacy_secret.as_ref().ok_or_else(|| {
            AuthError::configuration("received an HS256 token but no legacy secret is configured")
        })?;
        let key = DecodingKey::from_secret(secret.as_bytes());
        let validation = build_validation(Algorithm::HS256, expected_audience);
        let data = jsonwebtoken::decode::<Claims>(token, &key, &validation)?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("legacy_secret", &self.legacy_secret.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

fn build_validation(alg: Algorithm, expected_audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(alg);
    match expected_audience {
        Some(aud) => {
            validation.set_audience(&[aud]);
            // `set_audience` alone only compares the claim when present;
            // enforcement also requires a token without `aud` to reject.
            validation.required_spec_claims.insert("aud".to_owned());
        },
        None => validation.validate_aud = false,
    }
    validation.validate_nbf = false;
    validation
}

/// Attempts verification against every key in `set`, hinted `kid` first.
///
/// Returns `Ok(Some(_))` on success and `Ok(None)` when every key produced
/// a signature mismatch. Any other failure is terminal: the library checks
/// the signature before the registered claims, so an expiry or audience
/// error proves some key already validated the signature and trying further
/// keys cannot change the outcome.
fn try_key_set(
    token: &str,
    validation: &Validation,
    set: &KeySet,
    kid_hint: Option<&str>,
    tried: &mut usize,
    last_error: &mut String,
) -> Result<Option<TokenData<Claims>>> {
    let hinted = kid_hint.and_then(|kid| set.get(kid).map(|key| (kid, key)));
    let rest = set.iter().filter(|(kid, _)| Some(*kid) != kid_hint);

    for (kid, key) in hinted.into_iter().chain(rest) {
        match jsonwebtoken::decode::<Claims>(token, key, validation) {
            Ok(data) => return Ok(Some(data)),
            Err(err) => {
                let mapped = AuthError::from(err);
                if mapped.is_signature_mismatch() {
                    *tried += 1;
                    *last_error = format!("key {kid}: {mapped}");
                } else {
                    return Err(mapped);
                }
            },
        }
    }
    Ok(None)
}
