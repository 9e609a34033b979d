//! Authentication error types.
//!
//! Every rejected verification path maps to a distinct [`AuthError`] variant
//! so callers can decide on user-facing behavior (e.g. "log in again" for
//! [`AuthError::TokenExpired`] versus "service misconfigured" for
//! [`AuthError::Configuration`]).

use thiserror::Error;

/// Bearer-token verification errors.
///
/// All variants are terminal from the verifier's point of view — the verifier
/// never retries a rejected token itself; retry decisions belong to the
/// caller.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Token structure or header cannot be parsed.
    #[error("malformed token: {message}")]
    MalformedToken {
        /// What failed to parse.
        message: String,
    },

    /// Declared algorithm is neither ES256 nor HS256.
    #[error("unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// The algorithm string from the unverified header.
        algorithm: String,
    },

    /// Required configuration (shared secret, JWKS URL) is missing for the
    /// requested verification path.
    #[error("configuration error: {message}")]
    Configuration {
        /// Which setting is missing or invalid.
        message: String,
    },

    /// Signature verified but the token's expiration has passed.
    ///
    /// Expiration short-circuits further key attempts: an expired token is
    /// expired under every key.
    #[error("token expired")]
    TokenExpired,

    /// Claims verified but the audience check failed under enforced mode.
    ///
    /// Callers that intentionally issue audience-less tokens during
    /// migration may retry in non-enforced mode.
    #[error("invalid audience: {message}")]
    InvalidAudience {
        /// Expected/actual mismatch detail.
        message: String,
    },

    /// Signature did not match the key that was tried.
    ///
    /// On the asymmetric path this is a per-key outcome and falls through to
    /// the next key; it is surfaced directly only on the legacy symmetric
    /// path (wrong shared secret).
    #[error("invalid signature")]
    InvalidSignature,

    /// The asymmetric path exhausted the cached key set and one forced
    /// refresh without a valid signature.
    #[error("no published key verified the token (tried {tried} keys): {last_error}")]
    AllKeysFailed {
        /// Number of distinct verification attempts.
        tried: usize,
        /// The last concrete error seen, for diagnostics.
        last_error: String,
    },

    /// Network or parse failure talking to the published-keys endpoint.
    ///
    /// Surfaced only when no previously fetched key set exists to fall back
    /// on; with a warm cache the fetch failure is logged and the stale set
    /// keeps serving.
    #[error("failed to fetch published keys: {message}")]
    KeysFetch {
        /// Transport or parse detail.
        message: String,
    },

    /// A published key descriptor declares a family or curve this verifier
    /// does not support (only EC / P-256 is accepted).
    #[error("unsupported key descriptor: {message}")]
    UnsupportedKey {
        /// Which field was unsupported or malformed.
        message: String,
    },
}

impl AuthError {
    /// Creates a [`AuthError::MalformedToken`] error.
    pub fn malformed_token(message: impl Into<String>) -> Self {
        AuthError::MalformedToken { message: message.into() }
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`] error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        AuthError::UnsupportedAlgorithm { algorithm: algorithm.into() }
    }

    /// Creates an [`AuthError::Configuration`] error.
    pub fn configuration(message: impl Into<String>) -> Self {
        AuthError::Configuration { message: message.into() }
    }

    /// Creates an [`AuthError::InvalidAudience`] error.
    pub fn invalid_audience(message: impl Into<String>) -> Self {
        AuthError::InvalidAudience { message: message.into() }
    }

    /// Creates an [`AuthError::AllKeysFailed`] error carrying the last
    /// concrete failure seen during key attempts.
    pub fn all_keys_failed(tried: usize, last_error: impl Into<String>) -> Self {
        AuthError::AllKeysFailed { tried, last_error: last_error.into() }
    }

    /// Creates an [`AuthError::KeysFetch`] error.
    pub fn keys_fetch(message: impl Into<String>) -> Self {
        AuthError::KeysFetch { message: message.into() }
    }

    /// Creates an [`AuthError::UnsupportedKey`] error.
    pub fn unsupported_key(message: impl Into<String>) -> Self {
        AuthError::UnsupportedKey { message: message.into() }
    }

    /// Whether this error is a per-key signature outcome that should fall
    /// through to the next key during rotation fallback, as opposed to a
    /// terminal outcome (expired, bad audience, malformed) that
    /// short-circuits the attempt loop.
    #[must_use]
    pub(crate) fn is_signature_mismatch(&self) -> bool {
        matches!(self, AuthError::InvalidSignature)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            // jsonwebtoken checks the signature before temporal/audience
            // claims, so these two imply the signature was valid.
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidAudience => {
                AuthError::invalid_audience("audience claim did not match expected value")
            },
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            // Under enforced audience validation the claim is required, so
            // its absence is an audience failure, not a parse failure.
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                AuthError::invalid_audience("audience claim is required but absent")
            },
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::unsupported_algorithm("algorithm rejected by validation")
            },
            ErrorKind::InvalidEcdsaKey => AuthError::unsupported_key("invalid ECDSA key material"),
            _ => AuthError::malformed_token(format!("JWT error: {err}")),
        }
    }
}

/// Result type alias for verification operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::malformed_token("not a JWT");
        assert_eq!(err.to_string(), "malformed token: not a JWT");

        let err = AuthError::TokenExpired;
        assert_eq!(err.to_string(), "token expired");

        let err = AuthError::unsupported_algorithm("RS256");
        assert_eq!(err.to_string(), "unsupported algorithm: RS256");

        let err = AuthError::all_keys_failed(3, "invalid signature");
        assert_eq!(
            err.to_string(),
            "no published key verified the token (tried 3 keys): invalid signature"
        );
    }

    #[test]
    fn test_expired_signature_maps_to_token_expired() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature);
        let auth_err: AuthError = jwt_err.into();
        assert!(matches!(auth_err, AuthError::TokenExpired));
    }

    #[test]
    fn test_invalid_signature_maps_and_falls_through() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature);
        let auth_err: AuthError = jwt_err.into();
        assert!(auth_err.is_signature_mismatch());
    }

    #[test]
    fn test_invalid_audience_is_terminal() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidAudience);
        let auth_err: AuthError = jwt_err.into();
        assert!(matches!(auth_err, AuthError::InvalidAudience { .. }));
        assert!(!auth_err.is_signature_mismatch());
    }

    #[test]
    fn test_missing_audience_claim_maps_to_invalid_audience() {
        let jwt_err = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::MissingRequiredClaim("aud".to_owned()),
        );
        assert!(matches!(AuthError::from(jwt_err), AuthError::InvalidAudience { .. }));

        // Other missing required claims stay structural failures.
        let jwt_err = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::MissingRequiredClaim("exp".to_owned()),
        );
        assert!(matches!(AuthError::from(jwt_err), AuthError::MalformedToken { .. }));
    }

    #[test]
    fn test_unknown_jwt_error_maps_to_malformed() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidToken);
        let auth_err: AuthError = jwt_err.into();
        assert!(matches!(auth_err, AuthError::MalformedToken { .. }));
    }
}
