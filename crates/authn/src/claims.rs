//! Verified token claims.
//!
//! [`Claims`] is produced only as the output of a successful verification by
//! [`TokenVerifier::verify`](crate::verifier::TokenVerifier::verify); callers
//! never construct one by hand. Required fields (`sub`, `exp`) are typed and
//! named; everything else the provider embeds is preserved opaquely in
//! [`Claims::extra`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Verified JWT payload.
///
/// Tokens issued by the provider carry the standard subject/expiration
/// claims plus provider-specific fields (`email`, `user_metadata`). Custom
/// claims a deployment adds are kept in the flattened [`extra`](Self::extra)
/// bag rather than dropped, so downstream permission checks can read them
/// without re-decoding the token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the provider-assigned user identifier.
    pub sub: String,
    /// Audience the token was issued for, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Email address, when the provider embeds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Provider-embedded user metadata object, preserved as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Value>,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// All remaining claims, preserved opaquely.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// The verified user identifier (the `sub` claim).
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// The provider role claim, when present (e.g. `"authenticated"`).
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.extra.get("role").and_then(Value::as_str)
    }

    /// Looks up a string-valued field inside `user_metadata`.
    ///
    /// Returns `None` if the metadata object is absent, the key is missing,
    /// or the value is not a string.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.as_ref()?.get(key)?.as_str()
    }
}
