//! Published-key descriptors and conversion to verification keys.
//!
//! The provider publishes its current signing keys as a JSON document (a
//! JWKS). Each entry is parsed into a [`Jwk`] descriptor and converted into a
//! [`jsonwebtoken::DecodingKey`] usable for ES256 signature verification.
//! A refresh produces a whole new immutable [`KeySet`] snapshot; readers
//! never observe a partially converted set.
//!
//! Only one key family is supported: elliptic curve, P-256 (secp256r1).
//! Descriptors declaring anything else convert to
//! [`AuthError::UnsupportedKey`], and a set-level build skips them rather
//! than aborting the whole refresh.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use p256::{EncodedPoint, FieldBytes, ecdsa::VerifyingKey};
use serde::Deserialize;

use crate::error::{AuthError, Result};

/// Byte length of a P-256 affine coordinate.
const P256_COORDINATE_LEN: usize = 32;

/// One published key descriptor, as fetched from the provider.
///
/// Fields follow RFC 7517 naming. Coordinates are base64url-encoded without
/// padding. The descriptor is immutable once parsed; trust is established
/// only by converting it and verifying a signature, never by the metadata
/// itself.
#[derive(Clone, Debug, Deserialize)]
pub struct Jwk {
    /// Provider-assigned opaque key identifier.
    pub kid: String,
    /// Key family tag (`"EC"` is the only supported value).
    pub kty: String,
    /// Curve name (`"P-256"` is the only supported value).
    #[serde(default)]
    pub crv: Option<String>,
    /// X coordinate, base64url, big-endian unsigned.
    #[serde(default)]
    pub x: Option<String>,
    /// Y coordinate, base64url, big-endian unsigned.
    #[serde(default)]
    pub y: Option<String>,
    /// Declared algorithm, informational only.
    #[serde(default)]
    pub alg: Option<String>,
    /// Declared use (`"sig"`), informational only.
    #[serde(default, rename = "use")]
    pub use_: Option<String>,
}

/// The JWKS document shape: `{"keys": [...]}`.
#[derive(Clone, Debug, Deserialize)]
pub struct JwkSet {
    /// The published key descriptors.
    pub keys: Vec<Jwk>,
}

/// Converts one published descriptor into a usable verification key.
///
/// Steps: decode both coordinates from base64url (tolerating padding,
/// left-padding short big-endian values to 32 bytes), construct the affine
/// point, check it actually lies on P-256, and hand back a
/// [`DecodingKey`] suitable for ECDSA/SHA-256 verification.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedKey`] for any non-EC/P-256 descriptor,
/// missing or undecodable coordinates, or a point not on the curve.
pub fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey> {
    if jwk.kty != "EC" {
        return Err(AuthError::unsupported_key(format!("key type '{}' (expected EC)", jwk.kty)));
    }
    let crv = jwk.crv.as_deref().unwrap_or("");
    if crv != "P-256" {
        return Err(AuthError::unsupported_key(format!("curve '{crv}' (expected P-256)")));
    }

    let x = jwk.x.as_deref().ok_or_else(|| AuthError::unsupported_key("missing x coordinate"))?;
    let y = jwk.y.as_deref().ok_or_else(|| AuthError::unsupported_key("missing y coordinate"))?;
    let x_bytes = decode_coordinate(x, "x")?;
    let y_bytes = decode_coordinate(y, "y")?;

    // Reject descriptors whose coordinates do not name a point on the
    // curve before caching anything derived from them.
    let point = EncodedPoint::from_affine_coordinates(
        &FieldBytes::from(x_bytes),
        &FieldBytes::from(y_bytes),
        false,
    );
    VerifyingKey::from_encoded_point(&point)
        .map_err(|e| AuthError::unsupported_key(format!("point not on P-256: {e}")))?;

    DecodingKey::from_ec_components(
        &URL_SAFE_NO_PAD.encode(x_bytes),
        &URL_SAFE_NO_PAD.encode(y_bytes),
    )
    .map_err(|e| AuthError::unsupported_key(format!("decoding key construction: {e}")))
}

/// Decodes one base64url coordinate into a fixed 32-byte big-endian value.
///
/// Published coordinates are unpadded; padding is stripped if present.
/// Values shorter than 32 bytes are left-padded with zeros (big-endian
/// unsigned integer semantics); longer values are rejected.
pub(crate) fn decode_coordinate(encoded: &str, name: &str) -> Result<[u8; P256_COORDINATE_LEN]> {
    let decoded = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| AuthError::unsupported_key(format!("{name} coordinate base64: {e}")))?;

    if decoded.len() > P256_COORDINATE_LEN {
        return Err(AuthError::unsupported_key(format!(
            "{name} coordinate is {} bytes (max {P256_COORDINATE_LEN})",
            decoded.len()
        )));
    }

    let mut bytes = [0u8; P256_COORDINATE_LEN];
    bytes[P256_COORDINATE_LEN - decoded.len()..].copy_from_slice(&decoded);
    Ok(bytes)
}

/// An immutable snapshot of the provider's published keys.
///
/// Produced by one refresh, shared by reference across concurrent readers,
/// and discarded wholesale when a newer snapshot replaces it in the cache.
/// A `KeySet` is never mutated after construction.
pub struct KeySet {
    keys: HashMap<String, Arc<DecodingKey>>,
    fetched_at: Instant,
}

impl KeySet {
    /// Builds a snapshot from fetched descriptors.
    ///
    /// `fetched_at` is the instant the refresh started, so that TTL
    /// accounting does not credit the network round-trip. A descriptor that
    /// fails conversion is logged and skipped — a partial key set is valid,
    /// and a missing kid simply falls into the try-all-keys path during
    /// verification.
    #[must_use]
    pub fn from_descriptors(descriptors: Vec<Jwk>, fetched_at: Instant) -> Self {
        let mut keys = HashMap::with_capacity(descriptors.len());
        for jwk in descriptors {
            match to_decoding_key(&jwk) {
                Ok(key) => {
                    keys.insert(jwk.kid, Arc::new(key));
                },
                Err(err) => {
                    tracing::warn!(kid = %jwk.kid, error = %err, "skipping unusable published key");
                },
            }
        }
        Self { keys, fetched_at }
    }

    /// Looks up a key by its provider-assigned identifier.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&Arc<DecodingKey>> {
        self.keys.get(kid)
    }

    /// Iterates all keys in the snapshot.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<DecodingKey>)> {
        self.keys.iter().map(|(kid, key)| (kid.as_str(), key))
    }

    /// Number of usable keys in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the snapshot holds no usable keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The instant the refresh that produced this snapshot started.
    #[must_use]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Whether this snapshot has outlived the given TTL.
    #[must_use]
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;

    use super::*;

    /// Builds a valid P-256 descriptor from a fresh random key pair.
    fn valid_jwk(kid: &str) -> Jwk {
        let signing_key = SigningKey::random(&mut OsRng);
        let point = signing_key.verifying_key().to_encoded_point(false);
        Jwk {
            kid: kid.to_string(),
            kty: "EC".to_string(),
            crv: Some("P-256".to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(point.x().expect("x coordinate"))),
            y: Some(URL_SAFE_NO_PAD.encode(point.y().expect("y coordinate"))),
            alg: Some("ES256".to_string()),
            use_: Some("sig".to_string()),
        }
    }

    #[test]
    fn test_valid_descriptor_converts() {
        let jwk = valid_jwk("key-1");
        assert!(to_decoding_key(&jwk).is_ok());
    }

    #[test]
    fn test_padded_coordinates_accepted() {
        // Some publishers pad; the converter strips it.
        let mut jwk = valid_jwk("key-pad");
        jwk.x = Some(format!("{}=", jwk.x.unwrap()));
        assert!(to_decoding_key(&jwk).is_ok());
    }

    #[test]
    fn test_rsa_key_type_rejected() {
        let mut jwk = valid_jwk("key-rsa");
        jwk.kty = "RSA".to_string();
        let result = to_decoding_key(&jwk);
        assert!(
            matches!(&result, Err(AuthError::UnsupportedKey { message }) if message.contains("RSA"))
        );
    }

    #[test]
    fn test_wrong_curve_rejected() {
        let mut jwk = valid_jwk("key-p384");
        jwk.crv = Some("P-384".to_string());
        let result = to_decoding_key(&jwk);
        assert!(
            matches!(&result, Err(AuthError::UnsupportedKey { message }) if message.contains("P-384"))
        );
    }

    #[test]
    fn test_missing_coordinate_rejected() {
        let mut jwk = valid_jwk("key-nox");
        jwk.x = None;
        assert!(matches!(to_decoding_key(&jwk), Err(AuthError::UnsupportedKey { .. })));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let mut jwk = valid_jwk("key-badb64");
        jwk.y = Some("!!!not-base64!!!".to_string());
        assert!(matches!(to_decoding_key(&jwk), Err(AuthError::UnsupportedKey { .. })));
    }

    #[test]
    fn test_point_off_curve_rejected() {
        // (1, 1) is not on P-256.
        let mut jwk = valid_jwk("key-offcurve");
        jwk.x = Some(URL_SAFE_NO_PAD.encode([1u8]));
        jwk.y = Some(URL_SAFE_NO_PAD.encode([1u8]));
        let result = to_decoding_key(&jwk);
        assert!(
            matches!(&result, Err(AuthError::UnsupportedKey { message }) if message.contains("not on P-256"))
        );
    }

    #[test]
    fn test_coordinate_left_padding() {
        // A 31-byte value decodes into the low 31 bytes, big-endian.
        let short = [0xABu8; 31];
        let decoded = decode_coordinate(&URL_SAFE_NO_PAD.encode(short), "x").unwrap();
        assert_eq!(decoded[0], 0x00);
        assert_eq!(&decoded[1..], &short[..]);
    }

    #[test]
    fn test_coordinate_too_long_rejected() {
        let long = [0x01u8; 33];
        let result = decode_coordinate(&URL_SAFE_NO_PAD.encode(long), "x");
        assert!(matches!(result, Err(AuthError::UnsupportedKey { .. })));
    }

    #[test]
    fn test_key_set_skips_bad_descriptors() {
        let mut bad = valid_jwk("key-bad");
        bad.kty = "RSA".to_string();
        let descriptors = vec![valid_jwk("key-a"), bad, valid_jwk("key-b")];

        let set = KeySet::from_descriptors(descriptors, Instant::now());
        assert_eq!(set.len(), 2);
        assert!(set.get("key-a").is_some());
        assert!(set.get("key-b").is_some());
        assert!(set.get("key-bad").is_none());
    }

    #[test]
    fn test_key_set_staleness() {
        let set = KeySet::from_descriptors(vec![], Instant::now());
        assert!(set.is_empty());
        assert!(!set.is_stale(Duration::from_secs(60)));
        assert!(set.is_stale(Duration::ZERO));
    }

    #[test]
    fn test_jwk_set_parses_provider_document() {
        let body = serde_json::json!({
            "keys": [
                { "kid": "k1", "kty": "EC", "crv": "P-256", "x": "AA", "y": "AA", "use": "sig" },
                { "kid": "k2", "kty": "RSA" },
            ]
        });
        let set: JwkSet = serde_json::from_value(body).expect("JWKS should parse");
        assert_eq!(set.keys.len(), 2);
        assert_eq!(set.keys[0].use_.as_deref(), Some("sig"));
        assert!(set.keys[1].crv.is_none());
    }
}
