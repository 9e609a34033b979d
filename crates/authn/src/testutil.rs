//! Test doubles and token-minting helpers.
//!
//! Compiled for this crate's own tests and, behind the `testutil` feature,
//! for integration tests of downstream services. Nothing here belongs in a
//! production build: keys are freshly generated per call and signing
//! shortcuts (like unsigned tokens) are deliberate.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::ecdsa::{Signature, SigningKey, signature::Signer};
use parking_lot::RwLock;
use rand_core::OsRng;
use serde_json::Value;

use crate::{
    error::{AuthError, Result},
    fetcher::KeyFetcher,
    jwks::Jwk,
};

/// Generates a fresh P-256 key pair and its published descriptor.
pub fn es256_keypair(kid: &str) -> (SigningKey, Jwk) {
    let signing_key = SigningKey::random(&mut OsRng);
    let point = signing_key.verifying_key().to_encoded_point(false);
    let jwk = Jwk {
        kid: kid.to_owned(),
        kty: "EC".to_owned(),
        crv: Some("P-256".to_owned()),
        x: Some(URL_SAFE_NO_PAD.encode(point.x().expect("non-identity point"))),
        y: Some(URL_SAFE_NO_PAD.encode(point.y().expect("non-identity point"))),
        alg: Some("ES256".to_owned()),
        use_: Some("sig".to_owned()),
    };
    (signing_key, jwk)
}

/// Signs a compact ES256 JWT over the given claims.
///
/// Signing is done directly with the P-256 key (raw `r || s` signature per
/// RFC 7518) so the key never needs converting to another format.
pub fn sign_es256(key: &SigningKey, kid: Option<&str>, claims: &Value) -> String {
    let mut header = serde_json::json!({ "alg": "ES256", "typ": "JWT" });
    if let Some(kid) = kid {
        header["kid"] = Value::from(kid);
    }
    let signing_input = format!("{}.{}", encode_segment(&header), encode_segment(claims));
    let signature: Signature = key.sign(signing_input.as_bytes());
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

/// Signs a compact HS256 JWT with the given shared secret.
pub fn create_hs256_jwt(secret: &str, claims: &Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("HS256 signing cannot fail with a valid secret")
}

/// Assembles a three-segment token with an arbitrary header and a garbage
/// signature. For exercising dispatch and rejection paths.
pub fn craft_raw_jwt(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        encode_segment(header),
        encode_segment(claims),
        URL_SAFE_NO_PAD.encode(b"invalid-signature")
    )
}

/// A claims object that passes verification: `sub`, `exp` one hour out, and
/// an `aud` when given.
pub fn standard_claims(aud: Option<&str>) -> Value {
    let now = u64::try_from(chrono::Utc::now().timestamp()).expect("current time");
    let mut claims = serde_json::json!({
        "sub": "user-1",
        "email": "user-1@example.com",
        "role": "authenticated",
        "user_metadata": { "plan": "free" },
        "exp": now + 3_600,
    });
    if let Some(aud) = aud {
        claims["aud"] = Value::from(aud);
    }
    claims
}

fn encode_segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("claims serialize"))
}

/// In-memory [`KeyFetcher`] with failure injection and a fetch counter.
///
/// The served descriptors can be swapped at any time to simulate provider
/// key rotation, and an optional delay makes refresh overlap observable.
#[derive(Default)]
pub struct MockKeyFetcher {
    keys: RwLock<Vec<Jwk>>,
    failing: AtomicBool,
    delay: RwLock<Option<Duration>>,
    fetch_count: AtomicU64,
}

impl MockKeyFetcher {
    /// Creates a fetcher serving the given descriptors.
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys: RwLock::new(keys), ..Self::default() }
    }

    /// Replaces the served descriptors (simulates a provider rotation).
    pub fn set_keys(&self, keys: Vec<Jwk>) {
        *self.keys.write() = keys;
    }

    /// Makes every subsequent fetch fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Adds an artificial delay before each fetch completes.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    /// Number of fetches attempted so far, including failed ones.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl KeyFetcher for MockKeyFetcher {
    async fn fetch_keys(&self) -> Result<Vec<Jwk>> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(AuthError::keys_fetch("injected fetch failure"));
        }
        Ok(self.keys.read().clone())
    }
}

/// Asserts that a `Result` is an `Err` matching the given pattern.
///
/// ```ignore
/// assert_auth_error!(verifier.verify(token, None).await, AuthError::TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $pattern:pat $(if $guard:expr)?) => {
        match $result {
            Err($pattern) $(if $guard)? => {},
            Err(other) => panic!(
                "expected error matching {}, got {other:?}",
                stringify!($pattern)
            ),
            Ok(_) => panic!("expected error matching {}, got Ok", stringify!($pattern)),
        }
    };
}
