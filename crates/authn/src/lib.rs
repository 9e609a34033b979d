//! # Parapet Authentication
//!
//! Bearer-token verification against an auth provider's published keys.
//!
//! This crate provides:
//! - **Token verification**: header dispatch, signature checks, claims
//!   extraction
//! - **Key cache**: TTL-bounded JWKS cache with single-flight refresh and
//!   rotation fallback
//! - **Legacy path**: HS256 shared-secret verification for tokens minted
//!   before the ES256 migration
//!
//! ## Security model
//!
//! - Only `ES256` and (when a secret is configured) `HS256` are accepted;
//!   everything else, `none` included, is rejected before any key work
//! - A token's `kid` header is an ordering hint, never a trust anchor:
//!   signature verification against a published key is the only thing that
//!   establishes trust
//! - Key fetch failures degrade gracefully by serving the last good key set
//!
//! ## Example
//!
//! ```no_run
//! use parapet_authn::{TokenVerifier, VerifierConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerifierConfig::builder("https://auth.example.com").build();
//! let verifier = TokenVerifier::new(config)?;
//!
//! let claims = verifier.verify("eyJhbGciOiJFUzI1NiIsImtpZCI6Ii4uLiJ9...", None).await?;
//! println!("verified subject: {}", claims.sub);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Verified token claims.
pub mod claims;
/// Verifier configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// Published-key fetching.
pub mod fetcher;
/// Key descriptors and conversion.
pub mod jwks;
/// TTL key cache with single-flight refresh.
pub mod key_cache;
/// Token verification.
pub mod verifier;

/// Test doubles and token-minting helpers.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use claims::Claims;
pub use config::{VerifierConfig, VerifierConfigBuilder};
pub use error::{AuthError, Result};
pub use fetcher::{DEFAULT_FETCH_TIMEOUT, HttpKeyFetcher, KeyFetcher};
pub use jwks::{Jwk, JwkSet, KeySet, to_decoding_key};
pub use key_cache::{DEFAULT_CACHE_TTL, JwksCache};
pub use verifier::TokenVerifier;
