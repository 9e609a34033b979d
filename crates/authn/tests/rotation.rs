//! Key-rotation and cache-behavior tests.
//!
//! Exercises the full verifier against a mock key source: fallback to a
//! freshly fetched key set when the provider rotates mid-cache, the
//! one-forced-refresh bound per verification, refresh coalescing under
//! concurrency, TTL-driven refetching, and degraded serving when the key
//! endpoint is down.
#![allow(clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use parapet_authn::{
    AuthError, TokenVerifier, VerifierConfig, assert_auth_error,
    testutil::{MockKeyFetcher, es256_keypair, sign_es256, standard_claims},
};

fn verifier_over(
    fetcher: Arc<MockKeyFetcher>,
    cache_ttl: Duration,
) -> TokenVerifier {
    let config = VerifierConfig::builder("https://auth.example.com")
        .cache_ttl(cache_ttl)
        .build();
    TokenVerifier::with_fetcher(fetcher, config)
}

#[tokio::test]
async fn test_rotated_key_verifies_via_forced_refresh() {
    let (old_key, old_jwk) = es256_keypair("2023-key");
    let fetcher = Arc::new(MockKeyFetcher::new(vec![old_jwk]));
    let verifier = verifier_over(Arc::clone(&fetcher), Duration::from_secs(3_600));

    // Warm the cache on the pre-rotation key set.
    let old_token = sign_es256(&old_key, Some("2023-key"), &standard_claims(None));
    verifier.verify(&old_token, None).await.expect("pre-rotation token");
    assert_eq!(fetcher.fetch_count(), 1);

    // Provider rotates. The cache still holds only the old key, so a token
    // signed by the new key must trigger a refresh and then verify.
    let (new_key, new_jwk) = es256_keypair("2024-key");
    fetcher.set_keys(vec![new_jwk]);
    let new_token = sign_es256(&new_key, Some("2024-key"), &standard_claims(None));

    let claims = verifier.verify(&new_token, None).await.expect("post-rotation token");
    assert_eq!(claims.sub, "user-1");
    assert_eq!(fetcher.fetch_count(), 2);

    // The refreshed set is cached; the next verification fetches nothing.
    verifier.verify(&new_token, None).await.expect("cached post-rotation token");
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_unverifiable_token_forces_exactly_one_refresh() {
    let (_, jwk) = es256_keypair("published");
    let fetcher = Arc::new(MockKeyFetcher::new(vec![jwk]));
    let verifier = verifier_over(Arc::clone(&fetcher), Duration::from_secs(3_600));

    let (rogue, _) = es256_keypair("rogue");
    let token = sign_es256(&rogue, Some("rogue"), &standard_claims(None));

    assert_auth_error!(verifier.verify(&token, None).await, AuthError::AllKeysFailed { .. });
    // One fetch to populate the cache plus exactly one forced refresh.
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_verifiable_token_never_forces_refresh() {
    let (key, jwk) = es256_keypair("active");
    let fetcher = Arc::new(MockKeyFetcher::new(vec![jwk]));
    let verifier = verifier_over(Arc::clone(&fetcher), Duration::from_secs(3_600));
    let token = sign_es256(&key, Some("active"), &standard_claims(None));

    for _ in 0..5 {
        verifier.verify(&token, None).await.expect("valid token");
    }
    assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_concurrent_failing_verifications_share_one_refresh() {
    let (_, jwk) = es256_keypair("published");
    let fetcher = Arc::new(MockKeyFetcher::new(vec![jwk]));
    let verifier = Arc::new(verifier_over(Arc::clone(&fetcher), Duration::from_secs(3_600)));

    // Warm the cache so every task starts from the same snapshot.
    let (rogue, _) = es256_keypair("rogue");
    let token = sign_es256(&rogue, Some("rogue"), &standard_claims(None));
    assert!(verifier.verify(&token, None).await.is_err());
    assert_eq!(fetcher.fetch_count(), 2);

    // Slow the fetch down so the forced refreshes overlap.
    fetcher.set_delay(Some(Duration::from_millis(50)));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let verifier = Arc::clone(&verifier);
        let token = token.clone();
        handles.push(tokio::spawn(async move { verifier.verify(&token, None).await }));
    }
    for handle in handles {
        assert!(handle.await.expect("task").is_err());
    }

    // All eight tasks exhausted the same snapshot; only the first forced
    // refresh actually fetched.
    assert_eq!(fetcher.fetch_count(), 3);
}

#[tokio::test]
async fn test_ttl_expiry_triggers_single_refetch() {
    let (key, jwk) = es256_keypair("active");
    let fetcher = Arc::new(MockKeyFetcher::new(vec![jwk]));
    let verifier = verifier_over(Arc::clone(&fetcher), Duration::from_millis(40));
    let token = sign_es256(&key, Some("active"), &standard_claims(None));

    verifier.verify(&token, None).await.expect("first");
    assert_eq!(fetcher.fetch_count(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;

    verifier.verify(&token, None).await.expect("after expiry");
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_degraded_serving_when_key_endpoint_down() {
    let (key, jwk) = es256_keypair("active");
    let fetcher = Arc::new(MockKeyFetcher::new(vec![jwk]));
    let verifier = verifier_over(Arc::clone(&fetcher), Duration::from_millis(30));
    let token = sign_es256(&key, Some("active"), &standard_claims(None));

    verifier.verify(&token, None).await.expect("warm-up");

    // Endpoint goes down and the cache goes stale. Verification keeps
    // working off the last good key set.
    fetcher.set_failing(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    verifier.verify(&token, None).await.expect("degraded serving");
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_cold_cache_fetch_failure_surfaces() {
    let (key, jwk) = es256_keypair("active");
    let fetcher = Arc::new(MockKeyFetcher::new(vec![jwk]));
    fetcher.set_failing(true);
    let verifier = verifier_over(Arc::clone(&fetcher), Duration::from_secs(3_600));
    let token = sign_es256(&key, Some("active"), &standard_claims(None));

    assert_auth_error!(verifier.verify(&token, None).await, AuthError::KeysFetch { .. });

    // Endpoint recovers; the same verifier works without a restart.
    fetcher.set_failing(false);
    verifier.verify(&token, None).await.expect("after recovery");
}

#[tokio::test]
async fn test_empty_key_set_fails_without_panic() {
    let fetcher = Arc::new(MockKeyFetcher::new(Vec::new()));
    let verifier = verifier_over(Arc::clone(&fetcher), Duration::from_secs(3_600));

    let (key, _) = es256_keypair("unpublished");
    let token = sign_es256(&key, Some("unpublished"), &standard_claims(None));

    match verifier.verify(&token, None).await {
        Err(AuthError::AllKeysFailed { tried, .. }) => assert_eq!(tried, 0),
        other => panic!("expected AllKeysFailed, got {other:?}"),
    }
}
