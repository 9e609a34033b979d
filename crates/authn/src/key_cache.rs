//! TTL-bounded cache of the provider's published key set.
//!
//! [`JwksCache`] owns the single piece of shared mutable state in the
//! verifier: the current [`KeySet`] snapshot. Snapshots themselves are
//! immutable and shared by `Arc`, so readers take no lock beyond a brief
//! `RwLock` read to clone the pointer; only the refresh path serializes.
//!
//! # Refresh discipline
//!
//! Refreshes are single-flight: every refresh runs under one async mutex,
//! and callers that arrive while a refresh is in flight wait for its result
//! instead of issuing a duplicate fetch. Staleness is re-checked after
//! acquiring the lock, and forced refreshes compare the caller's snapshot
//! pointer against the current one, so a whole burst of failing
//! verifications collapses into one fetch.
//!
//! # Graceful degradation
//!
//! A failed fetch never evicts anything: if a previous good snapshot exists
//! it keeps serving (logged at WARN with its age), and the fetch error is
//! surfaced only on a cold cache.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::{error::Result, fetcher::KeyFetcher, jwks::KeySet};

/// Default time-to-live for a fetched key set (1 hour).
///
/// Rotation at the provider is infrequent; the rotation-fallback path in the
/// verifier covers the window where the cache is one generation behind, so
/// the TTL trades fetch volume against staleness rather than correctness.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3_600);

/// Cache of published verification keys with single-flight refresh.
pub struct JwksCache {
    fetcher: Arc<dyn KeyFetcher>,
    ttl: Duration,
    /// Current snapshot. Swapped atomically as a whole; never patched.
    current: RwLock<Option<Arc<KeySet>>>,
    /// Serializes refreshes. Async so waiters suspend instead of blocking.
    refresh_lock: Mutex<()>,
    fetch_attempts: AtomicU64,
    fetch_failures: AtomicU64,
}

impl JwksCache {
    /// Creates a cache over the given fetcher with the given TTL.
    #[must_use]
    pub fn new(fetcher: Arc<dyn KeyFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            fetch_attempts: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    /// Returns the current key set, refreshing first if it is stale or the
    /// cache is cold.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeysFetch`](crate::AuthError::KeysFetch) only
    /// when the fetch fails and no previously fetched set exists to fall
    /// back on.
    pub async fn key_set(&self) -> Result<Arc<KeySet>> {
        if let Some(set) = self.fresh() {
            return Ok(set);
        }

        let _guard = self.refresh_lock.lock().await;
        // Re-check under the lock: a waiter that queued behind an in-flight
        // refresh uses that refresh's result rather than fetching again.
        if let Some(set) = self.fresh() {
            return Ok(set);
        }
        self.refresh_locked().await
    }

    /// Unconditionally refreshes the key set.
    ///
    /// `previous` is the snapshot the caller has already exhausted. If the
    /// current snapshot is no longer that one, another caller refreshed in
    /// the meantime and its result is returned without a duplicate fetch.
    ///
    /// # Errors
    ///
    /// Same surfacing rule as [`key_set`](Self::key_set): the fetch error
    /// propagates only when there is no previous good set.
    pub async fn force_refresh(&self, previous: &Arc<KeySet>) -> Result<Arc<KeySet>> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(current) = self.cached() {
            if !Arc::ptr_eq(&current, previous) {
                tracing::debug!("skipping forced refresh: key set already replaced");
                return Ok(current);
            }
        }
        self.refresh_locked().await
    }

    /// Returns the cached snapshot regardless of freshness, if any.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<KeySet>> {
        self.current.read().clone()
    }

    /// The configured time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Total fetch attempts, successful or not. Exposed for observability
    /// and for counting fetches in tests.
    #[must_use]
    pub fn fetch_attempts(&self) -> u64 {
        self.fetch_attempts.load(Ordering::Relaxed)
    }

    /// Total failed fetch attempts.
    #[must_use]
    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    fn fresh(&self) -> Option<Arc<KeySet>> {
        self.current.read().as_ref().filter(|set| !set.is_stale(self.ttl)).map(Arc::clone)
    }

    /// Performs one fetch-convert-swap cycle. Caller must hold
    /// `refresh_lock`.
    async fn refresh_locked(&self) -> Result<Arc<KeySet>> {
        // TTL accounting starts when the refresh starts, not when the
        // response lands.
        let started = Instant::now();
        self.fetch_attempts.fetch_add(1, Ordering::Relaxed);

        match self.fetcher.fetch_keys().await {
            Ok(descriptors) => {
                let set = Arc::new(KeySet::from_descriptors(descriptors, started));
                tracing::debug!(key_count = set.len(), "published key set refreshed");
                *self.current.write() = Some(Arc::clone(&set));
                Ok(set)
            },
            Err(err) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                if let Some(previous) = self.cached() {
                    tracing::warn!(
                        error = %err,
                        stale_age_secs = previous.fetched_at().elapsed().as_secs(),
                        "published-keys fetch failed; serving last good key set"
                    );
                    Ok(previous)
                } else {
                    Err(err)
                }
            },
        }
    }
}
