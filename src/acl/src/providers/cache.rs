//! TTL caching decorators for external providers
//!
//! Entries are never invalidated proactively: a result stays valid until its
//! TTL runs out, even if the backing service changes its answer. There is no
//! request coalescing either; two concurrent misses for one key both reach
//! the underlying provider and the later answer wins.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{AuthenticationProvider, GroupsProvider};
use crate::error::Result;
use crate::types::{Credentials, LoggedUser};

/// Cached entry with TTL
#[derive(Clone)]
struct CachedEntry<V> {
    value: V,
    cached_at: Instant,
}

impl<V> CachedEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Concurrent key/value cache with a fixed entry lifetime
///
/// A zero TTL turns the cache into a pass-through: nothing is stored and
/// every lookup misses.
pub struct TtlCache<K, V> {
    entries: Arc<DashMap<K, CachedEntry<V>>>,
    ttl: Duration,
    stats: Arc<DashMap<&'static str, usize>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            stats: Arc::new(DashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Fresh value for `key`, dropping it if expired
    pub fn get(&self, key: &K) -> Option<V> {
        if !self.is_enabled() {
            self.increment_stat("misses");
            return None;
        }

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(self.ttl) {
                self.increment_stat("hits");
                return Some(entry.value.clone());
            }
            drop(entry);
            // a concurrent refresh may have replaced it meanwhile
            self.entries.remove_if(key, |_, e| e.is_expired(self.ttl));
            self.increment_stat("expirations");
        }

        self.increment_stat("misses");
        None
    }

    pub fn insert(&self, key: K, value: V) {
        if self.is_enabled() {
            self.entries.insert(key, CachedEntry::new(value));
        }
    }

    /// Cached value, or the result of `fetch` stored on success
    ///
    /// Errors are returned as-is and never cached.
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: K, fetch: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            entries: self.entries.len(),
        }
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Groups provider memoizing results per user id
pub struct CachedGroupsProvider {
    underlying: Arc<dyn GroupsProvider>,
    cache: TtlCache<String, HashSet<String>>,
}

impl CachedGroupsProvider {
    pub fn new(underlying: Arc<dyn GroupsProvider>, ttl: Duration) -> Self {
        Self {
            underlying,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[async_trait]
impl GroupsProvider for CachedGroupsProvider {
    fn name(&self) -> &str {
        self.underlying.name()
    }

    async fn fetch_groups_for(&self, user: &LoggedUser) -> Result<HashSet<String>> {
        self.cache
            .get_or_try_fetch(user.id.clone(), || {
                trace!("Groups cache miss for '{}' in {}", user.id, self.name());
                self.underlying.fetch_groups_for(user)
            })
            .await
    }
}

/// Authentication provider memoizing successful logins
///
/// Entries are keyed by username and hold a BLAKE3 digest of the accepted
/// secret; a cached user presenting a different secret is rejected without
/// consulting the service. Rejections are not cached.
pub struct CachedAuthenticationProvider {
    underlying: Arc<dyn AuthenticationProvider>,
    cache: TtlCache<String, (LoggedUser, [u8; 32])>,
}

impl CachedAuthenticationProvider {
    pub fn new(underlying: Arc<dyn AuthenticationProvider>, ttl: Duration) -> Self {
        Self {
            underlying,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[async_trait]
impl AuthenticationProvider for CachedAuthenticationProvider {
    fn name(&self) -> &str {
        self.underlying.name()
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<LoggedUser>> {
        let hashed = credentials.hashed_secret();

        if let Some((user, cached_hash)) = self.cache.get(&credentials.user) {
            if cached_hash == hashed {
                return Ok(Some(user));
            }
            debug!(
                "Cached user '{}' presented a different secret to {}",
                credentials.user,
                self.name()
            );
            return Ok(None);
        }

        let user = self.underlying.authenticate(credentials).await?;
        if let Some(user) = &user {
            self.cache
                .insert(credentials.user.clone(), (user.clone(), hashed));
        }
        Ok(user)
    }
}

/// Wrap `provider` in a cache unless `ttl` is zero
pub fn cached_groups_provider(provider: Arc<dyn GroupsProvider>, ttl: Duration) -> Arc<dyn GroupsProvider> {
    if ttl.is_zero() {
        provider
    } else {
        Arc::new(CachedGroupsProvider::new(provider, ttl))
    }
}

/// Wrap `provider` in a cache unless `ttl` is zero
pub fn cached_authentication_provider(
    provider: Arc<dyn AuthenticationProvider>,
    ttl: Duration,
) -> Arc<dyn AuthenticationProvider> {
    if ttl.is_zero() {
        provider
    } else {
        Arc::new(CachedAuthenticationProvider::new(provider, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::StaticDirectory;
    use std::sync::atomic::Ordering;

    fn directory() -> StaticDirectory {
        StaticDirectory::new("dir").with_user("alice", "secret", &["admins", "devs"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_cache_expiry() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(1));

        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(cache.get(&"a"), Some(1));

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get(&"a"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_pass_through() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::ZERO);

        cache.insert("a", 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
    }

    #[tokio::test]
    async fn test_fetch_errors_are_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));

        let failed: std::result::Result<u32, &str> = cache.get_or_try_fetch("a", || async { Err("down") }).await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let ok: std::result::Result<u32, &str> = cache.get_or_try_fetch("a", || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        assert_eq!(cache.get(&"a"), Some(7));
    }

    #[tokio::test]
    async fn test_cached_groups_provider_hits() {
        let dir = directory();
        let fetches = dir.group_fetches.clone();
        let provider = CachedGroupsProvider::new(Arc::new(dir), Duration::from_secs(60));
        let alice = LoggedUser::new("alice");

        let first = provider.fetch_groups_for(&alice).await.unwrap();
        let second = provider.fetch_groups_for(&alice).await.unwrap();

        assert_eq!(first, second);
        assert!(first.contains("admins"));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(provider.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_cached_authentication_compares_hashed_secret() {
        let dir = directory();
        let calls = dir.authentications.clone();
        let provider = CachedAuthenticationProvider::new(Arc::new(dir), Duration::from_secs(60));

        let good = Credentials::new("alice", "secret");
        let bad = Credentials::new("alice", "wrong");

        assert!(provider.authenticate(&good).await.unwrap().is_some());
        assert!(provider.authenticate(&good).await.unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // served from cache: different secret is rejected without a call
        assert!(provider.authenticate(&bad).await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejections_are_not_cached() {
        let dir = directory();
        let calls = dir.authentications.clone();
        let provider = CachedAuthenticationProvider::new(Arc::new(dir), Duration::from_secs(60));

        let bad = Credentials::new("alice", "wrong");
        assert!(provider.authenticate(&bad).await.unwrap().is_none());
        assert!(provider.authenticate(&bad).await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let dir = directory().failing();
        let provider = CachedGroupsProvider::new(Arc::new(dir), Duration::from_secs(60));

        assert!(provider.fetch_groups_for(&LoggedUser::new("alice")).await.is_err());
        assert_eq!(provider.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_wrap_helpers_skip_zero_ttl() {
        let dir: Arc<dyn GroupsProvider> = Arc::new(directory());
        let wrapped = cached_groups_provider(dir.clone(), Duration::ZERO);
        assert!(Arc::ptr_eq(&dir, &wrapped));

        let wrapped = cached_groups_provider(dir.clone(), Duration::from_secs(1));
        assert!(!Arc::ptr_eq(&dir, &wrapped));
    }
}
