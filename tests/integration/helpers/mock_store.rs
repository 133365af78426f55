//! In-memory backing store for integration testing
//!
//! Provides a mock store and factory that can:
//! - Hold keys with TTLs against the tokio clock (pause/advance friendly)
//! - Simulate an unreachable endpoint
//! - Count operations for assertions
//! - Count how many backends the manager asked the factory to build

use async_trait::async_trait;
use mirrorcache::core::connection_pool::PoolSettings;
use mirrorcache::{AtomicBackendMetrics, Backend, BackendError, BackendFactory, Endpoint};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Statistics tracked by the mock store
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    pub gets: usize,
    pub sets: usize,
    pub expires: usize,
    pub deletes: usize,
    pub flushes: usize,
    pub refused: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Mock backing store for one endpoint
pub struct MockStore {
    endpoint: Endpoint,
    name: String,
    reachable: AtomicBool,
    storage: Mutex<HashMap<Vec<u8>, Entry>>,
    stats: Mutex<MockStats>,
    metrics: Arc<AtomicBackendMetrics>,
}

impl MockStore {
    pub fn new(endpoint: Endpoint) -> Self {
        let name = endpoint.to_string();
        Self {
            metrics: Arc::new(AtomicBackendMetrics::new(name.clone())),
            endpoint,
            name,
            reachable: AtomicBool::new(true),
            storage: Mutex::new(HashMap::new()),
            stats: Mutex::new(MockStats::default()),
        }
    }

    /// Make every subsequent operation fail as if the host were down
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> MockStats {
        self.stats.lock().unwrap().clone()
    }

    /// Read a live value directly, bypassing reachability
    pub fn get_stored_value(&self, key: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.storage
            .lock()
            .unwrap()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining TTL of a key, `None` when it has no expiry or does not exist
    pub fn ttl_of(&self, key: &[u8]) -> Option<Duration> {
        let now = Instant::now();
        self.storage
            .lock()
            .unwrap()
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn set_stored_value(&self, key: &[u8], value: &[u8]) {
        self.storage.lock().unwrap().insert(
            key.to_vec(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
    }

    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.storage
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.stats.lock().unwrap().refused += 1;
            Err(BackendError::ConnectionFailed(format!(
                "{}: Connection refused",
                self.endpoint
            )))
        }
    }
}

#[async_trait]
impl Backend for MockStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.check_reachable()?;
        self.stats.lock().unwrap().gets += 1;
        let now = Instant::now();
        let mut storage = self.storage.lock().unwrap();
        match storage.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                storage.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> Result<(), BackendError> {
        self.check_reachable()?;
        let mut stats = self.stats.lock().unwrap();
        stats.sets += 1;
        let expires_at = if ttl_secs != 0 {
            stats.expires += 1;
            Some(Instant::now() + Duration::from_secs(ttl_secs))
        } else {
            None
        };
        self.storage.lock().unwrap().insert(
            key.to_vec(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), BackendError> {
        self.check_reachable()?;
        self.stats.lock().unwrap().deletes += 1;
        self.storage.lock().unwrap().remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BackendError> {
        self.check_reachable()?;
        self.stats.lock().unwrap().flushes += 1;
        self.storage.lock().unwrap().clear();
        Ok(())
    }

    async fn size(&self) -> Result<u64, BackendError> {
        self.check_reachable()?;
        Ok(self.live_len() as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<HashSet<Vec<u8>>, BackendError> {
        self.check_reachable()?;
        let now = Instant::now();
        Ok(self
            .storage
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_matches(pattern.as_bytes(), key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> Arc<AtomicBackendMetrics> {
        Arc::clone(&self.metrics)
    }
}

/// Glob matching with `*` and `?` wildcards, as the store does for KEYS
pub fn glob_matches(pattern: &[u8], key: &[u8]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((b'*', rest)) => (0..=key.len()).any(|skip| glob_matches(rest, &key[skip..])),
        Some((b'?', rest)) => !key.is_empty() && glob_matches(rest, &key[1..]),
        Some((c, rest)) => key.first() == Some(c) && glob_matches(rest, &key[1..]),
    }
}

/// Factory handing out one shared [`MockStore`] per endpoint
#[derive(Default)]
pub struct MockFactory {
    stores: Mutex<HashMap<Endpoint, Arc<MockStore>>>,
    created: AtomicUsize,
    build_delay: Option<Duration>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow down each build to widen races between concurrent initializers
    pub fn with_build_delay(delay: Duration) -> Self {
        Self {
            build_delay: Some(delay),
            ..Self::default()
        }
    }

    /// The store behind `host:port`, created on first request
    pub fn store(&self, host: &str, port: u16) -> Arc<MockStore> {
        let endpoint = Endpoint::new(host, port);
        let mut stores = self.stores.lock().unwrap();
        Arc::clone(
            stores
                .entry(endpoint.clone())
                .or_insert_with(|| Arc::new(MockStore::new(endpoint))),
        )
    }

    /// Number of backends built through [`BackendFactory::create_backend`]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendFactory for MockFactory {
    async fn create_backend(
        &self,
        endpoint: &Endpoint,
        _settings: &PoolSettings,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.store(&endpoint.host, endpoint.port) as Arc<dyn Backend>)
    }
}

#[cfg(test)]
mod tests {
    use super::glob_matches;

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches(b"*", b"anything"));
        assert!(glob_matches(b"session:*", b"session:42"));
        assert!(!glob_matches(b"session:*", b"user:42"));
        assert!(glob_matches(b"s?ssion:1", b"session:1"));
        assert!(glob_matches(b"*:1", b"session:1"));
        assert!(!glob_matches(b"exact", b"exactly"));
    }
}
