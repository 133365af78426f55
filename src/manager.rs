use crate::config::{CacheConfig, ConfigError};
use crate::core::backend::{Backend, BackendError, BackendFactory, RedisBackendFactory};
use crate::core::endpoint::{resolve_endpoints, Endpoint, EndpointError};
use crate::core::metrics::{BackendMetrics, MetricsSnapshot};
use crate::core::mirror::{MirrorSet, ReplicationReport, ReplicationStats};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Cache facade over one authoritative primary store and optional write mirrors.
///
/// Pools are created lazily on first use, at most once per manager, even
/// under concurrent first callers. Reads, `size` and `keys` are served by the
/// primary only. Writes and deletes go to the mirrors first (best-effort) and
/// then to the primary, whose result is the result of the call; a mirror may
/// therefore hold a write the primary rejected.
pub struct CacheManager {
    config: Arc<CacheConfig>,
    factory: Arc<dyn BackendFactory>,
    primary: OnceCell<Arc<dyn Backend>>,
    mirrors: OnceCell<MirrorSet>,
}

impl CacheManager {
    /// Manager backed by pooled Redis connections
    pub fn new(config: CacheConfig) -> Self {
        Self::with_factory(config, Arc::new(RedisBackendFactory))
    }

    pub fn with_factory(config: CacheConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            primary: OnceCell::new(),
            mirrors: OnceCell::new(),
        }
    }

    /// Load and validate a YAML configuration file, then build a Redis-backed manager
    pub async fn from_yaml_file(path: &str) -> Result<Self, CacheError> {
        let config = CacheConfig::from_yaml_file(path).await?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Eagerly create the primary and mirror pools, typically at startup
    pub async fn init(&self) -> Result<(), CacheError> {
        self.ensure_initialized().await.map(|_| ())
    }

    /// Create the primary pool and the mirror pools if they do not exist yet.
    ///
    /// A failed attempt leaves the state unset so a later call may retry.
    pub async fn ensure_initialized(&self) -> Result<(&Arc<dyn Backend>, &MirrorSet), CacheError> {
        let primary = self
            .primary
            .get_or_try_init(|| async {
                self.config.validate_connection_settings()?;
                let settings = self.config.pool_settings();
                let endpoint = self.config.primary_endpoint();
                debug!(primary = %endpoint, "creating primary pool");
                let backend = self.factory.create_backend(&endpoint, &settings).await?;
                Ok::<_, CacheError>(backend)
            })
            .await?;

        let mirrors = self
            .mirrors
            .get_or_try_init(|| async {
                let Some(hosts) = self.config.sibling_hosts.as_deref() else {
                    return Ok::<_, CacheError>(MirrorSet::empty());
                };

                let endpoints = resolve_endpoints(hosts, self.config.port)?;
                let settings = self.config.pool_settings();
                let mut backends = Vec::with_capacity(endpoints.len());
                for endpoint in &endpoints {
                    debug!(mirror = %endpoint, "creating mirror pool");
                    backends.push(self.factory.create_backend(endpoint, &settings).await?);
                }

                info!(
                    primary = %primary.endpoint(),
                    mirrors = backends.len(),
                    "cache pools initialized"
                );
                Ok::<_, CacheError>(MirrorSet::new(backends))
            })
            .await?;

        Ok((primary, mirrors))
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        let (primary, _) = self.ensure_initialized().await?;
        Ok(primary.get(key).await?)
    }

    /// Store `value` with the configured default TTL and return it
    pub async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<Vec<u8>, CacheError> {
        self.set_with_ttl(key, value, self.config.expire).await
    }

    /// Store `value` with an explicit TTL in seconds (0 never expires) and return it
    pub async fn set_with_ttl(
        &self,
        key: &[u8],
        value: Vec<u8>,
        ttl_secs: u64,
    ) -> Result<Vec<u8>, CacheError> {
        self.set_reporting(key, value, ttl_secs)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`set_with_ttl`](Self::set_with_ttl), also returning per-mirror outcomes
    pub async fn set_reporting(
        &self,
        key: &[u8],
        value: Vec<u8>,
        ttl_secs: u64,
    ) -> Result<(Vec<u8>, ReplicationReport), CacheError> {
        let (primary, mirrors) = self.ensure_initialized().await?;
        let report = mirrors.set(key, &value, ttl_secs).await;
        primary.set(key, &value, ttl_secs).await?;
        Ok((value, report))
    }

    pub async fn delete(&self, key: &[u8]) -> Result<(), CacheError> {
        self.delete_reporting(key).await.map(|_| ())
    }

    pub async fn delete_reporting(&self, key: &[u8]) -> Result<ReplicationReport, CacheError> {
        let (primary, mirrors) = self.ensure_initialized().await?;
        let report = mirrors.delete(key).await;
        primary.delete(key).await?;
        Ok(report)
    }

    /// Empty the primary, then every mirror
    pub async fn flush(&self) -> Result<(), CacheError> {
        self.flush_reporting().await.map(|_| ())
    }

    pub async fn flush_reporting(&self) -> Result<ReplicationReport, CacheError> {
        let (primary, mirrors) = self.ensure_initialized().await?;
        primary.flush().await?;
        Ok(mirrors.flush().await)
    }

    pub async fn size(&self) -> Result<u64, CacheError> {
        let (primary, _) = self.ensure_initialized().await?;
        Ok(primary.size().await?)
    }

    /// Keys on the primary matching a glob pattern such as `shiro:session:*`
    pub async fn keys(&self, pattern: &str) -> Result<HashSet<Vec<u8>>, CacheError> {
        let (primary, _) = self.ensure_initialized().await?;
        Ok(primary.keys(pattern).await?)
    }

    /// Mirror endpoints in fan-out order; empty until initialized
    pub fn mirror_endpoints(&self) -> Vec<Endpoint> {
        self.mirrors
            .get()
            .map(MirrorSet::endpoints)
            .unwrap_or_default()
    }

    pub fn replication_stats(&self) -> ReplicationStats {
        self.mirrors
            .get()
            .map(MirrorSet::stats)
            .unwrap_or_default()
    }

    /// Metrics of the primary followed by each mirror
    pub fn metrics_snapshots(&self) -> Vec<MetricsSnapshot> {
        let primary = self.primary.get().into_iter();
        let mirrors = self
            .mirrors
            .get()
            .map(MirrorSet::backends)
            .unwrap_or_default()
            .iter();

        primary
            .chain(mirrors)
            .map(|backend| backend.metrics().snapshot())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid sibling host configuration: {0}")]
    Configuration(#[from] EndpointError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl CacheError {
    /// True when the primary store could not be reached
    pub fn is_connection_error(&self) -> bool {
        matches!(self, CacheError::Backend(e) if e.is_connection_error())
    }
}
