use crate::core::connection_pool::{
    ConnectionError, ConnectionPoolBuilder, PoolSettings, PooledRedisConnection, RedisPool,
};
use crate::core::endpoint::Endpoint;
use crate::core::metrics::{AtomicBackendMetrics, BackendMetrics};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Core trait for a single backing store endpoint.
///
/// Every call borrows one connection for its own duration and returns it
/// before completing, on success and on failure alike.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the value stored under `key`
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;

    /// Store `value` under `key`, then apply a TTL when `ttl_secs` is non-zero
    async fn set(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> Result<(), BackendError>;

    /// Remove `key`; removing an absent key succeeds
    async fn delete(&self, key: &[u8]) -> Result<(), BackendError>;

    /// Remove every key in the selected database
    async fn flush(&self) -> Result<(), BackendError>;

    /// Number of keys in the selected database
    async fn size(&self) -> Result<u64, BackendError>;

    /// Keys matching a store-side glob pattern
    async fn keys(&self, pattern: &str) -> Result<HashSet<Vec<u8>>, BackendError>;

    /// Endpoint this backend talks to
    fn endpoint(&self) -> &Endpoint;

    /// Get backend identifier/name
    fn name(&self) -> &str;

    /// Get metrics for this backend
    fn metrics(&self) -> Arc<AtomicBackendMetrics>;
}

/// Redis backend on top of a bb8 connection pool
#[derive(Debug)]
pub struct RedisBackend {
    pub name: String,
    pub endpoint: Endpoint,
    pub connection_pool: RedisPool,
    pub metrics: Arc<AtomicBackendMetrics>,
}

impl RedisBackend {
    /// Create a backend (and its pool) for one endpoint
    pub fn from_settings(
        endpoint: Endpoint,
        settings: &PoolSettings,
    ) -> Result<Self, BackendError> {
        let connection_pool = ConnectionPoolBuilder::build_pool(&endpoint, settings)
            .map_err(|e| BackendError::PoolCreationFailed(e.to_string()))?;
        Ok(Self::with_connection_pool(endpoint, connection_pool))
    }

    /// Create a backend with a custom connection pool
    pub fn with_connection_pool(endpoint: Endpoint, pool: RedisPool) -> Self {
        let name = endpoint.to_string();
        let metrics = Arc::new(AtomicBackendMetrics::new(name.clone()));
        Self {
            name,
            endpoint,
            connection_pool: pool,
            metrics,
        }
    }

    async fn checkout(&self) -> Result<PooledRedisConnection<'_>, BackendError> {
        self.connection_pool.get().await.map_err(|e| match e {
            ConnectionError::ConnectionFailed(reason) => BackendError::ConnectionFailed(reason),
            other => BackendError::ConnectionFailed(format!("{}: {}", self.endpoint, other)),
        })
    }

    fn command_error(&self, error: RedisError) -> BackendError {
        if error.is_io_error()
            || error.is_connection_dropped()
            || error.is_connection_refusal()
            || error.is_timeout()
        {
            BackendError::ConnectionFailed(format!("{}: {}", self.endpoint, error))
        } else {
            BackendError::CommandFailed(format!("{}: {}", self.endpoint, error))
        }
    }

    /// Execute an operation with latency measurement (helper method)
    async fn execute_with_metrics<T>(
        &self,
        operation: impl std::future::Future<Output = Result<T, BackendError>> + Send,
    ) -> Result<T, BackendError> {
        let start = Instant::now();
        let result = operation.await;
        let latency = start.elapsed();

        match &result {
            Ok(_) => self.metrics.record_success(latency),
            Err(_) => self.metrics.record_failure(Some(latency)),
        }

        result
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.execute_with_metrics(async {
            let mut conn = self.checkout().await?;
            conn.get::<_, Option<Vec<u8>>>(key)
                .await
                .map_err(|e| self.command_error(e))
        })
        .await
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> Result<(), BackendError> {
        self.execute_with_metrics(async {
            let mut conn = self.checkout().await?;
            conn.set::<_, _, ()>(key, value)
                .await
                .map_err(|e| self.command_error(e))?;
            if ttl_secs != 0 {
                let seconds = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
                conn.expire::<_, ()>(key, seconds)
                    .await
                    .map_err(|e| self.command_error(e))?;
            }
            Ok::<_, BackendError>(())
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<(), BackendError> {
        self.execute_with_metrics(async {
            let mut conn = self.checkout().await?;
            conn.del::<_, ()>(key)
                .await
                .map_err(|e| self.command_error(e))
        })
        .await
    }

    async fn flush(&self) -> Result<(), BackendError> {
        self.execute_with_metrics(async {
            let mut conn = self.checkout().await?;
            let _: () = redis::cmd("FLUSHDB")
                .query_async(&mut *conn)
                .await
                .map_err(|e| self.command_error(e))?;
            Ok::<_, BackendError>(())
        })
        .await
    }

    async fn size(&self) -> Result<u64, BackendError> {
        self.execute_with_metrics(async {
            let mut conn = self.checkout().await?;
            let size: Option<u64> = redis::cmd("DBSIZE")
                .query_async(&mut *conn)
                .await
                .map_err(|e| self.command_error(e))?;
            Ok::<_, BackendError>(size.unwrap_or(0))
        })
        .await
    }

    async fn keys(&self, pattern: &str) -> Result<HashSet<Vec<u8>>, BackendError> {
        self.execute_with_metrics(async {
            let mut conn = self.checkout().await?;
            conn.keys::<_, HashSet<Vec<u8>>>(pattern.as_bytes())
                .await
                .map_err(|e| self.command_error(e))
        })
        .await
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

/// Builds one backend per endpoint during lazy initialization
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create_backend(
        &self,
        endpoint: &Endpoint,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn Backend>, BackendError>;
}

/// Factory producing pooled [`RedisBackend`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisBackendFactory;

#[async_trait]
impl BackendFactory for RedisBackendFactory {
    async fn create_backend(
        &self,
        endpoint: &Endpoint,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        let backend = RedisBackend::from_settings(endpoint.clone(), settings)?;
        Ok(Arc::new(backend) as Arc<dyn Backend>)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Command failed: {0}")]
    CommandFailed(String),
    #[error("Connection pool creation failed: {0}")]
    PoolCreationFailed(String),
}

impl BackendError {
    /// True when the store could not be reached, as opposed to rejecting a command
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BackendError::ConnectionFailed(_))
    }
}
