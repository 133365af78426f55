use crate::config::ConnectionPoolConfig;
use crate::core::endpoint::Endpoint;
use async_trait::async_trait;
use bb8::{ErrorSink, Pool, PooledConnection, RunError, State};
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::time::Duration;
use tokio::sync::broadcast;

/// Connection manager for bb8 that opens Redis connections to one endpoint
#[derive(Debug, Clone)]
pub struct RedisConnectionManager {
    endpoint: Endpoint,
    client: redis::Client,
    connect_timeout: Option<Duration>,
}

impl RedisConnectionManager {
    pub fn new(
        endpoint: Endpoint,
        credential: Option<&str>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, ConnectionError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
            redis: RedisConnectionInfo {
                password: credential.map(str::to_string),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info)
            .map_err(|e| ConnectionError::PoolCreationFailed(e.to_string()))?;

        Ok(Self {
            endpoint,
            client,
            connect_timeout,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl bb8::ManageConnection for RedisConnectionManager {
    type Connection = MultiplexedConnection;
    type Error = ConnectionError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let connecting = self.client.get_multiplexed_async_connection();

        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting).await.map_err(|_| {
                ConnectionError::ConnectionFailed(format!(
                    "{}: connect timed out after {}ms",
                    self.endpoint,
                    limit.as_millis()
                ))
            })?,
            None => connecting.await,
        };

        result.map_err(|e| ConnectionError::ConnectionFailed(format!("{}: {}", self.endpoint, e)))
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        let _: () = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(|_| ConnectionError::ConnectionInvalid)?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // Broken multiplexed connections surface through is_valid on checkout
        false
    }
}

/// Hands connect failures from bb8's background dialer to waiting checkouts.
///
/// bb8 only reports a failed dial to its error sink; a checkout waiting for
/// that connection would otherwise sit out the whole pool deadline.
#[derive(Debug, Clone)]
struct ConnectFailureSink {
    failures: broadcast::Sender<String>,
}

impl ErrorSink<ConnectionError> for ConnectFailureSink {
    fn sink(&self, error: ConnectionError) {
        match error {
            ConnectionError::ConnectionFailed(reason) => {
                // No receivers means no checkout is waiting
                let _ = self.failures.send(reason);
            }
            other => tracing::debug!(error = %other, "discarding pooled connection"),
        }
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<ConnectionError>> {
        Box::new(self.clone())
    }
}

/// Type alias for a pooled connection (without static lifetime constraint)
pub type PooledRedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// bb8 pool for one endpoint whose checkouts fail as soon as a dial fails
#[derive(Debug, Clone)]
pub struct RedisPool {
    endpoint: Endpoint,
    pool: Pool<RedisConnectionManager>,
    failures: broadcast::Sender<String>,
}

impl RedisPool {
    /// Borrow a connection, dialing one if none is idle.
    ///
    /// A refused or timed out dial is returned right away as
    /// [`ConnectionError::ConnectionFailed`].
    pub async fn get(&self) -> Result<PooledRedisConnection<'_>, ConnectionError> {
        // Subscribe before checkout so a failure of the dial it triggers is seen
        let mut failures = self.failures.subscribe();

        tokio::select! {
            checkout = self.pool.get() => checkout.map_err(|e| match e {
                RunError::User(inner) => inner,
                RunError::TimedOut => ConnectionError::ConnectionFailed(format!(
                    "{}: timed out waiting for a pooled connection",
                    self.endpoint
                )),
            }),
            Ok(reason) = failures.recv() => Err(ConnectionError::ConnectionFailed(reason)),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> State {
        self.pool.state()
    }
}

/// Per-endpoint pool construction settings, shared by the primary and every mirror
#[derive(Debug, Clone, Default)]
pub struct PoolSettings {
    pub connect_timeout: Option<Duration>,
    pub credential: Option<String>,
    pub pool: ConnectionPoolConfig,
}

/// Which optional knobs a pool is built with; the rest come from library defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Authenticated { with_timeout: bool },
    TimeoutOnly,
    LibraryDefaults,
}

impl PoolSettings {
    pub fn mode(&self) -> PoolMode {
        match (&self.credential, self.connect_timeout) {
            (Some(_), timeout) => PoolMode::Authenticated {
                with_timeout: timeout.is_some(),
            },
            (None, Some(_)) => PoolMode::TimeoutOnly,
            (None, None) => PoolMode::LibraryDefaults,
        }
    }
}

/// Builder for creating connection pools
pub struct ConnectionPoolBuilder;

impl ConnectionPoolBuilder {
    /// Create a connection pool for `endpoint`.
    ///
    /// No connection is opened here; the pool dials lazily on first checkout,
    /// so an unreachable endpoint only fails the operations that use it.
    pub fn build_pool(
        endpoint: &Endpoint,
        settings: &PoolSettings,
    ) -> Result<RedisPool, ConnectionError> {
        let mode = settings.mode();
        tracing::debug!(endpoint = %endpoint, ?mode, "building connection pool");

        // bb8 panics on these bounds instead of returning an error
        settings
            .pool
            .validate()
            .map_err(|e| ConnectionError::PoolCreationFailed(format!("{}: {}", endpoint, e)))?;

        let manager = RedisConnectionManager::new(
            endpoint.clone(),
            settings.credential.as_deref(),
            settings.connect_timeout,
        )?;

        let (failures, _) = broadcast::channel(16);
        let config = &settings.pool;
        let mut builder = Pool::builder()
            .max_size(config.max_connections)
            .min_idle((config.min_idle > 0).then_some(config.min_idle))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .max_lifetime(Some(Duration::from_secs(config.max_lifetime_secs)))
            .retry_connection(false)
            .error_sink(Box::new(ConnectFailureSink {
                failures: failures.clone(),
            }));

        if let Some(timeout) = settings.connect_timeout {
            builder = builder.connection_timeout(timeout);
        }

        Ok(RedisPool {
            endpoint: endpoint.clone(),
            pool: builder.build_unchecked(manager),
            failures,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection pool creation failed: {0}")]
    PoolCreationFailed(String),
    #[error("Connection is invalid")]
    ConnectionInvalid,
}
