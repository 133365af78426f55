pub mod backend;
pub mod connection_pool;
pub mod endpoint;
pub mod metrics;
pub mod mirror;

// Re-export core traits
pub use backend::{Backend, BackendError, BackendFactory, RedisBackend, RedisBackendFactory};
pub use connection_pool::{ConnectionPoolBuilder, PoolMode, PoolSettings, RedisPool};
pub use endpoint::{resolve_endpoints, Endpoint, EndpointError};
pub use metrics::{AtomicBackendMetrics, BackendMetrics, MetricsSnapshot};
pub use mirror::{MirrorOutcome, MirrorSet, ReplicationReport, ReplicationStats};
