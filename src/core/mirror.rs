use crate::core::backend::{Backend, BackendError};
use crate::core::endpoint::Endpoint;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of replicating one write to one mirror
#[derive(Debug, Clone)]
pub enum MirrorOutcome {
    Applied,
    Failed(BackendError),
}

impl MirrorOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MirrorOutcome::Applied)
    }
}

/// Per-mirror outcomes of one fan-out, in mirror order
#[derive(Debug, Clone, Default)]
pub struct ReplicationReport {
    pub outcomes: Vec<(Endpoint, MirrorOutcome)>,
}

impl ReplicationReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.applied()
    }

    /// Endpoints that did not receive the write
    pub fn failed_endpoints(&self) -> Vec<&Endpoint> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_applied())
            .map(|(endpoint, _)| endpoint)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }
}

/// Running totals of replication attempts across all mirrors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub attempts: u64,
    pub failures: u64,
}

/// Write-only fan-out set of mirror stores.
///
/// Writes are attempted against every mirror in configuration order. A failing
/// mirror is logged and recorded in the returned report; it never stops the
/// remaining mirrors from being tried and never surfaces as an error.
/// Mirrors are not consulted for reads.
pub struct MirrorSet {
    mirrors: Vec<Arc<dyn Backend>>,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl MirrorSet {
    pub fn new(mirrors: Vec<Arc<dyn Backend>>) -> Self {
        Self {
            mirrors,
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.mirrors
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.mirrors.iter().map(|m| m.endpoint().clone()).collect()
    }

    pub fn stats(&self) -> ReplicationStats {
        ReplicationStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub async fn set(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> ReplicationReport {
        self.fan_out("set", |mirror| async move { mirror.set(key, value, ttl_secs).await })
            .await
    }

    pub async fn delete(&self, key: &[u8]) -> ReplicationReport {
        self.fan_out("delete", |mirror| async move { mirror.delete(key).await })
            .await
    }

    pub async fn flush(&self) -> ReplicationReport {
        self.fan_out("flush", |mirror| async move { mirror.flush().await })
            .await
    }

    async fn fan_out<'a, F, Fut>(&'a self, operation: &str, apply: F) -> ReplicationReport
    where
        F: Fn(&'a dyn Backend) -> Fut,
        Fut: Future<Output = Result<(), BackendError>> + 'a,
    {
        let mut report = ReplicationReport {
            outcomes: Vec::with_capacity(self.mirrors.len()),
        };

        for mirror in &self.mirrors {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let outcome = match apply(mirror.as_ref()).await {
                Ok(()) => MirrorOutcome::Applied,
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        mirror = %mirror.endpoint(),
                        operation,
                        error = %e,
                        "Cannot replicate to sibling host"
                    );
                    MirrorOutcome::Failed(e)
                }
            };
            report.outcomes.push((mirror.endpoint().clone(), outcome));
        }

        if !report.outcomes.is_empty() {
            tracing::debug!(
                operation,
                applied = report.applied(),
                failed = report.failed(),
                "mirror fan-out finished"
            );
        }

        report
    }
}

impl std::fmt::Debug for MirrorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorSet")
            .field("mirrors", &self.endpoints())
            .field("stats", &self.stats())
            .finish()
    }
}
