use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Core trait for per-endpoint operation metrics
pub trait BackendMetrics: Send + Sync {
    /// Record a successful operation with its latency
    fn record_success(&self, latency: Duration);

    /// Record a failed operation with its latency (if available)
    fn record_failure(&self, latency: Option<Duration>);

    /// Get current metrics snapshot
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub backend_name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub success_rate: f64,
    pub last_request_time: Option<Instant>,
}

/// Thread-safe implementation of BackendMetrics
#[derive(Debug)]
pub struct AtomicBackendMetrics {
    backend_name: String,

    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,

    latency_tracker: Mutex<LatencyTracker>,
    last_request_time: Mutex<Option<Instant>>,
}

impl AtomicBackendMetrics {
    pub fn new(backend_name: String) -> Self {
        Self {
            backend_name,
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            latency_tracker: Mutex::new(LatencyTracker::new()),
            last_request_time: Mutex::new(None),
        }
    }

    fn touch(&self, latency: Option<Duration>) {
        if let Ok(mut last_time) = self.last_request_time.lock() {
            *last_time = Some(Instant::now());
        }
        if let Some(latency) = latency {
            if let Ok(mut tracker) = self.latency_tracker.lock() {
                tracker.record_latency(latency);
            }
        }
    }
}

impl BackendMetrics for AtomicBackendMetrics {
    fn record_success(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.touch(Some(latency));
    }

    fn record_failure(&self, latency: Option<Duration>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.touch(latency);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successes = self.successful_requests.load(Ordering::Relaxed);

        let success_rate = if total > 0 {
            (successes as f64) / (total as f64) * 100.0
        } else {
            0.0
        };

        let (average_latency_ms, p95_latency_ms, p99_latency_ms) =
            match self.latency_tracker.lock() {
                Ok(tracker) => (
                    tracker.average_latency_ms(),
                    tracker.percentile_latency_ms(95.0),
                    tracker.percentile_latency_ms(99.0),
                ),
                Err(_) => (0.0, 0.0, 0.0),
            };

        let last_request_time = self.last_request_time.lock().ok().and_then(|time| *time);

        MetricsSnapshot {
            backend_name: self.backend_name.clone(),
            total_requests: total,
            successful_requests: successes,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_latency_ms,
            p95_latency_ms,
            p99_latency_ms,
            success_rate,
            last_request_time,
        }
    }
}

/// Latency tracking with sliding window for percentiles
#[derive(Debug)]
struct LatencyTracker {
    latencies: Vec<Duration>,
    max_samples: usize,
    next_index: usize,
}

impl LatencyTracker {
    fn new() -> Self {
        Self {
            latencies: Vec::with_capacity(1000),
            max_samples: 1000, // Keep last 1000 samples for percentile calculation
            next_index: 0,
        }
    }

    fn record_latency(&mut self, latency: Duration) {
        if self.latencies.len() < self.max_samples {
            self.latencies.push(latency);
        } else {
            self.latencies[self.next_index] = latency;
            self.next_index = (self.next_index + 1) % self.max_samples;
        }
    }

    fn average_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }

        let total_ms: f64 = self
            .latencies
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .sum();

        total_ms / self.latencies.len() as f64
    }

    fn percentile_latency_ms(&self, percentile: f64) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }

        let mut sorted_latencies = self.latencies.clone();
        sorted_latencies.sort();

        let index = ((percentile / 100.0) * sorted_latencies.len() as f64) as usize;
        let index = index.min(sorted_latencies.len() - 1);

        sorted_latencies[index].as_secs_f64() * 1000.0
    }
}
