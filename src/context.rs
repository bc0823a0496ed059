// Shared run state handed to every component that needs it
use crate::config::Config;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Bytes successfully delivered, across every sender.
#[derive(Debug, Default)]
pub struct ThroughputCounter {
    bytes_sent: AtomicU64,
}

impl ThroughputCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Megabytes (MiB) per second for `bytes` over `elapsed`; zero for an empty window.
pub fn rate_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 / BYTES_PER_MB) / secs
}

/// Everything a run shares: immutable configuration, the throughput counter
/// and the process start instant.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Arc<Config>,
    pub throughput: Arc<ThroughputCounter>,
    pub started_at: Instant,
}

impl RunContext {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            throughput: Arc::new(ThroughputCounter::new()),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
