use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tally of completed request cycles, shared by every worker in a run. Clones point at the same
/// count.
#[derive(Debug, Clone, Default)]
pub struct RequestCounter {
    value: Arc<AtomicU64>,
}

impl RequestCounter {
    pub fn new() -> RequestCounter {
        RequestCounter::default()
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }

    pub fn read(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Aggregate numbers for a finished run.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RunStatistics {
    pub total_time: Duration,
    pub total_requests: u64,
}

impl RunStatistics {
    pub fn new(total_time: Duration, total_requests: u64) -> RunStatistics {
        RunStatistics {
            total_time,
            total_requests,
        }
    }

    /// Requests per second. A zero-length run reports 0.
    pub fn throughput(&self) -> f64 {
        match self.total_time.as_secs_f64() {
            secs if secs > 0.0 => self.total_requests as f64 / secs,
            _ => 0.0,
        }
    }

    pub fn log(&self) {
        info!(
            "Total time: {} seconds, total requests: {}",
            self.total_time.as_secs(),
            self.total_requests
        );
        info!("Req/sec: {:.2}", self.throughput());
    }
}
