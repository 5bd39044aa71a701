use stampede_core::{LatencyDigest, Millis};
use std::fmt;
use std::time::Duration;

/// What happened during a single scheduler tick.
#[derive(Debug, Clone)]
pub(crate) struct IntervalMeasurement {
    pub requests: u64,
    pub failed: u64,
    pub elapsed: Duration,
    latency: LatencyDigest,
}

impl IntervalMeasurement {
    pub fn new(requests: u64, failed: u64, elapsed: Duration) -> Self {
        Self {
            requests,
            failed,
            elapsed,
            latency: LatencyDigest::new(),
        }
    }

    pub fn populate_latencies(&mut self, latencies: &[Duration]) {
        self.latency.extend(latencies);
    }

    pub fn rps(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.;
        }
        self.requests as f64 / self.elapsed.as_secs_f64()
    }

    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.;
        }
        self.failed as f64 / self.requests as f64
    }

    pub fn latency(&self, quantile: f64) -> Option<Duration> {
        self.latency.quantile(quantile)
    }
}

impl fmt::Display for IntervalMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RPS={:.2}, FailRate={:.2}, p50={}, p90={}, p99={}",
            self.rps(),
            self.failure_rate(),
            Millis(self.latency(0.5)),
            Millis(self.latency(0.90)),
            Millis(self.latency(0.99)),
        )
    }
}
