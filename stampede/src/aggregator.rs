use crate::measurement::IntervalMeasurement;
use metrics_util::AtomicBucket;
use stampede_core::{
    Check, CheckStats, ErrorCounts, LatencyDigest, RequestErrorKind, RequestSample,
    RunStatistics, Threshold, ThresholdOutcome,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Shared sink for the samples of every virtual user.
///
/// Workers only touch atomics and lock-free buckets. The buckets are drained once per tick by the
/// run loop into the run-wide digest, which is the only state behind a lock.
pub(crate) struct Aggregator {
    requests: AtomicU64,
    failed: AtomicU64,
    interval_requests: AtomicU64,
    interval_failed: AtomicU64,
    checks: Vec<CheckCounter>,
    errors: ErrorCounters,
    stages: Vec<AtomicU64>,
    latency: AtomicBucket<Duration>,
    statuses: AtomicBucket<u16>,
    totals: Mutex<Totals>,
}

struct CheckCounter {
    name: String,
    passed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Default)]
struct ErrorCounters {
    timeout: AtomicU64,
    connect: AtomicU64,
    other: AtomicU64,
}

#[derive(Default)]
struct Totals {
    latency: LatencyDigest,
    status_codes: BTreeMap<u16, u64>,
}

impl Aggregator {
    pub fn new(checks: &[Check], stage_count: usize) -> Self {
        Self {
            requests: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            interval_requests: AtomicU64::new(0),
            interval_failed: AtomicU64::new(0),
            checks: checks
                .iter()
                .map(|check| CheckCounter {
                    name: check.name().to_string(),
                    passed: AtomicU64::new(0),
                    failed: AtomicU64::new(0),
                })
                .collect(),
            errors: ErrorCounters::default(),
            stages: (0..stage_count).map(|_| AtomicU64::new(0)).collect(),
            latency: AtomicBucket::new(),
            statuses: AtomicBucket::new(),
            totals: Mutex::new(Totals::default()),
        }
    }

    pub fn record(&self, sample: RequestSample) {
        let failure = sample.is_failure();

        self.requests.fetch_add(1, Ordering::Relaxed);
        self.interval_requests.fetch_add(1, Ordering::Relaxed);
        if failure {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.interval_failed.fetch_add(1, Ordering::Relaxed);
        }

        for (counter, passed) in self.checks.iter().zip(&sample.checks) {
            if *passed {
                counter.passed.fetch_add(1, Ordering::Relaxed);
            } else {
                counter.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(kind) = sample.error {
            let counter = match kind {
                RequestErrorKind::Timeout => &self.errors.timeout,
                RequestErrorKind::Connect => &self.errors.connect,
                RequestErrorKind::Other => &self.errors.other,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(stage) = self.stages.get(sample.stage) {
            stage.fetch_add(1, Ordering::Relaxed);
        }

        self.latency.push(sample.latency);
        self.statuses.push(sample.status);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("stampede_http_reqs").increment(1);
            if failure {
                metrics::counter!("stampede_http_req_failed").increment(1);
            }
            metrics::histogram!("stampede_http_req_duration").record(sample.latency.as_secs_f64());
        }
    }

    /// Drain everything recorded since the previous call into the run totals.
    pub fn collect(&self, elapsed: Duration) -> IntervalMeasurement {
        let requests = self.interval_requests.swap(0, Ordering::Relaxed);
        let failed = self.interval_failed.swap(0, Ordering::Relaxed);
        let mut measurement = IntervalMeasurement::new(requests, failed, elapsed);

        let mut totals = self.totals();
        self.latency.clear_with(|latencies| {
            measurement.populate_latencies(latencies);
            totals.latency.extend(latencies);
        });
        self.statuses.clear_with(|codes| {
            for code in codes {
                *totals.status_codes.entry(*code).or_default() += 1;
            }
        });

        measurement
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Builds the run statistics and evaluates every threshold against them. Only meaningful once
    /// all workers have stopped and a final [`Aggregator::collect`] happened.
    pub fn finish(
        &self,
        elapsed: Duration,
        max_vus: usize,
        thresholds: &[Threshold],
    ) -> (RunStatistics, Vec<ThresholdOutcome>) {
        let stats = self.statistics(elapsed, max_vus);
        let outcomes = thresholds.iter().map(|t| t.evaluate(&stats)).collect();
        (stats, outcomes)
    }

    pub fn statistics(&self, elapsed: Duration, max_vus: usize) -> RunStatistics {
        let totals = self.totals();
        RunStatistics {
            elapsed,
            max_vus,
            requests: self.requests.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            latency: totals.latency.clone(),
            checks: self
                .checks
                .iter()
                .map(|c| CheckStats {
                    name: c.name.clone(),
                    passed: c.passed.load(Ordering::Relaxed),
                    failed: c.failed.load(Ordering::Relaxed),
                })
                .collect(),
            errors: ErrorCounts {
                timeout: self.errors.timeout.load(Ordering::Relaxed),
                connect: self.errors.connect.load(Ordering::Relaxed),
                other: self.errors.other.load(Ordering::Relaxed),
            },
            status_codes: totals.status_codes.clone(),
            stage_requests: self
                .stages
                .iter()
                .map(|s| s.load(Ordering::Relaxed))
                .collect(),
        }
    }

    fn totals(&self) -> MutexGuard<'_, Totals> {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
