use hdrhistogram::Histogram;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Precision of the latency histogram. Three figures keeps quantiles within 0.1% of the
/// recorded value.
const HISTOGRAM_SIGFIG: u8 = 3;

/// Streaming latency distribution.
///
/// Samples are recorded in microseconds into an auto-resizing HDR histogram, so memory only grows
/// with the latency range and quantiles carry a bounded relative error. Count, sum, min and max
/// are tracked exactly alongside it.
#[derive(Debug, Clone)]
pub struct LatencyDigest {
    histogram: Histogram<u64>,
    count: u64,
    sum: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl Default for LatencyDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyDigest {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(HISTOGRAM_SIGFIG).expect("Invalid histogram precision"),
            count: 0,
            sum: Duration::ZERO,
            min: None,
            max: None,
        }
    }

    pub fn insert(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        if let Err(err) = self.histogram.record(micros) {
            warn!("Unable to record latency {latency:?}: {err:?}");
        }
        self.count += 1;
        self.sum += latency;
        self.min = Some(self.min.map_or(latency, |m| m.min(latency)));
        self.max = Some(self.max.map_or(latency, |m| m.max(latency)));
    }

    pub fn extend(&mut self, latencies: &[Duration]) {
        for latency in latencies {
            self.insert(*latency);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        let nanos = self.sum.as_nanos() / u128::from(self.count);
        Some(Duration::from_nanos(nanos as u64))
    }

    /// Latency at `quantile` (0.0..=1.0), clamped to the exact recorded range. `None` when
    /// nothing was recorded.
    pub fn quantile(&self, quantile: f64) -> Option<Duration> {
        let (min, max) = (self.min?, self.max?);
        if min == max {
            return Some(min);
        }

        let micros = self.histogram.value_at_quantile(quantile.clamp(0., 1.));
        Some(Duration::from_micros(micros).clamp(min, max))
    }
}

impl fmt::Display for LatencyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
            Millis(self.mean()),
            Millis(self.min()),
            Millis(self.quantile(0.5)),
            Millis(self.max()),
            Millis(self.quantile(0.90)),
            Millis(self.quantile(0.95)),
            Millis(self.quantile(0.99)),
        )
    }
}

/// Formats an optional duration as fractional milliseconds.
pub struct Millis(pub Option<Duration>);

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(d) => write!(f, "{:.2}ms", d.as_secs_f64() * 1e3),
            None => write!(f, "-"),
        }
    }
}
