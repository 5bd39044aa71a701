use crate::LatencyDigest;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckStats {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

impl CheckStats {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    pub fn pass_rate(&self) -> Option<f64> {
        ratio(self.passed, self.total())
    }
}

/// Requests which never produced a response, by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounts {
    pub timeout: u64,
    pub connect: u64,
    pub other: u64,
}

impl ErrorCounts {
    pub fn total(&self) -> u64 {
        self.timeout + self.connect + self.other
    }
}

/// Aggregated results of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    pub elapsed: Duration,
    pub max_vus: usize,
    pub requests: u64,
    pub failed_requests: u64,
    pub latency: LatencyDigest,
    pub checks: Vec<CheckStats>,
    pub errors: ErrorCounts,
    pub status_codes: BTreeMap<u16, u64>,
    /// Requests issued while each stage was active, indexed like the configured stages.
    pub stage_requests: Vec<u64>,
}

impl RunStatistics {
    pub fn request_rate(&self) -> Option<f64> {
        if self.elapsed.is_zero() {
            None
        } else {
            Some(self.requests as f64 / self.elapsed.as_secs_f64())
        }
    }

    pub fn failure_rate(&self) -> Option<f64> {
        ratio(self.failed_requests, self.requests)
    }

    pub fn check_pass_rate(&self) -> Option<f64> {
        let passed = self.checks.iter().map(|c| c.passed).sum();
        let total = self.checks.iter().map(CheckStats::total).sum();
        ratio(passed, total)
    }

    pub fn failed_checks(&self) -> u64 {
        self.checks.iter().map(|c| c.failed).sum()
    }
}

fn ratio(part: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(part as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_need_data() {
        let stats = RunStatistics::default();
        assert_eq!(stats.request_rate(), None);
        assert_eq!(stats.failure_rate(), None);
        assert_eq!(stats.check_pass_rate(), None);
    }

    #[test]
    fn check_pass_rate_spans_all_checks() {
        let stats = RunStatistics {
            elapsed: Duration::from_secs(4),
            requests: 10,
            checks: vec![
                CheckStats {
                    name: "a".into(),
                    passed: 10,
                    failed: 0,
                },
                CheckStats {
                    name: "b".into(),
                    passed: 5,
                    failed: 5,
                },
            ],
            ..Default::default()
        };
        assert_eq!(stats.check_pass_rate(), Some(0.75));
        assert_eq!(stats.failed_checks(), 5);
        assert_eq!(stats.request_rate(), Some(2.5));
    }
}
