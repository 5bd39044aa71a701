//! End of run summary
use stampede_core::{RunConfig, RunStatistics, ThresholdOutcome};
use std::fmt;
use std::time::Duration;

/// How failed checks affect the run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckGate {
    /// A threshold on `checks` is configured and decides, except that a run where every check
    /// failed never passes.
    Threshold,
    /// Any failed check fails the run.
    AllMustPass,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target_url: String,
    pub stage_count: usize,
    /// Sum of all stage durations.
    pub planned: Duration,
    pub stats: RunStatistics,
    pub thresholds: Vec<ThresholdOutcome>,
    pub check_gate: CheckGate,
}

impl RunReport {
    pub fn new(
        config: &RunConfig,
        stats: RunStatistics,
        thresholds: Vec<ThresholdOutcome>,
    ) -> Self {
        let check_gate = if config.checks_governed_by_threshold() {
            CheckGate::Threshold
        } else {
            CheckGate::AllMustPass
        };

        Self {
            target_url: config.target_url().to_string(),
            stage_count: config.stages().len(),
            planned: config.total_duration(),
            stats,
            thresholds,
            check_gate,
        }
    }

    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn checks_passed(&self) -> bool {
        match self.check_gate {
            CheckGate::Threshold => self.stats.check_pass_rate() != Some(0.),
            CheckGate::AllMustPass => self.stats.failed_checks() == 0,
        }
    }

    /// Run verdict, used for the process exit status.
    pub fn passed(&self) -> bool {
        self.thresholds_passed() && self.checks_passed()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;

        writeln!(f, "target: {}", self.target_url)?;
        writeln!(
            f,
            "stages: {} ({} planned, {} elapsed)",
            self.stage_count,
            humantime::format_duration(self.planned),
            humantime::format_duration(round_millis(stats.elapsed)),
        )?;
        writeln!(f)?;

        for check in &stats.checks {
            let mark = if check.failed == 0 { '✓' } else { '✗' };
            writeln!(
                f,
                "  {mark} {:.<32} {} ({}/{})",
                format!("{} ", check.name),
                Percent(check.pass_rate()),
                check.passed,
                check.total(),
            )?;
        }
        writeln!(f)?;

        writeln!(f, "  {:.<32} {}", "checks ", Percent(stats.check_pass_rate()))?;
        writeln!(f, "  {:.<32} {}", "http_req_duration ", stats.latency)?;
        writeln!(
            f,
            "  {:.<32} {} ({}/{})",
            "http_req_failed ",
            Percent(stats.failure_rate()),
            stats.failed_requests,
            stats.requests,
        )?;
        writeln!(
            f,
            "  {:.<32} {} ({:.2}/s)",
            "http_reqs ",
            stats.requests,
            stats.request_rate().unwrap_or_default(),
        )?;
        writeln!(f, "  {:.<32} {}", "vus_max ", stats.max_vus)?;

        if stats.errors.total() > 0 {
            writeln!(
                f,
                "  {:.<32} timeout={} connect={} other={}",
                "network_errors ", stats.errors.timeout, stats.errors.connect, stats.errors.other,
            )?;
        }

        if !stats.status_codes.is_empty() {
            let codes: Vec<_> = stats
                .status_codes
                .iter()
                .map(|(code, count)| format!("{code}={count}"))
                .collect();
            writeln!(f, "  {:.<32} {}", "status_codes ", codes.join(" "))?;
        }

        let per_stage: Vec<_> = stats.stage_requests.iter().map(u64::to_string).collect();
        writeln!(f, "  {:.<32} {}", "stage_reqs ", per_stage.join(" "))?;

        if !self.thresholds.is_empty() {
            writeln!(f)?;
            writeln!(f, "thresholds:")?;
            for outcome in &self.thresholds {
                writeln!(f, "  {outcome}")?;
            }
        }

        if !self.checks_passed() {
            writeln!(f)?;
            match self.check_gate {
                CheckGate::AllMustPass => writeln!(f, "{} checks failed", stats.failed_checks())?,
                CheckGate::Threshold => writeln!(f, "all {} checks failed", stats.failed_checks())?,
            }
        }

        writeln!(f)?;
        write!(
            f,
            "result: {}",
            if self.passed() { "PASSED" } else { "FAILED" }
        )
    }
}

struct Percent(Option<f64>);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rate) => write!(f, "{:.2}%", rate * 100.),
            None => write!(f, "-"),
        }
    }
}

fn round_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}
