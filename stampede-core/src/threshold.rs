use crate::{Millis, RunStatistics, ThresholdError};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Metrics a threshold can be written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Request latency, in milliseconds.
    HttpReqDuration,
    HttpReqs,
    /// Fraction of requests which errored out or got a non 2xx/3xx status.
    HttpReqFailed,
    /// Fraction of check evaluations which passed.
    Checks,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::HttpReqDuration => "http_req_duration",
            Metric::HttpReqs => "http_reqs",
            Metric::HttpReqFailed => "http_req_failed",
            Metric::Checks => "checks",
        }
    }

    fn supports(&self, aggregation: Aggregation) -> bool {
        use Aggregation::*;
        match self {
            Metric::HttpReqDuration => matches!(aggregation, Avg | Min | Max | Med | Percentile(_)),
            Metric::HttpReqs => matches!(aggregation, Count | Rate),
            Metric::HttpReqFailed | Metric::Checks => matches!(aggregation, Rate),
        }
    }
}

impl FromStr for Metric {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "http_req_duration" => Ok(Metric::HttpReqDuration),
            "http_reqs" => Ok(Metric::HttpReqs),
            "http_req_failed" => Ok(Metric::HttpReqFailed),
            "checks" => Ok(Metric::Checks),
            other => Err(ThresholdError::UnknownMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in the 0..=100 range.
    Percentile(f64),
    Count,
    Rate,
}

impl FromStr for Aggregation {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "avg" => return Ok(Aggregation::Avg),
            "min" => return Ok(Aggregation::Min),
            "max" => return Ok(Aggregation::Max),
            "med" => return Ok(Aggregation::Med),
            "count" => return Ok(Aggregation::Count),
            "rate" => return Ok(Aggregation::Rate),
            _ => {}
        }

        let inner = s
            .strip_prefix("p(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| ThresholdError::UnknownAggregation(s.to_string()))?;

        match inner.trim().parse::<f64>() {
            Ok(p) if (0. ..=100.).contains(&p) => Ok(Aggregation::Percentile(p)),
            _ => Err(ThresholdError::InvalidPercentile(inner.to_string())),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Rate => write!(f, "rate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }
}

/// A pass/fail condition over an aggregated metric, e.g. `p(95)<250` on `http_req_duration`.
///
/// Latency values are milliseconds; a `us`, `ms` or `s` suffix is accepted on the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: Metric,
    aggregation: Aggregation,
    comparison: Comparison,
    value: f64,
    expression: String,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ThresholdError> {
        let metric: Metric = metric.parse()?;
        let (lhs, comparison, rhs) = split_expression(expression)
            .ok_or_else(|| ThresholdError::MissingOperator(expression.to_string()))?;

        let aggregation: Aggregation = lhs.parse()?;
        if !metric.supports(aggregation) {
            return Err(ThresholdError::UnsupportedAggregation {
                metric: metric.name(),
                aggregation: lhs.to_string(),
            });
        }

        let value = if metric == Metric::HttpReqDuration {
            parse_millis(rhs)
        } else {
            rhs.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        .ok_or_else(|| ThresholdError::InvalidValue(rhs.to_string()))?;

        Ok(Self {
            metric,
            aggregation,
            comparison,
            value,
            expression: expression.trim().to_string(),
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The aggregated value this threshold compares against. `None` when the metric has no data.
    pub fn observe(&self, stats: &RunStatistics) -> Option<f64> {
        use Aggregation::*;
        match (self.metric, self.aggregation) {
            (Metric::HttpReqDuration, aggregation) => {
                let latency = &stats.latency;
                match aggregation {
                    Avg => latency.mean(),
                    Min => latency.min(),
                    Max => latency.max(),
                    Med => latency.quantile(0.5),
                    Percentile(p) => latency.quantile(p / 100.),
                    Count | Rate => None,
                }
                .map(as_millis)
            }
            (Metric::HttpReqs, Count) => Some(stats.requests as f64),
            (Metric::HttpReqs, Rate) => stats.request_rate(),
            (Metric::HttpReqFailed, Rate) => stats.failure_rate(),
            (Metric::Checks, Rate) => stats.check_pass_rate(),
            _ => None,
        }
    }

    pub fn evaluate(&self, stats: &RunStatistics) -> ThresholdOutcome {
        let observed = self.observe(stats);
        let passed = observed.is_some_and(|v| self.comparison.apply(v, self.value));
        ThresholdOutcome {
            metric: self.metric,
            expression: self.expression.clone(),
            observed,
            passed,
        }
    }
}

/// Result of evaluating a [`Threshold`] at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: Metric,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

impl fmt::Display for ThresholdOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { '✓' } else { '✗' };
        write!(f, "{mark} {} {}", self.metric, self.expression)?;
        match (self.metric, self.observed) {
            (_, None) => write!(f, " (no data)"),
            (Metric::HttpReqDuration, Some(ms)) => write!(
                f,
                " (observed {})",
                Millis(Duration::try_from_secs_f64(ms / 1e3).ok())
            ),
            (Metric::HttpReqs, Some(v)) => write!(f, " (observed {v:.2})"),
            (_, Some(rate)) => write!(f, " (observed {:.2}%)", rate * 100.),
        }
    }
}

fn split_expression(expression: &str) -> Option<(&str, Comparison, &str)> {
    let idx = expression.find(|c: char| matches!(c, '<' | '>' | '=' | '!'))?;
    let (lhs, rest) = expression.split_at(idx);
    let (comparison, len) = match rest.as_bytes() {
        [b'<', b'=', ..] => (Comparison::Le, 2),
        [b'>', b'=', ..] => (Comparison::Ge, 2),
        [b'=', b'=', ..] => (Comparison::Eq, 2),
        [b'!', b'=', ..] => (Comparison::Ne, 2),
        [b'<', ..] => (Comparison::Lt, 1),
        [b'>', ..] => (Comparison::Gt, 1),
        _ => return None,
    };
    Some((lhs.trim(), comparison, rest[len..].trim()))
}

fn parse_millis(raw: &str) -> Option<f64> {
    let (number, scale) = if let Some(n) = raw.strip_suffix("ms") {
        (n, 1.)
    } else if let Some(n) = raw.strip_suffix("us").or_else(|| raw.strip_suffix("µs")) {
        (n, 1e-3)
    } else if let Some(n) = raw.strip_suffix('s') {
        (n, 1e3)
    } else {
        (raw, 1.)
    };
    let value = number.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value * scale)
}

fn as_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}
