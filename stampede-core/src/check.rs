use crate::DEFAULT_CHECK_STATUS;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    /// The response status equals the given code.
    Status(u16),
    /// The request completed strictly faster than the given duration.
    MaxLatency(Duration),
}

/// A per-request boolean assertion, tracked for pass-rate reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    name: String,
    kind: CheckKind,
}

impl Check {
    pub fn status(code: u16) -> Self {
        Self {
            name: format!("status is {code}"),
            kind: CheckKind::Status(code),
        }
    }

    pub fn max_latency(latency: Duration) -> Self {
        Self {
            name: format!("latency below {}", humantime::format_duration(latency)),
            kind: CheckKind::MaxLatency(latency),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    /// Only called for requests which received a response; network failures fail every check.
    pub fn evaluate(&self, status: u16, latency: Duration) -> bool {
        match self.kind {
            CheckKind::Status(code) => status == code,
            CheckKind::MaxLatency(max) => latency < max,
        }
    }
}

impl Default for Check {
    fn default() -> Self {
        Self::status(DEFAULT_CHECK_STATUS)
    }
}
