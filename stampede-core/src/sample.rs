use crate::FAILED_STATUS;
use std::time::Duration;

/// Why a request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    Timeout,
    Connect,
    Other,
}

/// The outcome of a single virtual user iteration.
///
/// Created by the executor and handed over to the aggregator, which consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSample {
    pub vu: u64,
    pub stage: usize,
    /// Time since the start of the run at which the request was issued.
    pub timestamp: Duration,
    pub latency: Duration,
    pub status: u16,
    /// One result per configured check, in configuration order.
    pub checks: Vec<bool>,
    pub error: Option<RequestErrorKind>,
}

impl RequestSample {
    pub fn failed(
        vu: u64,
        stage: usize,
        timestamp: Duration,
        latency: Duration,
        check_count: usize,
        error: RequestErrorKind,
    ) -> Self {
        Self {
            vu,
            stage,
            timestamp,
            latency,
            status: FAILED_STATUS,
            checks: vec![false; check_count],
            error: Some(error),
        }
    }

    /// A request counts as failed when it errored out or got a status outside of 2xx/3xx.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !(200..400).contains(&self.status)
    }
}
