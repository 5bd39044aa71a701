use crate::aggregator::Aggregator;
use crate::schedule::Schedule;
use reqwest::Client;
use stampede_core::{RequestErrorKind, RequestSample, RunConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Issues requests on behalf of virtual users.
///
/// Shared by every worker: holds the HTTP client, the run clock and the aggregator samples are
/// handed to.
pub(crate) struct Executor {
    client: Client,
    config: Arc<RunConfig>,
    schedule: Arc<Schedule>,
    aggregator: Arc<Aggregator>,
    start: Instant,
}

impl Executor {
    pub fn new(
        config: Arc<RunConfig>,
        schedule: Arc<Schedule>,
        aggregator: Arc<Aggregator>,
        start: Instant,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(&config)?,
            config,
            schedule,
            aggregator,
            start,
        })
    }

    /// Virtual user loop. Runs until `stop` flips to `true` (or its sender goes away). The flag is
    /// only observed between iterations, so an in-flight request always completes and is recorded.
    pub async fn run(self: Arc<Self>, vu: u64, mut stop: watch::Receiver<bool>) {
        debug!("VU started");

        while !*stop.borrow() {
            let sample = self.iteration(vu).await;
            self.aggregator.record(sample);

            tokio::select! {
                _ = sleep(self.config.sleep()) => {}
                res = stop.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("VU stopped");
    }

    /// A single request against the target, turned into a sample.
    pub async fn iteration(&self, vu: u64) -> RequestSample {
        let timestamp = self.start.elapsed();
        let stage = self.schedule.stage_at(timestamp);
        let checks = self.config.checks();

        let begin = Instant::now();
        let res = self.request().await;
        let latency = begin.elapsed();

        match res {
            Ok(status) => {
                trace!("{status} in {latency:?}");
                RequestSample {
                    vu,
                    stage,
                    timestamp,
                    latency,
                    status,
                    checks: checks.iter().map(|c| c.evaluate(status, latency)).collect(),
                    error: None,
                }
            }
            Err(err) => {
                let kind = classify(&err);
                debug!("Request failed ({kind:?}): {err}");
                RequestSample::failed(vu, stage, timestamp, latency, checks.len(), kind)
            }
        }
    }

    async fn request(&self) -> Result<u16, reqwest::Error> {
        let response = self
            .client
            .get(self.config.target_url().clone())
            .send()
            .await?;
        let status = response.status().as_u16();
        // Latency covers the full body.
        response.bytes().await?;
        Ok(status)
    }
}

pub(crate) fn http_client(config: &RunConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent())
        .build()
}

fn classify(err: &reqwest::Error) -> RequestErrorKind {
    if err.is_timeout() {
        RequestErrorKind::Timeout
    } else if err.is_connect() {
        RequestErrorKind::Connect
    } else {
        RequestErrorKind::Other
    }
}
