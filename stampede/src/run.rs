//! Load test orchestration
use crate::aggregator::Aggregator;
use crate::executor::Executor;
use crate::pool::WorkerPool;
use crate::report::RunReport;
use crate::schedule::Schedule;
use crate::timer::Timer;
use stampede_core::{ConfigError, RunConfig};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Lifecycle of a run, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Ramping { stage: usize },
    Draining,
    Reporting,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Init => write!(f, "init"),
            RunPhase::Ramping { stage } => write!(f, "ramping(stage {})", stage + 1),
            RunPhase::Draining => write!(f, "draining"),
            RunPhase::Reporting => write!(f, "reporting"),
            RunPhase::Done => write!(f, "done"),
        }
    }
}

/// A staged load test.
///
/// Nothing happens until the future is polled; it resolves once every stage has elapsed and all
/// virtual users have finished their last request.
///
/// # Example
/// ```no_run
/// use stampede::prelude::*;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let config = RunConfig::new(
///         "http://localhost:9999/clientes/1/extrato",
///         vec![
///             Stage::new(Duration::from_secs(10), 50),
///             Stage::new(Duration::from_secs(10), 0),
///         ],
///     )
///     .unwrap()
///     .with_threshold("http_req_duration", "p(95)<1")
///     .unwrap();
///
///     let report = LoadTest::new(config).await.unwrap();
///     println!("{report}");
/// }
/// ```
pub struct LoadTest {
    config: Arc<RunConfig>,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<RunReport, RunError>> + Send>>>,
}

impl LoadTest {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config: Arc::new(config),
            runner_fut: None,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

impl Future for LoadTest {
    type Output = Result<RunReport, RunError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.runner_fut.is_none() {
            let config = self.config.clone();
            self.runner_fut = Some(Box::pin(async move { run_load_test(config).await }));
        }

        if let Some(runner) = &mut self.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

#[instrument(name = "run", skip_all, fields(url = %config.target_url()))]
pub(crate) async fn run_load_test(config: Arc<RunConfig>) -> Result<RunReport, RunError> {
    let mut phase = RunPhase::Init;
    let schedule = Arc::new(Schedule::new(config.stages())?);
    info!(
        "Running {} stages over {} with up to {} VUs",
        schedule.len(),
        humantime::format_duration(schedule.total_duration()),
        schedule.max_target(),
    );

    let aggregator = Arc::new(Aggregator::new(config.checks(), schedule.len()));
    let start = Instant::now();
    let executor = Executor::new(config.clone(), schedule.clone(), aggregator.clone(), start)?;
    let mut pool = WorkerPool::new(Arc::new(executor), schedule.max_target() as usize);

    let mut timer = Timer::new(config.tick()).await;
    debug!("Collecting every {timer}");
    let deadline = sleep_until(start + schedule.total_duration());
    tokio::pin!(deadline);
    let mut last_collect = Instant::now();

    // NOTE: This loop is time-sensitive. Any long awaits or blocking will throw off the ramp.
    loop {
        let elapsed = start.elapsed();
        if elapsed >= schedule.total_duration() {
            break;
        }

        let stage = schedule.stage_at(elapsed);
        if phase != (RunPhase::Ramping { stage }) {
            let s = &config.stages()[stage];
            info!(
                "Stage {}/{}: {} VUs over {}",
                stage + 1,
                schedule.len(),
                s.target,
                humantime::format_duration(s.duration),
            );
            transition(&mut phase, RunPhase::Ramping { stage });
        }

        let target = schedule.target_at(elapsed) as usize;
        pool.scale_to(target);

        tokio::select! {
            interval = timer.tick() => {
                last_collect = Instant::now();
                let measurement = aggregator.collect(interval);
                info!(
                    "[{}] VUs={}/{target} {measurement}",
                    format_elapsed(start.elapsed()),
                    pool.active(),
                );
            }
            _ = &mut deadline => break,
        }
    }

    transition(&mut phase, RunPhase::Draining);
    let max_vus = pool.peak();
    pool.shutdown().await;
    let elapsed = start.elapsed();
    let measurement = aggregator.collect(last_collect.elapsed());
    debug!("Final interval: {measurement}");

    transition(&mut phase, RunPhase::Reporting);
    let (stats, outcomes) = aggregator.finish(elapsed, max_vus, config.thresholds());
    for outcome in &outcomes {
        if outcome.passed {
            info!("{outcome}");
        } else {
            warn!("{outcome}");
        }
    }
    let report = RunReport::new(&config, stats, outcomes);

    transition(&mut phase, RunPhase::Done);
    info!(
        "Load test complete: {} requests in {}, {}",
        report.stats.requests,
        format_elapsed(elapsed),
        if report.passed() { "passed" } else { "failed" },
    );

    Ok(report)
}

fn transition(phase: &mut RunPhase, next: RunPhase) {
    info!("{phase} -> {next}");
    *phase = next;
}

fn format_elapsed(elapsed: Duration) -> humantime::FormattedDuration {
    humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
}
