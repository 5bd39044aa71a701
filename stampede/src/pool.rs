use crate::executor::Executor;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

struct VirtualUser {
    id: u64,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl VirtualUser {
    /// Ask the worker to stop after its current iteration.
    fn stop(self) -> JoinHandle<()> {
        trace!("Stopping VU {}", self.id);
        self.stop.send_replace(true);
        self.handle
    }
}

/// The set of running virtual users.
///
/// Workers are never aborted: scaling down signals the newest ones to stop and keeps their
/// handles around until they finish. Draining workers count against the ceiling, so the number
/// of live workers never exceeds it.
pub(crate) struct WorkerPool {
    executor: Arc<Executor>,
    ceiling: usize,
    next_id: u64,
    active: Vec<VirtualUser>,
    draining: Vec<JoinHandle<()>>,
    peak: usize,
}

impl WorkerPool {
    pub fn new(executor: Arc<Executor>, ceiling: usize) -> Self {
        Self {
            executor,
            ceiling,
            next_id: 0,
            active: vec![],
            draining: vec![],
            peak: 0,
        }
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    pub fn draining(&self) -> usize {
        self.draining.len()
    }

    /// Highest number of concurrently active workers seen so far.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn scale_to(&mut self, target: usize) {
        self.draining.retain(|handle| !handle.is_finished());

        let current = self.active.len();
        if target < current {
            let stopped = self.active.split_off(target);
            self.draining.extend(stopped.into_iter().map(VirtualUser::stop));
        } else if target > current {
            let room = self
                .ceiling
                .saturating_sub(current + self.draining.len());
            let spawn = (target - current).min(room);
            if spawn < target - current {
                warn!(
                    "Deferring {} VUs until {} draining VUs finish",
                    target - current - spawn,
                    self.draining.len()
                );
            }
            for _ in 0..spawn {
                self.spawn();
            }
        }

        self.peak = self.peak.max(self.active.len());

        #[cfg(feature = "metrics")]
        metrics::gauge!("stampede_vus").set(self.active.len() as f64);
    }

    fn spawn(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        let (stop, rx) = watch::channel(false);
        let executor = self.executor.clone();
        let handle = tokio::spawn(
            executor
                .run(id, rx)
                .instrument(tracing::debug_span!("vu", id)),
        );
        self.active.push(VirtualUser { id, stop, handle });
    }

    /// Stop every worker and wait for all in-flight iterations to complete.
    pub async fn shutdown(mut self) {
        self.scale_to(0);
        for handle in self.draining.drain(..) {
            if let Err(err) = handle.await {
                error!("VU task failed: {err}");
            }
        }

        #[cfg(feature = "metrics")]
        metrics::gauge!("stampede_vus").set(0.);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::schedule::Schedule;
    use stampede_core::{Check, RunConfig, Stage};
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    fn pool(url: &str, ceiling: usize, sleep: Duration) -> (WorkerPool, Arc<Aggregator>) {
        let config = RunConfig::new(url, vec![Stage::new(Duration::from_secs(10), 1)])
            .unwrap()
            .with_checks(vec![Check::status(200)])
            .with_sleep(sleep);
        let schedule = Arc::new(Schedule::new(config.stages()).unwrap());
        let aggregator = Arc::new(Aggregator::new(config.checks(), schedule.len()));
        let executor =
            Executor::new(Arc::new(config), schedule, aggregator.clone(), Instant::now()).unwrap();
        (WorkerPool::new(Arc::new(executor), ceiling), aggregator)
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn scales_up_and_down() {
        let service = mock_service::spawn().await;
        let (mut pool, aggregator) =
            pool(&service.url("/delay/ms/0"), 10, Duration::from_millis(10));

        pool.scale_to(10);
        assert_eq!(pool.active(), 10);
        sleep(Duration::from_millis(100)).await;

        pool.scale_to(4);
        assert_eq!(pool.active(), 4);
        assert!(pool.active() + pool.draining() <= 10);

        pool.scale_to(10);
        assert!(pool.active() + pool.draining() <= 10);

        sleep(Duration::from_millis(200)).await;
        pool.scale_to(10);
        assert_eq!(pool.active(), 10);
        assert_eq!(pool.draining(), 0);
        assert_eq!(pool.peak(), 10);

        pool.shutdown().await;
        assert!(aggregator.requests() > 0);
        let after = aggregator.requests();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(aggregator.requests(), after);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn draining_counts_against_ceiling() {
        let service = mock_service::spawn().await;
        let (mut pool, _) = pool(&service.url("/delay/ms/300"), 3, Duration::ZERO);

        pool.scale_to(3);
        sleep(Duration::from_millis(50)).await;

        // All three are mid-request and must finish before being replaced.
        pool.scale_to(0);
        pool.scale_to(3);
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.draining(), 3);

        sleep(Duration::from_millis(500)).await;
        pool.scale_to(3);
        assert_eq!(pool.active(), 3);
        assert_eq!(pool.draining(), 0);

        pool.shutdown().await;
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn in_flight_requests_complete() {
        let service = mock_service::spawn().await;
        let (mut pool, aggregator) = pool(&service.url("/delay/ms/200"), 1, Duration::ZERO);

        pool.scale_to(1);
        sleep(Duration::from_millis(50)).await;
        pool.shutdown().await;

        assert_eq!(aggregator.requests(), 1);
        let stats = aggregator.statistics(Duration::from_secs(1), 1);
        assert_eq!(stats.checks[0].passed, 1);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn workers_survive_connection_errors() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (mut pool, aggregator) = pool(
            &format!("http://127.0.0.1:{port}/"),
            2,
            Duration::from_millis(10),
        );

        pool.scale_to(2);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(pool.active(), 2);
        assert!(pool.active.iter().all(|vu| !vu.handle.is_finished()));

        pool.shutdown().await;
        let stats = aggregator.statistics(Duration::from_secs(1), 2);
        assert!(stats.requests > 2);
        assert_eq!(stats.failed_requests, stats.requests);
        assert_eq!(stats.errors.connect, stats.requests);
    }
}
