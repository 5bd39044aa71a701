mod utils;
#[allow(unused)]
use utils::*;

use stampede::prelude::*;
use std::time::Duration;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(20_000)]
async fn ramp_and_drain_passes() {
    let service = service().await;
    let config = RunConfig::new(
        &service.url("/delay/ms/0"),
        vec![Stage::new(secs(5), 10), Stage::new(secs(5), 0)],
    )
    .unwrap()
    .with_threshold("http_req_duration", "p(95)<1000ms")
    .unwrap();

    let report = LoadTest::new(config).await.unwrap();
    println!("{report}");

    assert!(report.passed());
    assert_eq!(report.stats.check_pass_rate(), Some(1.));
    assert_eq!(report.stats.failed_requests, 0);
    assert!(report.stats.max_vus <= 10);
    assert!(report.stats.max_vus >= 8);
    // Averaging ~5 VUs over 10s with a 1s sleep.
    assert!(report.stats.requests >= 25);
    assert_eq!(report.stats.requests, service.hits());
    assert_eq!(report.stats.stage_requests.iter().sum::<u64>(), report.stats.requests);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10_000)]
async fn unreachable_target_fails_every_check() {
    init();
    let config = RunConfig::new(
        &format!("http://127.0.0.1:{}/clientes/1/extrato", closed_port()),
        vec![Stage::new(secs(2), 3)],
    )
    .unwrap()
    .with_sleep(Duration::from_millis(100));

    let report = LoadTest::new(config).await.unwrap();
    println!("{report}");

    assert!(!report.passed());
    assert!(report.stats.requests > 0);
    assert_eq!(report.stats.check_pass_rate(), Some(0.));
    assert_eq!(report.stats.errors.connect, report.stats.requests);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10_000)]
async fn plateau_holds_target_concurrency() {
    let service = service().await;
    let config = RunConfig::new(
        &service.url("/delay/ms/0"),
        vec![
            Stage::new(Duration::ZERO, 4),
            Stage::new(secs(3), 4),
        ],
    )
    .unwrap()
    .with_sleep(Duration::from_millis(100))
    .with_tick(Duration::from_millis(250))
    .unwrap();

    let report = LoadTest::new(config).await.unwrap();

    assert_eq!(report.stats.max_vus, 4);
    // 4 VUs at up to 10 iterations per second for 3 seconds.
    assert!(report.stats.requests >= 4 * 3 * 5);
    assert!(report.stats.requests <= 4 * 3 * 10 + 4);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10_000)]
async fn constant_latency_thresholds_are_deterministic() {
    let service = service().await;
    let run = |threshold: &'static str| {
        let config = RunConfig::new(
            &service.url("/delay/ms/50"),
            vec![Stage::new(Duration::ZERO, 2), Stage::new(secs(1), 2)],
        )
        .unwrap()
        .with_sleep(Duration::from_millis(10))
        .with_threshold("http_req_duration", threshold)
        .unwrap();
        LoadTest::new(config)
    };

    let (fast, slow) = tokio::join!(run("p(95)<10"), run("p(95)<2s"));
    assert!(!fast.unwrap().passed());
    assert!(slow.unwrap().passed());
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10_000)]
async fn server_errors_fail_checks_and_rate_threshold() {
    let service = service().await;
    let config = RunConfig::new(
        &service.url("/status/503"),
        vec![Stage::new(Duration::ZERO, 2), Stage::new(secs(1), 2)],
    )
    .unwrap()
    .with_sleep(Duration::from_millis(50))
    .with_threshold("http_req_failed", "rate<0.01")
    .unwrap();

    let report = LoadTest::new(config).await.unwrap();

    assert!(!report.passed());
    assert_eq!(report.stats.failure_rate(), Some(1.));
    assert_eq!(report.stats.status_codes.get(&503), Some(&report.stats.requests));
    assert_eq!(report.stats.errors.total(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10_000)]
async fn all_checks_failing_fails_under_checks_threshold() {
    let service = service().await;
    let config = RunConfig::new(
        &service.url("/clientes/9/extrato"),
        vec![Stage::new(Duration::ZERO, 1), Stage::new(secs(1), 1)],
    )
    .unwrap()
    .with_sleep(Duration::from_millis(50))
    .with_threshold("checks", "rate>=0")
    .unwrap();

    let report = LoadTest::new(config).await.unwrap();
    println!("{report}");

    assert_eq!(report.stats.check_pass_rate(), Some(0.));
    assert!(report.thresholds_passed());
    assert!(!report.passed());
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10_000)]
async fn jittered_latency_spreads_percentiles() {
    let service = service().await;
    let config = RunConfig::new(
        &service.url("/jitter/ms/20/5"),
        vec![Stage::new(Duration::ZERO, 5), Stage::new(secs(2), 5)],
    )
    .unwrap()
    .with_sleep(Duration::from_millis(10))
    .with_threshold("http_req_duration", "p(95)<1000ms")
    .unwrap()
    .with_threshold("http_req_duration", "med>=5ms")
    .unwrap();

    let report = LoadTest::new(config).await.unwrap();
    println!("{report}");

    assert!(report.passed());
    assert!(report.stats.requests >= 50);
    let latency = &report.stats.latency;
    let (p50, p95) = (latency.quantile(0.5).unwrap(), latency.quantile(0.95).unwrap());
    assert!(p50 >= Duration::from_millis(5), "{p50:?}");
    assert!(p95 > p50, "p50={p50:?} p95={p95:?}");
    assert!(latency.max().unwrap() >= p95);
}

#[cfg(feature = "integration")]
mod integration {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn extrato_reference_workload() {
        let service = service().await;
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/extrato.json");
        let mut config = RunConfig::from_path(path).unwrap();
        config
            .set_target_url(&service.url("/clientes/1/extrato"))
            .unwrap();

        let report = LoadTest::new(config).await.unwrap();
        println!("{report}");

        assert_eq!(report.stats.stage_requests.len(), 4);
        assert!(report.stats.max_vus <= 200);
        assert!(report.stats.max_vus >= 190);
        assert_eq!(report.stats.check_pass_rate(), Some(1.));
    }
}
