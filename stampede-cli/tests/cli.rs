use serde_json::json;
use std::path::PathBuf;
use std::process::Output;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::process::Command;

fn write_config(config: serde_json::Value) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let path = std::env::temp_dir().join(format!(
        "stampede-cli-{}-{}.json",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

async fn stampede(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stampede"))
        .args(args)
        .env("RUST_LOG", "stampede=debug")
        .output()
        .await
        .unwrap()
}

#[tokio::test]
#[ntest::timeout(5_000)]
async fn missing_config_exits_with_config_error() {
    let output = stampede(&["run", "does/not/exist.json"]).await;
    assert_eq!(output.status.code(), Some(2));
}

#[tokio::test]
#[ntest::timeout(5_000)]
async fn empty_stages_exit_with_config_error() {
    let path = write_config(json!({
        "target_url": "http://localhost:9999/",
        "stages": [],
    }));
    let output = stampede(&["run", path.to_str().unwrap()]).await;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No stages configured"));
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn passing_run_exits_cleanly() {
    let service = mock_service::spawn().await;
    let path = write_config(json!({
        "target_url": "http://placeholder.invalid/",
        "stages": [
            {"duration": "1s", "target": 3},
            {"duration": "1s", "target": 0},
        ],
        "thresholds": {"http_req_duration": "p(95)<1000ms"},
        "sleep": "50ms",
        "tick": "250ms",
    }));

    let url = service.url("/clientes/1/extrato");
    let output = stampede(&["run", path.to_str().unwrap(), "--url", &url]).await;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0), "{stdout}");
    assert!(stdout.contains("status is 200"));
    assert!(stdout.ends_with("result: PASSED\n"));
    assert!(service.hits() > 0);
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn unreachable_target_fails() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let path = write_config(json!({
        "target_url": format!("http://127.0.0.1:{port}/"),
        "stages": [{"duration": "1s", "target": 2}],
        "sleep": "100ms",
        "tick": "250ms",
    }));

    let output = stampede(&["run", path.to_str().unwrap()]).await;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("0.00%"));
    assert!(stdout.ends_with("result: FAILED\n"));
}
