use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=debug,tower_http=info")
        .init();

    PrometheusBuilder::new()
        .with_http_listener("0.0.0.0:8003".parse::<SocketAddr>()?)
        .install()?;

    let addr: SocketAddr = std::env::var("MOCK_SERVICE_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:9999".to_string())
        .parse()?;

    mock_service::run(addr).await
}
