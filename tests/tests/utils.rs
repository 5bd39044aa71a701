use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::MockService;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_env_filter("stampede=debug,stampede_core=debug,mock_service=info")
            .init();

        // Only the recorder: nothing scrapes it, but it exercises the metrics emission paths.
        let _ = PrometheusBuilder::new().install_recorder();
    });
}

#[allow(unused)]
pub async fn service() -> MockService {
    init();
    mock_service::spawn().await
}

#[allow(unused)]
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
