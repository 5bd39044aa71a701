use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use metrics::counter;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Handle to a mock service spawned on an ephemeral port.
#[derive(Clone)]
pub struct MockService {
    pub addr: SocketAddr,
    hits: Arc<AtomicU64>,
}

impl MockService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Requests served so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

pub fn router(hits: Arc<AtomicU64>) -> Router {
    Router::new()
        .route("/clientes/:id/extrato", get(extrato))
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/jitter/ms/:mean_ms/:std_ms", get(jitter))
        .route("/status/:code", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(hits)
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let hits = Arc::new(AtomicU64::new(0));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tokio::spawn(tps_measure_task(hits.clone()));
    axum::serve(listener, router(hits)).await?;
    Ok(())
}

/// Bind to `127.0.0.1:0` and serve in the background.
pub async fn spawn() -> MockService {
    let hits = Arc::new(AtomicU64::new(0));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock service");
    let addr = listener.local_addr().expect("mock service address");

    let app = router(hits.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });

    MockService { addr, hits }
}

/** Handlers **/

#[derive(Serialize)]
struct Saldo {
    total: i64,
    data_extrato: u64,
    limite: i64,
}

#[derive(Serialize)]
struct Transacao {
    valor: i64,
    tipo: &'static str,
    descricao: &'static str,
    realizada_em: u64,
}

#[derive(Serialize)]
pub struct Extrato {
    saldo: Saldo,
    ultimas_transacoes: Vec<Transacao>,
}

const LIMITES: [i64; 5] = [100_000, 80_000, 1_000_000, 10_000_000, 500_000];

#[debug_handler]
pub async fn extrato(
    State(hits): State<Arc<AtomicU64>>,
    Path(id): Path<u32>,
) -> Result<Json<Extrato>, StatusCode> {
    hit(&hits);
    let limite = match id {
        1..=5 => LIMITES[id as usize - 1],
        _ => {
            debug!("Unknown client {id}");
            return Err(StatusCode::NOT_FOUND);
        }
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Ok(Json(Extrato {
        saldo: Saldo {
            total: 0,
            data_extrato: now,
            limite,
        },
        ultimas_transacoes: vec![Transacao {
            valor: 10,
            tipo: "c",
            descricao: "deposito",
            realizada_em: now,
        }],
    }))
}

#[debug_handler]
pub async fn delay(State(hits): State<Arc<AtomicU64>>, Path(delay_ms): Path<u64>) {
    hit(&hits);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

#[debug_handler]
pub async fn jitter(
    State(hits): State<Arc<AtomicU64>>,
    Path((mean_ms, std_ms)): Path<(f64, f64)>,
) -> Result<(), StatusCode> {
    hit(&hits);
    let normal = Normal::new(mean_ms, std_ms).map_err(|_| StatusCode::BAD_REQUEST)?;
    let delay_ms = normal.sample(&mut rand::thread_rng()).max(0.);
    tokio::time::sleep(Duration::from_secs_f64(delay_ms / 1000.)).await;
    Ok(())
}

#[debug_handler]
pub async fn status(State(hits): State<Arc<AtomicU64>>, Path(code): Path<u16>) -> StatusCode {
    hit(&hits);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

fn hit(hits: &AtomicU64) {
    counter!("mock-service.requests").increment(1);
    hits.fetch_add(1, Ordering::Relaxed);
}

/** TPS Printer **/

pub async fn tps_measure_task(hits: Arc<AtomicU64>) {
    let mut last = hits.load(Ordering::Relaxed);
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let current = hits.load(Ordering::Relaxed);
        println!("{} TPS", current - last);
        last = current;
    }
}
