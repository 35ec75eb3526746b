use axum::extract::{MatchedPath, State};
use axum::{Router, routing::get};
use http::{Request, StatusCode};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::{Layer, Service};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};

use futures_util::future::BoxFuture;

use crate::shutdown::shutdown_signal;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static SERVER_STARTED: OnceLock<()> = OnceLock::new();

fn install_recorder_once() -> &'static PrometheusHandle {
    PROM_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("install global metrics recorder")
    })
}

/// Flipped by the leader watchdog (`reconciler::leader`) every time the
/// lease is successfully renewed, and cleared on loss. `/healthz` reflects
/// it directly — see `SPEC_FULL.md` §4.1 and §10.4.
#[derive(Clone, Default)]
pub struct ReadinessFlag(Arc<AtomicBool>);

impl ReadinessFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts the `/healthz` + `/metrics` HTTP server once per process,
/// regardless of leadership state, so a standby replica still answers
/// health probes (§10.4). Returns immediately if `METRICS_PORT` is unset.
pub fn maybe_spawn_metrics_server(node_id: String, readiness: ReadinessFlag) {
    let Some(port) = metric_port_env() else {
        return;
    };

    if SERVER_STARTED.set(()).is_ok() {
        let _ = install_recorder_once();
        tokio::spawn(run_metrics_server(port, node_id, readiness));
    }
}

async fn healthz(State(readiness): State<ReadinessFlag>) -> StatusCode {
    if readiness.get() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn run_metrics_server(port: u16, node_id: String, readiness: ReadinessFlag) {
    let handle = install_recorder_once().clone();
    let metrics_route = {
        let handle = handle.clone();
        axum::routing::get(move || async move { handle.render() })
    };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .with_state(readiness)
        .route("/metrics", metrics_route)
        .layer(MetricsLayer::new(node_id));
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .inspect_err(|e| tracing::error!(%addr, error = %e, "failed to bind metrics server"))
        .unwrap();
    tracing::info!(port, "starting metrics/health server");
    let started = Instant::now();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("failed to serve metrics");
    tracing::info!(uptime = ?started.elapsed(), "metrics server stopped gracefully");
}

fn metric_port_env() -> Option<u16> {
    std::env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
}

/// Tower layer that records request count, latency histogram, and in-flight gauge.
/// Uses `MatchedPath` to avoid high-cardinality raw URLs.
#[derive(Clone)]
pub struct MetricsLayer {
    classifier: SharedClassifier<ServerErrorsAsFailures>,
    node_id: String,
}
impl MetricsLayer {
    fn new(node_id: String) -> Self {
        Self {
            classifier: SharedClassifier::new(ServerErrorsAsFailures::new()),
            node_id,
        }
    }
}
impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            classifier: self.classifier.clone(),
            node_id: self.node_id.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    node_id: String,
    pub classifier: SharedClassifier<ServerErrorsAsFailures>,
}

impl<S, B> Service<Request<B>> for MetricsService<S>
where
    S: Service<Request<B>, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let start = Instant::now();
        let method = req.method().clone();
        let method_str = method.as_str().to_owned();

        let route: String = req
            .extensions()
            .get::<MatchedPath>()
            .map(|m| m.as_str().to_owned())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let mut svc = self.inner.clone();
        let fut = svc.call(req);
        let node_id = self.node_id.clone();

        Box::pin(async move {
            let in_flight_gauge =
                gauge!("http_server_in_flight_requests", "method" => method_str.clone());
            in_flight_gauge.increment(1);

            let res = fut.await;
            let elapsed = start.elapsed().as_secs_f64();

            let status = match &res {
                Ok(resp) => resp.status(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };

            let _ = histogram!(
                "http_server_request_duration_seconds",
                "elapsed" => elapsed.to_string(),
                "method" => method_str.clone(),
                "route"  => route.clone(),
                "status" => status.as_u16().to_string(),
                "node_id" => node_id.clone()
            );

            counter!(
                "http_server_requests_total",
                "method" => method_str.clone(),
                "route"  => route.clone(),
                "status" => status.as_u16().to_string(),
                "node_id" => node_id
            )
            .increment(1);

            in_flight_gauge.decrement(1);

            res
        })
    }
}
