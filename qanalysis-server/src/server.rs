//! HTTP analysis server built on axum.

use axum::{Json, Router, extract::State, routing::get, routing::post};
use chrono::{DateTime, Utc};
use qanalysis_core::{
    AnalysisMetrics, CompositionPolicy, DecodeParms, PrefillParms, QueueAnalyzer, QueueConfig,
    RequestSize, ServerConfig, ServiceParms, SizingResult, TargetMetric,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::types::{AnalysisData, AnalyzeRequest, ProblemData, SizeRequest, SizeResponse};

const SECS_PER_MIN: f64 = 60.0;
const MSEC_PER_SEC: f64 = 1000.0;

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Defaults for fields a structured request leaves out.
    pub defaults: QueueConfig,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(defaults: QueueConfig) -> Self {
        Self {
            defaults,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Build the axum router for the analysis API.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/solve", post(solve_handler))
        .route("/target", post(target_handler))
        .route("/analyze", post(analyze_handler))
        .route("/size", post(size_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0);
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
    }))
}

/// Analyzer for a flat problem: decode-only service, one decode step per
/// output token, no prefill.
fn flat_analyzer(pd: &ProblemData) -> Result<QueueAnalyzer, ApiError> {
    pd.validate().map_err(ApiError::InvalidInput)?;
    let config = QueueConfig {
        max_batch_size: pd.max_batch_size as usize,
        max_queue_size: pd.max_queue_size as usize,
        service: ServiceParms {
            prefill: PrefillParms {
                gamma: 0.0,
                delta: 0.0,
            },
            decode: DecodeParms {
                alpha: pd.alpha,
                beta: pd.beta,
            },
        },
        policy: CompositionPolicy::DecodeOnly,
        ..QueueConfig::default()
    };
    let size = RequestSize {
        avg_input_tokens: 0,
        avg_output_tokens: u32::try_from(pd.avg_num_tokens)
            .map_err(|_| ApiError::InvalidInput("avgNumTokens out of range".into()))?,
    };
    Ok(QueueAnalyzer::new(config, size)?)
}

async fn solve_handler(Json(pd): Json<ProblemData>) -> Result<Json<AnalysisData>, ApiError> {
    let analyzer = flat_analyzer(&pd)?;
    if pd.rpm <= 0.0 {
        return Err(ApiError::InvalidInput("RPM must be positive".into()));
    }
    let max_rpm = analyzer.rate_range().max * SECS_PER_MIN;
    if pd.rpm > max_rpm {
        return Err(ApiError::RateLimit {
            requested: pd.rpm,
            max: max_rpm,
        });
    }

    let metrics = analyzer.analyze(pd.rpm / SECS_PER_MIN)?;
    tracing::info!(rpm = pd.rpm, throughput = metrics.throughput, "solved");
    Ok(Json(AnalysisData::from_metrics(
        &metrics,
        pd.avg_num_tokens as f64,
    )))
}

async fn target_handler(Json(pd): Json<ProblemData>) -> Result<Json<AnalysisData>, ApiError> {
    let analyzer = flat_analyzer(&pd)?;

    // Service time of a request is ITL times its token count.
    let targets: Vec<(TargetMetric, f64)> = [
        (TargetMetric::WaitTime, pd.target_wait * MSEC_PER_SEC),
        (TargetMetric::ServiceTime, pd.target_itl * pd.avg_num_tokens as f64),
    ]
    .into_iter()
    .filter(|(_, value)| *value > 0.0)
    .collect();

    let sized = analyzer.size_for(&targets)?;
    tracing::info!(binding = %sized.binding, rate = sized.rate, "sized flat problem");

    let mut data = AnalysisData::from_metrics(&sized.metrics, pd.avg_num_tokens as f64);
    data.rpm_target_wait = rate_per_min(&sized, TargetMetric::WaitTime);
    data.rpm_target_itl = rate_per_min(&sized, TargetMetric::ServiceTime);
    Ok(Json(data))
}

/// Per-target rate in requests/min, zero when unspecified or infeasible.
fn rate_per_min(sized: &SizingResult, metric: TargetMetric) -> f64 {
    sized
        .per_target
        .iter()
        .find(|t| t.metric == metric)
        .and_then(|t| t.rate)
        .map_or(0.0, |r| r * SECS_PER_MIN)
}

async fn analyze_handler(
    State(state): State<SharedState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisMetrics>, ApiError> {
    let queue = req.queue.unwrap_or_else(|| state.defaults.clone());
    let analyzer = QueueAnalyzer::new(queue, req.request)?;
    let metrics = analyzer.analyze(req.rate)?;
    Ok(Json(metrics))
}

async fn size_handler(
    State(state): State<SharedState>,
    Json(req): Json<SizeRequest>,
) -> Result<Json<SizeResponse>, ApiError> {
    let queue = req.queue.unwrap_or_else(|| state.defaults.clone());
    let analyzer = QueueAnalyzer::new(queue, req.request)?;
    let sized = analyzer.size(&req.targets)?;
    Ok(Json(sized.into()))
}

/// Start the analysis server on the configured address.
///
/// Runs until the process receives Ctrl-C.
pub async fn run(server: &ServerConfig, defaults: QueueConfig) -> Result<(), std::io::Error> {
    let app = router(Arc::new(AppState::new(defaults)));
    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "analysis server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("analysis server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState::new(QueueConfig::default())))
    }

    #[test]
    fn test_flat_analyzer_is_decode_only() {
        let pd = ProblemData {
            rpm: 60.0,
            max_batch_size: 10,
            avg_num_tokens: 1,
            alpha: 1.0,
            beta: 0.5,
            max_queue_size: 90,
            ..ProblemData::default()
        };
        let analyzer = flat_analyzer(&pd).unwrap();
        assert_eq!(analyzer.config().policy, CompositionPolicy::DecodeOnly);
        assert_eq!(analyzer.capacity(), 100);
        // rate(10) = 10 / 6 per msec
        let expected = 10.0 / 6.0 * 0.999 * 1000.0;
        assert!((analyzer.rate_range().max - expected).abs() < 1e-6);
    }

    #[test]
    fn test_flat_analyzer_rejects_invalid() {
        let pd = ProblemData {
            max_batch_size: 0,
            avg_num_tokens: 1,
            alpha: 1.0,
            ..ProblemData::default()
        };
        assert!(matches!(
            flat_analyzer(&pd),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_health() {
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app(), req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
