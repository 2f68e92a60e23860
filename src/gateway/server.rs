//! # HTTP Server Module
//!
//! The axum application: shared state, the JSON extractor that turns body
//! errors into envelopes, one handler per endpoint, the middleware stack,
//! and server startup with graceful shutdown.
//!
//! ## Endpoints
//!
//! | method | path | behaviour |
//! |---|---|---|
//! | POST | `/query` | cached find |
//! | POST | `/query_one` | cached find-one |
//! | POST | `/aggregate` | cached aggregation |
//! | POST | `/distinct` | cached distinct |
//! | POST | `/stats` | collection stats, never cached |
//! | POST | `/connect` | connectivity probe |
//! | GET | `/health` | liveness and cache state |
//! | GET | `/cache/stats` | response cache counters |
//! | GET | `/` | API information |

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    async_trait,
    error_handling::HandleErrorLayer,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    BoxError, Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument};

use super::operations::{
    AggregateRequest, ConnectProbe, ConnectionRequest, DistinctRequest, QueryOneRequest,
    QueryRequest, StatsLookup, ValidateRequest,
};
use super::orchestrator::{CachedOperation, RequestOrchestrator};
use crate::caching::ResponseCache;
use crate::core::config::{QueryLimits, ServerConfig};
use crate::core::error::{describe_panic, GatewayError, GatewayResult};
use crate::core::types::ApiResponse;
use crate::docstore::DocumentStore;
use crate::middleware::timing::process_timing;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RequestOrchestrator>,
    pub cache: Arc<ResponseCache>,
    pub limits: QueryLimits,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<ResponseCache>, limits: QueryLimits) -> Self {
        Self {
            orchestrator: Arc::new(RequestOrchestrator::new(store, cache.clone())),
            cache,
            limits,
            started_at: Instant::now(),
        }
    }
}

/// `Json<T>` whose rejections render as error envelopes
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Build the application router with all layers attached
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health_check))
        .route("/cache/stats", get(cache_stats))
        .route("/connect", post(connect_probe))
        .route("/stats", post(collection_stats))
        .route("/query", post(query_documents))
        .route("/query_one", post(query_one_document))
        .route("/aggregate", post(aggregate_documents))
        .route("/distinct", post(distinct_values))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_request_size))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(config.request_timeout),
        )
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(process_timing))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, Json<ApiResponse>) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(ApiResponse::error("Request timed out")),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Unhandled internal error: {}", err))),
        )
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let reason = describe_panic(payload.as_ref());
    error!(panic = %reason, "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error(format!("Internal server error: {}", reason))),
    )
        .into_response()
}

async fn run_cached<O>(state: &AppState, request: O) -> GatewayResult<Json<ApiResponse>>
where
    O: CachedOperation + ValidateRequest,
{
    request.validate(&state.limits)?;
    Ok(Json(state.orchestrator.run(&request).await))
}

/// Error envelopes from the probe endpoints carry a 400
fn probe_response(response: ApiResponse) -> (StatusCode, Json<ApiResponse>) {
    let status = if response.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

#[instrument(skip_all, fields(database = %request.database_name, collection = %request.collection_name))]
async fn query_documents(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<QueryRequest>,
) -> GatewayResult<Json<ApiResponse>> {
    run_cached(&state, request).await
}

#[instrument(skip_all, fields(database = %request.database_name, collection = %request.collection_name))]
async fn query_one_document(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<QueryOneRequest>,
) -> GatewayResult<Json<ApiResponse>> {
    run_cached(&state, request).await
}

#[instrument(skip_all, fields(database = %request.database_name, collection = %request.collection_name))]
async fn aggregate_documents(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AggregateRequest>,
) -> GatewayResult<Json<ApiResponse>> {
    run_cached(&state, request).await
}

#[instrument(skip_all, fields(database = %request.database_name, collection = %request.collection_name))]
async fn distinct_values(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<DistinctRequest>,
) -> GatewayResult<Json<ApiResponse>> {
    run_cached(&state, request).await
}

async fn connect_probe(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ConnectionRequest>,
) -> GatewayResult<(StatusCode, Json<ApiResponse>)> {
    request.validate(&state.limits)?;
    let target = request.target();
    let response = state
        .orchestrator
        .run_uncached("connect", &target, &ConnectProbe { target: &target })
        .await;
    Ok(probe_response(response))
}

async fn collection_stats(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ConnectionRequest>,
) -> GatewayResult<(StatusCode, Json<ApiResponse>)> {
    request.validate(&state.limits)?;
    let response = state
        .orchestrator
        .run_uncached("stats", &request.target(), &StatsLookup)
        .await;
    Ok(probe_response(response))
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Json<ApiResponse> {
    let reachable = state.cache.health_check().await;
    Json(ApiResponse::healthy("Service is running").with_data(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "cache": {
            "available": state.cache.is_available(),
            "reachable": reachable,
            "default_ttl_secs": state.cache.default_ttl_secs(),
        },
    })))
}

async fn cache_stats(State(state): State<AppState>) -> Json<ApiResponse> {
    let stats = state.cache.stats();
    let hit_rate = stats.hit_rate();
    let mut data = json!(stats);
    data["hit_rate"] = json!(hit_rate);
    Json(ApiResponse::success("Cache statistics").with_data(data))
}

async fn api_info() -> Json<ApiResponse> {
    Json(ApiResponse::success("Document query gateway").with_data(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /query": "Find documents (cached)",
            "POST /query_one": "Find the first matching document (cached)",
            "POST /aggregate": "Run an aggregation pipeline (cached)",
            "POST /distinct": "Distinct values of a field (cached)",
            "POST /stats": "Collection statistics",
            "POST /connect": "Check that a deployment is reachable",
            "GET /health": "Service health",
            "GET /cache/stats": "Response cache counters",
        },
    })))
}

/// HTTP server bound to the configured address
pub struct GatewayServer {
    config: ServerConfig,
    app: Router,
}

impl GatewayServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        let app = build_router(state, &config);
        Self { config, app }
    }

    pub fn bind_address(&self) -> String {
        self.config.socket_address()
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_address = self.bind_address();
        let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind server to {}: {}", bind_address, e))
        })?;

        info!("Gateway HTTP server listening on {}", bind_address);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("Server error: {}", e)))?;

        info!("Gateway HTTP server stopped");
        Ok(())
    }
}
