//! HTTP surface
//!
//! Thin axum handlers over [`AppContext`]. Request bodies are decoded into
//! boundary DTOs with optional fields and validated into domain types here,
//! so everything below this module works with checked values only.

mod dto;

pub use dto::{AnalyzeBody, AnalyzeResponse, HealthResponse, PriceUpdateBody};

use crate::context::AppContext;
use crate::errors::{utils, AnalyzerError, PriceError, ValidationError};
use crate::models::WeatherAnalysisMode;
use crate::weather::{LocationInfo, WeatherSummary};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type SharedContext = Arc<AppContext>;

/// Errors a handler can answer with
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<AnalyzerError> for ApiError {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::Validation(e) => ApiError::Validation(e),
            other => {
                crate::analyzer_error!(
                    error = %other,
                    severity = %utils::get_error_severity(&other),
                    recoverable = utils::is_recoverable_error(&other),
                    "Request failed"
                );
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(e) => {
                let details: serde_json::Map<String, Value> = e
                    .field_errors()
                    .into_iter()
                    .map(|(field, message)| (field, Value::String(message)))
                    .collect();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "error": "Invalid input", "details": details }),
                )
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Malformed request", "details": message }),
            ),
            ApiError::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "Service unavailable", "details": message }),
            ),
            ApiError::Internal(message) => {
                tracing::debug!(%message, "Internal error hidden from client");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// All routes with CORS and request tracing applied
pub fn router(ctx: SharedContext) -> Router {
    let cors = cors_layer(&ctx.config.server.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/weather/:location", get(weather))
        .route("/api/locations", get(locations))
        .route("/api/weather-analysis-options", get(weather_analysis_options))
        .route("/api/electricity-price", get(electricity_price))
        .route("/api/electricity-price/update-live", post(update_price_live))
        .route("/api/electricity-price/update-manual", post(update_price_manual))
        .route("/api/rag/status", get(rag_status))
        .route("/api/rag/refresh", post(rag_refresh))
        .route("/api/policies/summary", get(policy_summary))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve until the listener fails or `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, ctx: SharedContext, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

async fn health(State(ctx): State<SharedContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "Solar Feasibility Analyzer",
        version: crate::VERSION,
        build_profile: crate::BUILD_PROFILE,
        uptime_seconds: (chrono::Utc::now() - ctx.started_at).num_seconds().max(0),
    })
}

async fn analyze(
    State(ctx): State<SharedContext>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> ApiResult<AnalyzeResponse> {
    let Json(body) = body?;
    let request = body.into_request()?;
    let outcome = ctx.analyze(&request).await?;
    Ok(Json(AnalyzeResponse::new(request.location(), outcome)))
}

async fn weather(State(ctx): State<SharedContext>, Path(location): Path<String>) -> Json<WeatherSummary> {
    let solar = &ctx.config.solar;
    Json(
        ctx.weather
            .summary(&location, solar.latest_window_years, solar.hybrid_latest_weight),
    )
}

async fn locations(State(ctx): State<SharedContext>) -> Json<Value> {
    let locations: Vec<LocationInfo> = ctx.weather.locations();
    Json(json!({
        "count": locations.len(),
        "default_location": ctx.config.data.default_location,
        "locations": locations,
    }))
}

async fn weather_analysis_options() -> Json<Value> {
    let options: Vec<Value> = WeatherAnalysisMode::ALL
        .iter()
        .map(|mode| json!({ "value": mode.as_str(), "description": mode.description() }))
        .collect();
    Json(json!({
        "default": WeatherAnalysisMode::default().as_str(),
        "options": options,
    }))
}

async fn electricity_price(State(ctx): State<SharedContext>) -> Json<Value> {
    Json(json!(ctx.prices.current()))
}

async fn update_price_live(State(ctx): State<SharedContext>) -> ApiResult<Value> {
    match ctx.prices.update_live().await {
        Ok(stored) => Ok(Json(json!({ "status": "updated", "price": stored }))),
        Err(e) => {
            tracing::warn!(error = %e, "Live price update failed");
            Err(ApiError::Unavailable(e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct PriceQuery {
    price: Option<f64>,
}

async fn update_price_manual(
    State(ctx): State<SharedContext>,
    Query(query): Query<PriceQuery>,
    body: Option<Json<PriceUpdateBody>>,
) -> ApiResult<Value> {
    let price = body
        .and_then(|Json(b)| b.price)
        .or(query.price)
        .ok_or_else(|| ValidationError::missing("price"))?;

    match ctx.prices.update_manual(price) {
        Ok(stored) => Ok(Json(json!({ "status": "updated", "price": stored }))),
        Err(PriceError::InvalidPrice { value }) => Err(ValidationError::invalid(
            "price",
            format!("{value} is outside the accepted range (0, 2) EUR/kWh"),
        )
        .into()),
        Err(e) => Err(AnalyzerError::from(e).into()),
    }
}

async fn rag_status(State(ctx): State<SharedContext>) -> Json<Value> {
    Json(json!(ctx.rag.status()))
}

async fn rag_refresh(State(ctx): State<SharedContext>) -> Json<Value> {
    let summary = ctx.rag.refresh_policy_data().await;
    Json(json!({ "status": "refreshed", "summary": summary }))
}

async fn policy_summary(State(ctx): State<SharedContext>) -> Json<Value> {
    let policy = ctx.rag.policy();
    Json(json!({
        "policies": policy.policy_summary(),
        "document_count": policy.document_count(),
    }))
}
