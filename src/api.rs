//! HTTP surface for the converter.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::converter::FxConverter;
use crate::core::cache::{CacheStats, TtlCache};
use crate::core::config::AppConfig;
use crate::core::error::ConversionError;
use crate::core::rates::QuoteSource;

pub struct AppState {
    pub converter: FxConverter,
    /// General-purpose cache shared by handlers.
    pub cache: TtlCache<Value>,
}

impl AppState {
    pub fn from_config(config: &AppConfig, source: Arc<dyn QuoteSource>) -> Self {
        AppState {
            converter: FxConverter::new(source),
            cache: TtlCache::with_default_ttl(config.cache.default_ttl()),
        }
    }
}

pub enum ApiError {
    /// Request parameters failed validation.
    Unprocessable(String),
    Conversion(ConversionError),
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        ApiError::Conversion(err)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Conversion(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Conversion(err) => {
                error!("Conversion error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct ConvertParams {
    ccy_from: String,
    ccy_to: String,
    quantity: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversionResponse {
    pub quantity: f64,
    pub ccy: String,
}

#[derive(Debug, Deserialize)]
struct RateParams {
    ccy_from: String,
    ccy_to: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RateResponse {
    pub from: String,
    pub to: String,
    pub rate: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CurrenciesResponse {
    pub currencies: Vec<String>,
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "currency-converter" }))
}

async fn convert_currency(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ConvertParams>, QueryRejection>,
) -> ApiResult<Json<ConversionResponse>> {
    let Query(params) = params?;
    if params.quantity.is_nan() || params.quantity <= 0.0 {
        return Err(ApiError::Unprocessable(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let from = params.ccy_from.to_uppercase();
    let to = params.ccy_to.to_uppercase();
    let converted = state
        .converter
        .convert(&from, &to, params.quantity)
        .await?;

    Ok(Json(ConversionResponse {
        quantity: round_to_cents(converted),
        ccy: to,
    }))
}

async fn exchange_rate(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RateParams>, QueryRejection>,
) -> ApiResult<Json<RateResponse>> {
    let Query(params) = params?;
    let from = params.ccy_from.to_uppercase();
    let to = params.ccy_to.to_uppercase();
    let rate = state.converter.get_exchange_rate(&from, &to).await?;
    Ok(Json(RateResponse { from, to, rate }))
}

async fn supported_currencies(State(state): State<Arc<AppState>>) -> Json<CurrenciesResponse> {
    Json(CurrenciesResponse {
        currencies: state.converter.supported_currencies().await,
    })
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/convert", get(convert_currency))
        .route("/rate", get(exchange_rate))
        .route("/currencies", get(supported_currencies))
        .route("/cache/stats", get(cache_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
