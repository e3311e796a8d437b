use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Deserializer, de};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use astrotrack_common::UnavailableResponse;

use crate::module::ephemeris::{CacheGate, EphemerisSource};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    gate: Arc<CacheGate<dyn EphemerisSource>>,
}

impl AppState {
    pub fn new(gate: Arc<CacheGate<dyn EphemerisSource>>) -> Self {
        Self { gate }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PositionsQuery {
    /// `true`/`false`, `1`/`0` or `yes`/`no`
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub refresh: Option<bool>,
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" | "" => Ok(Some(false)),
        other => Err(de::Error::custom(format!("invalid refresh flag {:?}", other))),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/positions", get(positions))
        .route("/api/status", get(status))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn positions(State(state): State<AppState>, Query(query): Query<PositionsQuery>) -> Response {
    let force_refresh = query.refresh.unwrap_or(false);

    match state.gate.request(force_refresh).await {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => {
            let retry_after = state.gate.settings().ttl.as_secs().max(1);
            tracing::error!("Positions unavailable: {}", e);
            let body = UnavailableResponse {
                error: format!("Positions are currently unavailable: {}", e),
                retry_after_secs: Some(retry_after),
            };
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gate.status())
}
