//! Handlers HTTP del proxy de tráfico
//!
//! /route se intercepta para aplicar velocidades reales; /matrix y
//! /sources_to_targets se reenvían tal cual (el ajuste de matrices con
//! tráfico en vivo no está soportado); cualquier otra ruta se proxea
//! transparentemente al motor.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use super::geocode::kakao_geocoding;
use super::rewrite::{apply_real_traffic_to_response, requested_live_traffic};
use super::ProxyState;

const ROUTE_TIMEOUT: Duration = Duration::from_secs(30);
const MATRIX_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

pub fn create_proxy_router() -> Router<ProxyState> {
    Router::new()
        .route("/route", post(proxy_route))
        .route("/matrix", post(proxy_matrix))
        .route("/sources_to_targets", post(proxy_sources_to_targets))
        .route("/search", get(search))
        .route("/health", get(health))
        .route("/status", get(engine_status))
        .route("/traffic-debug", get(traffic_debug))
        .fallback(proxy_all)
}

/// /route con intercepción de tráfico en vivo
async fn proxy_route(State(state): State<ProxyState>, Json(original_request): Json<Value>) -> Response {
    let use_traffic = requested_live_traffic(&original_request);
    let snapshot = state.speed_table.snapshot().await;

    log::info!("Route request received");
    log::info!("교통 데이터 수집: {}개", snapshot.len());

    let result = state
        .client
        .post(format!("{}/route", state.config.valhalla_url))
        .json(&original_request)
        .timeout(ROUTE_TIMEOUT)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => match response.json::<Value>().await {
            Ok(mut body) => {
                apply_real_traffic_to_response(&mut body, &snapshot, use_traffic);
                Json(body).into_response()
            }
            Err(e) => {
                log::error!("Invalid engine response: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "invalid routing engine response" })),
                )
                    .into_response()
            }
        },
        Ok(response) => {
            // 5xx/4xx del motor se devuelve con el body original
            let status = response.status();
            log::error!("Valhalla error: {}", status);
            let body = response.text().await.unwrap_or_default();
            (status, body).into_response()
        }
        Err(e) => {
            log::error!("Proxy error: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// /matrix reenvía al sources_to_targets del motor. El ajuste de matrices
/// con tráfico en vivo no está soportado: pass-through siempre.
async fn proxy_matrix(State(state): State<ProxyState>, Json(original_request): Json<Value>) -> Response {
    log::info!("Matrix request received");
    forward_sources_to_targets(&state, original_request).await
}

async fn proxy_sources_to_targets(
    State(state): State<ProxyState>,
    Json(original_request): Json<Value>,
) -> Response {
    forward_sources_to_targets(&state, original_request).await
}

async fn forward_sources_to_targets(state: &ProxyState, original_request: Value) -> Response {
    let result = state
        .client
        .post(format!("{}/sources_to_targets", state.config.valhalla_url))
        .json(&original_request)
        .timeout(MATRIX_TIMEOUT)
        .send()
        .await;

    match result {
        Ok(response) => {
            let status = response.status();
            let body = response.bytes().await.unwrap_or_default();
            if !status.is_success() {
                log::error!("Matrix request failed: {}", status);
            }
            (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Matrix proxy error: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Geocoding en vivo con la cadena de fallbacks; nunca falla
async fn search(
    State(state): State<ProxyState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let text = params.get("text").cloned().unwrap_or_default();
    log::info!("카카오 지오코딩 요청: {}", text);

    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "text parameter required" })),
        )
            .into_response();
    }

    let result = kakao_geocoding(&state.client, &state.config.kakao_api_key, &text).await;

    if result.confidence >= 0.8 {
        log::info!(
            "카카오 지오코딩 성공: {} -> ({}, {}) 신뢰도: {}",
            text,
            result.lat,
            result.lon,
            result.confidence
        );
    } else {
        log::warn!(
            "카카오 지오코딩 (낮은 신뢰도): {} -> ({}, {}) 신뢰도: {}",
            text,
            result.lat,
            result.lon,
            result.confidence
        );
    }

    Json(json!({
        "features": [{
            "geometry": {
                "coordinates": [result.lon, result.lat]
            },
            "properties": {
                "confidence": result.confidence,
                "display_name": result.display_name,
                "district": result.district,
                "geocoding_method": result.method
            }
        }]
    }))
    .into_response()
}

/// Introspección del proxy y de la tabla de tráfico
async fn health(State(state): State<ProxyState>) -> Json<Value> {
    let snapshot = state.speed_table.snapshot().await;

    let traffic_stats = if snapshot.is_empty() {
        json!({})
    } else {
        let speeds: Vec<f64> = snapshot.values().copied().collect();
        let avg = speeds.iter().sum::<f64>() / speeds.len() as f64;
        json!({
            "avg_speed": avg,
            "min_speed": speeds.iter().cloned().fold(f64::INFINITY, f64::min),
            "max_speed": speeds.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            "slow_roads": speeds.iter().filter(|s| **s < 20.0).count(),
            "fast_roads": speeds.iter().filter(|s| **s > 50.0).count()
        })
    };

    Json(json!({
        "status": "healthy",
        "traffic_data_count": snapshot.len(),
        "traffic_stats": traffic_stats,
        "valhalla_url": state.config.valhalla_url,
        "kakao_api_configured": state.config.kakao_configured(),
        "geocoding_method": "kakao",
        "intercept_method": "response_modification"
    }))
}

/// Estado del motor de rutas
async fn engine_status(State(state): State<ProxyState>) -> Response {
    let result = state
        .client
        .get(format!("{}/status", state.config.valhalla_url))
        .timeout(STATUS_TIMEOUT)
        .send()
        .await;

    match result {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            (status, body).into_response()
        }
        Err(e) => {
            log::error!("Status check error: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Valhalla unreachable" })),
            )
                .into_response()
        }
    }
}

/// Distribución de velocidades observadas, con una muestra de la tabla
async fn traffic_debug(State(state): State<ProxyState>) -> Json<Value> {
    let snapshot = state.speed_table.snapshot().await;

    if snapshot.is_empty() {
        return Json(json!({ "message": "교통 데이터 없음" }));
    }

    let speeds: Vec<f64> = snapshot.values().copied().collect();
    let sample: HashMap<&String, &f64> = snapshot.iter().take(10).collect();

    Json(json!({
        "total_roads": snapshot.len(),
        "speed_stats": {
            "avg": speeds.iter().sum::<f64>() / speeds.len() as f64,
            "min": speeds.iter().cloned().fold(f64::INFINITY, f64::min),
            "max": speeds.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        },
        "speed_distribution": {
            "very_slow": speeds.iter().filter(|s| **s < 15.0).count(),
            "slow": speeds.iter().filter(|s| (15.0..30.0).contains(*s)).count(),
            "normal": speeds.iter().filter(|s| (30.0..50.0).contains(*s)).count(),
            "fast": speeds.iter().filter(|s| **s >= 50.0).count()
        },
        "sample_data": sample,
        "method": "Valhalla 응답 인터셉트 후 실시간 속도로 시간 재계산"
    }))
}

/// Proxy transparente para el resto de rutas del motor
async fn proxy_all(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let url = format!("{}{}", state.config.valhalla_url, path_and_query);

    let request = match method {
        Method::GET => state.client.get(&url),
        Method::POST => state
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body),
        _ => {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({ "error": "only GET and POST are proxied" })),
            )
                .into_response();
        }
    };

    match request.timeout(ROUTE_TIMEOUT).send().await {
        Ok(response) => {
            let status = response.status();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/json")
                .to_string();
            let bytes = response.bytes().await.unwrap_or_default();
            (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            log::error!("Proxy error for {}: {}", path_and_query, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
