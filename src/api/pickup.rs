//! Handlers del despachador de recogida
//!
//! Intake por webhook con cutoff de mediodía, ruteo online por conductor y
//! disparo del handoff hacia el despachador de entrega cuando no queda
//! ninguna recogida pendiente.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middleware::auth::AuthenticatedDriver;
use crate::models::zone::{pickup_driver_for_district, zone_for_driver};
use crate::repositories::parcel_repository::ParcelRepository;
use crate::services::dispatch_service::{resolve_district, DispatchEngine, PICKUP_SIDE};
use crate::services::routing_service::GeoPoint;
use crate::state::AppState;
use crate::utils::errors::{AppError, AppResult};

pub fn open_routes() -> Router<AppState> {
    Router::new()
        .route("/pickup/webhook", post(pickup_webhook))
        .route("/pickup/all-completed", get(all_completed))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/pickup/next", get(next_destination))
        .route("/pickup/complete", post(complete_pickup))
        .route("/pickup/hub-arrived", post(hub_arrived))
        .route("/pickup/status", get(pickup_status))
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub parcel_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub parcel_id: i64,
}

/// Intake de una nueva solicitud de recogida.
///
/// Idempotente: un paquete ya asignado responde already_processed sin tocar
/// la base. El cutoff de las 12:00 es inclusivo: lo recibido a las 12 en
/// punto se programa para mañana.
async fn pickup_webhook(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> AppResult<Json<Value>> {
    let repo = ParcelRepository::new(state.pool.clone());

    let parcel = repo
        .find_by_id(request.parcel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("수거 건을 찾을 수 없습니다".to_string()))?;

    if parcel.pickup_driver_id.is_some() {
        log::info!("🔁 Webhook repetido para el paquete {}", parcel.id);
        return Ok(Json(json!({
            "status": "already_processed",
            "parcel_id": parcel.id
        })));
    }

    let engine = DispatchEngine::from_config(&state.config, state.geocode_cache.clone());
    let district = resolve_district(engine.geocoder.as_ref(), &parcel.recipient_addr)
        .await
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "주소에서 구를 확인할 수 없습니다: {}",
                parcel.recipient_addr
            ))
        })?;

    let driver_id = pickup_driver_for_district(&district).ok_or_else(|| {
        AppError::BadRequest(format!("서비스 지역이 아닙니다: {}", district))
    })?;

    let now = state.config.local_now();
    let today = now.date_naive();
    let next_day = PICKUP_SIDE.past_cutoff(now.time());
    let scheduled_date = if next_day {
        today.succ_opt().unwrap_or(today)
    } else {
        today
    };

    let assigned = repo
        .assign_pickup_driver(parcel.id, driver_id, scheduled_date)
        .await?;
    if !assigned {
        // otro webhook ganó la carrera
        return Ok(Json(json!({
            "status": "already_processed",
            "parcel_id": parcel.id
        })));
    }

    log::info!(
        "📦 Paquete {} asignado al conductor {} ({}), programado {}",
        parcel.id,
        driver_id,
        district,
        scheduled_date
    );

    if next_day {
        Ok(Json(json!({
            "status": "scheduled_tomorrow",
            "parcel_id": parcel.id,
            "district": district,
            "driverId": driver_id,
            "scheduled_date": scheduled_date.to_string()
        })))
    } else {
        Ok(Json(json!({
            "status": "success",
            "parcel_id": parcel.id,
            "district": district,
            "driverId": driver_id,
            "scheduled_for": "today"
        })))
    }
}

/// Próxima parada óptima del conductor de recogida
async fn next_destination(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_pickup()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let now = state.config.local_now();
    if let Some(seconds) = PICKUP_SIDE.seconds_until_start(now.time()) {
        return Ok(Json(json!({
            "status": "waiting",
            "message": "수거는 오전 7시부터 시작됩니다",
            "start_time": "07:00",
            "seconds_until_start": seconds
        })));
    }

    let today = now.date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap();
    let pending = repo.pending_pickups_for_driver(driver_id, today).await?;

    let engine = DispatchEngine::from_config(&state.config, state.geocode_cache.clone());
    let at_hub = state.is_at_hub(driver_id).await;

    // posición actual: hub confirmado > última recogida completada hoy > hub
    let (current, current_name) = if at_hub {
        (
            GeoPoint {
                lat: state.config.hub.lat,
                lon: state.config.hub.lon,
            },
            state.config.hub.name.clone(),
        )
    } else if let Some(last) = repo.last_completed_pickup_since(driver_id, day_start).await? {
        let place = engine.geocoder.resolve(&last.recipient_addr).await;
        (
            GeoPoint {
                lat: place.lat,
                lon: place.lon,
            },
            last.recipient_addr,
        )
    } else {
        (
            GeoPoint {
                lat: state.config.hub.lat,
                lon: state.config.hub.lon,
            },
            state.config.hub.name.clone(),
        )
    };

    if pending.is_empty() {
        if at_hub {
            return Ok(Json(json!({
                "status": "at_hub",
                "remaining_pickups": 0
            })));
        }

        if !PICKUP_SIDE.past_cutoff(now.time()) {
            // antes del cutoff pueden seguir entrando pedidos: quedarse en campo
            return Ok(Json(json!({
                "status": "waiting_for_orders",
                "cutoff_time": "12:00",
                "remaining_pickups": 0
            })));
        }

        let hub = GeoPoint {
            lat: state.config.hub.lat,
            lon: state.config.hub.lon,
        };
        let route = engine.planner.turn_by_turn(current, hub).await;

        return Ok(Json(json!({
            "status": "return_to_hub",
            "next_destination": {
                "lat": state.config.hub.lat,
                "lon": state.config.hub.lon,
                "name": state.config.hub.name
            },
            "route": route,
            "is_last": true,
            "remaining_pickups": 0,
            "current_location": { "lat": current.lat, "lon": current.lon, "name": current_name }
        })));
    }

    // llegó trabajo nuevo: la marca de hub deja de valer
    state.clear_at_hub(driver_id).await;

    let stops = engine.locate_stops(&pending, &PICKUP_SIDE).await;
    let (idx, used_fallback) = engine.choose_next(current, &stops).await;
    let chosen = &stops[idx];

    if used_fallback {
        log::warn!(
            "⚠️ Conductor {}: fallback a primera pendiente (paquete {})",
            driver_id,
            chosen.parcel_id
        );
    }

    let route = engine.planner.turn_by_turn(current, chosen.point()).await;
    repo.mark_next_pickup_target(driver_id, chosen.parcel_id).await?;

    Ok(Json(json!({
        "status": "success",
        "next_destination": chosen,
        "route": route,
        "is_last": false,
        "remaining_pickups": stops.len(),
        "current_location": { "lat": current.lat, "lon": current.lon, "name": current_name }
    })))
}

/// Marca una recogida como completada (solo su conductor)
async fn complete_pickup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
    Json(request): Json<CompleteRequest>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_pickup()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let parcel = repo
        .find_by_id(request.parcel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("수거 건을 찾을 수 없습니다".to_string()))?;

    if parcel.pickup_driver_id != Some(driver_id) {
        return Err(AppError::Forbidden("권한이 없습니다".to_string()));
    }

    let now = state.config.local_now();
    let completed = repo
        .complete_pickup(parcel.id, driver_id, now.naive_local())
        .await?;
    if !completed {
        return Err(AppError::Conflict("이미 처리된 수거 건입니다".to_string()));
    }

    let remaining = repo
        .count_pending_pickups_for_driver(driver_id, now.date_naive())
        .await?;

    log::info!(
        "✅ Recogida {} completada por el conductor {} ({} restantes)",
        parcel.id,
        driver_id,
        remaining
    );

    Ok(Json(json!({
        "status": "success",
        "parcel_id": parcel.id,
        "remaining_pickups": remaining
    })))
}

/// Confirmación explícita de llegada al hub, solo con cero pendientes
async fn hub_arrived(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_pickup()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let today = state.config.local_now().date_naive();
    let remaining = repo
        .count_pending_pickups_for_driver(driver_id, today)
        .await?;
    if remaining > 0 {
        return Err(AppError::BadRequest(format!(
            "아직 남은 수거가 있습니다: {}건",
            remaining
        )));
    }

    state.set_at_hub(driver_id).await;

    Ok(Json(json!({
        "status": "success",
        "at_hub": true
    })))
}

/// Estado agregado del día; cuando todo está completo dispara el handoff
/// hacia el despachador de entrega
async fn all_completed(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let repo = ParcelRepository::new(state.pool.clone());

    let now = state.config.local_now();
    let today = now.date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap();

    let remaining = repo.count_pending_pickups(today).await?;
    let completed_count = repo.count_pickups_completed_since(day_start).await?;
    let completed = remaining == 0;

    let mut response = json!({
        "completed": completed,
        "remaining": remaining,
        "completed_count": completed_count
    });

    if completed && completed_count > 0 {
        log::info!("🏁 Recogidas del día completas: disparando import + assign de entregas");

        let import_status = trigger_delivery(&state, "/delivery/import").await;
        let assign_status = trigger_delivery(&state, "/delivery/assign").await;

        response["import_status"] = json!(import_status);
        response["assign_status"] = json!(assign_status);
    }

    Ok(Json(response))
}

/// POST sincrónico al despachador de entrega; devuelve el status HTTP o 0
/// si no respondió
async fn trigger_delivery(state: &AppState, path: &str) -> u16 {
    let url = format!("{}{}", state.config.delivery_service_url, path);

    match state
        .http_client
        .post(&url)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
    {
        Ok(response) => response.status().as_u16(),
        Err(e) => {
            log::error!("❌ Handoff {} falló: {}", path, e);
            0
        }
    }
}

/// Estado del conductor de recogida autenticado
async fn pickup_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_pickup()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let now = state.config.local_now();
    let today = now.date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap();

    let pending = repo
        .count_pending_pickups_for_driver(driver_id, today)
        .await?;
    let completed = repo
        .count_pickups_completed_since_for_driver(driver_id, day_start)
        .await?;
    let zone = zone_for_driver(driver_id).map(|z| z.name).unwrap_or("미지정");

    Ok(Json(json!({
        "status": "success",
        "driver": {
            "driver_id": driver_id,
            "zone": zone,
            "pending_pickups": pending,
            "completed_today": completed,
            "at_hub": state.is_at_hub(driver_id).await
        }
    })))
}
