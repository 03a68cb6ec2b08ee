//! Handlers del despachador de entrega
//!
//! Espejo del lado de recogida más el pipeline de conversión de mediodía:
//! import (PICKUP_COMPLETED -> DELIVERY_PENDING) y assign (distrito ->
//! conductor 6-10). El día de entrega empieza a las 15:00 y no tiene cutoff.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middleware::auth::AuthenticatedDriver;
use crate::models::zone::{delivery_driver_for_district, district_from_address, zone_for_driver};
use crate::repositories::parcel_repository::ParcelRepository;
use crate::services::dispatch_service::{resolve_district, DispatchEngine, DELIVERY_SIDE};
use crate::services::routing_service::GeoPoint;
use crate::state::AppState;
use crate::utils::errors::{AppError, AppResult};

pub fn open_routes() -> Router<AppState> {
    Router::new()
        .route("/delivery/import", post(import_pickups))
        .route("/delivery/assign", post(assign_deliveries))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/delivery/next", get(next_destination))
        .route("/delivery/complete", post(complete_delivery))
        .route("/delivery/hub-arrived", post(hub_arrived))
        .route("/delivery/status", get(delivery_status))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub parcel_id: i64,
}

/// Convierte las recogidas completadas hoy en entregas pendientes
async fn import_pickups(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let repo = ParcelRepository::new(state.pool.clone());

    let today = state.config.local_now().date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap();
    let day_end = day_start + chrono::Duration::days(1);

    let candidates = repo.list_importable_pickups(day_start, day_end).await?;

    if candidates.is_empty() {
        return Ok(Json(json!({
            "status": "info",
            "message": "오늘 완료된 수거가 없습니다",
            "imported_count": 0,
            "by_district": {}
        })));
    }

    let mut imported = 0usize;
    let mut by_district: BTreeMap<String, usize> = BTreeMap::new();

    for parcel in &candidates {
        if repo.mark_delivery_pending(parcel.id).await? {
            imported += 1;
            let district = district_from_address(&parcel.recipient_addr)
                .unwrap_or("미지정")
                .to_string();
            *by_district.entry(district).or_insert(0) += 1;
        }
    }

    log::info!("📥 {} recogidas convertidas a entregas", imported);

    Ok(Json(json!({
        "status": "success",
        "imported_count": imported,
        "by_district": by_district
    })))
}

/// Asigna conductor de entrega (6-10) a las entregas de hoy sin conductor
async fn assign_deliveries(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let repo = ParcelRepository::new(state.pool.clone());
    let engine = DispatchEngine::from_config(&state.config, state.geocode_cache.clone());

    let today = state.config.local_now().date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap();
    let day_end = day_start + chrono::Duration::days(1);

    let unassigned = repo.list_unassigned_deliveries(day_start, day_end).await?;

    let mut assigned = 0usize;
    let mut skipped = 0usize;
    let mut by_driver: BTreeMap<String, usize> = BTreeMap::new();

    for parcel in &unassigned {
        let district = resolve_district(engine.geocoder.as_ref(), &parcel.recipient_addr).await;

        let driver_id = match district.as_deref().and_then(delivery_driver_for_district) {
            Some(driver_id) => driver_id,
            None => {
                log::warn!(
                    "⚠️ Entrega {} sin distrito resoluble: {}",
                    parcel.id,
                    parcel.recipient_addr
                );
                skipped += 1;
                continue;
            }
        };

        if repo.assign_delivery_driver(parcel.id, driver_id).await? {
            assigned += 1;
            *by_driver.entry(driver_id.to_string()).or_insert(0) += 1;
        }
    }

    log::info!(
        "🚚 {} entregas asignadas, {} sin distrito resoluble",
        assigned,
        skipped
    );

    Ok(Json(json!({
        "status": "success",
        "assigned_count": assigned,
        "skipped": skipped,
        "by_driver": by_driver
    })))
}

/// Próxima parada óptima del conductor de entrega
async fn next_destination(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_delivery()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let now = state.config.local_now();
    if let Some(seconds) = DELIVERY_SIDE.seconds_until_start(now.time()) {
        return Ok(Json(json!({
            "status": "waiting",
            "message": "배달은 오후 3시부터 시작됩니다",
            "start_time": "15:00",
            "seconds_until_start": seconds
        })));
    }

    let today = now.date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap();
    let pending = repo.pending_deliveries_for_driver(driver_id).await?;

    let engine = DispatchEngine::from_config(&state.config, state.geocode_cache.clone());
    let at_hub = state.is_at_hub(driver_id).await;

    let (current, current_name) = if at_hub {
        (
            GeoPoint {
                lat: state.config.hub.lat,
                lon: state.config.hub.lon,
            },
            state.config.hub.name.clone(),
        )
    } else if let Some(last) = repo
        .last_completed_delivery_since(driver_id, day_start)
        .await?
    {
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
                "remaining_deliveries": 0
            })));
        }

        // sin cutoff: sin pendientes siempre se vuelve al hub
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
            "remaining_deliveries": 0,
            "current_location": { "lat": current.lat, "lon": current.lon, "name": current_name }
        })));
    }

    state.clear_at_hub(driver_id).await;

    let stops = engine.locate_stops(&pending, &DELIVERY_SIDE).await;
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
    repo.mark_next_delivery_target(driver_id, chosen.parcel_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "next_destination": chosen,
        "route": route,
        "is_last": false,
        "remaining_deliveries": stops.len(),
        "current_location": { "lat": current.lat, "lon": current.lon, "name": current_name }
    })))
}

/// Marca una entrega como completada (solo su conductor)
async fn complete_delivery(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
    Json(request): Json<CompleteRequest>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_delivery()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let parcel = repo
        .find_by_id(request.parcel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("배달 건을 찾을 수 없습니다".to_string()))?;

    if parcel.delivery_driver_id != Some(driver_id) {
        return Err(AppError::Forbidden("권한이 없습니다".to_string()));
    }

    let now = state.config.local_now();
    let completed = repo
        .complete_delivery(parcel.id, driver_id, now.naive_local())
        .await?;
    if !completed {
        return Err(AppError::Conflict("이미 처리된 배달입니다".to_string()));
    }

    let remaining = repo.count_pending_deliveries_for_driver(driver_id).await?;

    log::info!(
        "✅ Entrega {} completada por el conductor {} ({} restantes)",
        parcel.id,
        driver_id,
        remaining
    );

    Ok(Json(json!({
        "status": "success",
        "parcel_id": parcel.id,
        "remaining_deliveries": remaining
    })))
}

/// Confirmación explícita de llegada al hub, solo con cero pendientes
async fn hub_arrived(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_delivery()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let remaining = repo.count_pending_deliveries_for_driver(driver_id).await?;
    if remaining > 0 {
        return Err(AppError::BadRequest(format!(
            "아직 남은 배달이 있습니다: {}건",
            remaining
        )));
    }

    state.set_at_hub(driver_id).await;

    Ok(Json(json!({
        "status": "success",
        "at_hub": true
    })))
}

/// Estado del conductor de entrega autenticado
async fn delivery_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedDriver>,
) -> AppResult<Json<Value>> {
    let driver_id = auth.require_delivery()?;
    let repo = ParcelRepository::new(state.pool.clone());

    let today = state.config.local_now().date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap();

    let pending = repo.count_pending_deliveries_for_driver(driver_id).await?;
    let completed = repo
        .count_deliveries_completed_since_for_driver(driver_id, day_start)
        .await?;
    let zone = zone_for_driver(driver_id).map(|z| z.name).unwrap_or("미지정");

    Ok(Json(json!({
        "status": "success",
        "driver": {
            "driver_id": driver_id,
            "zone": zone,
            "pending_deliveries": pending,
            "completed_today": completed,
            "at_hub": state.is_at_hub(driver_id).await
        }
    })))
}
