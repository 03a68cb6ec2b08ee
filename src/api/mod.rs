//! API del sistema
//!
//! Este módulo contiene los handlers HTTP de los dos despachadores,
//! organizados por lado del flujo (recogida por la mañana, entrega por la
//! tarde).

pub mod delivery;
pub mod pickup;

use axum::{middleware::from_fn_with_state, Router};

use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

/// Router del despachador de recogida
pub fn create_pickup_router(state: AppState) -> Router<AppState> {
    let protected = pickup::protected_routes()
        .layer(from_fn_with_state(state, auth_middleware));

    pickup::open_routes().merge(protected)
}

/// Router del despachador de entrega
pub fn create_delivery_router(state: AppState) -> Router<AppState> {
    let protected = delivery::protected_routes()
        .layer(from_fn_with_state(state, auth_middleware));

    delivery::open_routes().merge(protected)
}
