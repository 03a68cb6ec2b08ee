//! Middleware de autenticación JWT
//!
//! Valida el bearer token contra el secreto compartido y resuelve la
//! identidad del conductor para los handlers. El token lo emite el servicio
//! de cuentas externo; aquí solo se verifica.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{
    models::zone::{DELIVERY_DRIVER_IDS, PICKUP_DRIVER_IDS},
    state::AppState,
    utils::errors::AppError,
    utils::jwt::{extract_token_from_header, verify_token},
};

/// Conductor autenticado que se inyecta en las requests
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedDriver {
    pub driver_id: i64,
}

impl AuthenticatedDriver {
    /// 403 si el conductor no pertenece al rango de recogida (1-5)
    pub fn require_pickup(&self) -> Result<i64, AppError> {
        if PICKUP_DRIVER_IDS.contains(&self.driver_id) {
            Ok(self.driver_id)
        } else {
            Err(AppError::Forbidden("기사만 접근 가능합니다".to_string()))
        }
    }

    /// 403 si el conductor no pertenece al rango de entrega (6-10)
    pub fn require_delivery(&self) -> Result<i64, AppError> {
        if DELIVERY_DRIVER_IDS.contains(&self.driver_id) {
            Ok(self.driver_id)
        } else {
            Err(AppError::Forbidden("기사만 접근 가능합니다".to_string()))
        }
    }
}

/// Middleware de autenticación JWT
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("토큰이 없습니다".to_string()))?;

    let token = extract_token_from_header(auth_header)?;
    let driver_id = verify_token(token, &state.config.jwt_secret)?;

    request
        .extensions_mut()
        .insert(AuthenticatedDriver { driver_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickup_range() {
        assert!(AuthenticatedDriver { driver_id: 1 }.require_pickup().is_ok());
        assert!(AuthenticatedDriver { driver_id: 5 }.require_pickup().is_ok());
        assert!(AuthenticatedDriver { driver_id: 6 }.require_pickup().is_err());
        assert!(AuthenticatedDriver { driver_id: 0 }.require_pickup().is_err());
    }

    #[test]
    fn test_delivery_range() {
        assert!(AuthenticatedDriver { driver_id: 6 }.require_delivery().is_ok());
        assert!(AuthenticatedDriver { driver_id: 10 }.require_delivery().is_ok());
        assert!(AuthenticatedDriver { driver_id: 5 }.require_delivery().is_err());
        assert!(AuthenticatedDriver { driver_id: 11 }.require_delivery().is_err());
    }
}
