//! Utilidades JWT
//!
//! Este módulo contiene funciones helper para manejo de JWT tokens
//! y resolución de la identidad del conductor autenticado.

use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::utils::errors::AppError;

/// Claims del JWT emitido por el servicio de cuentas.
///
/// El emisor escribe el id de usuario como `user_id` o `userId` según la
/// versión; ambos se aceptan.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id_camel: Option<i64>,
    pub exp: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,
}

impl JwtClaims {
    pub fn resolved_user_id(&self) -> Option<i64> {
        self.user_id.or(self.user_id_camel)
    }
}

/// Extraer token del header Authorization
pub fn extract_token_from_header(auth_header: &str) -> Result<&str, AppError> {
    let mut parts = auth_header.splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(token)) if !token.is_empty() => Ok(token),
        _ => Err(AppError::Unauthorized("잘못된 토큰 형식입니다".to_string())),
    }
}

/// Verificar y decodificar JWT token, resolviendo el id de usuario
pub fn verify_token(token: &str, secret: &str) -> Result<i64, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());

    let token_data = decode::<JwtClaims>(token, &decoding_key, &Validation::default()).map_err(
        |e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("토큰이 만료되었습니다".to_string())
            }
            _ => AppError::Unauthorized("유효하지 않은 토큰입니다".to_string()),
        },
    )?;

    token_data
        .claims
        .resolved_user_id()
        .ok_or_else(|| AppError::Unauthorized("토큰에 사용자 ID 정보가 없습니다".to_string()))
}

/// Generar un token firmado (usado por los tests y herramientas internas)
pub fn generate_token(user_id: i64, secret: &str, expires_in_secs: i64) -> Result<String, AppError> {
    let now = chrono::Utc::now();
    let claims = JwtClaims {
        user_id: Some(user_id),
        user_id_camel: None,
        exp: (now.timestamp() + expires_in_secs) as usize,
        iat: Some(now.timestamp() as usize),
    };

    let encoding_key = EncodingKey::from_secret(secret.as_ref());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| AppError::Jwt(format!("Error generando token: {}", e)))
}
