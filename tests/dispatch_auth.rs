//! Tests de integración de la capa de autenticación de los despachadores
//!
//! Todo lo que se comprueba ocurre antes de tocar la base de datos: tokens
//! ausentes, malformados, expirados y conductores fuera del rango del lado.

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::Value;
use sqlx::MySqlPool;

use parcel_dispatch::api::{create_delivery_router, create_pickup_router};
use parcel_dispatch::config::{DispatchConfig, HubLocation};
use parcel_dispatch::state::AppState;
use parcel_dispatch::utils::jwt::generate_token;

const JWT_SECRET: &str = "integration-test-secret";

fn test_config() -> DispatchConfig {
    DispatchConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: JWT_SECRET.to_string(),
        mysql_host: "127.0.0.1".to_string(),
        mysql_port: 3306,
        mysql_user: "test".to_string(),
        mysql_password: "test".to_string(),
        mysql_database: "test".to_string(),
        valhalla_url: "http://127.0.0.1:1".to_string(),
        lkh_service_url: "http://127.0.0.1:1/solve".to_string(),
        delivery_service_url: "http://127.0.0.1:1".to_string(),
        hub: HubLocation {
            lat: 37.5299,
            lon: 126.9648,
            name: "용산역".to_string(),
        },
        utc_offset_hours: 9,
    }
}

fn test_state() -> AppState {
    let config = test_config();
    // pool perezoso: estos tests no llegan a ejecutar consultas
    let pool = MySqlPool::connect_lazy(&config.database_url()).unwrap();
    AppState::new(pool, config)
}

fn pickup_server() -> TestServer {
    let state = test_state();
    let app = create_pickup_router(state.clone()).with_state(state);
    TestServer::new(app).unwrap()
}

fn delivery_server() -> TestServer {
    let state = test_state();
    let app = create_delivery_router(state.clone()).with_state(state);
    TestServer::new(app).unwrap()
}

fn bearer(driver_id: i64) -> String {
    let token = generate_token(driver_id, JWT_SECRET, 3600).unwrap();
    format!("Bearer {}", token)
}

#[tokio::test]
async fn test_missing_token() {
    let server = pickup_server();
    let response = server.get("/pickup/next").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["message"], "토큰이 없습니다");
}

#[tokio::test]
async fn test_malformed_authorization_header() {
    let server = pickup_server();
    let response = server
        .get("/pickup/next")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("NotBearer abc"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["message"], "잘못된 토큰 형식입니다");
}

#[tokio::test]
async fn test_invalid_token() {
    let server = pickup_server();
    let response = server
        .get("/pickup/next")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not.a.jwt"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["message"], "유효하지 않은 토큰입니다");
}

#[tokio::test]
async fn test_expired_token() {
    let expired = generate_token(5, JWT_SECRET, -7200).unwrap();

    let server = pickup_server();
    let response = server
        .get("/pickup/next")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", expired)).unwrap())
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["message"], "토큰이 만료되었습니다");
}

#[tokio::test]
async fn test_wrong_secret_token() {
    let forged = generate_token(5, "other-secret", 3600).unwrap();

    let server = pickup_server();
    let response = server
        .get("/pickup/next")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", forged)).unwrap())
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delivery_driver_rejected_on_pickup_side() {
    let server = pickup_server();
    let response = server
        .get("/pickup/next")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&bearer(7)).unwrap())
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["message"], "기사만 접근 가능합니다");
}

#[tokio::test]
async fn test_pickup_driver_rejected_on_delivery_side() {
    let server = delivery_server();
    let response = server
        .get("/delivery/next")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&bearer(3)).unwrap())
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_complete_requires_matching_side() {
    // un conductor de entrega no puede completar recogidas, con cualquier body
    let server = pickup_server();
    let response = server
        .post("/pickup/complete")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&bearer(8)).unwrap())
        .json(&serde_json::json!({ "parcel_id": 101 }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_protected_routes_reject_unauthenticated() {
    let pickup = pickup_server();
    for path in ["/pickup/status"] {
        let response = pickup.get(path).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    let response = pickup.post("/pickup/hub-arrived").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let delivery = delivery_server();
    let response = delivery.post("/delivery/hub-arrived").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}
