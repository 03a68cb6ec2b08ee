//! Handlers HTTP del adaptador TSP
//!
//! Contrato: POST /solve {matrix|distances: [[int]]} -> {tour, tour_length}.
//! El tour es una permutación de [0, N) que empieza en 0. N <= 2 se resuelve
//! sin tocar el binario.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::lkh::{solve_tsp_with_lkh, LkhParams};
use super::TspState;

pub fn create_tsp_router() -> Router<TspState> {
    Router::new()
        .route("/solve", post(solve))
        .route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct SolveRequest {
    matrix: Option<Vec<Vec<f64>>>,
    distances: Option<Vec<Vec<f64>>>,
    runs: Option<u32>,
    seed: Option<u32>,
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn solve(State(state): State<TspState>, Json(request): Json<SolveRequest>) -> Response {
    let Some(distances) = request.matrix.or(request.distances) else {
        return bad_request("Missing 'distances' or 'matrix' field");
    };

    let n = distances.len();
    if n == 0 {
        return bad_request("Distance matrix must be square");
    }
    if distances.iter().any(|row| row.len() != n) {
        return bad_request("Distance matrix must be square");
    }

    // 2개 이하 노드는 특별 처리 (LKH가 처리하지 못함)
    if n <= 2 {
        log::info!("특별 처리: {}개 노드", n);
        return if n == 1 {
            Json(json!({ "tour": [0], "tour_length": 0.0 })).into_response()
        } else {
            Json(json!({ "tour": [0, 1], "tour_length": distances[0][1] })).into_response()
        };
    }

    let int_matrix: Vec<Vec<i64>> = distances
        .iter()
        .map(|row| row.iter().map(|v| v.round() as i64).collect())
        .collect();

    let params = LkhParams::for_dimension(n, request.runs);
    let seed = request.seed.unwrap_or(1);

    log::info!("TSP 해결 중 (노드 수: {}, runs: {})", n, params.runs);

    match solve_tsp_with_lkh(
        &state.config.lkh_executable,
        &int_matrix,
        request.runs,
        seed,
    )
    .await
    {
        Ok((tour, tour_length)) => {
            log::info!(
                "TSP 해결 완료: 경로 길이 = {:.2}, 노드 수 = {}",
                tour_length,
                tour.len()
            );
            Json(json!({
                "tour": tour,
                "tour_length": tour_length,
                "nodes": n,
                "runs_used": params.runs
            }))
            .into_response()
        }
        Err(e) => {
            log::error!("LKH 실행 중 오류: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("LKH execution error: {}", e) })),
            )
                .into_response()
        }
    }
}
