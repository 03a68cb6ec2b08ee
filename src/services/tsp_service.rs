//! Cliente del adaptador TSP (LKH)
//!
//! Los casos degenerados (N <= 2) se resuelven localmente sin llamar al
//! servicio. Un error del adaptador se propaga para que el despachador caiga
//! a "siguiente = primera pendiente".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::utils::errors::{AppError, AppResult};

/// Seam del solver de tours para el núcleo de despacho
#[async_trait]
pub trait TourSolver: Send + Sync {
    /// Devuelve una permutación de [0, N) que empieza en 0
    async fn solve(&self, matrix: &[Vec<f64>]) -> AppResult<Vec<usize>>;
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    tour: Vec<usize>,
    #[allow(dead_code)]
    tour_length: f64,
}

/// Cliente HTTP del servicio LKH
pub struct LkhSolver {
    solve_url: String,
    client: Client,
}

impl LkhSolver {
    pub fn new(solve_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { solve_url, client }
    }
}

#[async_trait]
impl TourSolver for LkhSolver {
    async fn solve(&self, matrix: &[Vec<f64>]) -> AppResult<Vec<usize>> {
        let n = matrix.len();

        // con 2 nodos o menos el tour es trivial
        if n <= 2 {
            log::info!("Only {} nodes remain. Direct path calculation.", n);
            return Ok((0..n).collect());
        }

        // LKH prefiere pesos enteros: redondear los segundos
        let int_matrix: Vec<Vec<i64>> = matrix
            .iter()
            .map(|row| row.iter().map(|v| v.round() as i64).collect())
            .collect();

        let response = self
            .client
            .post(&self.solve_url)
            .json(&json!({ "matrix": int_matrix }))
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("TSP service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalApi(format!(
                "TSP service returned {}",
                status
            )));
        }

        let body: SolveResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("invalid TSP response: {}", e)))?;

        if body.tour.len() != n {
            return Err(AppError::ExternalApi(format!(
                "TSP tour has {} nodes, expected {}",
                body.tour.len(),
                n
            )));
        }

        Ok(body.tour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_degenerate_sizes_skip_the_service() {
        // URL inválida a propósito: N <= 2 no debe tocar la red
        let solver = LkhSolver::new("http://127.0.0.1:1/solve".to_string());

        let one = solver.solve(&[vec![0.0]]).await.unwrap();
        assert_eq!(one, vec![0]);

        let two = solver
            .solve(&[vec![0.0, 12.0], vec![12.0, 0.0]])
            .await
            .unwrap();
        assert_eq!(two, vec![0, 1]);
    }
}
