//! Cliente del motor de rutas (vía proxy de tráfico)
//!
//! Construye la matriz de tiempos para el TSP y las rutas turn-by-turn con
//! waypoints derivados de las maniobras. Si el motor no responde, la ruta
//! degrada a una línea recta entre los dos puntos; la matriz degrada a error
//! y el llamador cae a "siguiente = primera pendiente".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::utils::errors::{AppError, AppResult};
use crate::utils::shape::{decode_polyline6, ShapePoint};

/// Modelo de coste usado en todas las llamadas al motor
pub const COSTING_MODEL: &str = "auto";

/// Penalización finita para pares inalcanzables: cualquier tour es mejor
/// que ninguna respuesta
pub const UNREACHABLE_PENALTY: f64 = 9_999_999.0;

/// Velocidad asumida para la degradación en línea recta
const STRAIGHT_LINE_SPEED_KMH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Seam del motor de rutas para el núcleo de despacho
#[async_trait]
pub trait RoutePlanner: Send + Sync {
    /// Matriz NxN de tiempos de viaje en segundos
    async fn time_matrix(&self, locations: &[GeoPoint]) -> AppResult<Vec<Vec<f64>>>;

    /// Ruta turn-by-turn entre dos puntos; nunca falla (degrada a línea recta)
    async fn turn_by_turn(&self, from: GeoPoint, to: GeoPoint) -> RouteArtifact;
}

// --- tipos de respuesta del motor ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSummary {
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub length: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maneuver {
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub street_names: Option<Vec<String>>,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub begin_shape_index: Option<usize>,
    #[serde(default)]
    pub end_shape_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_speed_applied: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteLeg {
    pub summary: RouteSummary,
    #[serde(default)]
    pub maneuvers: Vec<Maneuver>,
    #[serde(default)]
    pub shape: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub summary: RouteSummary,
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    trip: Trip,
}

/// Waypoint visible para el conductor, uno por maniobra
#[derive(Debug, Clone, Serialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub instruction: String,
}

/// Artefacto de ruta devuelto a los clientes
#[derive(Debug, Clone, Serialize)]
pub struct RouteArtifact {
    pub trip: Trip,
    pub waypoints: Vec<Waypoint>,
    pub coordinates: Vec<ShapePoint>,
}

impl RouteArtifact {
    /// Deriva waypoints y coordenadas de un viaje del motor
    pub fn from_trip(trip: Trip) -> Self {
        let mut waypoints = Vec::new();
        let mut coordinates = Vec::new();

        for leg in &trip.legs {
            let shape = decode_polyline6(&leg.shape);

            for maneuver in &leg.maneuvers {
                let idx = maneuver.begin_shape_index.unwrap_or(0);
                if let Some(point) = shape.get(idx) {
                    waypoints.push(Waypoint {
                        lat: point.lat,
                        lon: point.lon,
                        name: maneuver
                            .street_names
                            .as_ref()
                            .and_then(|names| names.first().cloned())
                            .unwrap_or_default(),
                        instruction: maneuver.instruction.clone().unwrap_or_default(),
                    });
                }
            }

            coordinates.extend(shape);
        }

        Self {
            trip,
            waypoints,
            coordinates,
        }
    }

    /// Degradación: artefacto en línea recta entre dos puntos
    pub fn straight_line(from: GeoPoint, to: GeoPoint) -> Self {
        let length = haversine_km(from, to);
        let time = length / STRAIGHT_LINE_SPEED_KMH * 3600.0;

        let trip = Trip {
            summary: RouteSummary {
                time,
                length,
                original_time: None,
            },
            legs: vec![RouteLeg {
                summary: RouteSummary {
                    time,
                    length,
                    original_time: None,
                },
                maneuvers: vec![],
                shape: String::new(),
            }],
        };

        Self {
            trip,
            waypoints: vec![
                Waypoint {
                    lat: from.lat,
                    lon: from.lon,
                    name: String::new(),
                    instruction: "출발".to_string(),
                },
                Waypoint {
                    lat: to.lat,
                    lon: to.lon,
                    name: String::new(),
                    instruction: "도착".to_string(),
                },
            ],
            coordinates: vec![
                ShapePoint {
                    lat: from.lat,
                    lon: from.lon,
                },
                ShapePoint {
                    lat: to.lat,
                    lon: to.lon,
                },
            ],
        }
    }
}

/// Distancia de gran círculo en kilómetros
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Cliente HTTP del motor de rutas detrás del proxy
pub struct ValhallaPlanner {
    base_url: String,
    client: Client,
}

impl ValhallaPlanner {
    pub fn new(base_url: String) -> Self {
        // la matriz es la llamada más lenta; su timeout manda
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self { base_url, client }
    }

    fn locations_payload(locations: &[GeoPoint]) -> Vec<serde_json::Value> {
        locations
            .iter()
            .map(|loc| json!({ "lat": loc.lat, "lon": loc.lon }))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    // una fila entera puede venir null si la fuente es inalcanzable
    #[serde(default)]
    sources_to_targets: Vec<Option<Vec<Option<MatrixCell>>>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    time: Option<f64>,
    #[allow(dead_code)]
    distance: Option<f64>,
}

#[async_trait]
impl RoutePlanner for ValhallaPlanner {
    async fn time_matrix(&self, locations: &[GeoPoint]) -> AppResult<Vec<Vec<f64>>> {
        if locations.len() < 2 {
            return Err(AppError::BadRequest(
                "Need at least two locations for matrix calculation".to_string(),
            ));
        }

        let payload = json!({
            "sources": Self::locations_payload(locations),
            "targets": Self::locations_payload(locations),
            "costing": COSTING_MODEL,
            "units": "kilometers",
            "costing_options": {
                COSTING_MODEL: { "use_live_traffic": true }
            }
        });

        log::info!("📐 Solicitando matriz {}x{}", locations.len(), locations.len());

        let response = self
            .client
            .post(format!("{}/matrix", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("matrix request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalApi(format!(
                "matrix endpoint returned {}",
                status
            )));
        }

        let body: MatrixResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("invalid matrix response: {}", e)))?;

        let n = locations.len();
        let mut matrix = vec![vec![UNREACHABLE_PENALTY; n]; n];
        let mut found_routes = 0usize;

        for (i, row) in body.sources_to_targets.iter().enumerate().take(n) {
            let Some(row) = row else {
                log::warn!("⚠️ Fuente {} sin fila de destinos: fila penalizada", i);
                continue;
            };
            for (j, cell) in row.iter().enumerate().take(n) {
                if let Some(cell) = cell {
                    if let Some(time) = cell.time {
                        matrix[i][j] = time;
                        found_routes += 1;
                        continue;
                    }
                }
                log::warn!(
                    "⚠️ Sin ruta entre {} y {}: aplicando penalización finita",
                    i,
                    j
                );
            }
        }

        if found_routes == 0 {
            return Err(AppError::ExternalApi(
                "matrix contained no reachable pairs".to_string(),
            ));
        }

        Ok(matrix)
    }

    async fn turn_by_turn(&self, from: GeoPoint, to: GeoPoint) -> RouteArtifact {
        let payload = json!({
            "locations": [
                { "lat": from.lat, "lon": from.lon },
                { "lat": to.lat, "lon": to.lon }
            ],
            "costing": COSTING_MODEL,
            "directions_options": {
                "units": "kilometers",
                "language": "ko-KR",
                "narrative": true
            },
            "costing_options": {
                COSTING_MODEL: { "use_live_traffic": true }
            }
        });

        let result = async {
            let response = self
                .client
                .post(format!("{}/route", self.base_url))
                .timeout(Duration::from_secs(30))
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("route endpoint returned {}", status);
            }

            let body: RouteResponse = response.json().await?;
            Ok::<Trip, anyhow::Error>(body.trip)
        }
        .await;

        match result {
            Ok(trip) => RouteArtifact::from_trip(trip),
            Err(e) => {
                log::error!("❌ Error del motor de rutas, degradando a línea recta: {}", e);
                RouteArtifact::straight_line(from, to)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_seoul_landmarks() {
        // 서울시청 -> 강남역, unos 8.6 km en línea recta
        let city_hall = GeoPoint {
            lat: 37.5665,
            lon: 126.9780,
        };
        let gangnam = GeoPoint {
            lat: 37.4979,
            lon: 127.0276,
        };
        let d = haversine_km(city_hall, gangnam);
        assert!(d > 8.0 && d < 10.0, "distance was {}", d);
    }

    #[test]
    fn test_straight_line_artifact() {
        let from = GeoPoint {
            lat: 37.5299,
            lon: 126.9648,
        };
        let to = GeoPoint {
            lat: 37.5172,
            lon: 127.0473,
        };
        let artifact = RouteArtifact::straight_line(from, to);

        assert_eq!(artifact.waypoints.len(), 2);
        assert_eq!(artifact.coordinates.len(), 2);
        assert!(artifact.trip.summary.length > 0.0);
        assert!(artifact.trip.summary.time > 0.0);
    }

    #[test]
    fn test_artifact_waypoints_match_maneuvers() {
        // "_ibE_ibEAC": dos puntos decodificados
        let trip = Trip {
            summary: RouteSummary {
                time: 120.0,
                length: 1.5,
                original_time: None,
            },
            legs: vec![RouteLeg {
                summary: RouteSummary {
                    time: 120.0,
                    length: 1.5,
                    original_time: None,
                },
                maneuvers: vec![
                    Maneuver {
                        instruction: Some("직진하세요".to_string()),
                        street_names: Some(vec!["테헤란로".to_string()]),
                        time: 60.0,
                        length: 0.7,
                        begin_shape_index: Some(0),
                        end_shape_index: Some(1),
                        original_time: None,
                        real_speed_applied: None,
                    },
                    Maneuver {
                        instruction: Some("도착했습니다".to_string()),
                        street_names: None,
                        time: 60.0,
                        length: 0.8,
                        begin_shape_index: Some(1),
                        end_shape_index: Some(1),
                        original_time: None,
                        real_speed_applied: None,
                    },
                ],
                shape: "_ibE_ibEAC".to_string(),
            }],
        };

        let artifact = RouteArtifact::from_trip(trip);
        assert_eq!(artifact.waypoints.len(), 2);
        assert_eq!(artifact.coordinates.len(), 2);
        assert_eq!(artifact.waypoints[0].name, "테헤란로");
        assert_eq!(artifact.waypoints[1].instruction, "도착했습니다");
    }

    #[test]
    fn test_artifact_skips_out_of_range_shape_index() {
        let trip = Trip {
            summary: RouteSummary {
                time: 0.0,
                length: 0.0,
                original_time: None,
            },
            legs: vec![RouteLeg {
                summary: RouteSummary {
                    time: 0.0,
                    length: 0.0,
                    original_time: None,
                },
                maneuvers: vec![Maneuver {
                    instruction: None,
                    street_names: None,
                    time: 0.0,
                    length: 0.0,
                    begin_shape_index: Some(99),
                    end_shape_index: None,
                    original_time: None,
                    real_speed_applied: None,
                }],
                shape: "_ibE_ibE".to_string(),
            }],
        };

        let artifact = RouteArtifact::from_trip(trip);
        assert!(artifact.waypoints.is_empty());
        assert_eq!(artifact.coordinates.len(), 1);
    }
}
