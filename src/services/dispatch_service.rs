//! Núcleo de despacho compartido
//!
//! La recogida y la entrega comparten el mismo algoritmo de "siguiente
//! parada": geocodificar pendientes, matriz de tiempos, tour TSP, elegir el
//! nodo que sigue a la posición actual. Los dos lados son instancias de
//! `DispatchSide` (hora de inicio, cutoff opcional, cómo nombrar la parada).

use std::sync::Arc;

use chrono::NaiveTime;
use futures::future::join_all;
use serde::Serialize;

use crate::config::DispatchConfig;
use crate::models::parcel::Parcel;
use crate::services::geocoding_service::{Geocoder, ProxyGeocoder};
use crate::services::routing_service::{GeoPoint, RoutePlanner, ValhallaPlanner};
use crate::services::tsp_service::{LkhSolver, TourSolver};
use crate::state::GeocodeCache;

/// Parámetros que distinguen un lado del despacho del otro
#[derive(Clone, Copy)]
pub struct DispatchSide {
    pub label: &'static str,
    /// Hora local a partir de la cual el lado sirve rutas
    pub start_hour: u32,
    /// Hora de corte de intake; solo la recogida la tiene
    pub cutoff_hour: Option<u32>,
    /// Nombre de la parada mostrado al conductor
    pub stop_name: fn(&Parcel) -> String,
}

pub const PICKUP_SIDE: DispatchSide = DispatchSide {
    label: "pickup",
    start_hour: 7,
    cutoff_hour: Some(12),
    stop_name: pickup_stop_name,
};

pub const DELIVERY_SIDE: DispatchSide = DispatchSide {
    label: "delivery",
    start_hour: 15,
    cutoff_hour: None,
    stop_name: delivery_stop_name,
};

fn pickup_stop_name(parcel: &Parcel) -> String {
    parcel.product_name.clone().unwrap_or_default()
}

fn delivery_stop_name(parcel: &Parcel) -> String {
    parcel.recipient_name.clone().unwrap_or_default()
}

impl DispatchSide {
    pub fn start_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour, 0, 0).unwrap()
    }

    pub fn cutoff_time(&self) -> Option<NaiveTime> {
        self.cutoff_hour
            .map(|h| NaiveTime::from_hms_opt(h, 0, 0).unwrap())
    }

    /// Segundos que faltan para la apertura del lado, si aún no abrió
    pub fn seconds_until_start(&self, now: NaiveTime) -> Option<i64> {
        let start = self.start_time();
        if now < start {
            Some((start - now).num_seconds())
        } else {
            None
        }
    }

    /// El cutoff es inclusivo: a las 12:00:00 en punto ya es "mañana"
    pub fn past_cutoff(&self, now: NaiveTime) -> bool {
        match self.cutoff_time() {
            Some(cutoff) => now >= cutoff,
            None => true,
        }
    }
}

/// Parada candidata ya geocodificada
#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub parcel_id: i64,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub address: String,
}

impl Stop {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Los tres colaboradores externos del algoritmo, detrás de sus seams
pub struct DispatchEngine {
    pub geocoder: Arc<dyn Geocoder>,
    pub planner: Arc<dyn RoutePlanner>,
    pub solver: Arc<dyn TourSolver>,
}

impl DispatchEngine {
    pub fn from_config(config: &DispatchConfig, cache: GeocodeCache) -> Self {
        Self {
            geocoder: Arc::new(ProxyGeocoder::new(config.valhalla_url.clone(), cache)),
            planner: Arc::new(ValhallaPlanner::new(config.valhalla_url.clone())),
            solver: Arc::new(LkhSolver::new(config.lkh_service_url.clone())),
        }
    }

    /// Geocodifica las direcciones pendientes en paralelo (sin caché local
    /// más allá de la caché del geocoder: la consulta es en vivo por diseño)
    pub async fn locate_stops(&self, parcels: &[Parcel], side: &DispatchSide) -> Vec<Stop> {
        log::info!(
            "🗺️ Geocodificando {} paradas pendientes ({})",
            parcels.len(),
            side.label
        );

        let futures = parcels.iter().map(|parcel| async {
            let place = self.geocoder.resolve(&parcel.recipient_addr).await;
            Stop {
                parcel_id: parcel.id,
                lat: place.lat,
                lon: place.lon,
                name: (side.stop_name)(parcel),
                address: parcel.recipient_addr.clone(),
            }
        });

        join_all(futures).await
    }

    /// Elige la siguiente parada en orden de tour.
    ///
    /// Devuelve el índice dentro de `stops` y si se usó el fallback
    /// "primera pendiente" por fallo de matriz o solver.
    pub async fn choose_next(&self, current: GeoPoint, stops: &[Stop]) -> (usize, bool) {
        if stops.len() == 1 {
            return (0, false);
        }

        let mut locations = Vec::with_capacity(stops.len() + 1);
        locations.push(current);
        locations.extend(stops.iter().map(Stop::point));

        let matrix = match self.planner.time_matrix(&locations).await {
            Ok(matrix) => matrix,
            Err(e) => {
                log::error!("❌ Fallo de matriz, fallback a primera pendiente: {}", e);
                return (0, true);
            }
        };

        let tour = match self.solver.solve(&matrix).await {
            Ok(tour) => tour,
            Err(e) => {
                log::error!("❌ Fallo del solver TSP, fallback a primera pendiente: {}", e);
                return (0, true);
            }
        };

        match next_after_current(&tour) {
            Some(node) if node >= 1 && node <= stops.len() => (node - 1, false),
            _ => {
                log::error!("❌ Tour sin nodo siguiente utilizable: {:?}", tour);
                (0, true)
            }
        }
    }
}

/// Resuelve el distrito de servicio de una dirección.
///
/// Preferencia: el region_2depth_name estructurado del geocoder; después el
/// nombre normalizado que devuelve, y como último recurso el token con
/// sufijo `구` del texto original. Solo se aceptan distritos presentes en la
/// tabla de zonas; lo demás es un error que el llamador convierte en 400
/// para que el remitente corrija la dirección.
pub async fn resolve_district(geocoder: &dyn Geocoder, address: &str) -> Option<String> {
    use crate::models::zone::{district_from_address, zone_for_district};

    let place = geocoder.resolve(address).await;

    if let Some(district) = place.district.as_deref() {
        if zone_for_district(district).is_some() {
            return Some(district.to_string());
        }
    }

    if let Some(district) = district_from_address(&place.display_name) {
        if zone_for_district(district).is_some() {
            return Some(district.to_string());
        }
    }

    district_from_address(address)
        .filter(|district| zone_for_district(district).is_some())
        .map(|district| district.to_string())
}

/// Nodo que sigue a la posición actual (nodo 0) en el orden del tour,
/// saltando reapariciones de 0
fn next_after_current(tour: &[usize]) -> Option<usize> {
    let pos = tour.iter().position(|&n| n == 0)?;

    tour.iter()
        .cycle()
        .skip(pos + 1)
        .take(tour.len())
        .find(|&&n| n != 0)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parcel::ParcelStatus;
    use crate::services::geocoding_service::GeocodedPlace;
    use crate::services::routing_service::RouteArtifact;
    use crate::utils::errors::{AppError, AppResult};
    use async_trait::async_trait;

    fn test_parcel(id: i64, addr: &str) -> Parcel {
        Parcel {
            id,
            owner_id: Some(1),
            product_name: Some(format!("상품 {}", id)),
            size: Some("보통".to_string()),
            recipient_name: Some("받는분".to_string()),
            recipient_phone: Some("010-0000-0000".to_string()),
            recipient_addr: addr.to_string(),
            detail_address: None,
            status: ParcelStatus::PickupPending,
            pickup_driver_id: Some(5),
            delivery_driver_id: None,
            pickup_scheduled_date: None,
            pickup_completed_at: None,
            delivery_completed_at: None,
            is_next_pickup_target: false,
            is_next_delivery_target: false,
            is_deleted: false,
            created_at: None,
        }
    }

    struct StubGeocoder;

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn resolve(&self, address: &str) -> GeocodedPlace {
            // coordenadas distintas por dirección, deterministas
            let shift = address.len() as f64 * 0.001;
            GeocodedPlace {
                lat: 37.5 + shift,
                lon: 127.0 + shift,
                display_name: address.to_string(),
                district: None,
                confidence: 0.95,
            }
        }
    }

    struct StubPlanner {
        fail_matrix: bool,
    }

    #[async_trait]
    impl RoutePlanner for StubPlanner {
        async fn time_matrix(&self, locations: &[GeoPoint]) -> AppResult<Vec<Vec<f64>>> {
            if self.fail_matrix {
                return Err(AppError::ExternalApi("matrix down".to_string()));
            }
            let n = locations.len();
            let mut matrix = vec![vec![0.0; n]; n];
            for (i, row) in matrix.iter_mut().enumerate() {
                for (j, cell) in row.iter_mut().enumerate() {
                    if i != j {
                        *cell = 100.0 * (i as f64 - j as f64).abs();
                    }
                }
            }
            Ok(matrix)
        }

        async fn turn_by_turn(&self, from: GeoPoint, to: GeoPoint) -> RouteArtifact {
            RouteArtifact::straight_line(from, to)
        }
    }

    struct StubSolver {
        tour: Option<Vec<usize>>,
    }

    #[async_trait]
    impl TourSolver for StubSolver {
        async fn solve(&self, _matrix: &[Vec<f64>]) -> AppResult<Vec<usize>> {
            self.tour
                .clone()
                .ok_or_else(|| AppError::ExternalApi("solver down".to_string()))
        }
    }

    fn engine(fail_matrix: bool, tour: Option<Vec<usize>>) -> DispatchEngine {
        DispatchEngine {
            geocoder: Arc::new(StubGeocoder),
            planner: Arc::new(StubPlanner { fail_matrix }),
            solver: Arc::new(StubSolver { tour }),
        }
    }

    fn stops(n: usize) -> Vec<Stop> {
        (0..n)
            .map(|i| Stop {
                parcel_id: 100 + i as i64,
                lat: 37.5 + i as f64 * 0.01,
                lon: 127.0 + i as f64 * 0.01,
                name: format!("상품 {}", i),
                address: format!("서울 강남구 {}번지", i),
            })
            .collect()
    }

    const CURRENT: GeoPoint = GeoPoint {
        lat: 37.5299,
        lon: 126.9648,
    };

    #[tokio::test]
    async fn test_single_stop_skips_matrix_and_solver() {
        // planner y solver rotos: con una sola parada no deben usarse
        let engine = engine(true, None);
        let (idx, fallback) = engine.choose_next(CURRENT, &stops(1)).await;
        assert_eq!(idx, 0);
        assert!(!fallback);
    }

    #[tokio::test]
    async fn test_tour_order_selects_next_node() {
        let engine = engine(false, Some(vec![0, 3, 1, 2]));
        let (idx, fallback) = engine.choose_next(CURRENT, &stops(3)).await;
        // el nodo 3 del tour es stops[2]
        assert_eq!(idx, 2);
        assert!(!fallback);
    }

    #[tokio::test]
    async fn test_current_in_middle_of_tour() {
        let engine = engine(false, Some(vec![2, 0, 3, 1]));
        let (idx, _) = engine.choose_next(CURRENT, &stops(3)).await;
        assert_eq!(idx, 2);
    }

    #[tokio::test]
    async fn test_matrix_failure_falls_back_to_first_pending() {
        let engine = engine(true, Some(vec![0, 2, 1]));
        let (idx, fallback) = engine.choose_next(CURRENT, &stops(2)).await;
        assert_eq!(idx, 0);
        assert!(fallback);
    }

    #[tokio::test]
    async fn test_solver_failure_falls_back_to_first_pending() {
        let engine = engine(false, None);
        let (idx, fallback) = engine.choose_next(CURRENT, &stops(2)).await;
        assert_eq!(idx, 0);
        assert!(fallback);
    }

    #[tokio::test]
    async fn test_locate_stops_uses_side_naming() {
        let engine = engine(false, None);
        let parcels = vec![test_parcel(101, "서울 강남구 테헤란로 152")];

        let pickup_stops = engine.locate_stops(&parcels, &PICKUP_SIDE).await;
        assert_eq!(pickup_stops[0].name, "상품 101");

        let delivery_stops = engine.locate_stops(&parcels, &DELIVERY_SIDE).await;
        assert_eq!(delivery_stops[0].name, "받는분");
        assert_eq!(delivery_stops[0].parcel_id, 101);
    }

    struct CityHallGeocoder;

    #[async_trait]
    impl Geocoder for CityHallGeocoder {
        async fn resolve(&self, _address: &str) -> GeocodedPlace {
            GeocodedPlace {
                lat: 37.5665,
                lon: 126.9780,
                display_name: "서울시청".to_string(),
                district: None,
                confidence: 0.1,
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_district_prefers_structured_field() {
        // resultado de keyword search: el nombre es un local sin token 구,
        // el distrito viene solo en region_2depth_name
        struct LandmarkGeocoder;

        #[async_trait]
        impl Geocoder for LandmarkGeocoder {
            async fn resolve(&self, _address: &str) -> GeocodedPlace {
                GeocodedPlace {
                    lat: 37.4979,
                    lon: 127.0286,
                    display_name: "스타벅스 강남R점".to_string(),
                    district: Some("서초구".to_string()),
                    confidence: 0.85,
                }
            }
        }

        let district = resolve_district(&LandmarkGeocoder, "강남대로 390").await;
        assert_eq!(district.as_deref(), Some("서초구"));
    }

    #[tokio::test]
    async fn test_resolve_district_falls_back_to_geocoder_name() {
        struct NormalizingGeocoder;

        #[async_trait]
        impl Geocoder for NormalizingGeocoder {
            async fn resolve(&self, _address: &str) -> GeocodedPlace {
                GeocodedPlace {
                    lat: 37.5172,
                    lon: 127.0473,
                    display_name: "서울 강남구 역삼동".to_string(),
                    district: None,
                    confidence: 0.95,
                }
            }
        }

        // la dirección cruda ni siquiera menciona el distrito
        let district = resolve_district(&NormalizingGeocoder, "테헤란로 152").await;
        assert_eq!(district.as_deref(), Some("강남구"));
    }

    #[tokio::test]
    async fn test_resolve_district_ignores_out_of_area_structured_field() {
        // un region_2depth_name fuera del área de servicio no corta la
        // cadena: se sigue intentando con el texto
        struct OutOfAreaGeocoder;

        #[async_trait]
        impl Geocoder for OutOfAreaGeocoder {
            async fn resolve(&self, _address: &str) -> GeocodedPlace {
                GeocodedPlace {
                    lat: 37.45,
                    lon: 126.70,
                    display_name: "인천 어딘가".to_string(),
                    district: Some("계양구".to_string()),
                    confidence: 0.85,
                }
            }
        }

        let district = resolve_district(&OutOfAreaGeocoder, "서울 마포구 공덕동 1-1").await;
        assert_eq!(district.as_deref(), Some("마포구"));
    }

    #[tokio::test]
    async fn test_resolve_district_textual_fallback() {
        let district =
            resolve_district(&CityHallGeocoder, "서울 마포구 공덕동 1-1").await;
        assert_eq!(district.as_deref(), Some("마포구"));
    }

    #[tokio::test]
    async fn test_resolve_district_rejects_out_of_area() {
        // 계양구 termina en 구 pero no está en la tabla de zonas
        let district = resolve_district(&CityHallGeocoder, "인천 계양구 1번지").await;
        assert!(district.is_none());
    }

    #[test]
    fn test_next_after_current_wraps_and_skips_zero() {
        assert_eq!(next_after_current(&[0, 2, 1]), Some(2));
        assert_eq!(next_after_current(&[1, 2, 0]), Some(1));
        assert_eq!(next_after_current(&[0]), None);
        assert_eq!(next_after_current(&[1, 2]), None);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert!(PICKUP_SIDE.past_cutoff(noon));
        let before = NaiveTime::from_hms_opt(11, 59, 59).unwrap();
        assert!(!PICKUP_SIDE.past_cutoff(before));
    }

    #[test]
    fn test_start_gate() {
        let side = PICKUP_SIDE;
        let early = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
        assert_eq!(side.seconds_until_start(early), Some(1800));
        let open = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
        assert_eq!(side.seconds_until_start(open), None);

        let delivery_early = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert_eq!(
            DELIVERY_SIDE.seconds_until_start(delivery_early),
            Some(3 * 3600)
        );
    }
}
