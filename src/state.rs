//! Shared application state
//!
//! Este módulo define el estado compartido de los despachadores que se pasa
//! a través del router de Axum.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use sqlx::MySqlPool;
use tokio::sync::Mutex;

use crate::config::DispatchConfig;
use crate::services::geocoding_service::GeocodedPlace;

/// Entrada de la caché de geocoding (optimización, no contrato)
#[derive(Clone, Debug)]
pub struct CachedPlace {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
    pub district: Option<String>,
    pub confidence: f64,
    inserted_at: Instant,
}

const GEOCODE_CACHE_MAX: usize = 512;
const GEOCODE_CACHE_TTL: Duration = Duration::from_secs(600);

/// Caché acotada de direcciones geocodificadas, con clave md5 sobre la
/// dirección recortada
#[derive(Clone, Default)]
pub struct GeocodeCache {
    entries: Arc<Mutex<HashMap<String, CachedPlace>>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(address: &str) -> String {
        format!("{:x}", md5::compute(address.trim()))
    }

    pub async fn get(&self, address: &str) -> Option<CachedPlace> {
        let entries = self.entries.lock().await;
        entries
            .get(&Self::key(address))
            .filter(|entry| entry.inserted_at.elapsed() < GEOCODE_CACHE_TTL)
            .cloned()
    }

    pub async fn store(&self, address: &str, place: &GeocodedPlace) {
        let mut entries = self.entries.lock().await;

        if entries.len() >= GEOCODE_CACHE_MAX {
            entries.retain(|_, entry| entry.inserted_at.elapsed() < GEOCODE_CACHE_TTL);
            if entries.len() >= GEOCODE_CACHE_MAX {
                entries.clear();
            }
        }

        entries.insert(
            Self::key(address),
            CachedPlace {
                lat: place.lat,
                lon: place.lon,
                display_name: place.display_name.clone(),
                district: place.district.clone(),
                confidence: place.confidence,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub config: DispatchConfig,
    pub http_client: Client,
    /// Conductores que confirmaron llegada al hub. Proceso-local: se pierde
    /// al reiniciar y el conductor vuelve a confirmar.
    pub at_hub: Arc<Mutex<HashMap<i64, bool>>>,
    pub geocode_cache: GeocodeCache,
}

impl AppState {
    pub fn new(pool: MySqlPool, config: DispatchConfig) -> Self {
        Self {
            pool,
            config,
            http_client: Client::new(),
            at_hub: Arc::new(Mutex::new(HashMap::new())),
            geocode_cache: GeocodeCache::new(),
        }
    }

    /// Consultar si un conductor está marcado en el hub
    pub async fn is_at_hub(&self, driver_id: i64) -> bool {
        let map = self.at_hub.lock().await;
        map.get(&driver_id).copied().unwrap_or(false)
    }

    /// Marcar llegada al hub
    pub async fn set_at_hub(&self, driver_id: i64) {
        let mut map = self.at_hub.lock().await;
        map.insert(driver_id, true);
        log::info!("🏠 Conductor {} marcado en el hub", driver_id);
    }

    /// Limpiar la marca de hub (llegó trabajo nuevo)
    pub async fn clear_at_hub(&self, driver_id: i64) {
        let mut map = self.at_hub.lock().await;
        if map.remove(&driver_id).is_some() {
            log::info!("🚚 Conductor {} sale del hub: hay paradas pendientes", driver_id);
        }
    }
}
