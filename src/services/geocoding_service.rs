//! Cliente de geocoding de los despachadores
//!
//! Habla con el endpoint /search del proxy de tráfico. Nunca falla: si el
//! proxy no responde, degrada al centroide del distrito y en último término
//! al ayuntamiento, igual que hace el propio proxy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::zone::{centroid_for_address, district_in_address, CITY_HALL};
use crate::state::GeocodeCache;

/// Coordenada geocodificada con su nivel de confianza
#[derive(Debug, Clone)]
pub struct GeocodedPlace {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
    /// Distrito estructurado (region_2depth_name) cuando el geocoder lo da
    pub district: Option<String>,
    pub confidence: f64,
}

/// Seam de geocoding del núcleo de despacho
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, address: &str) -> GeocodedPlace;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    features: Vec<SearchFeature>,
}

#[derive(Debug, Deserialize)]
struct SearchFeature {
    geometry: SearchGeometry,
    #[serde(default)]
    properties: SearchProperties,
}

#[derive(Debug, Deserialize)]
struct SearchGeometry {
    coordinates: Vec<f64>, // [longitude, latitude]
}

#[derive(Debug, Default, Deserialize)]
struct SearchProperties {
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    district: Option<String>,
}

/// Geocoder respaldado por el proxy de tráfico
pub struct ProxyGeocoder {
    base_url: String,
    client: Client,
    cache: GeocodeCache,
}

impl ProxyGeocoder {
    pub fn new(base_url: String, cache: GeocodeCache) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            client,
            cache,
        }
    }

    async fn query_proxy(&self, address: &str) -> anyhow::Result<GeocodedPlace> {
        let url = format!(
            "{}/search?text={}",
            self.base_url,
            urlencoding::encode(address)
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("search endpoint returned {}", status);
        }

        let body: SearchResponse = response.json().await?;
        let feature = body
            .features
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty feature list"))?;

        if feature.geometry.coordinates.len() < 2 {
            anyhow::bail!("feature without coordinates");
        }

        Ok(GeocodedPlace {
            lon: feature.geometry.coordinates[0],
            lat: feature.geometry.coordinates[1],
            display_name: feature
                .properties
                .display_name
                .unwrap_or_else(|| address.to_string()),
            district: feature.properties.district.filter(|d| !d.is_empty()),
            confidence: feature.properties.confidence.unwrap_or(0.5),
        })
    }

    /// Fallback local cuando el proxy no responde
    fn fallback(address: &str) -> GeocodedPlace {
        if let Some((lat, lon, name)) = centroid_for_address(address) {
            log::info!("📍 Centroide de distrito para: {} -> {}", address, name);
            return GeocodedPlace {
                lat,
                lon,
                display_name: name.to_string(),
                district: district_in_address(address).map(str::to_string),
                confidence: 0.5,
            };
        }

        let (lat, lon, name) = CITY_HALL;
        log::warn!("⚠️ Sin distrito reconocible, usando {}: {}", name, address);
        GeocodedPlace {
            lat,
            lon,
            display_name: name.to_string(),
            district: None,
            confidence: 0.1,
        }
    }
}

#[async_trait]
impl Geocoder for ProxyGeocoder {
    async fn resolve(&self, address: &str) -> GeocodedPlace {
        if let Some(hit) = self.cache.get(address).await {
            return GeocodedPlace {
                lat: hit.lat,
                lon: hit.lon,
                display_name: hit.display_name,
                district: hit.district,
                confidence: hit.confidence,
            };
        }

        match self.query_proxy(address).await {
            Ok(place) => {
                log::info!(
                    "🗺️ Geocoding: {} -> ({}, {}) confianza {}",
                    address,
                    place.lat,
                    place.lon,
                    place.confidence
                );
                self.cache.store(address, &place).await;
                place
            }
            Err(e) => {
                log::error!("❌ Error de geocoding para {}: {}", address, e);
                Self::fallback(address)
            }
        }
    }
}
