//! Proxy de tráfico delante del motor de rutas
//!
//! Tres capacidades sobre el motor: geocoding en vivo (/search), ingesta
//! periódica del feed municipal de velocidades y reescritura de las
//! respuestas /route con tiempos reales. Todo lo demás se proxea tal cual.

pub mod api;
pub mod geocode;
pub mod rewrite;
pub mod traffic;

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

use crate::config::ProxyConfig;
use self::traffic::SpeedTable;

#[derive(Clone)]
pub struct ProxyState {
    pub config: ProxyConfig,
    pub client: Client,
    /// Velocidades observadas por way id OSM, reemplazadas atómicamente por
    /// ciclo de ingesta
    pub speed_table: SpeedTable,
    /// service_link_id municipal -> osm_way_id, cargado del CSV al arrancar
    pub mapping: Arc<HashMap<String, String>>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig, mapping: HashMap<String, String>) -> Self {
        Self {
            config,
            client: Client::new(),
            speed_table: SpeedTable::new(),
            mapping: Arc::new(mapping),
        }
    }
}
