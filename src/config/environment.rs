//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno para los cuatro servicios.
//! Cada servicio lee únicamente las variables que necesita.

use std::env;

use chrono::{DateTime, FixedOffset, Utc};

/// Ubicación fija del hub (punto de partida y retorno de todos los conductores)
#[derive(Debug, Clone)]
pub struct HubLocation {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

impl HubLocation {
    fn from_env() -> Self {
        Self {
            lat: env::var("HUB_LAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(37.5299),
            lon: env::var("HUB_LON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(126.9648),
            name: env::var("HUB_NAME").unwrap_or_else(|_| "용산역".to_string()),
        }
    }
}

/// Configuración del entorno para los despachadores de recogida y entrega
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub mysql_host: String,
    pub mysql_port: u16,
    pub mysql_user: String,
    pub mysql_password: String,
    pub mysql_database: String,
    /// URL del proxy de tráfico (que antepone el motor de rutas)
    pub valhalla_url: String,
    pub lkh_service_url: String,
    /// URL del despachador de entregas, usada para el handoff de mediodía
    pub delivery_service_url: String,
    pub hub: HubLocation,
    /// Desplazamiento horario local en horas (Seúl: +9)
    pub utc_offset_hours: i32,
}

impl DispatchConfig {
    pub fn from_env(default_port: u16) -> Self {
        let valhalla_host = env::var("VALHALLA_HOST").unwrap_or_else(|_| "traffic-proxy".to_string());
        let valhalla_port = env::var("VALHALLA_PORT").unwrap_or_else(|_| "8003".to_string());

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_port),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            mysql_host: env::var("MYSQL_HOST").expect("MYSQL_HOST must be set"),
            mysql_port: env::var("MYSQL_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3306),
            mysql_user: env::var("MYSQL_USER").expect("MYSQL_USER must be set"),
            mysql_password: env::var("MYSQL_PASSWORD").expect("MYSQL_PASSWORD must be set"),
            mysql_database: env::var("MYSQL_DATABASE").expect("MYSQL_DATABASE must be set"),
            valhalla_url: format!("http://{}:{}", valhalla_host, valhalla_port),
            lkh_service_url: env::var("LKH_SERVICE_URL")
                .unwrap_or_else(|_| "http://lkh:5001/solve".to_string()),
            delivery_service_url: env::var("DELIVERY_SERVICE_URL")
                .unwrap_or_else(|_| "http://delivery:5002".to_string()),
            hub: HubLocation::from_env(),
            utc_offset_hours: local_offset_hours(),
        }
    }

    pub fn database_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.mysql_user, self.mysql_password, self.mysql_host, self.mysql_port, self.mysql_database
        )
    }

    /// Hora actual en la zona horaria local de operación
    pub fn local_now(&self) -> DateTime<FixedOffset> {
        local_now_with_offset(self.utc_offset_hours)
    }
}

/// Configuración del entorno para el proxy de tráfico
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// URL del motor de rutas real detrás del proxy
    pub valhalla_url: String,
    pub seoul_api_key: String,
    pub kakao_api_key: String,
    pub mapping_file: String,
    pub traffic_update_interval_secs: u64,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8003),
            valhalla_url: env::var("VALHALLA_URL")
                .unwrap_or_else(|_| "http://valhalla:8002".to_string()),
            seoul_api_key: env::var("SEOUL_API_KEY").expect("SEOUL_API_KEY must be set"),
            kakao_api_key: env::var("KAKAO_API_KEY").expect("KAKAO_API_KEY must be set"),
            mapping_file: env::var("MAPPING_FILE")
                .unwrap_or_else(|_| "/data/service_to_osm_mapping.csv".to_string()),
            traffic_update_interval_secs: env::var("TRAFFIC_UPDATE_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    pub fn kakao_configured(&self) -> bool {
        !self.kakao_api_key.is_empty() && self.kakao_api_key != "YOUR_KAKAO_API_KEY_HERE"
    }
}

/// Configuración del entorno para el adaptador TSP
#[derive(Debug, Clone)]
pub struct TspConfig {
    pub host: String,
    pub port: u16,
    pub lkh_executable: String,
}

impl TspConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5001),
            lkh_executable: env::var("LKH_EXECUTABLE")
                .unwrap_or_else(|_| "/usr/local/bin/LKH".to_string()),
        }
    }
}

fn local_offset_hours() -> i32 {
    env::var("UTC_OFFSET_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(9)
}

/// Hora actual con un desplazamiento fijo (la zona de operación no tiene DST)
pub fn local_now_with_offset(offset_hours: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(9 * 3600).unwrap());
    Utc::now().with_timezone(&offset)
}
