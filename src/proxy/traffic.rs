//! Ingesta del feed municipal de tráfico en vivo
//!
//! Un único worker de fondo: una pasada inmediata al arrancar y luego una por
//! intervalo. Cada ciclo construye una tabla nueva completa y la publica con
//! un swap de puntero; los lectores ven la tabla anterior o la nueva entera,
//! nunca una mezcla.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;

use super::ProxyState;

/// Espaciado entre llamadas al feed para no disparar el rate limit upstream
const API_CALL_DELAY: Duration = Duration::from_millis(50);
const FEED_TIMEOUT: Duration = Duration::from_secs(5);
const FEED_OK_CODE: &str = "INFO-000";

/// Tabla de velocidades observadas (km/h) por way id OSM.
///
/// El writer es un único worker; los lectores toman un snapshot Arc y operan
/// sobre él sin bloquear el swap.
#[derive(Clone, Default)]
pub struct SpeedTable {
    inner: Arc<RwLock<Arc<HashMap<String, f64>>>>,
}

impl SpeedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot inmutable de ciclo completo
    pub async fn snapshot(&self) -> Arc<HashMap<String, f64>> {
        self.inner.read().await.clone()
    }

    /// Publica la tabla de un ciclo terminado (swap atómico)
    pub async fn replace(&self, table: HashMap<String, f64>) {
        let mut guard = self.inner.write().await;
        *guard = Arc::new(table);
    }
}

/// Filas del XML del feed: RESULT/CODE y row/{link_id, prcs_spd}
#[derive(Debug, Deserialize)]
pub struct TrafficInfoDocument {
    #[serde(rename = "RESULT")]
    pub result: Option<FeedResult>,
    #[serde(rename = "row", default)]
    pub rows: Vec<FeedRow>,
}

#[derive(Debug, Deserialize)]
pub struct FeedResult {
    #[serde(rename = "CODE")]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedRow {
    pub link_id: Option<String>,
    pub prcs_spd: Option<f64>,
}

/// Parsea un documento del feed; None si el código de resultado no es OK o
/// faltan campos
pub fn parse_feed_document(xml: &str) -> Option<(String, f64)> {
    let doc: TrafficInfoDocument = quick_xml::de::from_str(xml).ok()?;

    let ok = doc
        .result
        .map(|r| r.code == FEED_OK_CODE)
        .unwrap_or(false);
    if !ok {
        return None;
    }

    let row = doc.rows.into_iter().next()?;
    Some((row.link_id?, row.prcs_spd?))
}

/// Carga el CSV service_link_id,osm_way_id.
///
/// Filas en blanco, NaN o no numéricas se saltan y se cuentan; way ids en
/// notación flotante ("123.0") se aceptan.
pub fn load_mappings(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut mapping = HashMap::new();
    let mut success_count = 0usize;
    let mut error_count = 0usize;

    #[derive(Debug, Deserialize)]
    struct MappingRow {
        service_link_id: Option<String>,
        osm_way_id: Option<String>,
    }

    for (row_num, record) in reader.deserialize::<MappingRow>().enumerate() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                log::debug!("행 {}: 레코드 오류 {}", row_num + 1, e);
                error_count += 1;
                continue;
            }
        };

        let service_id = row.service_link_id.unwrap_or_default().trim().to_string();
        let osm_way_raw = row.osm_way_id.unwrap_or_default().trim().to_string();

        if service_id.is_empty() || osm_way_raw.is_empty() {
            error_count += 1;
            continue;
        }
        if osm_way_raw.eq_ignore_ascii_case("nan") {
            error_count += 1;
            continue;
        }

        match osm_way_raw.parse::<f64>() {
            Ok(value) if value.is_finite() => {
                mapping.insert(service_id, format!("{}", value as i64));
                success_count += 1;
            }
            _ => {
                log::debug!(
                    "행 {}: osm_way_id 값이 숫자가 아님 ({})",
                    row_num + 1,
                    osm_way_raw
                );
                error_count += 1;
            }
        }
    }

    log::info!(
        "매핑 로드 완료: 성공 {}개, 실패 {}개",
        success_count,
        error_count
    );
    log::info!("유효한 매핑: {}개", mapping.len());

    Ok(mapping)
}

fn feed_url(api_key: &str, service_link: &str) -> String {
    format!(
        "http://openapi.seoul.go.kr:8088/{}/xml/TrafficInfo/1/1/{}",
        api_key, service_link
    )
}

/// Un ciclo completo: una llamada por service link, tabla nueva al final
pub async fn fetch_traffic_cycle(state: &ProxyState) {
    log::info!("실시간 교통 데이터 수집 시작...");

    let total_links = state.mapping.len();
    log::info!("총 서비스링크 수: {}개", total_links);

    let mut new_table = HashMap::new();
    let mut success_count = 0usize;
    let mut fail_count = 0usize;

    for (i, (service_link, osm_id)) in state.mapping.iter().enumerate() {
        let url = feed_url(&state.config.seoul_api_key, service_link);

        let fetched = async {
            let response = state
                .client
                .get(&url)
                .timeout(FEED_TIMEOUT)
                .send()
                .await?;
            let body = response.text().await?;
            Ok::<String, reqwest::Error>(body)
        }
        .await;

        match fetched {
            Ok(body) => match parse_feed_document(&body) {
                Some((link_id, speed)) if &link_id == service_link => {
                    new_table.insert(osm_id.clone(), speed);
                    success_count += 1;
                    if success_count % 100 == 0 {
                        log::info!("수집 중... {}개 완료", success_count);
                    }
                }
                _ => {
                    fail_count += 1;
                }
            },
            Err(_) => {
                // fallos se cuentan, no se reintentan dentro del ciclo
                fail_count += 1;
            }
        }

        if (i + 1) % 500 == 0 {
            log::info!(
                "진행률: {}/{} ({:.1}%)",
                i + 1,
                total_links,
                (i + 1) as f64 / total_links as f64 * 100.0
            );
        }

        tokio::time::sleep(API_CALL_DELAY).await;
    }

    log::info!(
        "교통 데이터 수집 완료: {}개 (성공: {}, 실패: {})",
        new_table.len(),
        success_count,
        fail_count
    );

    if !new_table.is_empty() {
        let speeds: Vec<f64> = new_table.values().copied().collect();
        let avg = speeds.iter().sum::<f64>() / speeds.len() as f64;
        let min = speeds.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = speeds.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        log::info!(
            "교통 속도 분포: 평균 {:.1}km/h, 최소 {:.1}km/h, 최대 {:.1}km/h",
            avg,
            min,
            max
        );
    }

    state.speed_table.replace(new_table).await;
}

/// Worker de fondo: pasada inmediata y luego una por intervalo.
///
/// Los errores de ingesta nunca afectan al serving; solo dejan la tabla
/// vieja en su sitio.
pub async fn run_traffic_updater(state: ProxyState) {
    log::info!("첫 번째 교통 데이터 수집 시작...");
    fetch_traffic_cycle(&state).await;

    let interval = Duration::from_secs(state.config.traffic_update_interval_secs);
    loop {
        log::info!("다음 업데이트까지 {}초 대기...", interval.as_secs());
        tokio::time::sleep(interval).await;
        log::info!("주기적 교통 데이터 업데이트 시작...");
        fetch_traffic_cycle(&state).await;
    }
}
