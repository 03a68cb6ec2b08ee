//! Geocoding respaldado por la API de Kakao
//!
//! Cadena de resolución: búsqueda por dirección (confianza 0.95), búsqueda
//! por keyword (0.85), centroide del distrito (0.5), ayuntamiento (0.1).
//! Nunca falla: siempre hay una coordenada que devolver.

use std::time::Duration;

use serde::Deserialize;

use crate::models::zone::{centroid_for_address, district_in_address, CITY_HALL};

const KAKAO_ADDRESS_API: &str = "https://dapi.kakao.com/v2/local/search/address.json";
const KAKAO_KEYWORD_API: &str = "https://dapi.kakao.com/v2/local/search/keyword.json";
const KAKAO_TIMEOUT: Duration = Duration::from_secs(10);

/// Resultado del geocoding con método y confianza
#[derive(Debug, Clone)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
    /// Distrito estructurado (region_2depth_name) cuando el geocoder lo da
    pub district: Option<String>,
    pub confidence: f64,
    pub method: &'static str,
}

#[derive(Debug, Deserialize)]
struct KakaoResponse {
    #[serde(default)]
    documents: Vec<KakaoDocument>,
}

#[derive(Debug, Deserialize)]
struct KakaoDocument {
    /// longitud
    x: String,
    /// latitud
    y: String,
    #[serde(default)]
    address_name: Option<String>,
    #[serde(default)]
    place_name: Option<String>,
    #[serde(default)]
    address: Option<KakaoAddress>,
}

#[derive(Debug, Deserialize)]
struct KakaoAddress {
    #[serde(default)]
    region_2depth_name: Option<String>,
}

impl KakaoDocument {
    fn coordinates(&self) -> Option<(f64, f64)> {
        let lon = self.x.parse().ok()?;
        let lat = self.y.parse().ok()?;
        Some((lat, lon))
    }

    /// region_2depth_name del bloque de dirección estructurado
    fn district(&self) -> Option<String> {
        self.address
            .as_ref()
            .and_then(|address| address.region_2depth_name.clone())
            .filter(|name| !name.is_empty())
    }
}

async fn query_kakao(
    client: &reqwest::Client,
    api_key: &str,
    endpoint: &str,
    query: &str,
) -> anyhow::Result<Option<KakaoDocument>> {
    let response = client
        .get(endpoint)
        .header("Authorization", format!("KakaoAK {}", api_key))
        .query(&[("query", query)])
        .timeout(KAKAO_TIMEOUT)
        .send()
        .await?;

    if !response.status().is_success() {
        anyhow::bail!("kakao endpoint returned {}", response.status());
    }

    let body: KakaoResponse = response.json().await?;
    Ok(body.documents.into_iter().next())
}

/// Fallback estático cuando Kakao no resuelve
pub fn default_coordinates_by_district(address: &str) -> GeocodeResult {
    if let Some((lat, lon, name)) = centroid_for_address(address) {
        log::info!("기본 좌표 사용: {} -> ({}, {}) [{}]", address, lat, lon, name);
        return GeocodeResult {
            lat,
            lon,
            display_name: name.to_string(),
            district: district_in_address(address).map(str::to_string),
            confidence: 0.5,
            method: "district_fallback",
        };
    }

    let (lat, lon, name) = CITY_HALL;
    log::warn!("구를 찾을 수 없어 서울시청 좌표 사용: {}", address);
    GeocodeResult {
        lat,
        lon,
        display_name: name.to_string(),
        district: None,
        confidence: 0.1,
        method: "fallback",
    }
}

/// Geocodifica una dirección con la cadena completa de fallbacks
pub async fn kakao_geocoding(
    client: &reqwest::Client,
    api_key: &str,
    address: &str,
) -> GeocodeResult {
    match query_kakao(client, api_key, KAKAO_ADDRESS_API, address).await {
        Ok(Some(doc)) => {
            if let Some((lat, lon)) = doc.coordinates() {
                let district = doc.district();
                let name = doc.address_name.unwrap_or_else(|| address.to_string());
                log::info!(
                    "카카오 주소 검색 성공: {} -> ({}, {}) [{}]",
                    address,
                    lat,
                    lon,
                    name
                );
                return GeocodeResult {
                    lat,
                    lon,
                    display_name: name,
                    district,
                    confidence: 0.95,
                    method: "kakao",
                };
            }
        }
        Ok(None) => {}
        Err(e) => log::error!("카카오 주소 검색 오류: {}", e),
    }

    match query_kakao(client, api_key, KAKAO_KEYWORD_API, address).await {
        Ok(Some(doc)) => {
            if let Some((lat, lon)) = doc.coordinates() {
                let district = doc.district();
                let name = doc
                    .place_name
                    .or(doc.address_name)
                    .unwrap_or_else(|| address.to_string());
                log::info!(
                    "카카오 키워드 검색 성공: {} -> ({}, {}) [{}]",
                    address,
                    lat,
                    lon,
                    name
                );
                return GeocodeResult {
                    lat,
                    lon,
                    display_name: name,
                    district,
                    confidence: 0.85,
                    method: "kakao",
                };
            }
        }
        Ok(None) => {}
        Err(e) => log::error!("카카오 키워드 검색 오류: {}", e),
    }

    log::warn!("카카오 지오코딩 실패, 기본 좌표 사용: {}", address);
    default_coordinates_by_district(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_district_fallback_confidence() {
        let result = default_coordinates_by_district("서울 강남구 테헤란로 152");
        assert!((result.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.method, "district_fallback");
        assert_eq!(result.display_name, "강남구 역삼동");
        assert_eq!(result.district.as_deref(), Some("강남구"));
    }

    #[test]
    fn test_city_hall_fallback_confidence() {
        let result = default_coordinates_by_district("평양시 중심가");
        assert!((result.confidence - 0.1).abs() < f64::EPSILON);
        assert_eq!(result.display_name, "서울시청");
        assert!((result.lat - 37.5665).abs() < 1e-9);
        assert!(result.district.is_none());
    }

    #[test]
    fn test_kakao_document_coordinates() {
        let doc = KakaoDocument {
            x: "127.0473".to_string(),
            y: "37.5172".to_string(),
            address_name: Some("서울 강남구 역삼동".to_string()),
            place_name: None,
            address: None,
        };
        let (lat, lon) = doc.coordinates().unwrap();
        assert!((lat - 37.5172).abs() < 1e-9);
        assert!((lon - 127.0473).abs() < 1e-9);

        let bad = KakaoDocument {
            x: "not-a-number".to_string(),
            y: "37.5".to_string(),
            address_name: None,
            place_name: None,
            address: None,
        };
        assert!(bad.coordinates().is_none());
    }

    #[test]
    fn test_kakao_document_structured_district() {
        // respuesta real de keyword search: el nombre es un local, el
        // distrito viene solo en el bloque address
        let json = r#"{
            "documents": [{
                "x": "127.0286",
                "y": "37.4979",
                "place_name": "스타벅스 강남R점",
                "address": { "region_2depth_name": "서초구" }
            }]
        }"#;
        let body: KakaoResponse = serde_json::from_str(json).unwrap();
        let doc = body.documents.into_iter().next().unwrap();
        assert_eq!(doc.district().as_deref(), Some("서초구"));

        let empty = KakaoDocument {
            x: "127.0".to_string(),
            y: "37.5".to_string(),
            address_name: None,
            place_name: None,
            address: Some(KakaoAddress {
                region_2depth_name: Some(String::new()),
            }),
        };
        assert!(empty.district().is_none());
    }
}
