//! Zonas operativas y tabla estática distrito -> conductor
//!
//! El área metropolitana está dividida en 25 distritos agrupados en 5 zonas.
//! Cada zona tiene exactamente un conductor de recogida (1-5) y uno de
//! entrega (6-10). La tabla es configuración, no algoritmo.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Definición de una zona operativa
#[derive(Debug, Clone)]
pub struct Zone {
    pub name: &'static str,
    pub districts: &'static [&'static str],
    pub pickup_driver_id: i64,
    pub delivery_driver_id: i64,
}

pub const PICKUP_DRIVER_IDS: std::ops::RangeInclusive<i64> = 1..=5;
pub const DELIVERY_DRIVER_IDS: std::ops::RangeInclusive<i64> = 6..=10;

pub static ZONES: &[Zone] = &[
    Zone {
        name: "강북서부",
        districts: &["은평구", "서대문구", "마포구"],
        pickup_driver_id: 1,
        delivery_driver_id: 6,
    },
    Zone {
        name: "강북동부",
        districts: &["도봉구", "노원구", "강북구", "성북구"],
        pickup_driver_id: 2,
        delivery_driver_id: 7,
    },
    Zone {
        name: "강북중부",
        districts: &["종로구", "중구", "용산구"],
        pickup_driver_id: 3,
        delivery_driver_id: 8,
    },
    Zone {
        name: "강남서부",
        districts: &["강서구", "양천구", "구로구", "영등포구", "동작구", "관악구", "금천구"],
        pickup_driver_id: 4,
        delivery_driver_id: 9,
    },
    Zone {
        name: "강남동부",
        districts: &["성동구", "광진구", "동대문구", "중랑구", "강동구", "송파구", "강남구", "서초구"],
        pickup_driver_id: 5,
        delivery_driver_id: 10,
    },
];

/// Coordenadas por defecto del ayuntamiento (fallback final de geocoding)
pub const CITY_HALL: (f64, f64, &str) = (37.5665, 126.9780, "서울시청");

lazy_static! {
    static ref DISTRICT_TO_ZONE: HashMap<&'static str, &'static Zone> = {
        let mut m = HashMap::new();
        for zone in ZONES {
            for district in zone.districts {
                m.insert(*district, zone);
            }
        }
        m
    };

    /// Centroides por distrito usados cuando el geocoder no responde
    static ref DISTRICT_CENTROIDS: HashMap<&'static str, (f64, f64, &'static str)> = {
        let mut m = HashMap::new();
        m.insert("강남구", (37.5172, 127.0473, "강남구 역삼동"));
        m.insert("서초구", (37.4837, 127.0324, "서초구 서초동"));
        m.insert("송파구", (37.5145, 127.1059, "송파구 잠실동"));
        m.insert("강동구", (37.5301, 127.1238, "강동구 천호동"));
        m.insert("성동구", (37.5634, 127.0369, "성동구 성수동"));
        m.insert("광진구", (37.5384, 127.0822, "광진구 광장동"));
        m.insert("동대문구", (37.5744, 127.0396, "동대문구 전농동"));
        m.insert("중랑구", (37.6063, 127.0927, "중랑구 면목동"));
        m.insert("종로구", (37.5735, 126.9790, "종로구 종로"));
        m.insert("중구", (37.5641, 126.9979, "중구 명동"));
        m.insert("용산구", (37.5311, 126.9810, "용산구 한강로"));
        m.insert("성북구", (37.5894, 127.0167, "성북구 성북동"));
        m.insert("강북구", (37.6396, 127.0253, "강북구 번동"));
        m.insert("도봉구", (37.6687, 127.0472, "도봉구 방학동"));
        m.insert("노원구", (37.6543, 127.0568, "노원구 상계동"));
        m.insert("은평구", (37.6176, 126.9269, "은평구 불광동"));
        m.insert("서대문구", (37.5791, 126.9368, "서대문구 신촌동"));
        m.insert("마포구", (37.5638, 126.9084, "마포구 공덕동"));
        m.insert("양천구", (37.5170, 126.8667, "양천구 목동"));
        m.insert("강서구", (37.5509, 126.8496, "강서구 화곡동"));
        m.insert("구로구", (37.4954, 126.8877, "구로구 구로동"));
        m.insert("금천구", (37.4564, 126.8955, "금천구 가산동"));
        m.insert("영등포구", (37.5263, 126.8966, "영등포구 영등포동"));
        m.insert("동작구", (37.5124, 126.9393, "동작구 상도동"));
        m.insert("관악구", (37.4784, 126.9516, "관악구 봉천동"));
        m
    };
}

/// Zona a la que pertenece un distrito
pub fn zone_for_district(district: &str) -> Option<&'static Zone> {
    DISTRICT_TO_ZONE.get(district).copied()
}

/// Conductor de recogida responsable de un distrito
pub fn pickup_driver_for_district(district: &str) -> Option<i64> {
    zone_for_district(district).map(|z| z.pickup_driver_id)
}

/// Conductor de entrega responsable de un distrito
pub fn delivery_driver_for_district(district: &str) -> Option<i64> {
    zone_for_district(district).map(|z| z.delivery_driver_id)
}

/// Zona asignada a un conductor (de cualquiera de los dos lados)
pub fn zone_for_driver(driver_id: i64) -> Option<&'static Zone> {
    ZONES
        .iter()
        .find(|z| z.pickup_driver_id == driver_id || z.delivery_driver_id == driver_id)
}

/// Extrae el distrito de una dirección de texto libre.
///
/// Busca el primer token terminado en `구` que sea un distrito conocido;
/// si ningún token coincide con la tabla, devuelve el primer token
/// terminado en `구` tal cual (el llamador decide si lo acepta).
pub fn district_from_address(address: &str) -> Option<&str> {
    let mut first_suffix_token = None;

    for token in address.split_whitespace() {
        let token = token.trim_matches(|c: char| c.is_ascii_punctuation());
        if !token.ends_with('구') {
            continue;
        }
        if DISTRICT_TO_ZONE.contains_key(token) {
            return Some(token);
        }
        if first_suffix_token.is_none() {
            first_suffix_token = Some(token);
        }
    }

    first_suffix_token
}

/// Distrito conocido contenido en una dirección, en cualquier posición (no
/// solo como token separado)
pub fn district_in_address(address: &str) -> Option<&'static str> {
    DISTRICT_TO_ZONE
        .keys()
        .find(|district| address.contains(*district))
        .copied()
}

/// Centroide de un distrito para el fallback de geocoding
pub fn centroid_for_address(address: &str) -> Option<(f64, f64, &'static str)> {
    district_in_address(address).and_then(|district| DISTRICT_CENTROIDS.get(district).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_district_maps_to_one_zone() {
        let total: usize = ZONES.iter().map(|z| z.districts.len()).sum();
        assert_eq!(total, 25);
        assert_eq!(DISTRICT_TO_ZONE.len(), 25);
    }

    #[test]
    fn test_driver_ids_are_disjoint_ranges() {
        for zone in ZONES {
            assert!(PICKUP_DRIVER_IDS.contains(&zone.pickup_driver_id));
            assert!(DELIVERY_DRIVER_IDS.contains(&zone.delivery_driver_id));
            assert_eq!(zone.delivery_driver_id, zone.pickup_driver_id + 5);
        }
    }

    #[test]
    fn test_gangnam_belongs_to_southeast_zone() {
        let zone = zone_for_district("강남구").unwrap();
        assert_eq!(zone.name, "강남동부");
        assert_eq!(pickup_driver_for_district("강남구"), Some(5));
        assert_eq!(delivery_driver_for_district("강남구"), Some(10));
    }

    #[test]
    fn test_district_from_address() {
        assert_eq!(
            district_from_address("서울 강남구 테헤란로 152"),
            Some("강남구")
        );
        assert_eq!(district_from_address("서울 마포구 공덕동 1-1"), Some("마포구"));
        assert_eq!(district_from_address("제주도 서귀포시 123"), None);
    }

    #[test]
    fn test_unknown_gu_token_is_still_returned() {
        // token con sufijo 구 fuera de la tabla: se devuelve para que el
        // llamador pueda rechazarlo con un 400 explícito
        assert_eq!(district_from_address("인천 계양구 1번지"), Some("계양구"));
    }

    #[test]
    fn test_district_in_address_matches_anywhere() {
        // sin separación por espacios, como devuelve el geocoder
        assert_eq!(district_in_address("서울특별시마포구공덕동"), Some("마포구"));
        assert_eq!(district_in_address("부산 해운대구"), None);
    }

    #[test]
    fn test_centroid_lookup() {
        let (lat, lon, name) = centroid_for_address("서울 송파구 잠실동 40-1").unwrap();
        assert!((lat - 37.5145).abs() < 1e-9);
        assert!((lon - 127.1059).abs() < 1e-9);
        assert_eq!(name, "송파구 잠실동");
        assert!(centroid_for_address("어딘가 다른 곳").is_none());
    }

    #[test]
    fn test_every_district_has_centroid() {
        for zone in ZONES {
            for district in zone.districts {
                assert!(
                    DISTRICT_CENTROIDS.contains_key(district),
                    "missing centroid for {}",
                    district
                );
            }
        }
    }
}
