//! Reescritura de respuestas /route con velocidades observadas
//!
//! La atribución de velocidad por maniobra es best-effort: el motor no
//! devuelve way ids en la respuesta, así que se busca por nombre de calle y,
//! si no hay match, se usa el promedio global solo cuando indica congestión.
//! Sobre- o sub-atribución se tolera; el contrato es dar forma al tiempo,
//! no exactitud.

use std::collections::HashMap;

use serde_json::{json, Value};

/// Corredores vigilados con cobertura del feed; el match por nombre toma la
/// primera velocidad positiva de la tabla
const MONITORED_CORRIDORS: &[&str] = &["강남대로", "gangnam"];

/// Umbral de congestión: el promedio global solo se aplica por debajo
const CONGESTION_THRESHOLD_KMH: f64 = 40.0;

/// ¿El caller pidió tráfico en vivo? costing_options[costing].use_live_traffic
pub fn requested_live_traffic(request: &Value) -> bool {
    let costing = request
        .get("costing")
        .and_then(Value::as_str)
        .unwrap_or("auto");

    request
        .get("costing_options")
        .and_then(|options| options.get(costing))
        .and_then(|opts| opts.get("use_live_traffic"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn find_real_speed_for_maneuver(maneuver: &Value, speeds: &HashMap<String, f64>) -> Option<f64> {
    if speeds.is_empty() {
        return None;
    }

    let street_names = maneuver
        .get("street_names")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for name in &street_names {
        let Some(name) = name.as_str() else { continue };
        let lower = name.to_lowercase();

        if MONITORED_CORRIDORS
            .iter()
            .any(|corridor| name.contains(corridor) || lower.contains(corridor))
        {
            if let Some(speed) = speeds.values().find(|s| **s > 0.0) {
                return Some(*speed);
            }
        }
    }

    let plausible: Vec<f64> = speeds
        .values()
        .copied()
        .filter(|s| (5.0..=100.0).contains(s))
        .collect();
    if plausible.is_empty() {
        return None;
    }

    let avg = plausible.iter().sum::<f64>() / plausible.len() as f64;
    if avg < CONGESTION_THRESHOLD_KMH {
        Some(avg)
    } else {
        None
    }
}

/// Aplica velocidades reales a una respuesta del motor de rutas.
///
/// Reescribe el time de cada maniobra atribuible como
/// (length_km / speed_kmh) * 3600, preservando el original, y recalcula los
/// summary de leg y de trip. Siempre anota el trip con los contadores de
/// aplicación.
pub fn apply_real_traffic_to_response(
    response: &mut Value,
    speeds: &HashMap<String, f64>,
    use_traffic: bool,
) {
    let has_trip = response.get("trip").is_some();
    if !has_trip {
        return;
    }

    if !use_traffic || speeds.is_empty() {
        let trip = &mut response["trip"];
        trip["has_traffic"] = json!(false);
        trip["traffic_data_count"] = json!(speeds.len());
        trip["real_traffic_applied"] = json!(false);
        return;
    }

    log::info!("모터 응답 인터셉트 - 실시간 교통 속도 적용 시작");

    let mut applied_segments = 0usize;
    let mut total_segments = 0usize;
    let mut total_original_time = 0.0f64;
    let mut total_new_time = 0.0f64;

    if let Some(legs) = response["trip"].get_mut("legs").and_then(Value::as_array_mut) {
        for leg in legs {
            let mut leg_original_time = 0.0f64;
            let mut leg_new_time = 0.0f64;

            if let Some(maneuvers) = leg.get_mut("maneuvers").and_then(Value::as_array_mut) {
                for maneuver in maneuvers {
                    total_segments += 1;

                    let original_time = maneuver
                        .get("time")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    let length_km = maneuver
                        .get("length")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);

                    leg_original_time += original_time;

                    let real_speed = find_real_speed_for_maneuver(maneuver, speeds);

                    match real_speed {
                        Some(speed) if speed > 0.0 && length_km > 0.0 => {
                            let new_time = (length_km / speed) * 3600.0;

                            maneuver["time"] = json!(new_time);
                            maneuver["original_time"] = json!(original_time);
                            maneuver["real_speed_applied"] = json!(speed);

                            leg_new_time += new_time;
                            applied_segments += 1;
                        }
                        _ => {
                            leg_new_time += original_time;
                        }
                    }
                }
            }

            if let Some(summary) = leg.get_mut("summary") {
                summary["original_time"] = json!(leg_original_time);
                summary["time"] = json!(leg_new_time);
            }

            total_original_time += leg_original_time;
            total_new_time += leg_new_time;
        }
    }

    if let Some(summary) = response["trip"].get_mut("summary") {
        summary["original_time"] = json!(total_original_time);
        summary["time"] = json!(total_new_time);
        summary["traffic_time"] = json!(total_new_time);
    }

    let trip = &mut response["trip"];
    trip["has_traffic"] = json!(true);
    trip["traffic_data_count"] = json!(speeds.len());
    trip["real_traffic_applied"] = json!(true);
    trip["applied_segments"] = json!(applied_segments);
    trip["total_segments"] = json!(total_segments);

    if applied_segments > 0 && total_original_time > 0.0 {
        let change_pct = (total_new_time - total_original_time) / total_original_time * 100.0;
        log::info!(
            "실시간 교통 적용 완료: {}/{} 구간, 시간 변화: {:+.1}%",
            applied_segments,
            total_segments,
            change_pct
        );
    } else {
        log::info!("적용된 실시간 교통 구간 없음");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn congested_table() -> HashMap<String, f64> {
        let mut speeds = HashMap::new();
        speeds.insert("521766182".to_string(), 20.0);
        speeds.insert("521766183".to_string(), 30.0);
        speeds
    }

    fn free_flow_table() -> HashMap<String, f64> {
        let mut speeds = HashMap::new();
        speeds.insert("521766182".to_string(), 80.0);
        speeds.insert("521766183".to_string(), 90.0);
        speeds
    }

    fn route_response() -> Value {
        json!({
            "trip": {
                "summary": { "time": 600.0, "length": 10.0 },
                "legs": [{
                    "summary": { "time": 600.0, "length": 10.0 },
                    "maneuvers": [
                        {
                            "instruction": "직진",
                            "street_names": ["테헤란로"],
                            "time": 300.0,
                            "length": 5.0,
                            "begin_shape_index": 0
                        },
                        {
                            "instruction": "좌회전",
                            "street_names": ["서초대로"],
                            "time": 300.0,
                            "length": 5.0,
                            "begin_shape_index": 10
                        }
                    ],
                    "shape": "_ibE_ibE"
                }]
            }
        })
    }

    #[test]
    fn test_requested_live_traffic() {
        let req = json!({
            "costing": "auto",
            "costing_options": { "auto": { "use_live_traffic": true } }
        });
        assert!(requested_live_traffic(&req));

        let req = json!({ "costing": "auto" });
        assert!(!requested_live_traffic(&req));

        // el costing por defecto es auto
        let req = json!({
            "costing_options": { "auto": { "use_live_traffic": true } }
        });
        assert!(requested_live_traffic(&req));
    }

    #[test]
    fn test_congestion_average_rewrites_times() {
        let mut response = route_response();
        apply_real_traffic_to_response(&mut response, &congested_table(), true);

        let trip = &response["trip"];
        assert_eq!(trip["real_traffic_applied"], json!(true));
        assert_eq!(trip["applied_segments"], json!(2));
        assert_eq!(trip["total_segments"], json!(2));

        // promedio 25 km/h sobre 5 km = 720 s por maniobra
        let maneuver = &trip["legs"][0]["maneuvers"][0];
        assert!((maneuver["time"].as_f64().unwrap() - 720.0).abs() < 1e-6);
        assert_eq!(maneuver["original_time"], json!(300.0));

        // los summary se recalculan y conservan el original
        assert!((trip["summary"]["time"].as_f64().unwrap() - 1440.0).abs() < 1e-6);
        assert_eq!(trip["summary"]["original_time"], json!(600.0));
    }

    #[test]
    fn test_free_flow_average_leaves_maneuvers_untouched() {
        let mut response = route_response();
        apply_real_traffic_to_response(&mut response, &free_flow_table(), true);

        let trip = &response["trip"];
        // promedio 85 km/h: sin congestión no se atribuye nada
        assert_eq!(trip["applied_segments"], json!(0));
        let maneuver = &trip["legs"][0]["maneuvers"][0];
        assert_eq!(maneuver["time"], json!(300.0));
        assert!(maneuver.get("original_time").is_none());
    }

    #[test]
    fn test_monitored_corridor_matches_table_speed() {
        let mut response = route_response();
        response["trip"]["legs"][0]["maneuvers"][0]["street_names"] = json!(["강남대로"]);

        let mut speeds = HashMap::new();
        speeds.insert("521766182".to_string(), 55.0);
        apply_real_traffic_to_response(&mut response, &speeds, true);

        let maneuver = &response["trip"]["legs"][0]["maneuvers"][0];
        // el corredor vigilado usa la velocidad de la tabla aunque no haya congestión
        assert_eq!(maneuver["real_speed_applied"], json!(55.0));
    }

    #[test]
    fn test_opt_out_only_annotates() {
        let mut response = route_response();
        apply_real_traffic_to_response(&mut response, &congested_table(), false);

        let trip = &response["trip"];
        assert_eq!(trip["real_traffic_applied"], json!(false));
        assert_eq!(trip["has_traffic"], json!(false));
        assert_eq!(trip["legs"][0]["maneuvers"][0]["time"], json!(300.0));
    }

    #[test]
    fn test_empty_table_only_annotates() {
        let mut response = route_response();
        apply_real_traffic_to_response(&mut response, &HashMap::new(), true);
        assert_eq!(response["trip"]["real_traffic_applied"], json!(false));
    }

    #[test]
    fn test_non_trip_response_untouched() {
        let mut response = json!({ "error": "no route" });
        apply_real_traffic_to_response(&mut response, &congested_table(), true);
        assert_eq!(response, json!({ "error": "no route" }));
    }
}
