use std::net::SocketAddr;
use std::path::Path;

use anyhow::Result;
use dotenvy::dotenv;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use parcel_dispatch::config::ProxyConfig;
use parcel_dispatch::proxy::api::create_proxy_router;
use parcel_dispatch::proxy::traffic::{load_mappings, run_traffic_updater};
use parcel_dispatch::proxy::ProxyState;
use parcel_dispatch::utils::shutdown_signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("🚦 Traffic Proxy - intercepción de respuestas del motor de rutas");
    info!("===============================================================");

    let config = ProxyConfig::from_env();

    info!(
        "카카오 API 설정: {}",
        if config.kakao_configured() { "OK" } else { "API KEY 필요" }
    );

    // el CSV puede faltar: el proxy sigue sirviendo, solo sin tabla de tráfico
    let mapping = match load_mappings(Path::new(&config.mapping_file)) {
        Ok(mapping) => mapping,
        Err(e) => {
            warn!("매핑 파일을 찾을 수 없습니다: {} ({})", config.mapping_file, e);
            Default::default()
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = ProxyState::new(config, mapping);

    // único worker de fondo; los errores de ingesta nunca tocan el serving
    tokio::spawn(run_traffic_updater(state.clone()));
    info!("교통 데이터 자동 업데이트 태스크 시작됨");

    let app = create_proxy_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   POST /route - Rutas con tráfico en vivo");
    info!("   POST /matrix - Matriz de tiempos (pass-through)");
    info!("   POST /sources_to_targets - Pass-through al motor");
    info!("   GET  /search - Geocoding Kakao con fallbacks");
    info!("   GET  /health /status /traffic-debug - Introspección");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Error del servidor: {}", e);
            anyhow::anyhow!(e)
        })?;

    info!("👋 Servidor terminado");
    Ok(())
}
