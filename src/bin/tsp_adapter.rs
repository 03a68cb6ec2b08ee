use std::net::SocketAddr;

use anyhow::Result;
use dotenvy::dotenv;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use parcel_dispatch::config::TspConfig;
use parcel_dispatch::tsp::api::create_tsp_router;
use parcel_dispatch::tsp::TspState;
use parcel_dispatch::utils::shutdown_signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("🧭 TSP Adapter - 최적화된 LKH TSP 서비스 시작...");

    let config = TspConfig::from_env();
    info!("LKH 바이너리: {}", config.lkh_executable);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = TspState::new(config);

    let app = create_tsp_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   POST /solve - Resolver TSP simétrico");
    info!("   GET  /health - Health check");

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
