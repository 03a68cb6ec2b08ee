use std::net::SocketAddr;

use anyhow::Result;
use dotenvy::dotenv;
use sqlx::mysql::MySqlPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use parcel_dispatch::api::create_pickup_router;
use parcel_dispatch::config::DispatchConfig;
use parcel_dispatch::middleware::cors::cors_middleware;
use parcel_dispatch::state::AppState;
use parcel_dispatch::utils::shutdown_signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("🚚 Pickup Dispatcher - despacho de recogidas de la mañana");
    info!("========================================================");

    let config = DispatchConfig::from_env(5000);

    // Inicializar base de datos
    let pool = match MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&config.database_url())
        .await
    {
        Ok(pool) => {
            info!("✅ Base de datos conectada exitosamente");
            pool
        }
        Err(e) => {
            error!("❌ Error conectando a la base de datos: {}", e);
            return Err(anyhow::anyhow!("Error de base de datos: {}", e));
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::new(pool, config);

    let app = create_pickup_router(state.clone())
        .layer(cors_middleware())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   POST /pickup/webhook - Intake de solicitudes de recogida");
    info!("   GET  /pickup/next - Próxima parada óptima (auth)");
    info!("   POST /pickup/complete - Completar recogida (auth)");
    info!("   POST /pickup/hub-arrived - Confirmar llegada al hub (auth)");
    info!("   GET  /pickup/all-completed - Estado agregado + handoff");
    info!("   GET  /pickup/status - Estado del conductor (auth)");

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
