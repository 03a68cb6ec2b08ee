//! Utilidades del sistema
//!
//! Este módulo contiene el manejo de errores, las utilidades JWT y la
//! decodificación de polilíneas del motor de rutas.

pub mod errors;
pub mod jwt;
pub mod shape;

pub use errors::*;

use tokio::signal;
use tracing::info;

/// Señal de apagado graceful compartida por los cuatro binarios
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
