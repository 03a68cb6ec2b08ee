//! Adaptador del solver TSP (LKH)
//!
//! Servicio delgado sobre el binario LKH: matriz de costes entera de
//! entrada, tour y coste de salida. Cada invocación trabaja en su propio
//! directorio temporal y está acotada por un watchdog de timeout.

pub mod api;
pub mod lkh;

use crate::config::TspConfig;

#[derive(Clone)]
pub struct TspState {
    pub config: TspConfig,
}

impl TspState {
    pub fn new(config: TspConfig) -> Self {
        Self { config }
    }
}
