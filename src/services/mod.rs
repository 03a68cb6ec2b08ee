//! Services module
//!
//! Este módulo contiene la lógica de negocio y los clientes de los
//! colaboradores externos (geocoder, motor de rutas, solver TSP). Los seams
//! son traits para que el núcleo de despacho sea testeable con stubs.

pub mod dispatch_service;
pub mod geocoding_service;
pub mod routing_service;
pub mod tsp_service;

pub use dispatch_service::*;
pub use geocoding_service::*;
pub use routing_service::*;
pub use tsp_service::*;
