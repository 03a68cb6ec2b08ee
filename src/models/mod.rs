//! Modelos de datos
//!
//! Este módulo contiene los modelos de datos para la aplicación.

pub mod parcel;
pub mod zone;

pub use parcel::*;
pub use zone::*;
