//! Repositorios de acceso a datos
//!
//! Cada transición de estado es una única sentencia UPDATE con guarda en el
//! WHERE; la base de datos lineariza las transiciones por paquete.

pub mod parcel_repository;

pub use parcel_repository::*;
