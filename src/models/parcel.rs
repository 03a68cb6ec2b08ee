//! Modelo de Parcel
//!
//! Este módulo contiene el struct Parcel y su ciclo de vida. Mapea
//! exactamente al schema MySQL del almacén de paquetes (columnas camelCase,
//! booleanos como tinyint).

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Estado del ciclo de vida - mapea al ENUM status
///
/// El ciclo es estrictamente monótono:
/// PICKUP_PENDING -> PICKUP_COMPLETED -> DELIVERY_PENDING -> DELIVERY_COMPLETED
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelStatus {
    PickupPending,
    PickupCompleted,
    DeliveryPending,
    DeliveryCompleted,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::PickupPending => "PICKUP_PENDING",
            ParcelStatus::PickupCompleted => "PICKUP_COMPLETED",
            ParcelStatus::DeliveryPending => "DELIVERY_PENDING",
            ParcelStatus::DeliveryCompleted => "DELIVERY_COMPLETED",
        }
    }
}

/// Parcel principal - mapea exactamente a la tabla parcels
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Parcel {
    pub id: i64,
    #[sqlx(rename = "ownerId")]
    pub owner_id: Option<i64>,
    #[sqlx(rename = "productName")]
    pub product_name: Option<String>,
    pub size: Option<String>,
    #[sqlx(rename = "recipientName")]
    pub recipient_name: Option<String>,
    #[sqlx(rename = "recipientPhone")]
    pub recipient_phone: Option<String>,
    #[sqlx(rename = "recipientAddr")]
    pub recipient_addr: String,
    #[sqlx(rename = "detailAddress")]
    pub detail_address: Option<String>,
    pub status: ParcelStatus,
    #[sqlx(rename = "pickupDriverId")]
    pub pickup_driver_id: Option<i64>,
    #[sqlx(rename = "deliveryDriverId")]
    pub delivery_driver_id: Option<i64>,
    #[sqlx(rename = "pickupScheduledDate")]
    pub pickup_scheduled_date: Option<NaiveDate>,
    #[sqlx(rename = "pickupCompletedAt")]
    pub pickup_completed_at: Option<NaiveDateTime>,
    #[sqlx(rename = "deliveryCompletedAt")]
    pub delivery_completed_at: Option<NaiveDateTime>,
    #[sqlx(rename = "isNextPickupTarget")]
    pub is_next_pickup_target: bool,
    #[sqlx(rename = "isNextDeliveryTarget")]
    pub is_next_delivery_target: bool,
    #[sqlx(rename = "isDeleted")]
    pub is_deleted: bool,
    #[sqlx(rename = "createdAt")]
    pub created_at: Option<NaiveDateTime>,
}
