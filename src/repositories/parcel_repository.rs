//! Repositorio de paquetes
//!
//! Todas las consultas excluyen filas con soft-delete. Las mutaciones son
//! sentencias únicas en autocommit; la guarda de estado en el WHERE es la
//! primitiva de concurrencia (0 filas afectadas = conflicto).

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::MySqlPool;

use crate::models::parcel::{Parcel, ParcelStatus};
use crate::utils::errors::AppResult;

const PARCEL_COLUMNS: &str = "id, ownerId, productName, size, recipientName, recipientPhone, \
     recipientAddr, detailAddress, status, pickupDriverId, deliveryDriverId, \
     pickupScheduledDate, pickupCompletedAt, deliveryCompletedAt, \
     isNextPickupTarget, isNextDeliveryTarget, isDeleted, createdAt";

pub struct ParcelRepository {
    pool: MySqlPool,
}

impl ParcelRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<Parcel>> {
        let query = format!(
            "SELECT {} FROM parcels WHERE id = ? AND isDeleted = 0",
            PARCEL_COLUMNS
        );
        let parcel = sqlx::query_as::<_, Parcel>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(parcel)
    }

    /// Asignación del webhook: solo si el paquete aún no tiene conductor
    pub async fn assign_pickup_driver(
        &self,
        id: i64,
        driver_id: i64,
        scheduled_date: NaiveDate,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE parcels SET pickupDriverId = ?, pickupScheduledDate = ? \
             WHERE id = ? AND pickupDriverId IS NULL AND status = ? AND isDeleted = 0",
        )
        .bind(driver_id)
        .bind(scheduled_date)
        .bind(id)
        .bind(ParcelStatus::PickupPending)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Recogidas pendientes accionables hoy para un conductor
    pub async fn pending_pickups_for_driver(
        &self,
        driver_id: i64,
        today: NaiveDate,
    ) -> AppResult<Vec<Parcel>> {
        let query = format!(
            "SELECT {} FROM parcels \
             WHERE status = ? AND pickupDriverId = ? AND pickupScheduledDate <= ? \
             AND isDeleted = 0 ORDER BY id",
            PARCEL_COLUMNS
        );
        let parcels = sqlx::query_as::<_, Parcel>(&query)
            .bind(ParcelStatus::PickupPending)
            .bind(driver_id)
            .bind(today)
            .fetch_all(&self.pool)
            .await?;
        Ok(parcels)
    }

    pub async fn count_pending_pickups_for_driver(
        &self,
        driver_id: i64,
        today: NaiveDate,
    ) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM parcels \
             WHERE status = ? AND pickupDriverId = ? AND pickupScheduledDate <= ? \
             AND isDeleted = 0",
        )
        .bind(ParcelStatus::PickupPending)
        .bind(driver_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Recogidas pendientes de hoy en todo el sistema (para el handoff)
    pub async fn count_pending_pickups(&self, today: NaiveDate) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM parcels \
             WHERE status = ? AND pickupScheduledDate <= ? AND isDeleted = 0",
        )
        .bind(ParcelStatus::PickupPending)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    pub async fn count_pickups_completed_since(&self, day_start: NaiveDateTime) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM parcels \
             WHERE pickupCompletedAt >= ? AND isDeleted = 0",
        )
        .bind(day_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    pub async fn count_pickups_completed_since_for_driver(
        &self,
        driver_id: i64,
        day_start: NaiveDateTime,
    ) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM parcels \
             WHERE pickupDriverId = ? AND pickupCompletedAt >= ? AND isDeleted = 0",
        )
        .bind(driver_id)
        .bind(day_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Última recogida completada hoy por el conductor: su dirección es la
    /// posición actual del conductor
    pub async fn last_completed_pickup_since(
        &self,
        driver_id: i64,
        day_start: NaiveDateTime,
    ) -> AppResult<Option<Parcel>> {
        let query = format!(
            "SELECT {} FROM parcels \
             WHERE pickupDriverId = ? AND pickupCompletedAt >= ? AND isDeleted = 0 \
             ORDER BY pickupCompletedAt DESC LIMIT 1",
            PARCEL_COLUMNS
        );
        let parcel = sqlx::query_as::<_, Parcel>(&query)
            .bind(driver_id)
            .bind(day_start)
            .fetch_optional(&self.pool)
            .await?;
        Ok(parcel)
    }

    /// Transición PICKUP_PENDING -> PICKUP_COMPLETED con guarda de estado y
    /// de propiedad
    pub async fn complete_pickup(
        &self,
        id: i64,
        driver_id: i64,
        completed_at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE parcels SET status = ?, pickupCompletedAt = ?, isNextPickupTarget = 0 \
             WHERE id = ? AND status = ? AND pickupDriverId = ? AND isDeleted = 0",
        )
        .bind(ParcelStatus::PickupCompleted)
        .bind(completed_at)
        .bind(id)
        .bind(ParcelStatus::PickupPending)
        .bind(driver_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Marca de UI: próximo objetivo de recogida del conductor
    pub async fn mark_next_pickup_target(&self, driver_id: i64, parcel_id: i64) -> AppResult<()> {
        sqlx::query(
            "UPDATE parcels SET isNextPickupTarget = 0 \
             WHERE pickupDriverId = ? AND isNextPickupTarget = 1",
        )
        .bind(driver_id)
        .execute(&self.pool)
        .await?;
        sqlx::query("UPDATE parcels SET isNextPickupTarget = 1 WHERE id = ?")
            .bind(parcel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- lado de entrega ---

    /// Recogidas de hoy convertibles a entregas (aún sin conductor de entrega)
    pub async fn list_importable_pickups(
        &self,
        day_start: NaiveDateTime,
        day_end: NaiveDateTime,
    ) -> AppResult<Vec<Parcel>> {
        let query = format!(
            "SELECT {} FROM parcels \
             WHERE status = ? AND pickupCompletedAt >= ? AND pickupCompletedAt < ? \
             AND deliveryDriverId IS NULL AND isDeleted = 0 ORDER BY id",
            PARCEL_COLUMNS
        );
        let parcels = sqlx::query_as::<_, Parcel>(&query)
            .bind(ParcelStatus::PickupCompleted)
            .bind(day_start)
            .bind(day_end)
            .fetch_all(&self.pool)
            .await?;
        Ok(parcels)
    }

    /// Transición PICKUP_COMPLETED -> DELIVERY_PENDING
    pub async fn mark_delivery_pending(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE parcels SET status = ? WHERE id = ? AND status = ? AND isDeleted = 0",
        )
        .bind(ParcelStatus::DeliveryPending)
        .bind(id)
        .bind(ParcelStatus::PickupCompleted)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Entregas de hoy aún sin conductor asignado
    pub async fn list_unassigned_deliveries(
        &self,
        day_start: NaiveDateTime,
        day_end: NaiveDateTime,
    ) -> AppResult<Vec<Parcel>> {
        let query = format!(
            "SELECT {} FROM parcels \
             WHERE status = ? AND pickupCompletedAt >= ? AND pickupCompletedAt < ? \
             AND deliveryDriverId IS NULL AND isDeleted = 0 ORDER BY id",
            PARCEL_COLUMNS
        );
        let parcels = sqlx::query_as::<_, Parcel>(&query)
            .bind(ParcelStatus::DeliveryPending)
            .bind(day_start)
            .bind(day_end)
            .fetch_all(&self.pool)
            .await?;
        Ok(parcels)
    }

    pub async fn assign_delivery_driver(&self, id: i64, driver_id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE parcels SET deliveryDriverId = ? \
             WHERE id = ? AND status = ? AND deliveryDriverId IS NULL AND isDeleted = 0",
        )
        .bind(driver_id)
        .bind(id)
        .bind(ParcelStatus::DeliveryPending)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn pending_deliveries_for_driver(&self, driver_id: i64) -> AppResult<Vec<Parcel>> {
        let query = format!(
            "SELECT {} FROM parcels \
             WHERE status = ? AND deliveryDriverId = ? AND isDeleted = 0 ORDER BY id",
            PARCEL_COLUMNS
        );
        let parcels = sqlx::query_as::<_, Parcel>(&query)
            .bind(ParcelStatus::DeliveryPending)
            .bind(driver_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(parcels)
    }

    pub async fn count_pending_deliveries_for_driver(&self, driver_id: i64) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM parcels \
             WHERE status = ? AND deliveryDriverId = ? AND isDeleted = 0",
        )
        .bind(ParcelStatus::DeliveryPending)
        .bind(driver_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    pub async fn last_completed_delivery_since(
        &self,
        driver_id: i64,
        day_start: NaiveDateTime,
    ) -> AppResult<Option<Parcel>> {
        let query = format!(
            "SELECT {} FROM parcels \
             WHERE deliveryDriverId = ? AND deliveryCompletedAt >= ? AND isDeleted = 0 \
             ORDER BY deliveryCompletedAt DESC LIMIT 1",
            PARCEL_COLUMNS
        );
        let parcel = sqlx::query_as::<_, Parcel>(&query)
            .bind(driver_id)
            .bind(day_start)
            .fetch_optional(&self.pool)
            .await?;
        Ok(parcel)
    }

    pub async fn count_deliveries_completed_since_for_driver(
        &self,
        driver_id: i64,
        day_start: NaiveDateTime,
    ) -> AppResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM parcels \
             WHERE deliveryDriverId = ? AND deliveryCompletedAt >= ? AND isDeleted = 0",
        )
        .bind(driver_id)
        .bind(day_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Transición DELIVERY_PENDING -> DELIVERY_COMPLETED con guarda de estado
    /// y de propiedad
    pub async fn complete_delivery(
        &self,
        id: i64,
        driver_id: i64,
        completed_at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE parcels SET status = ?, deliveryCompletedAt = ?, isNextDeliveryTarget = 0 \
             WHERE id = ? AND status = ? AND deliveryDriverId = ? AND isDeleted = 0",
        )
        .bind(ParcelStatus::DeliveryCompleted)
        .bind(completed_at)
        .bind(id)
        .bind(ParcelStatus::DeliveryPending)
        .bind(driver_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Marca de UI: próximo objetivo de entrega del conductor
    pub async fn mark_next_delivery_target(&self, driver_id: i64, parcel_id: i64) -> AppResult<()> {
        sqlx::query(
            "UPDATE parcels SET isNextDeliveryTarget = 0 \
             WHERE deliveryDriverId = ? AND isNextDeliveryTarget = 1",
        )
        .bind(driver_id)
        .execute(&self.pool)
        .await?;
        sqlx::query("UPDATE parcels SET isNextDeliveryTarget = 1 WHERE id = ?")
            .bind(parcel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
