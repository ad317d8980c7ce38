use async_trait::async_trait;
use fareflow_core::repository::{BookingRecord, BookingRepository};
use sqlx::PgPool;
use tracing::info;

/// Booking history writes. Idempotent per order reference: the rich save
/// upserts, the minimal save never clobbers an existing rich row.
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn save_booking(
        &self,
        record: &BookingRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO bookings (order_reference, payload, responded_on, created_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_reference) DO UPDATE
                SET payload = EXCLUDED.payload,
                    responded_on = EXCLUDED.responded_on,
                    created_by = EXCLUDED.created_by
            "#,
        )
        .bind(&record.order_reference)
        .bind(&record.payload)
        .bind(record.responded_on)
        .bind(&record.created_by)
        .execute(&self.pool)
        .await?;

        info!(order_reference = %record.order_reference, "booking record saved");
        Ok(())
    }

    async fn save_booking_reference(
        &self,
        order_reference: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO bookings (order_reference)
            VALUES ($1)
            ON CONFLICT (order_reference) DO NOTHING
            "#,
        )
        .bind(order_reference)
        .execute(&self.pool)
        .await?;

        info!(order_reference = %order_reference, "minimal booking record saved");
        Ok(())
    }
}
