use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use vaamoose_core::booking::{BookedSeat, Booking};
use vaamoose_core::repository::BookingStore;
use vaamoose_core::{CoreError, CoreResult};

use crate::database::{db_err, unique_violation};

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    payment_reference: String,
    user_id: String,
    customer_email: String,
    company_id: String,
    vehicle_id: String,
    route_id: String,
    slot_id: Uuid,
    departure_date: NaiveDate,
    departure_time: NaiveTime,
    seats: Json<Vec<BookedSeat>>,
    total_price: i64,
    luggage_photo_refs: Json<Vec<String>>,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            payment_reference: row.payment_reference,
            user_id: row.user_id,
            customer_email: row.customer_email,
            company_id: row.company_id,
            vehicle_id: row.vehicle_id,
            route_id: row.route_id,
            slot_id: row.slot_id,
            departure_date: row.departure_date,
            departure_time: row.departure_time,
            seats: row.seats.0,
            total_price: row.total_price,
            luggage_photo_refs: row.luggage_photo_refs.0,
            payment_status: row.payment_status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, payment_reference, user_id, customer_email, company_id, \
     vehicle_id, route_id, slot_id, departure_date, departure_time, seats, total_price, \
     luggage_photo_refs, payment_status, created_at, updated_at";

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create(&self, booking: &Booking) -> CoreResult<Uuid> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, payment_reference, user_id, customer_email, company_id,
                vehicle_id, route_id, slot_id, departure_date, departure_time, seats, total_price,
                luggage_photo_refs, payment_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.payment_reference)
        .bind(&booking.user_id)
        .bind(&booking.customer_email)
        .bind(&booking.company_id)
        .bind(&booking.vehicle_id)
        .bind(&booking.route_id)
        .bind(booking.slot_id)
        .bind(booking.departure_date)
        .bind(booking.departure_time)
        .bind(Json(&booking.seats))
        .bind(booking.total_price)
        .bind(Json(&booking.luggage_photo_refs))
        .bind(booking.payment_status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => CoreError::DuplicateReference(booking.payment_reference.clone()),
            None => db_err(e),
        })?;

        // one row per seat; the primary key keeps a seat on at most one booking
        let rows: Vec<i32> = booking.seats.iter().map(|s| s.row as i32).collect();
        let columns: Vec<i32> = booking.seats.iter().map(|s| s.column as i32).collect();
        sqlx::query(
            "INSERT INTO booking_seats (slot_id, seat_row, seat_column, booking_id) \
             SELECT $1, r, c, $4 FROM UNNEST($2::int4[], $3::int4[]) AS t(r, c)",
        )
        .bind(booking.slot_id)
        .bind(&rows)
        .bind(&columns)
        .bind(booking.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => CoreError::SeatConflict {
                slot_id: booking.slot_id,
                seats: booking.seats.iter().map(BookedSeat::seat_id).collect(),
            },
            None => db_err(e),
        })?;

        tx.commit().await.map_err(db_err)?;
        tracing::info!(booking_id = %booking.id, reference = %booking.payment_reference, "Booking persisted");
        Ok(booking.id)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> CoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    fn list_for_user(&self, user_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        self.stream_rows(
            "SELECT id, payment_reference, user_id, customer_email, company_id, vehicle_id, \
             route_id, slot_id, departure_date, departure_time, seats, total_price, \
             luggage_photo_refs, payment_status, created_at, updated_at \
             FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            user_id.to_string(),
        )
    }

    fn list_for_company(&self, company_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        self.stream_rows(
            "SELECT id, payment_reference, user_id, customer_email, company_id, vehicle_id, \
             route_id, slot_id, departure_date, departure_time, seats, total_price, \
             luggage_photo_refs, payment_status, created_at, updated_at \
             FROM bookings WHERE company_id = $1 ORDER BY created_at DESC",
            company_id.to_string(),
        )
    }

    async fn mark_refunded(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<Option<Booking>> {
        let updated: Option<BookingRow> = sqlx::query_as(&format!(
            "UPDATE bookings SET payment_status = 'refunded', updated_at = $2 \
             WHERE id = $1 AND payment_status = 'paid' \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        updated.map(Booking::try_from).transpose()
    }
}

impl PgBookingStore {
    fn stream_rows(&self, sql: &'static str, key: String) -> BoxStream<'_, CoreResult<Booking>> {
        sqlx::query_as::<_, BookingRow>(sql)
            .bind(key)
            .fetch(&self.pool)
            .map(|row| row.map_err(db_err).and_then(Booking::try_from))
            .boxed()
    }
}
