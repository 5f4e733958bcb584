use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vaamoose_core::directory::Directory;
use vaamoose_core::model::{DepartureSlot, Route, Vehicle, VehicleType};
use vaamoose_core::{CoreError, CoreResult};

use crate::database::{db_err, unique_violation};

/// Routes, vehicles and departure slots in Postgres.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    id: Uuid,
    company_id: String,
    vehicle_id: String,
    route_id: String,
    departure_date: NaiveDate,
    departure_time: NaiveTime,
    total_seats: i32,
    created_at: DateTime<Utc>,
}

impl From<SlotRow> for DepartureSlot {
    fn from(row: SlotRow) -> Self {
        DepartureSlot {
            id: row.id,
            company_id: row.company_id,
            vehicle_id: row.vehicle_id,
            route_id: row.route_id,
            date: row.departure_date,
            time: row.departure_time,
            total_seats: row.total_seats.max(0) as u32,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: String,
    company_id: String,
    name: String,
    vehicle_type: String,
    capacity: i32,
    price_multiplier: f64,
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = CoreError;

    fn try_from(row: VehicleRow) -> Result<Self, Self::Error> {
        let vehicle_type = row
            .vehicle_type
            .parse::<VehicleType>()
            .map_err(|e| CoreError::internal(format!("vehicle {}: {}", row.id, e)))?;
        Ok(Vehicle {
            id: row.id,
            company_id: row.company_id,
            name: row.name,
            vehicle_type,
            capacity: row.capacity.max(0) as u32,
            price_multiplier: row.price_multiplier,
        })
    }
}

const SLOT_COLUMNS: &str =
    "id, company_id, vehicle_id, route_id, departure_date, departure_time, total_seats, created_at";

#[async_trait]
impl Directory for PgDirectory {
    async fn slot(&self, slot_id: Uuid) -> CoreResult<Option<DepartureSlot>> {
        let row: Option<SlotRow> =
            sqlx::query_as(&format!("SELECT {SLOT_COLUMNS} FROM departure_slots WHERE id = $1"))
                .bind(slot_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(DepartureSlot::from))
    }

    async fn route(&self, route_id: &str) -> CoreResult<Option<Route>> {
        let row: Option<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT id, company_id, origin, destination, base_price FROM routes WHERE id = $1",
        )
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(id, company_id, origin, destination, base_price)| Route {
            id,
            company_id,
            origin,
            destination,
            base_price,
        }))
    }

    async fn vehicle(&self, vehicle_id: &str) -> CoreResult<Option<Vehicle>> {
        let row: Option<VehicleRow> = sqlx::query_as(
            "SELECT id, company_id, name, vehicle_type, capacity, price_multiplier \
             FROM vehicles WHERE id = $1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Vehicle::try_from).transpose()
    }

    async fn list_slots(
        &self,
        company_id: Option<&str>,
        date: Option<NaiveDate>,
    ) -> CoreResult<Vec<DepartureSlot>> {
        let rows: Vec<SlotRow> = sqlx::query_as(&format!(
            "SELECT {SLOT_COLUMNS} FROM departure_slots \
             WHERE ($1::text IS NULL OR company_id = $1) \
               AND ($2::date IS NULL OR departure_date = $2) \
             ORDER BY departure_date, departure_time"
        ))
        .bind(company_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(DepartureSlot::from).collect())
    }

    async fn register_slot(&self, slot: &DepartureSlot) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO departure_slots (id, company_id, vehicle_id, route_id, departure_date,
                departure_time, total_seats, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(slot.id)
        .bind(&slot.company_id)
        .bind(&slot.vehicle_id)
        .bind(&slot.route_id)
        .bind(slot.date)
        .bind(slot.time)
        .bind(slot.total_seats as i32)
        .bind(slot.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => CoreError::ValidationError(format!("slot {} already registered", slot.id)),
            None => db_err(e),
        })?;
        tracing::info!(slot_id = %slot.id, company = %slot.company_id, "Departure slot registered");
        Ok(())
    }

    async fn upsert_route(&self, route: &Route) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO routes (id, company_id, origin, destination, base_price)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET company_id = EXCLUDED.company_id, origin = EXCLUDED.origin,
                destination = EXCLUDED.destination, base_price = EXCLUDED.base_price,
                updated_at = NOW()
            "#,
        )
        .bind(&route.id)
        .bind(&route.company_id)
        .bind(&route.origin)
        .bind(&route.destination)
        .bind(route.base_price)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_vehicle(&self, vehicle: &Vehicle) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicles (id, company_id, name, vehicle_type, capacity, price_multiplier)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET company_id = EXCLUDED.company_id, name = EXCLUDED.name,
                vehicle_type = EXCLUDED.vehicle_type, capacity = EXCLUDED.capacity,
                price_multiplier = EXCLUDED.price_multiplier, updated_at = NOW()
            "#,
        )
        .bind(&vehicle.id)
        .bind(&vehicle.company_id)
        .bind(&vehicle.name)
        .bind(vehicle.vehicle_type.as_str())
        .bind(vehicle.capacity as i32)
        .bind(vehicle.price_multiplier)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
