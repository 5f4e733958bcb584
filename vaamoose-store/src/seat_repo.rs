use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vaamoose_core::model::{SeatClass, SeatId, SeatRecord, SeatState};
use vaamoose_core::repository::SeatStore;
use vaamoose_core::{CoreError, CoreResult};

use crate::database::{db_err, unique_violation};

/// Seat inventory in Postgres. Writes lock the requested rows with
/// `SELECT ... FOR UPDATE` so concurrent holds on one seat serialise.
pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    slot_id: Uuid,
    seat_row: i32,
    seat_column: i32,
    seat_class: String,
    state: String,
    holder_session_id: Option<Uuid>,
    held_until: Option<DateTime<Utc>>,
}

impl TryFrom<SeatRow> for SeatRecord {
    type Error = CoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(SeatRecord {
            slot_id: row.slot_id,
            seat: SeatId::new(row.seat_row as u16, row.seat_column as u16),
            seat_class: row.seat_class.parse()?,
            state: row.state.parse()?,
            holder_session_id: row.holder_session_id,
            held_until: row.held_until,
        })
    }
}

const SEAT_COLUMNS: &str =
    "slot_id, seat_row, seat_column, seat_class, state, holder_session_id, held_until";

fn coords(seats: &[SeatId]) -> (Vec<i32>, Vec<i32>) {
    seats.iter().map(|s| (s.row as i32, s.column as i32)).unzip()
}

impl PgSeatStore {
    /// Locks and returns the requested seats, failing on ids the slot does not have.
    async fn lock_seats(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        slot_id: Uuid,
        seats: &[SeatId],
    ) -> CoreResult<Vec<SeatRecord>> {
        let (rows, columns) = coords(seats);
        let locked: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats \
             WHERE slot_id = $1 \
               AND (seat_row, seat_column) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[])) \
             ORDER BY seat_row, seat_column \
             FOR UPDATE"
        ))
        .bind(slot_id)
        .bind(&rows)
        .bind(&columns)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;

        let records = locked
            .into_iter()
            .map(SeatRecord::try_from)
            .collect::<CoreResult<Vec<_>>>()?;

        if records.len() != seats.len() {
            if records.is_empty() && !self.slot_exists(tx, slot_id).await? {
                return Err(CoreError::NotFound(format!("slot {}", slot_id)));
            }
            let unknown: Vec<String> = seats
                .iter()
                .filter(|s| !records.iter().any(|r| r.seat == **s))
                .map(SeatId::to_string)
                .collect();
            return Err(CoreError::ValidationError(format!("unknown seats: {}", unknown.join(", "))));
        }
        Ok(records)
    }

    async fn slot_exists(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        slot_id: Uuid,
    ) -> CoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM seats WHERE slot_id = $1)")
            .bind(slot_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(exists)
    }
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn initialize_slot(&self, slot_id: Uuid, seats: &[(SeatId, SeatClass)]) -> CoreResult<()> {
        let rows: Vec<i32> = seats.iter().map(|(s, _)| s.row as i32).collect();
        let columns: Vec<i32> = seats.iter().map(|(s, _)| s.column as i32).collect();
        let classes: Vec<String> = seats.iter().map(|(_, c)| c.as_str().to_string()).collect();

        sqlx::query(
            "INSERT INTO seats (slot_id, seat_row, seat_column, seat_class) \
             SELECT $1, r, c, k FROM UNNEST($2::int4[], $3::int4[], $4::text[]) AS t(r, c, k)",
        )
        .bind(slot_id)
        .bind(&rows)
        .bind(&columns)
        .bind(&classes)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => CoreError::ValidationError(format!("slot {} already has seats", slot_id)),
            None => db_err(e),
        })?;
        Ok(())
    }

    async fn seats(&self, slot_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<SeatRecord>> {
        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE slot_id = $1 ORDER BY seat_row, seat_column"
        ))
        .bind(slot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if rows.is_empty() {
            return Err(CoreError::NotFound(format!("slot {}", slot_id)));
        }
        rows.into_iter()
            .map(|row| SeatRecord::try_from(row).map(|r| r.normalized(now)))
            .collect()
    }

    async fn hold(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        held_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<SeatRecord>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let records = self.lock_seats(&mut tx, slot_id, seats).await?;

        let conflicts: Vec<SeatId> = records
            .iter()
            .filter(|r| r.effective_state(now) != SeatState::Available && !r.is_held_by(session_id, now))
            .map(|r| r.seat)
            .collect();
        if !conflicts.is_empty() {
            return Err(CoreError::SeatConflict { slot_id, seats: conflicts });
        }

        let (rows, columns) = coords(seats);
        let held: Vec<SeatRow> = sqlx::query_as(&format!(
            "UPDATE seats SET state = 'held', holder_session_id = $4, held_until = $5 \
             WHERE slot_id = $1 \
               AND (seat_row, seat_column) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[])) \
             RETURNING {SEAT_COLUMNS}"
        ))
        .bind(slot_id)
        .bind(&rows)
        .bind(&columns)
        .bind(session_id)
        .bind(held_until)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        held.into_iter().map(SeatRecord::try_from).collect()
    }

    async fn release(&self, slot_id: Uuid, seats: &[SeatId], session_id: Uuid) -> CoreResult<usize> {
        let (rows, columns) = coords(seats);
        let result = sqlx::query(
            "UPDATE seats SET state = 'available', holder_session_id = NULL, held_until = NULL \
             WHERE slot_id = $1 AND state = 'held' AND holder_session_id = $4 \
               AND (seat_row, seat_column) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[]))",
        )
        .bind(slot_id)
        .bind(&rows)
        .bind(&columns)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() as usize)
    }

    async fn release_session(&self, slot_id: Uuid, session_id: Uuid) -> CoreResult<usize> {
        let result = sqlx::query(
            "UPDATE seats SET state = 'available', holder_session_id = NULL, held_until = NULL \
             WHERE slot_id = $1 AND state = 'held' AND holder_session_id = $2",
        )
        .bind(slot_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() as usize)
    }

    async fn commit(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let records = self.lock_seats(&mut tx, slot_id, seats).await?;

        let conflicts: Vec<SeatId> = records
            .iter()
            .filter(|r| !r.is_occupied_by(session_id) && !r.is_held_by(session_id, now))
            .map(|r| r.seat)
            .collect();
        if !conflicts.is_empty() {
            return Err(CoreError::SeatConflict { slot_id, seats: conflicts });
        }

        let (rows, columns) = coords(seats);
        sqlx::query(
            "UPDATE seats SET state = 'occupied', held_until = NULL \
             WHERE slot_id = $1 AND holder_session_id = $4 \
               AND (seat_row, seat_column) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[]))",
        )
        .bind(slot_id)
        .bind(&rows)
        .bind(&columns)
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn revert_commit(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        held_until: DateTime<Utc>,
    ) -> CoreResult<()> {
        let (rows, columns) = coords(seats);
        sqlx::query(
            "UPDATE seats SET state = 'held', held_until = $5 \
             WHERE slot_id = $1 AND state = 'occupied' AND holder_session_id = $4 \
               AND (seat_row, seat_column) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[]))",
        )
        .bind(slot_id)
        .bind(&rows)
        .bind(&columns)
        .bind(session_id)
        .bind(held_until)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let result = sqlx::query(
            "UPDATE seats SET state = 'available', holder_session_id = NULL, held_until = NULL \
             WHERE state = 'held' AND (held_until IS NULL OR held_until <= $1)",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_parses_enums() {
        let row = SeatRow {
            slot_id: Uuid::new_v4(),
            seat_row: 2,
            seat_column: 3,
            seat_class: "window".to_string(),
            state: "held".to_string(),
            holder_session_id: Some(Uuid::new_v4()),
            held_until: Some(Utc::now()),
        };
        let record = SeatRecord::try_from(row).unwrap();
        assert_eq!(record.seat, SeatId::new(2, 3));
        assert_eq!(record.seat_class, SeatClass::Window);
        assert_eq!(record.state, SeatState::Held);

        let (rows, columns) = coords(&[SeatId::new(1, 2), SeatId::new(3, 4)]);
        assert_eq!(rows, vec![1, 3]);
        assert_eq!(columns, vec![2, 4]);
    }
}
