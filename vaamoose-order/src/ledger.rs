use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vaamoose_core::booking::{Booking, PaymentStatus};
use vaamoose_core::clock::Clock;
use vaamoose_core::repository::BookingStore;
use vaamoose_core::{CoreError, CoreResult};

/// Partner dashboard figures. Earnings count paid bookings only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDashboard {
    pub booking_count: usize,
    pub paid_count: usize,
    pub refunded_count: usize,
    pub earnings: i64,
}

/// Durable record of paid bookings.
pub struct BookingLedger {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl BookingLedger {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Writes the booking. A second write for the same payment reference returns the
    /// id of the booking already on file.
    pub async fn create(&self, booking: &Booking) -> CoreResult<Uuid> {
        match self.store.create(booking).await {
            Ok(id) => {
                tracing::info!(booking_id = %id, reference = %booking.payment_reference, "Booking recorded");
                Ok(id)
            }
            Err(CoreError::DuplicateReference(reference)) => {
                let existing = self.store.find_by_reference(&reference).await?.ok_or_else(|| {
                    CoreError::internal(format!("duplicate reference {} has no booking", reference))
                })?;
                tracing::info!(booking_id = %existing.id, %reference, "Booking already recorded for reference");
                Ok(existing.id)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: Uuid) -> CoreResult<Booking> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", id)))
    }

    /// The booking `user_id` may review: theirs, and still paid.
    pub async fn reviewable(&self, booking_id: Uuid, user_id: &str) -> CoreResult<Booking> {
        let booking = self.get(booking_id).await?;
        if booking.user_id != user_id {
            return Err(CoreError::Forbidden(format!("booking {} belongs to another user", booking_id)));
        }
        if booking.payment_status != PaymentStatus::Paid {
            return Err(CoreError::ValidationError(format!(
                "booking {} is {} and cannot be reviewed",
                booking_id,
                booking.payment_status.as_str()
            )));
        }
        Ok(booking)
    }

    pub async fn find_by_reference(&self, reference: &str) -> CoreResult<Option<Booking>> {
        self.store.find_by_reference(reference).await
    }

    pub fn list_for_user(&self, user_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        self.store.list_for_user(user_id)
    }

    pub fn list_for_company(&self, company_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        self.store.list_for_company(company_id)
    }

    /// Paid → refunded. Seats stay occupied.
    pub async fn mark_refunded(&self, id: Uuid) -> CoreResult<Booking> {
        let booking = self.get(id).await?;
        if booking.payment_status != PaymentStatus::Paid {
            return Err(CoreError::InvalidTransition {
                from: booking.payment_status.as_str().to_string(),
                to: PaymentStatus::Refunded.as_str().to_string(),
            });
        }

        let refunded = self
            .store
            .mark_refunded(id, self.clock.now())
            .await?
            .ok_or_else(|| CoreError::InvalidTransition {
                from: "unknown".to_string(),
                to: PaymentStatus::Refunded.as_str().to_string(),
            })?;
        tracing::info!(booking_id = %id, reference = %refunded.payment_reference, "Booking refunded");
        Ok(refunded)
    }

    pub async fn company_dashboard(&self, company_id: &str) -> CoreResult<CompanyDashboard> {
        self.list_for_company(company_id)
            .try_fold(CompanyDashboard::default(), |mut dash, booking| async move {
                dash.booking_count += 1;
                match booking.payment_status {
                    PaymentStatus::Paid => {
                        dash.paid_count += 1;
                        dash.earnings += booking.total_price;
                    }
                    PaymentStatus::Refunded => dash.refunded_count += 1,
                    PaymentStatus::Pending => {}
                }
                Ok(dash)
            })
            .await
    }
}

/// Booking store held in memory. Enforces the same uniqueness rules as the
/// Postgres tables: one booking per payment reference and per seat.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: Mutex<Vec<Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(&self, pred: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let bookings = self.bookings.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Booking> = bookings.iter().filter(|b| pred(b)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create(&self, booking: &Booking) -> CoreResult<Uuid> {
        let mut bookings = self.bookings.lock().unwrap_or_else(|e| e.into_inner());
        if bookings.iter().any(|b| b.payment_reference == booking.payment_reference) {
            return Err(CoreError::DuplicateReference(booking.payment_reference.clone()));
        }

        let taken: Vec<_> = booking
            .seats
            .iter()
            .filter(|seat| {
                bookings.iter().any(|b| {
                    b.slot_id == booking.slot_id
                        && b.seats.iter().any(|s| s.row == seat.row && s.column == seat.column)
                })
            })
            .map(|seat| seat.seat_id())
            .collect();
        if !taken.is_empty() {
            return Err(CoreError::SeatConflict { slot_id: booking.slot_id, seats: taken });
        }

        bookings.push(booking.clone());
        Ok(booking.id)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let bookings = self.bookings.lock().unwrap_or_else(|e| e.into_inner());
        Ok(bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> CoreResult<Option<Booking>> {
        let bookings = self.bookings.lock().unwrap_or_else(|e| e.into_inner());
        Ok(bookings.iter().find(|b| b.payment_reference == reference).cloned())
    }

    fn list_for_user(&self, user_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        let found = self.matching(|b| b.user_id == user_id);
        stream::iter(found.into_iter().map(Ok)).boxed()
    }

    fn list_for_company(&self, company_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        let found = self.matching(|b| b.company_id == company_id);
        stream::iter(found.into_iter().map(Ok)).boxed()
    }

    async fn mark_refunded(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<Option<Booking>> {
        let mut bookings = self.bookings.lock().unwrap_or_else(|e| e.into_inner());
        let Some(booking) = bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        if booking.payment_status != PaymentStatus::Paid {
            return Ok(None);
        }
        booking.mark_refunded(now)?;
        Ok(Some(booking.clone()))
    }
}

/// Failing store used to exercise compensation paths.
#[cfg(test)]
pub(crate) struct BrokenBookingStore;

#[cfg(test)]
#[async_trait]
impl BookingStore for BrokenBookingStore {
    async fn create(&self, _booking: &Booking) -> CoreResult<Uuid> {
        Err(CoreError::internal("ledger unavailable"))
    }

    async fn get(&self, _id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(None)
    }

    async fn find_by_reference(&self, _reference: &str) -> CoreResult<Option<Booking>> {
        Ok(None)
    }

    fn list_for_user(&self, _user_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        stream::empty().boxed()
    }

    fn list_for_company(&self, _company_id: &str) -> BoxStream<'_, CoreResult<Booking>> {
        stream::empty().boxed()
    }

    async fn mark_refunded(&self, _id: Uuid, _now: DateTime<Utc>) -> CoreResult<Option<Booking>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use vaamoose_core::booking::{BookedSeat, BookingDraft};
    use vaamoose_core::clock::ManualClock;
    use vaamoose_core::model::SeatClass;

    fn draft(slot_id: Uuid, row: u16, column: u16, total: i64) -> BookingDraft {
        BookingDraft {
            slot_id,
            company_id: "cmp-1".to_string(),
            vehicle_id: "veh-1".to_string(),
            route_id: "rte-1".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2026, 12, 18).unwrap(),
            departure_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            seats: vec![BookedSeat { row, column, seat_class: SeatClass::Standard, price: 0 }],
            luggage_photo_refs: vec![],
            total_price: total,
        }
    }

    fn ledger() -> (BookingLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (BookingLedger::new(Arc::new(InMemoryBookingStore::new()), clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_duplicate_reference_returns_existing_id() {
        let (ledger, clock) = ledger();
        let slot = Uuid::new_v4();
        let first = Booking::paid("VMS-1", "user-1", "a@uni.edu.ng", &draft(slot, 1, 1, 3500), clock.now());
        let replay = Booking::paid("VMS-1", "user-1", "a@uni.edu.ng", &draft(slot, 1, 1, 3500), clock.now());

        let id = ledger.create(&first).await.unwrap();
        assert_eq!(ledger.create(&replay).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_same_seat_cannot_be_booked_twice() {
        let (ledger, clock) = ledger();
        let slot = Uuid::new_v4();
        ledger
            .create(&Booking::paid("VMS-1", "user-1", "a@uni.edu.ng", &draft(slot, 2, 2, 3500), clock.now()))
            .await
            .unwrap();

        let err = ledger
            .create(&Booking::paid("VMS-2", "user-2", "b@uni.edu.ng", &draft(slot, 2, 2, 3500), clock.now()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SeatConflict { .. }));
    }

    #[tokio::test]
    async fn test_lists_are_newest_first_and_dashboard_sums_paid() {
        let (ledger, clock) = ledger();
        let slot = Uuid::new_v4();
        let older = Booking::paid("VMS-1", "user-1", "a@uni.edu.ng", &draft(slot, 1, 1, 3500), clock.now());
        clock.advance(Duration::minutes(5));
        let newer = Booking::paid("VMS-2", "user-1", "a@uni.edu.ng", &draft(slot, 1, 2, 4200), clock.now());
        ledger.create(&older).await.unwrap();
        ledger.create(&newer).await.unwrap();

        let mine: Vec<Booking> = ledger.list_for_user("user-1").try_collect().await.unwrap();
        assert_eq!(mine[0].payment_reference, "VMS-2");
        assert_eq!(mine[1].payment_reference, "VMS-1");

        ledger.mark_refunded(older.id).await.unwrap();
        let dash = ledger.company_dashboard("cmp-1").await.unwrap();
        assert_eq!(
            dash,
            CompanyDashboard { booking_count: 2, paid_count: 1, refunded_count: 1, earnings: 4200 }
        );
    }

    #[tokio::test]
    async fn test_refund_twice_is_invalid_transition() {
        let (ledger, clock) = ledger();
        let booking = Booking::paid("VMS-1", "user-1", "a@uni.edu.ng", &draft(Uuid::new_v4(), 1, 1, 3500), clock.now());
        ledger.create(&booking).await.unwrap();

        ledger.mark_refunded(booking.id).await.unwrap();
        let err = ledger.mark_refunded(booking.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));

        let err = ledger.mark_refunded(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
