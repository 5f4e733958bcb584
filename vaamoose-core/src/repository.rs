use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::booking::Booking;
use crate::model::{SeatClass, SeatId, SeatRecord};
use crate::payment::{IntentStatus, PaymentIntent};
use crate::review::Review;
use crate::session::ReservationSession;
use crate::{CoreError, CoreResult};

/// Seat state storage. Every method is atomic with respect to the seats it touches.
#[async_trait]
pub trait SeatStore: Send + Sync {
    async fn initialize_slot(&self, slot_id: Uuid, seats: &[(SeatId, SeatClass)]) -> CoreResult<()>;

    /// All seats of a slot, lapsed holds reported as available.
    async fn seats(&self, slot_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<SeatRecord>>;

    /// All-or-nothing hold. Seats already held by `session_id` are re-held.
    /// Fails with `SeatConflict` naming every seat that could not be held.
    async fn hold(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        held_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<SeatRecord>>;

    /// Releases the listed seats held by `session_id`; returns how many changed.
    async fn release(&self, slot_id: Uuid, seats: &[SeatId], session_id: Uuid) -> CoreResult<usize>;

    async fn release_session(&self, slot_id: Uuid, session_id: Uuid) -> CoreResult<usize>;

    /// held-by-session → occupied. Seats already occupied by the session are left as is.
    async fn commit(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// occupied-by-session → held until `held_until`; undoes a commit whose booking write failed.
    async fn revert_commit(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        held_until: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Physically resets lapsed holds. Readers never depend on this having run.
    async fn purge_expired(&self, now: DateTime<Utc>) -> CoreResult<usize>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Fails with `DuplicateReference` when the payment reference is already booked
    /// and `SeatConflict` when a seat already belongs to another booking.
    async fn create(&self, booking: &Booking) -> CoreResult<Uuid>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn find_by_reference(&self, reference: &str) -> CoreResult<Option<Booking>>;

    /// Newest first.
    fn list_for_user(&self, user_id: &str) -> BoxStream<'_, CoreResult<Booking>>;

    /// Newest first.
    fn list_for_company(&self, company_id: &str) -> BoxStream<'_, CoreResult<Booking>>;

    /// Conditional paid → refunded. `None` when the booking does not exist.
    async fn mark_refunded(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<Option<Booking>>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Fails with `AlreadyReviewed` when the booking already has a review.
    async fn create(&self, review: &Review) -> CoreResult<()>;

    async fn find_for_booking(&self, booking_id: Uuid) -> CoreResult<Option<Review>>;

    /// Newest first.
    fn list_for_company(&self, company_id: &str) -> BoxStream<'_, CoreResult<Review>>;
}

#[async_trait]
pub trait IntentStore: Send + Sync {
    async fn insert(&self, intent: &PaymentIntent) -> CoreResult<()>;

    async fn get(&self, reference: &str) -> CoreResult<Option<PaymentIntent>>;

    async fn find_open_for_session(&self, session_id: Uuid) -> CoreResult<Option<PaymentIntent>>;

    /// Writes `intent` only if the stored status still equals `expected`.
    async fn compare_and_set(&self, intent: &PaymentIntent, expected: IntentStatus) -> CoreResult<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `ttl` bounds how long the backing store may keep the record.
    async fn save(&self, session: &ReservationSession, ttl: Duration) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<ReservationSession>>;

    async fn delete(&self, id: Uuid) -> CoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// Seats occupied by a session that has no booking record.
    OrphanedSeats,
    /// Money was collected but no booking exists for it.
    RefundRequired,
}

impl ReconciliationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationKind::OrphanedSeats => "orphaned_seats",
            ReconciliationKind::RefundRequired => "refund_required",
        }
    }
}

impl FromStr for ReconciliationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orphaned_seats" => Ok(ReconciliationKind::OrphanedSeats),
            "refund_required" => Ok(ReconciliationKind::RefundRequired),
            other => Err(CoreError::InternalError(format!("unknown reconciliation kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub id: Uuid,
    pub payment_reference: String,
    pub kind: ReconciliationKind,
    pub detail: String,
    pub attempts: i32,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReconciliationEntry {
    pub fn new(payment_reference: &str, kind: ReconciliationKind, detail: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_reference: payment_reference.to_string(),
            kind,
            detail: detail.to_string(),
            attempts: 0,
            resolved: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Returns false when an unresolved entry of the same kind already exists for the reference.
    async fn record(&self, entry: &ReconciliationEntry) -> CoreResult<bool>;

    async fn list_open(&self) -> CoreResult<Vec<ReconciliationEntry>>;

    async fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<bool>;

    async fn bump_attempts(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()>;
}
