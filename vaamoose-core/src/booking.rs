use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::model::{SeatClass, SeatId};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(CoreError::InternalError(format!("unknown payment status '{}'", other))),
        }
    }
}

/// One priced seat on a quote or a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedSeat {
    pub row: u16,
    pub column: u16,
    pub seat_class: SeatClass,
    /// Seat surcharge in naira.
    pub price: i64,
}

impl BookedSeat {
    pub fn seat_id(&self) -> SeatId {
        SeatId::new(self.row, self.column)
    }
}

/// Everything needed to write a booking once payment clears.
///
/// Stored with the payment intent so verification still works after the
/// reservation session has expired or the client never came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub slot_id: Uuid,
    pub company_id: String,
    pub vehicle_id: String,
    pub route_id: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub seats: Vec<BookedSeat>,
    pub luggage_photo_refs: Vec<String>,
    pub total_price: i64,
}

impl BookingDraft {
    pub fn seat_ids(&self) -> Vec<SeatId> {
        self.seats.iter().map(BookedSeat::seat_id).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub payment_reference: String,
    pub user_id: String,
    pub customer_email: String,
    pub company_id: String,
    pub vehicle_id: String,
    pub route_id: String,
    pub slot_id: Uuid,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub seats: Vec<BookedSeat>,
    pub total_price: i64,
    pub luggage_photo_refs: Vec<String>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A paid booking for a verified payment.
    pub fn paid(
        payment_reference: &str,
        user_id: &str,
        customer_email: &str,
        draft: &BookingDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_reference: payment_reference.to_string(),
            user_id: user_id.to_string(),
            customer_email: customer_email.to_string(),
            company_id: draft.company_id.clone(),
            vehicle_id: draft.vehicle_id.clone(),
            route_id: draft.route_id.clone(),
            slot_id: draft.slot_id,
            departure_date: draft.departure_date,
            departure_time: draft.departure_time,
            seats: draft.seats.clone(),
            total_price: draft.total_price,
            luggage_photo_refs: draft.luggage_photo_refs.clone(),
            payment_status: PaymentStatus::Paid,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn seat_labels(&self) -> Vec<String> {
        self.seats.iter().map(|s| s.seat_id().to_string()).collect()
    }

    /// Paid → Refunded is the only mutation a booking accepts.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(CoreError::InvalidTransition {
                from: self.payment_status.as_str().to_string(),
                to: PaymentStatus::Refunded.as_str().to_string(),
            });
        }
        self.payment_status = PaymentStatus::Refunded;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> BookingDraft {
        BookingDraft {
            slot_id: Uuid::new_v4(),
            company_id: "cmp-1".to_string(),
            vehicle_id: "veh-1".to_string(),
            route_id: "rte-1".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2026, 12, 18).unwrap(),
            departure_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            seats: vec![BookedSeat { row: 1, column: 1, seat_class: SeatClass::Front, price: 500 }],
            luggage_photo_refs: vec![],
            total_price: 5050,
        }
    }

    #[test]
    fn test_refund_only_from_paid() {
        let now = Utc::now();
        let mut booking = Booking::paid("VMS-1", "user-1", "ada@uni.edu.ng", &draft(), now);
        assert_eq!(booking.seat_labels(), vec!["1-1".to_string()]);

        booking.mark_refunded(now).unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);

        let err = booking.mark_refunded(now).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }
}
