use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pii::Masked;

/// Seat map delta for one slot. Seats use the `"row-column"` label.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeatsChangedEvent {
    pub slot_id: Uuid,
    pub seats: Vec<String>,
    pub state: String,
    pub session_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub payment_reference: String,
    pub user_id: String,
    pub customer_email: Masked<String>,
    pub company_id: String,
    pub slot_id: Uuid,
    pub seats: Vec<String>,
    pub total_price: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentFailedEvent {
    pub payment_reference: String,
    pub session_id: Uuid,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    SeatsChanged(SeatsChangedEvent),
    BookingConfirmed(BookingConfirmedEvent),
    PaymentFailed(PaymentFailedEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::SeatsChanged(_) => "seats.changed",
            DomainEvent::BookingConfirmed(_) => "booking.confirmed",
            DomainEvent::PaymentFailed(_) => "payment.failed",
        }
    }

    /// Partition key: events for one slot (or one payment) stay ordered.
    pub fn key(&self) -> String {
        match self {
            DomainEvent::SeatsChanged(e) => e.slot_id.to_string(),
            DomainEvent::BookingConfirmed(e) => e.slot_id.to_string(),
            DomainEvent::PaymentFailed(e) => e.payment_reference.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_event_envelope() {
        let event = DomainEvent::PaymentFailed(PaymentFailedEvent {
            payment_reference: "VMS-abc".to_string(),
            session_id: Uuid::new_v4(),
            reason: "declined".to_string(),
            timestamp: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "payment_failed");
        assert_eq!(json["data"]["reason"], "declined");
        assert_eq!(event.topic(), "payment.failed");
        assert_eq!(event.key(), "VMS-abc");
    }
}
