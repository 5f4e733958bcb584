use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};
use vaamoose_core::booking::Booking;
use vaamoose_core::notify::{BookingNotifier, EventPublisher};
use vaamoose_core::{CoreError, CoreResult};
use vaamoose_shared::DomainEvent;

/// Topic the mailer consumes.
pub const EMAIL_TOPIC: &str = "notifications.email";

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!(topic, key, partition = delivery.partition, offset = delivery.offset, "Event delivered");
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, error = %e, "Failed to deliver event");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    async fn publish(&self, event: DomainEvent) -> CoreResult<()> {
        let payload = serde_json::to_string(&event).map_err(CoreError::internal)?;
        self.send(event.topic(), &event.key(), &payload)
            .await
            .map_err(CoreError::internal)
    }
}

/// Hands the confirmation to the mailer over Kafka; the recipient only travels in this message.
#[async_trait]
impl BookingNotifier for EventProducer {
    async fn booking_confirmed(&self, recipient_email: &str, booking: &Booking) -> CoreResult<()> {
        let payload = confirmation_payload(recipient_email, booking);
        self.send(EMAIL_TOPIC, &booking.id.to_string(), &payload.to_string())
            .await
            .map_err(CoreError::internal)
    }
}

fn confirmation_payload(recipient_email: &str, booking: &Booking) -> serde_json::Value {
    json!({
        "template": "booking_confirmed",
        "recipient": recipient_email,
        "booking": {
            "id": booking.id,
            "payment_reference": booking.payment_reference,
            "company_id": booking.company_id,
            "route_id": booking.route_id,
            "departure_date": booking.departure_date,
            "departure_time": booking.departure_time,
            "seats": booking.seat_labels(),
            "total_price": booking.total_price,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;
    use vaamoose_core::booking::{BookedSeat, BookingDraft};
    use vaamoose_core::model::SeatClass;

    #[test]
    fn test_confirmation_payload() {
        let draft = BookingDraft {
            slot_id: Uuid::new_v4(),
            company_id: "cmp-1".to_string(),
            vehicle_id: "veh-1".to_string(),
            route_id: "rte-1".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2026, 12, 18).unwrap(),
            departure_time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            seats: vec![BookedSeat { row: 2, column: 1, seat_class: SeatClass::Window, price: 200 }],
            luggage_photo_refs: vec![],
            total_price: 4750,
        };
        let booking = Booking::paid("VMS-1", "user-1", "ada@uni.edu.ng", &draft, Utc::now());

        let payload = confirmation_payload("ada@uni.edu.ng", &booking);
        assert_eq!(payload["template"], "booking_confirmed");
        assert_eq!(payload["recipient"], "ada@uni.edu.ng");
        assert_eq!(payload["booking"]["seats"][0], "2-1");
        assert_eq!(payload["booking"]["total_price"], 4750);
    }
}
