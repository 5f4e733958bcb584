use async_trait::async_trait;
use std::sync::Mutex;
use vaamoose_shared::pii::redact_email;
use vaamoose_shared::DomainEvent;

use crate::booking::Booking;
use crate::CoreResult;

/// Confirmation delivery (email today). Callers never let a failure here
/// affect the booking it reports on.
#[async_trait]
pub trait BookingNotifier: Send + Sync {
    async fn booking_confirmed(&self, recipient_email: &str, booking: &Booking) -> CoreResult<()>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> CoreResult<()>;
}

/// Publishes and logs failures instead of returning them.
pub async fn publish_quietly(publisher: &dyn EventPublisher, event: DomainEvent) {
    let topic = event.topic();
    if let Err(e) = publisher.publish(event).await {
        tracing::warn!(topic, error = %e, "Failed to publish domain event");
    }
}

/// Development notifier: logs the confirmation instead of sending it.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl BookingNotifier for LogNotifier {
    async fn booking_confirmed(&self, recipient_email: &str, booking: &Booking) -> CoreResult<()> {
        tracing::info!(
            booking_id = %booking.id,
            recipient = %redact_email(recipient_email),
            seats = ?booking.seat_labels(),
            total = booking.total_price,
            "Booking confirmation queued"
        );
        Ok(())
    }
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, _event: DomainEvent) -> CoreResult<()> {
        Ok(())
    }
}

/// Keeps published events in memory; used where no broker is configured and in tests.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::topic).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) -> CoreResult<()> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        Ok(())
    }
}
