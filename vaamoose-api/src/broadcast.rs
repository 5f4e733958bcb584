use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use vaamoose_core::notify::EventPublisher;
use vaamoose_core::CoreResult;
use vaamoose_shared::{DomainEvent, SeatsChangedEvent};

/// Forwards every event to the inner publisher and copies seat changes onto
/// the SSE channel.
pub struct BroadcastPublisher {
    inner: Arc<dyn EventPublisher>,
    tx: broadcast::Sender<SeatsChangedEvent>,
}

impl BroadcastPublisher {
    pub fn new(inner: Arc<dyn EventPublisher>, tx: broadcast::Sender<SeatsChangedEvent>) -> Self {
        Self { inner, tx }
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: DomainEvent) -> CoreResult<()> {
        if let DomainEvent::SeatsChanged(change) = &event {
            // no subscribers is fine
            let _ = self.tx.send(change.clone());
        }
        self.inner.publish(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use vaamoose_core::notify::RecordingPublisher;
    use vaamoose_shared::PaymentFailedEvent;

    #[tokio::test]
    async fn test_seat_changes_reach_subscribers() {
        let recorder = Arc::new(RecordingPublisher::new());
        let (tx, mut rx) = broadcast::channel(8);
        let publisher = BroadcastPublisher::new(recorder.clone(), tx);

        let slot_id = Uuid::new_v4();
        publisher
            .publish(DomainEvent::SeatsChanged(SeatsChangedEvent {
                slot_id,
                seats: vec!["1-1".to_string()],
                state: "held".to_string(),
                session_id: None,
                timestamp: Utc::now(),
            }))
            .await
            .unwrap();
        publisher
            .publish(DomainEvent::PaymentFailed(PaymentFailedEvent {
                payment_reference: "VMS-1".to_string(),
                session_id: Uuid::new_v4(),
                reason: "declined".to_string(),
                timestamp: Utc::now(),
            }))
            .await
            .unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.slot_id, slot_id);
        assert!(rx.try_recv().is_err());
        assert_eq!(recorder.topics(), vec!["seats.changed", "payment.failed"]);
    }
}
