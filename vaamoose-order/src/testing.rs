use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;
use vaamoose_catalog::{InMemoryDirectory, InMemorySeatStore, PricingEngine, SeatInventory};
use vaamoose_core::clock::{Clock, ManualClock};
use vaamoose_core::directory::Directory;
use vaamoose_core::model::{DepartureSlot, Route, SeatId, Vehicle, VehicleType};
use vaamoose_core::notify::RecordingPublisher;
use vaamoose_core::repository::BookingStore;

use crate::{
    BookingLedger, InMemoryBookingStore, InMemoryIntentStore, InMemoryReconciliationStore,
    InMemorySessionStore, MockPaymentGateway, PaymentOrchestrator, ReconciliationSweeper,
    SessionManager, SessionPolicy,
};

/// Minivan slot on a 3500 route with a 1.3 multiplier, wired to in-memory stores.
/// Holds last 10 minutes, sessions idle out after 15, the payment window is 20.
pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingPublisher>,
    pub seat_store: Arc<InMemorySeatStore>,
    pub booking_store: Arc<dyn BookingStore>,
    pub intents: Arc<InMemoryIntentStore>,
    pub reconciliation: Arc<InMemoryReconciliationStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub inventory: Arc<SeatInventory>,
    pub sessions: Arc<SessionManager>,
    pub ledger: Arc<BookingLedger>,
    pub orchestrator: PaymentOrchestrator,
    pub sweeper: ReconciliationSweeper,
    pub slot_id: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_booking_store(Arc::new(InMemoryBookingStore::new())).await
    }

    pub async fn with_booking_store(booking_store: Arc<dyn BookingStore>) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let events = Arc::new(RecordingPublisher::new());
        let seat_store = Arc::new(InMemorySeatStore::new());
        let directory = Arc::new(InMemoryDirectory::new());

        directory
            .upsert_route(&Route {
                id: "rte-1".to_string(),
                company_id: "cmp-1".to_string(),
                origin: "Ile-Ife".to_string(),
                destination: "Lagos".to_string(),
                base_price: 3500,
            })
            .await
            .unwrap();
        directory
            .upsert_vehicle(&Vehicle {
                id: "veh-1".to_string(),
                company_id: "cmp-1".to_string(),
                name: "Sienna".to_string(),
                vehicle_type: VehicleType::Minivan,
                capacity: 9,
                price_multiplier: 1.3,
            })
            .await
            .unwrap();

        let departs = clock.now() + Duration::days(3);
        let slot = DepartureSlot {
            id: Uuid::new_v4(),
            company_id: "cmp-1".to_string(),
            vehicle_id: "veh-1".to_string(),
            route_id: "rte-1".to_string(),
            date: departs.date_naive(),
            time: departs.time(),
            total_seats: 9,
            created_at: clock.now(),
        };
        directory.register_slot(&slot).await.unwrap();

        let inventory = Arc::new(SeatInventory::new(
            seat_store.clone(),
            clock.clone(),
            events.clone(),
            Duration::minutes(10),
        ));
        inventory.initialize_slot(slot.id, VehicleType::Minivan).await.unwrap();

        let sessions = Arc::new(SessionManager::new(
            Arc::new(InMemorySessionStore::new()),
            directory.clone(),
            inventory.clone(),
            Arc::new(PricingEngine::default()),
            clock.clone(),
            SessionPolicy::default(),
        ));
        let ledger = Arc::new(BookingLedger::new(booking_store.clone(), clock.clone()));
        let intents = Arc::new(InMemoryIntentStore::new());
        let reconciliation = Arc::new(InMemoryReconciliationStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());

        let orchestrator = PaymentOrchestrator::new(
            gateway.clone(),
            intents.clone(),
            sessions.clone(),
            ledger.clone(),
            reconciliation.clone(),
        )
        .with_events(events.clone());
        let sweeper = ReconciliationSweeper::new(
            reconciliation.clone(),
            intents.clone(),
            inventory.clone(),
            ledger.clone(),
        )
        .with_locks(orchestrator.reference_locks());

        Self {
            clock,
            events,
            seat_store,
            booking_store,
            intents,
            reconciliation,
            gateway,
            inventory,
            sessions,
            ledger,
            orchestrator,
            sweeper,
            slot_id: slot.id,
        }
    }

    /// Route, vehicle, seats and luggage: everything checkout needs.
    pub async fn fill(&self, session_id: Uuid, user_id: &str, seats: &[SeatId]) {
        self.sessions.set_route(session_id, user_id, "rte-1").await.unwrap();
        self.sessions.set_vehicle(session_id, user_id, "veh-1").await.unwrap();
        self.sessions.select_seats(session_id, user_id, seats).await.unwrap();
        self.sessions
            .set_luggage(session_id, user_id, vec!["https://photos.vaamoose.ng/bag-1.jpg".to_string()])
            .await
            .unwrap();
    }
}
