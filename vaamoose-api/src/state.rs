use chrono::Duration;
use std::sync::Arc;
use tokio::sync::broadcast;
use vaamoose_catalog::{
    InMemoryDirectory, InMemorySeatStore, PricingConfig, PricingEngine, SeatInventory, SurchargeTable,
};
use vaamoose_core::clock::{Clock, SystemClock};
use vaamoose_core::directory::Directory;
use vaamoose_core::notify::{BookingNotifier, EventPublisher, LogNotifier, NullPublisher};
use vaamoose_core::payment::PaymentGateway;
use vaamoose_core::repository::{
    BookingStore, IntentStore, ReconciliationStore, ReviewStore, SeatStore, SessionStore,
};
use vaamoose_order::{
    BookingLedger, InMemoryBookingStore, InMemoryIntentStore, InMemoryReconciliationStore,
    InMemoryReviewStore, InMemorySessionStore, PaymentConfig, PaymentOrchestrator,
    ReconciliationSweeper, ReviewService, SessionManager, SessionPolicy,
};
use vaamoose_shared::SeatsChangedEvent;
use vaamoose_store::app_config::BusinessRules;
use vaamoose_store::RedisClient;

use crate::broadcast::BroadcastPublisher;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<SeatInventory>,
    pub sessions: Arc<SessionManager>,
    pub payments: Arc<PaymentOrchestrator>,
    pub ledger: Arc<BookingLedger>,
    pub reviews: Arc<ReviewService>,
    pub directory: Arc<dyn Directory>,
    pub reconciliation: Arc<dyn ReconciliationStore>,
    pub sweeper: Arc<ReconciliationSweeper>,
    pub redis: Option<Arc<RedisClient>>,
    pub sse_tx: broadcast::Sender<SeatsChangedEvent>,
    pub auth: AuthConfig,
    /// Paystack secret used to check webhook signatures; `None` disables the webhook.
    pub webhook_secret: Option<String>,
    pub rate_limit_per_minute: i64,
    pub metrics: Arc<Metrics>,
}

/// Storage backends behind the engine.
pub struct Stores {
    pub seats: Arc<dyn SeatStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub intents: Arc<dyn IntentStore>,
    pub reconciliation: Arc<dyn ReconciliationStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub directory: Arc<dyn Directory>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            seats: Arc::new(InMemorySeatStore::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            bookings: Arc::new(InMemoryBookingStore::new()),
            intents: Arc::new(InMemoryIntentStore::new()),
            reconciliation: Arc::new(InMemoryReconciliationStore::new()),
            reviews: Arc::new(InMemoryReviewStore::new()),
            directory: Arc::new(InMemoryDirectory::new()),
        }
    }
}

/// Wires stores, gateway and business rules into an `AppState`.
pub struct AppBuilder {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    auth: AuthConfig,
    rules: BusinessRules,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    notifier: Arc<dyn BookingNotifier>,
    callback_url: Option<String>,
    webhook_secret: Option<String>,
    redis: Option<Arc<RedisClient>>,
    rate_limit_per_minute: i64,
}

impl AppBuilder {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, auth: AuthConfig, rules: BusinessRules) -> Self {
        Self {
            stores,
            gateway,
            auth,
            rules,
            clock: Arc::new(SystemClock),
            events: Arc::new(NullPublisher),
            notifier: Arc::new(LogNotifier),
            callback_url: None,
            webhook_secret: None,
            redis: None,
            rate_limit_per_minute: 120,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn BookingNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn callback_url(mut self, url: Option<String>) -> Self {
        self.callback_url = url;
        self
    }

    pub fn webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn rate_limit(mut self, redis: Option<Arc<RedisClient>>, per_minute: i64) -> Self {
        self.redis = redis;
        self.rate_limit_per_minute = per_minute;
        self
    }

    pub fn build(self) -> Result<AppState, prometheus::Error> {
        let rules = &self.rules;
        let (sse_tx, _) = broadcast::channel(256);
        let events: Arc<dyn EventPublisher> = Arc::new(BroadcastPublisher::new(self.events, sse_tx.clone()));

        let inventory = Arc::new(
            SeatInventory::new(
                self.stores.seats,
                self.clock.clone(),
                events.clone(),
                seconds(rules.seat_hold_seconds),
            )
            .with_compensation_ttl(seconds(rules.compensation_hold_seconds)),
        );
        let pricing = Arc::new(PricingEngine::new(PricingConfig {
            surcharges: SurchargeTable {
                standard: rules.surcharge_standard,
                window: rules.surcharge_window,
                front: rules.surcharge_front,
            },
            max_multiplier: rules.max_price_multiplier,
        }));
        let sessions = Arc::new(SessionManager::new(
            self.stores.sessions,
            self.stores.directory.clone(),
            inventory.clone(),
            pricing,
            self.clock.clone(),
            SessionPolicy {
                idle_ttl: seconds(rules.session_idle_seconds),
                retention_grace: seconds(rules.session_retention_grace_seconds),
                max_luggage_photos: rules.max_luggage_photos,
            },
        ));
        let ledger = Arc::new(BookingLedger::new(self.stores.bookings, self.clock.clone()));
        let payments = Arc::new(
            PaymentOrchestrator::new(
                self.gateway,
                self.stores.intents.clone(),
                sessions.clone(),
                ledger.clone(),
                self.stores.reconciliation.clone(),
            )
            .with_notifier(self.notifier)
            .with_events(events)
            .with_config(PaymentConfig {
                payment_hold_ttl: seconds(rules.payment_hold_seconds),
                callback_url: self.callback_url,
            }),
        );
        let sweeper = Arc::new(ReconciliationSweeper::new(
            self.stores.reconciliation.clone(),
            self.stores.intents,
            inventory.clone(),
            ledger.clone(),
        )
        .with_locks(payments.reference_locks()));
        let reviews = Arc::new(ReviewService::new(self.stores.reviews, ledger.clone(), self.clock.clone()));

        Ok(AppState {
            inventory,
            sessions,
            payments,
            ledger,
            reviews,
            directory: self.stores.directory,
            reconciliation: self.stores.reconciliation,
            sweeper,
            redis: self.redis,
            sse_tx,
            auth: self.auth,
            webhook_secret: self.webhook_secret,
            rate_limit_per_minute: self.rate_limit_per_minute,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(value as i64)
}
