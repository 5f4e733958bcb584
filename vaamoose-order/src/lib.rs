pub mod intents;
pub mod ledger;
pub mod orchestrator;
pub mod paystack;
pub mod reconciliation;
pub mod resiliency;
pub mod reviews;
pub mod session;

#[cfg(test)]
mod testing;

pub use intents::InMemoryIntentStore;
pub use ledger::{BookingLedger, CompanyDashboard, InMemoryBookingStore};
pub use orchestrator::{MockPaymentGateway, PaymentConfig, PaymentInit, PaymentOrchestrator, ReferenceLocks};
pub use paystack::{PaystackConfig, PaystackGateway, WebhookEvent};
pub use reconciliation::{InMemoryReconciliationStore, ReconciliationSweeper, SweepReport};
pub use resiliency::{CircuitBreaker, CircuitBreakerGateway, CircuitState};
pub use reviews::{InMemoryReviewStore, ReviewService};
pub use session::{InMemorySessionStore, SessionManager, SessionPolicy};
