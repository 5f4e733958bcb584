use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vaamoose_core::booking::Booking;
use vaamoose_core::notify::{publish_quietly, BookingNotifier, EventPublisher, LogNotifier, NullPublisher};
use vaamoose_core::payment::{
    GatewayInit, GatewayInitRequest, GatewayVerification, IntentStatus, PaymentGateway, PaymentIntent,
    VerifiedPayment,
};
use vaamoose_core::repository::{IntentStore, ReconciliationEntry, ReconciliationKind, ReconciliationStore};
use vaamoose_core::{CoreError, CoreResult};
use vaamoose_shared::pii::Masked;
use vaamoose_shared::{BookingConfirmedEvent, DomainEvent, PaymentFailedEvent};

use crate::ledger::BookingLedger;
use crate::session::SessionManager;

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// How long seats stay held once the customer is sent to the gateway.
    pub payment_hold_ttl: Duration,
    pub callback_url: Option<String>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            payment_hold_ttl: Duration::minutes(20),
            callback_url: None,
        }
    }
}

/// What the client needs to send the customer to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInit {
    pub reference: String,
    pub authorization_url: String,
    pub amount: i64,
}

/// Payment Gateway Adapter: ties intents, seat commits and the ledger together.
///
/// `verify` may be reached from the customer's redirect, client polling and the
/// gateway webhook at the same time. Calls for one reference are serialised in
/// process; across processes the intent compare-and-set, the idempotent seat
/// commit and the ledger's unique reference keep the outcome single.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    intents: Arc<dyn IntentStore>,
    sessions: Arc<SessionManager>,
    ledger: Arc<BookingLedger>,
    reconciliation: Arc<dyn ReconciliationStore>,
    notifier: Arc<dyn BookingNotifier>,
    events: Arc<dyn EventPublisher>,
    config: PaymentConfig,
    locks: Arc<ReferenceLocks>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        intents: Arc<dyn IntentStore>,
        sessions: Arc<SessionManager>,
        ledger: Arc<BookingLedger>,
        reconciliation: Arc<dyn ReconciliationStore>,
    ) -> Self {
        Self {
            gateway,
            intents,
            sessions,
            ledger,
            reconciliation,
            notifier: Arc::new(LogNotifier),
            events: Arc::new(NullPublisher),
            config: PaymentConfig::default(),
            locks: Arc::new(ReferenceLocks::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn BookingNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: PaymentConfig) -> Self {
        self.config = config;
        self
    }

    /// The per-reference locks `verify` runs under, for other workers touching the same payments.
    pub fn reference_locks(&self) -> Arc<ReferenceLocks> {
        self.locks.clone()
    }

    /// Starts a payment for a checked-out session.
    ///
    /// `expected_amount` is the total the client showed the customer; a mismatch
    /// with the current quote is rejected.
    pub async fn initialize(
        &self,
        session_id: Uuid,
        user_id: &str,
        customer_email: &str,
        expected_amount: Option<i64>,
    ) -> CoreResult<PaymentInit> {
        if customer_email.trim().is_empty() || !customer_email.contains('@') {
            return Err(CoreError::ValidationError("a valid customer email is required".to_string()));
        }

        let (mut session, draft) = self.sessions.prepare_payment(session_id, user_id).await?;
        if let Some(expected) = expected_amount {
            if expected != draft.total_price {
                return Err(CoreError::ValidationError(format!(
                    "amount {} does not match the current total {}",
                    expected, draft.total_price
                )));
            }
        }

        if let Some(open) = self.intents.find_open_for_session(session.id).await? {
            match open.authorization_url.clone() {
                Some(url) if open.draft == draft => {
                    self.sessions.extend_holds(&mut session, self.config.payment_hold_ttl).await?;
                    tracing::info!(reference = %open.reference, %session_id, "Reusing open payment intent");
                    return Ok(PaymentInit {
                        reference: open.reference,
                        authorization_url: url,
                        amount: open.amount,
                    });
                }
                _ => {
                    self.fail_intent(open, "superseded by a new payment attempt").await?;
                }
            }
        }

        self.sessions.extend_holds(&mut session, self.config.payment_hold_ttl).await?;

        let now = self.sessions.clock().now();
        let mut intent = PaymentIntent::initialized(session.id, user_id, customer_email, draft, now);
        self.intents.insert(&intent).await?;

        let request = GatewayInitRequest {
            reference: intent.reference.clone(),
            email: customer_email.to_string(),
            amount: intent.amount,
            callback_url: self.config.callback_url.clone(),
            metadata: serde_json::json!({
                "session_id": session.id,
                "slot_id": session.slot_id,
                "seats": intent.draft.seats.iter().map(|s| s.seat_id().to_string()).collect::<Vec<_>>(),
            }),
        };

        let init: GatewayInit = match self.gateway.initialize(&request).await {
            Ok(init) => init,
            Err(e) => {
                tracing::error!(reference = %intent.reference, error = %e, "Gateway initialization failed");
                let reason = e.to_string();
                self.fail_intent(intent, &reason).await?;
                return Err(match e {
                    CoreError::PaymentError(_) | CoreError::GatewayUnavailable(_) => e,
                    other => CoreError::PaymentError(other.to_string()),
                });
            }
        };

        intent.authorization_url = Some(init.authorization_url.clone());
        intent.external_reference = init.access_code.clone();
        intent.updated_at = self.sessions.clock().now();
        if !self.intents.compare_and_set(&intent, IntentStatus::Initialized).await? {
            tracing::warn!(reference = %intent.reference, "Intent changed while initializing");
        }

        tracing::info!(reference = %intent.reference, %session_id, amount = intent.amount, "Payment initialized");
        Ok(PaymentInit {
            reference: intent.reference,
            authorization_url: init.authorization_url,
            amount: intent.amount,
        })
    }

    pub async fn intent(&self, reference: &str) -> CoreResult<PaymentIntent> {
        self.intents
            .get(reference)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", reference)))
    }

    /// Confirms a payment with the gateway and, on success, books the seats.
    pub async fn verify(&self, reference: &str) -> CoreResult<VerifiedPayment> {
        self.locks.run(reference, self.verify_locked(reference)).await
    }

    async fn verify_locked(&self, reference: &str) -> CoreResult<VerifiedPayment> {
        let intent = self
            .intents
            .get(reference)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", reference)))?;

        if intent.status == IntentStatus::Succeeded {
            let booking = self.settled_booking(&intent).await?;
            tracing::debug!(%reference, booking_id = %booking.id, "Verification replayed");
            return Ok(VerifiedPayment {
                reference: reference.to_string(),
                booking,
                replayed: true,
            });
        }

        let verification = self.gateway.verify(reference).await?;

        if intent.status == IntentStatus::Failed {
            if verification.is_success() {
                self.flag(reference, ReconciliationKind::RefundRequired, "gateway reports success for a failed payment")
                    .await;
            }
            return Err(CoreError::PaymentError(
                intent.failure_reason.unwrap_or_else(|| "payment failed".to_string()),
            ));
        }

        if verification.is_in_flight() {
            return Err(CoreError::PaymentPending(reference.to_string()));
        }

        if !verification.is_success() {
            let reason = format!("gateway reported '{}'", verification.status);
            self.reject(intent, &reason).await?;
            return Err(CoreError::PaymentError(reason));
        }

        if verification.amount != intent.amount {
            let reason = format!("amount paid {} does not match {}", verification.amount, intent.amount);
            self.flag(reference, ReconciliationKind::RefundRequired, &reason).await;
            self.reject(intent, &reason).await?;
            return Err(CoreError::PaymentError(reason));
        }

        self.settle(intent, &verification).await
    }

    async fn settle(&self, mut intent: PaymentIntent, verification: &GatewayVerification) -> CoreResult<VerifiedPayment> {
        let inventory = self.sessions.inventory();
        let slot_id = intent.draft.slot_id;
        let seats = intent.draft.seat_ids();

        match inventory.commit(slot_id, &seats, intent.session_id).await {
            Ok(()) => {}
            Err(conflict @ CoreError::SeatConflict { .. }) => {
                tracing::warn!(reference = %intent.reference, error = %conflict, "Paid seats no longer available");
                self.flag(&intent.reference, ReconciliationKind::RefundRequired, "slot no longer available")
                    .await;
                self.fail_intent(intent, "slot no longer available").await?;
                return Err(conflict);
            }
            Err(e) => return Err(e),
        }

        let now = self.sessions.clock().now();
        let booking = Booking::paid(&intent.reference, &intent.user_id, &intent.customer_email, &intent.draft, now);
        let booking_id = match self.ledger.create(&booking).await {
            Ok(id) => id,
            Err(e) => return Err(self.compensate(&intent, e).await),
        };
        let booking = if booking_id == booking.id {
            booking
        } else {
            self.ledger.get(booking_id).await?
        };

        intent.status = IntentStatus::Succeeded;
        intent.booking_id = Some(booking.id);
        intent.external_reference = verification.external_id.clone().or(intent.external_reference);
        intent.updated_at = now;
        if !self.intents.compare_and_set(&intent, IntentStatus::Initialized).await? {
            tracing::warn!(reference = %intent.reference, "Intent settled concurrently");
        }

        self.sessions.complete(intent.session_id).await;
        self.announce(&booking).await;

        tracing::info!(reference = %intent.reference, booking_id = %booking.id, total = booking.total_price, "Payment verified");
        Ok(VerifiedPayment {
            reference: intent.reference,
            booking,
            replayed: false,
        })
    }

    /// Undo a commit whose booking could not be written. Returns the error to surface.
    async fn compensate(&self, intent: &PaymentIntent, cause: CoreError) -> CoreError {
        tracing::error!(reference = %intent.reference, error = %cause, "Booking write failed after seat commit");
        let inventory = self.sessions.inventory();
        match inventory
            .revert_commit(intent.draft.slot_id, &intent.draft.seat_ids(), intent.session_id)
            .await
        {
            Ok(()) => cause,
            Err(revert_err) => {
                let detail = format!("booking write failed ({}); seat revert failed ({})", cause, revert_err);
                self.flag(&intent.reference, ReconciliationKind::OrphanedSeats, &detail).await;
                CoreError::ReconciliationFailure {
                    reference: intent.reference.clone(),
                    detail,
                }
            }
        }
    }

    /// Fails the intent and returns its seats to the pool.
    async fn reject(&self, intent: PaymentIntent, reason: &str) -> CoreResult<()> {
        let slot_id = intent.draft.slot_id;
        let session_id = intent.session_id;
        let seats = intent.draft.seat_ids();
        self.fail_intent(intent, reason).await?;
        if let Err(e) = self.sessions.inventory().release(slot_id, &seats, session_id).await {
            tracing::warn!(%session_id, error = %e, "Failed to release seats after payment failure");
        }
        Ok(())
    }

    async fn fail_intent(&self, mut intent: PaymentIntent, reason: &str) -> CoreResult<()> {
        intent.status = IntentStatus::Failed;
        intent.failure_reason = Some(reason.to_string());
        intent.updated_at = self.sessions.clock().now();
        if !self.intents.compare_and_set(&intent, IntentStatus::Initialized).await? {
            tracing::warn!(reference = %intent.reference, "Intent already left initialized");
            return Ok(());
        }

        tracing::info!(reference = %intent.reference, reason, "Payment intent failed");
        let event = DomainEvent::PaymentFailed(PaymentFailedEvent {
            payment_reference: intent.reference.clone(),
            session_id: intent.session_id,
            reason: reason.to_string(),
            timestamp: intent.updated_at,
        });
        publish_quietly(self.events.as_ref(), event).await;
        Ok(())
    }

    async fn settled_booking(&self, intent: &PaymentIntent) -> CoreResult<Booking> {
        if let Some(id) = intent.booking_id {
            return self.ledger.get(id).await;
        }
        self.ledger
            .find_by_reference(&intent.reference)
            .await?
            .ok_or_else(|| CoreError::internal(format!("settled payment {} has no booking", intent.reference)))
    }

    async fn flag(&self, reference: &str, kind: ReconciliationKind, detail: &str) {
        let entry = ReconciliationEntry::new(reference, kind, detail, self.sessions.clock().now());
        match self.reconciliation.record(&entry).await {
            Ok(true) => tracing::warn!(%reference, kind = kind.as_str(), detail, "Reconciliation entry recorded"),
            Ok(false) => {}
            Err(e) => tracing::error!(%reference, kind = kind.as_str(), error = %e, "Failed to record reconciliation entry"),
        }
    }

    async fn announce(&self, booking: &Booking) {
        let notifier = self.notifier.clone();
        let email = booking.customer_email.clone();
        let confirmed = booking.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.booking_confirmed(&email, &confirmed).await {
                tracing::warn!(booking_id = %confirmed.id, error = %e, "Booking confirmation not delivered");
            }
        });

        let event = DomainEvent::BookingConfirmed(BookingConfirmedEvent {
            booking_id: booking.id,
            payment_reference: booking.payment_reference.clone(),
            user_id: booking.user_id.clone(),
            customer_email: Masked(booking.customer_email.clone()),
            company_id: booking.company_id.clone(),
            slot_id: booking.slot_id,
            seats: booking.seat_labels(),
            total_price: booking.total_price,
            timestamp: booking.created_at,
        });
        publish_quietly(self.events.as_ref(), event).await;
    }
}

/// In-process mutual exclusion keyed by payment reference. Entries are dropped
/// once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct ReferenceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReferenceLocks {
    pub async fn run<F, T>(&self, reference: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.lock_for(reference);
        let guard = lock.lock().await;
        let result = work.await;
        drop(guard);
        self.forget(reference, &lock);
        result
    }

    fn lock_for(&self, reference: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(reference.to_string()).or_default().clone()
    }

    fn forget(&self, reference: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // map entry + the caller's handle
        if Arc::strong_count(lock) <= 2 {
            locks.remove(reference);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Scriptable gateway for tests and local runs. Unscripted references report success
/// for the amount they were initialized with.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    initialized: Mutex<HashMap<String, GatewayInitRequest>>,
    statuses: Mutex<HashMap<String, String>>,
    amounts: Mutex<HashMap<String, i64>>,
    fail_initialize: Mutex<bool>,
    verify_calls: AtomicUsize,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, reference: &str, status: &str) {
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.insert(reference.to_string(), status.to_string());
    }

    /// Report a different paid amount (naira) for a reference.
    pub fn set_amount(&self, reference: &str, amount: i64) {
        let mut amounts = self.amounts.lock().unwrap_or_else(|e| e.into_inner());
        amounts.insert(reference.to_string(), amount);
    }

    pub fn fail_initialize(&self, fail: bool) {
        *self.fail_initialize.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn initialized_count(&self) -> usize {
        self.initialized.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initialize(&self, request: &GatewayInitRequest) -> CoreResult<GatewayInit> {
        if *self.fail_initialize.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(CoreError::GatewayUnavailable("mock gateway unavailable".to_string()));
        }
        let mut initialized = self.initialized.lock().unwrap_or_else(|e| e.into_inner());
        initialized.insert(request.reference.clone(), request.clone());
        Ok(GatewayInit {
            authorization_url: format!("https://checkout.mock.local/{}", request.reference),
            reference: request.reference.clone(),
            access_code: Some(format!("mock_{}", request.reference)),
        })
    }

    async fn verify(&self, reference: &str) -> CoreResult<GatewayVerification> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let request = self
            .initialized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .cloned()
            .ok_or_else(|| CoreError::PaymentError(format!("transaction {} not found", reference)))?;
        let status = self
            .statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .cloned()
            .unwrap_or_else(|| "success".to_string());
        let amount = self
            .amounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .copied()
            .unwrap_or(request.amount);

        Ok(GatewayVerification {
            reference: reference.to_string(),
            status,
            amount,
            customer_email: Some(request.email),
            external_id: Some(format!("mock_txn_{}", reference)),
            metadata: request.metadata,
        })
    }
}
