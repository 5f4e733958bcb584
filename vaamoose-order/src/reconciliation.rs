use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vaamoose_catalog::SeatInventory;
use vaamoose_core::payment::IntentStatus;
use vaamoose_core::repository::{
    IntentStore, ReconciliationEntry, ReconciliationKind, ReconciliationStore,
};
use vaamoose_core::{CoreError, CoreResult};

use crate::ledger::BookingLedger;
use crate::orchestrator::ReferenceLocks;

#[derive(Debug, Default)]
pub struct InMemoryReconciliationStore {
    entries: Mutex<Vec<ReconciliationEntry>>,
}

impl InMemoryReconciliationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryReconciliationStore {
    async fn record(&self, entry: &ReconciliationEntry) -> CoreResult<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let exists = entries.iter().any(|e| {
            e.payment_reference == entry.payment_reference && e.kind == entry.kind && !e.resolved
        });
        if exists {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn list_open(&self) -> CoreResult<Vec<ReconciliationEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().filter(|e| !e.resolved).cloned().collect())
    }

    async fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if !entry.resolved => {
                entry.resolved = true;
                entry.updated_at = now;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!("reconciliation entry {}", id))),
        }
    }

    async fn bump_attempts(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
            entry.updated_at = now;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Retries compensation for seats left occupied without a booking.
///
/// Refund entries are not touched here; an operator resolves them once money is returned.
/// Share the orchestrator's [`ReferenceLocks`] so a repair never interleaves with a verify.
pub struct ReconciliationSweeper {
    store: Arc<dyn ReconciliationStore>,
    intents: Arc<dyn IntentStore>,
    inventory: Arc<SeatInventory>,
    ledger: Arc<BookingLedger>,
    locks: Arc<ReferenceLocks>,
}

impl ReconciliationSweeper {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        intents: Arc<dyn IntentStore>,
        inventory: Arc<SeatInventory>,
        ledger: Arc<BookingLedger>,
    ) -> Self {
        Self {
            store,
            intents,
            inventory,
            ledger,
            locks: Arc::new(ReferenceLocks::default()),
        }
    }

    pub fn with_locks(mut self, locks: Arc<ReferenceLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub async fn run_once(&self) -> CoreResult<SweepReport> {
        let mut report = SweepReport::default();
        let open = self.store.list_open().await?;

        for entry in open.into_iter().filter(|e| e.kind == ReconciliationKind::OrphanedSeats) {
            report.examined += 1;
            match self.locks.run(&entry.payment_reference, self.repair(&entry)).await {
                Ok(()) => {
                    self.store.resolve(entry.id, self.inventory.now()).await?;
                    report.resolved += 1;
                    tracing::info!(reference = %entry.payment_reference, "Orphaned seats reconciled");
                }
                Err(e) => {
                    self.store.bump_attempts(entry.id, self.inventory.now()).await?;
                    report.failed += 1;
                    tracing::error!(
                        reference = %entry.payment_reference,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Orphaned seat repair failed"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn repair(&self, entry: &ReconciliationEntry) -> CoreResult<()> {
        // The booking may have been written by a later verify; occupied seats are then correct.
        if self.ledger.find_by_reference(&entry.payment_reference).await?.is_some() {
            return Ok(());
        }

        let intent = self
            .intents
            .get(&entry.payment_reference)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment intent {}", entry.payment_reference)))?;

        // Claim the intent before touching seats so no verify can settle it afterwards.
        match intent.status {
            IntentStatus::Succeeded => return Ok(()),
            IntentStatus::Failed => {}
            IntentStatus::Initialized => {
                let mut failed = intent.clone();
                failed.status = IntentStatus::Failed;
                failed.failure_reason = Some("booking could not be recorded".to_string());
                failed.updated_at = self.inventory.now();
                if !self.intents.compare_and_set(&failed, IntentStatus::Initialized).await? {
                    let current = self.intents.get(&entry.payment_reference).await?;
                    if matches!(current, Some(ref i) if i.status == IntentStatus::Succeeded) {
                        return Ok(());
                    }
                }
            }
        }

        if self.ledger.find_by_reference(&entry.payment_reference).await?.is_some() {
            return Ok(());
        }

        self.inventory
            .revert_commit(intent.draft.slot_id, &intent.draft.seat_ids(), intent.session_id)
            .await?;

        let refund = ReconciliationEntry::new(
            &entry.payment_reference,
            ReconciliationKind::RefundRequired,
            "paid but booking could not be recorded",
            self.inventory.now(),
        );
        self.store.record(&refund).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use vaamoose_core::clock::Clock;
    use vaamoose_core::model::{SeatId, SeatState};
    use vaamoose_core::repository::SeatStore;

    #[tokio::test]
    async fn test_record_is_deduplicated_until_resolved() {
        let store = InMemoryReconciliationStore::new();
        let now = Utc::now();
        let entry = ReconciliationEntry::new("VMS-1", ReconciliationKind::RefundRequired, "x", now);

        assert!(store.record(&entry).await.unwrap());
        let dup = ReconciliationEntry::new("VMS-1", ReconciliationKind::RefundRequired, "y", now);
        assert!(!store.record(&dup).await.unwrap());
        let other_kind = ReconciliationEntry::new("VMS-1", ReconciliationKind::OrphanedSeats, "z", now);
        assert!(store.record(&other_kind).await.unwrap());

        assert!(store.resolve(entry.id, now).await.unwrap());
        assert!(!store.resolve(entry.id, now).await.unwrap());
        assert_eq!(store.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_repairs_orphaned_seats() {
        let h = Harness::new().await;
        let session = h.sessions.create("ada", h.slot_id).await.unwrap();
        h.fill(session.id, "ada", &[SeatId::new(2, 2)]).await;
        let init = h
            .orchestrator
            .initialize(session.id, "ada", "ada@uni.edu.ng", None)
            .await
            .unwrap();

        // simulate a commit whose booking write and revert both failed
        h.inventory.commit(h.slot_id, &[SeatId::new(2, 2)], session.id).await.unwrap();
        let orphan = ReconciliationEntry::new(
            &init.reference,
            ReconciliationKind::OrphanedSeats,
            "booking write failed",
            h.clock.now(),
        );
        h.reconciliation.record(&orphan).await.unwrap();

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!(report, SweepReport { examined: 1, resolved: 1, failed: 0 });

        let seats = h.seat_store.seats(h.slot_id, h.clock.now()).await.unwrap();
        let seat = seats.iter().find(|r| r.seat == SeatId::new(2, 2)).unwrap();
        assert_eq!(seat.state, SeatState::Held);

        let open = h.reconciliation.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, ReconciliationKind::RefundRequired);

        let intent = h.intents.get(&init.reference).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Failed);
    }

    #[tokio::test]
    async fn test_sweeper_counts_failures() {
        let h = Harness::new().await;
        let orphan = ReconciliationEntry::new(
            "VMS-missing",
            ReconciliationKind::OrphanedSeats,
            "booking write failed",
            h.clock.now(),
        );
        h.reconciliation.record(&orphan).await.unwrap();

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        let open = h.reconciliation.list_open().await.unwrap();
        assert_eq!(open[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_sweeper_leaves_seats_of_settled_payment() {
        let h = Harness::new().await;
        let session = h.sessions.create("ada", h.slot_id).await.unwrap();
        h.fill(session.id, "ada", &[SeatId::new(2, 2)]).await;
        let init = h
            .orchestrator
            .initialize(session.id, "ada", "ada@uni.edu.ng", None)
            .await
            .unwrap();

        // an orphan was flagged, then a retried verify wrote the booking
        h.inventory.commit(h.slot_id, &[SeatId::new(2, 2)], session.id).await.unwrap();
        let orphan = ReconciliationEntry::new(
            &init.reference,
            ReconciliationKind::OrphanedSeats,
            "booking write failed",
            h.clock.now(),
        );
        h.reconciliation.record(&orphan).await.unwrap();
        h.orchestrator.verify(&init.reference).await.unwrap();

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!(report, SweepReport { examined: 1, resolved: 1, failed: 0 });

        let seats = h.seat_store.seats(h.slot_id, h.clock.now()).await.unwrap();
        let seat = seats.iter().find(|r| r.seat == SeatId::new(2, 2)).unwrap();
        assert_eq!(seat.state, SeatState::Occupied);
        assert!(h.reconciliation.list_open().await.unwrap().is_empty());
        let intent = h.intents.get(&init.reference).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_sweep_racing_verify_keeps_seats_consistent() {
        let h = Harness::new().await;
        let session = h.sessions.create("ada", h.slot_id).await.unwrap();
        h.fill(session.id, "ada", &[SeatId::new(3, 2)]).await;
        let init = h
            .orchestrator
            .initialize(session.id, "ada", "ada@uni.edu.ng", None)
            .await
            .unwrap();

        h.inventory.commit(h.slot_id, &[SeatId::new(3, 2)], session.id).await.unwrap();
        let orphan = ReconciliationEntry::new(
            &init.reference,
            ReconciliationKind::OrphanedSeats,
            "booking write failed",
            h.clock.now(),
        );
        h.reconciliation.record(&orphan).await.unwrap();

        let (report, verified) = tokio::join!(h.sweeper.run_once(), h.orchestrator.verify(&init.reference));
        assert_eq!(report.unwrap().resolved, 1);

        let seats = h.seat_store.seats(h.slot_id, h.clock.now()).await.unwrap();
        let seat = seats.iter().find(|r| r.seat == SeatId::new(3, 2)).unwrap();
        let booked = h.ledger.find_by_reference(&init.reference).await.unwrap();
        match verified {
            Ok(_) => {
                assert!(booked.is_some());
                assert_eq!(seat.state, SeatState::Occupied);
            }
            Err(_) => {
                assert!(booked.is_none());
                assert_ne!(seat.state, SeatState::Occupied);
            }
        }
    }
}
