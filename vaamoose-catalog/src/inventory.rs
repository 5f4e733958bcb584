use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vaamoose_core::clock::Clock;
use vaamoose_core::model::{SeatClass, SeatId, SeatRecord, SeatState, VehicleType};
use vaamoose_core::notify::{publish_quietly, EventPublisher};
use vaamoose_core::repository::SeatStore;
use vaamoose_core::{CoreError, CoreResult};
use vaamoose_shared::{DomainEvent, SeatsChangedEvent};

/// Seat layout for a vehicle type. Row 1 is the front row; the outer columns are windows.
pub fn seat_map(vehicle_type: VehicleType) -> Vec<(SeatId, SeatClass)> {
    let (rows, columns) = vehicle_type.grid();
    let mut seats = Vec::with_capacity(rows as usize * columns as usize);
    for row in 1..=rows {
        for column in 1..=columns {
            let class = if row == 1 {
                SeatClass::Front
            } else if column == 1 || column == columns {
                SeatClass::Window
            } else {
                SeatClass::Standard
            };
            seats.push((SeatId::new(row, column), class));
        }
    }
    seats
}

/// Result of a successful hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldSeats {
    pub slot_id: Uuid,
    pub seats: Vec<SeatId>,
    pub held_until: DateTime<Utc>,
}

/// Seat Inventory service: TTL policy, duplicate collapsing and change events
/// on top of a `SeatStore`.
pub struct SeatInventory {
    store: Arc<dyn SeatStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    hold_ttl: Duration,
    compensation_ttl: Duration,
}

impl SeatInventory {
    pub fn new(
        store: Arc<dyn SeatStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        hold_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            hold_ttl,
            compensation_ttl: Duration::minutes(2),
        }
    }

    /// TTL given to seats moved back to `held` after a failed booking write.
    pub fn with_compensation_ttl(mut self, ttl: Duration) -> Self {
        self.compensation_ttl = ttl;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn hold_ttl(&self) -> Duration {
        self.hold_ttl
    }

    pub async fn initialize_slot(
        &self,
        slot_id: Uuid,
        vehicle_type: VehicleType,
    ) -> CoreResult<Vec<(SeatId, SeatClass)>> {
        let layout = seat_map(vehicle_type);
        self.store.initialize_slot(slot_id, &layout).await?;
        tracing::info!(%slot_id, seats = layout.len(), vehicle_type = vehicle_type.as_str(), "Seat map initialized");
        Ok(layout)
    }

    pub async fn availability(&self, slot_id: Uuid) -> CoreResult<Vec<SeatRecord>> {
        self.store.seats(slot_id, self.clock.now()).await
    }

    /// Classes of the given seats, in the order requested.
    pub async fn seat_classes(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
    ) -> CoreResult<Vec<(SeatId, SeatClass)>> {
        let records: HashMap<SeatId, SeatClass> = self
            .availability(slot_id)
            .await?
            .into_iter()
            .map(|r| (r.seat, r.seat_class))
            .collect();
        seats
            .iter()
            .map(|seat| {
                records
                    .get(seat)
                    .map(|class| (*seat, *class))
                    .ok_or_else(|| CoreError::ValidationError(format!("unknown seat {}", seat)))
            })
            .collect()
    }

    pub async fn hold(&self, slot_id: Uuid, seats: &[SeatId], session_id: Uuid) -> CoreResult<HeldSeats> {
        self.hold_for(slot_id, seats, session_id, self.hold_ttl).await
    }

    /// All-or-nothing hold with an explicit TTL (the payment window uses a longer one).
    pub async fn hold_for(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        ttl: Duration,
    ) -> CoreResult<HeldSeats> {
        let seats = dedup(seats);
        if seats.is_empty() {
            return Err(CoreError::ValidationError("select at least one seat".to_string()));
        }
        let now = self.clock.now();
        let held_until = now + ttl;

        match self.store.hold(slot_id, &seats, session_id, held_until, now).await {
            Ok(_) => {
                tracing::debug!(%slot_id, %session_id, seats = ?labels(&seats), %held_until, "Seats held");
                self.announce(slot_id, &seats, SeatState::Held, Some(session_id)).await;
                Ok(HeldSeats { slot_id, seats, held_until })
            }
            Err(e) => {
                if let CoreError::SeatConflict { seats: ref conflicted, .. } = e {
                    tracing::info!(%slot_id, %session_id, conflicted = ?labels(conflicted), "Hold rejected");
                }
                Err(e)
            }
        }
    }

    pub async fn release(&self, slot_id: Uuid, seats: &[SeatId], session_id: Uuid) -> CoreResult<usize> {
        let seats = dedup(seats);
        if seats.is_empty() {
            return Ok(0);
        }
        let released = self.store.release(slot_id, &seats, session_id).await?;
        if released > 0 {
            self.announce(slot_id, &seats, SeatState::Available, Some(session_id)).await;
        }
        Ok(released)
    }

    pub async fn release_session(&self, slot_id: Uuid, session_id: Uuid) -> CoreResult<usize> {
        let held: Vec<SeatId> = self
            .store
            .seats(slot_id, self.clock.now())
            .await?
            .into_iter()
            .filter(|r| r.state == SeatState::Held && r.holder_session_id == Some(session_id))
            .map(|r| r.seat)
            .collect();
        let released = self.store.release_session(slot_id, session_id).await?;
        if released > 0 {
            tracing::debug!(%slot_id, %session_id, released, "Session holds released");
            self.announce(slot_id, &held, SeatState::Available, Some(session_id)).await;
        }
        Ok(released)
    }

    pub async fn commit(&self, slot_id: Uuid, seats: &[SeatId], session_id: Uuid) -> CoreResult<()> {
        let seats = dedup(seats);
        self.store.commit(slot_id, &seats, session_id, self.clock.now()).await?;
        tracing::info!(%slot_id, %session_id, seats = ?labels(&seats), "Seats committed");
        self.announce(slot_id, &seats, SeatState::Occupied, Some(session_id)).await;
        Ok(())
    }

    pub async fn revert_commit(&self, slot_id: Uuid, seats: &[SeatId], session_id: Uuid) -> CoreResult<()> {
        let seats = dedup(seats);
        let held_until = self.clock.now() + self.compensation_ttl;
        self.store.revert_commit(slot_id, &seats, session_id, held_until).await?;
        tracing::warn!(%slot_id, %session_id, seats = ?labels(&seats), "Seat commit reverted");
        self.announce(slot_id, &seats, SeatState::Held, Some(session_id)).await;
        Ok(())
    }

    pub async fn purge_expired(&self) -> CoreResult<usize> {
        self.store.purge_expired(self.clock.now()).await
    }

    async fn announce(&self, slot_id: Uuid, seats: &[SeatId], state: SeatState, session_id: Option<Uuid>) {
        let event = DomainEvent::SeatsChanged(SeatsChangedEvent {
            slot_id,
            seats: labels(seats),
            state: state.as_str().to_string(),
            session_id,
            timestamp: self.clock.now(),
        });
        publish_quietly(self.events.as_ref(), event).await;
    }
}

fn dedup(seats: &[SeatId]) -> Vec<SeatId> {
    seats.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

fn labels(seats: &[SeatId]) -> Vec<String> {
    seats.iter().map(SeatId::to_string).collect()
}

/// Seat store for tests and single-process deployments.
/// One lock around every slot makes each call atomic.
#[derive(Debug, Default)]
pub struct InMemorySeatStore {
    slots: Mutex<HashMap<Uuid, BTreeMap<SeatId, SeatRecord>>>,
}

impl InMemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown_seats(slot: &BTreeMap<SeatId, SeatRecord>, seats: &[SeatId]) -> CoreResult<()> {
    let unknown: Vec<String> = seats
        .iter()
        .filter(|s| !slot.contains_key(*s))
        .map(SeatId::to_string)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(CoreError::ValidationError(format!("unknown seats: {}", unknown.join(", "))))
    }
}

#[async_trait]
impl SeatStore for InMemorySeatStore {
    async fn initialize_slot(&self, slot_id: Uuid, seats: &[(SeatId, SeatClass)]) -> CoreResult<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.contains_key(&slot_id) {
            return Err(CoreError::ValidationError(format!("slot {} already has seats", slot_id)));
        }
        let records = seats
            .iter()
            .map(|(seat, class)| (*seat, SeatRecord::available(slot_id, *seat, *class)))
            .collect();
        slots.insert(slot_id, records);
        Ok(())
    }

    async fn seats(&self, slot_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<SeatRecord>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .get(&slot_id)
            .ok_or_else(|| CoreError::NotFound(format!("slot {}", slot_id)))?;
        Ok(slot.values().cloned().map(|r| r.normalized(now)).collect())
    }

    async fn hold(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        held_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<SeatRecord>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .get_mut(&slot_id)
            .ok_or_else(|| CoreError::NotFound(format!("slot {}", slot_id)))?;
        unknown_seats(slot, seats)?;

        let conflicts: Vec<SeatId> = seats
            .iter()
            .filter(|seat| {
                let record = &slot[*seat];
                record.effective_state(now) != SeatState::Available && !record.is_held_by(session_id, now)
            })
            .copied()
            .collect();
        if !conflicts.is_empty() {
            return Err(CoreError::SeatConflict { slot_id, seats: conflicts });
        }

        let mut held = Vec::with_capacity(seats.len());
        for seat in seats {
            if let Some(record) = slot.get_mut(seat) {
                record.state = SeatState::Held;
                record.holder_session_id = Some(session_id);
                record.held_until = Some(held_until);
                held.push(record.clone());
            }
        }
        Ok(held)
    }

    async fn release(&self, slot_id: Uuid, seats: &[SeatId], session_id: Uuid) -> CoreResult<usize> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.get_mut(&slot_id) else {
            return Ok(0);
        };
        let mut released = 0;
        for seat in seats {
            if let Some(record) = slot.get_mut(seat) {
                if record.state == SeatState::Held && record.holder_session_id == Some(session_id) {
                    record.clear();
                    released += 1;
                }
            }
        }
        Ok(released)
    }

    async fn release_session(&self, slot_id: Uuid, session_id: Uuid) -> CoreResult<usize> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.get_mut(&slot_id) else {
            return Ok(0);
        };
        let mut released = 0;
        for record in slot.values_mut() {
            if record.state == SeatState::Held && record.holder_session_id == Some(session_id) {
                record.clear();
                released += 1;
            }
        }
        Ok(released)
    }

    async fn commit(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .get_mut(&slot_id)
            .ok_or_else(|| CoreError::NotFound(format!("slot {}", slot_id)))?;
        unknown_seats(slot, seats)?;

        let conflicts: Vec<SeatId> = seats
            .iter()
            .filter(|seat| {
                let record = &slot[*seat];
                !record.is_occupied_by(session_id) && !record.is_held_by(session_id, now)
            })
            .copied()
            .collect();
        if !conflicts.is_empty() {
            return Err(CoreError::SeatConflict { slot_id, seats: conflicts });
        }

        for seat in seats {
            if let Some(record) = slot.get_mut(seat) {
                record.state = SeatState::Occupied;
                record.held_until = None;
            }
        }
        Ok(())
    }

    async fn revert_commit(
        &self,
        slot_id: Uuid,
        seats: &[SeatId],
        session_id: Uuid,
        held_until: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .get_mut(&slot_id)
            .ok_or_else(|| CoreError::NotFound(format!("slot {}", slot_id)))?;
        for seat in seats {
            if let Some(record) = slot.get_mut(seat) {
                if record.is_occupied_by(session_id) {
                    record.state = SeatState::Held;
                    record.held_until = Some(held_until);
                }
            }
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut purged = 0;
        for record in slots.values_mut().flat_map(|slot| slot.values_mut()) {
            if record.state == SeatState::Held && record.effective_state(now) == SeatState::Available {
                record.clear();
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaamoose_core::clock::ManualClock;
    use vaamoose_core::notify::RecordingPublisher;

    struct Fixture {
        inventory: SeatInventory,
        clock: Arc<ManualClock>,
        events: Arc<RecordingPublisher>,
        slot_id: Uuid,
    }

    async fn fixture(vehicle_type: VehicleType) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(RecordingPublisher::new());
        let inventory = SeatInventory::new(
            Arc::new(InMemorySeatStore::new()),
            clock.clone(),
            events.clone(),
            Duration::minutes(10),
        );
        let slot_id = Uuid::new_v4();
        inventory.initialize_slot(slot_id, vehicle_type).await.unwrap();
        Fixture { inventory, clock, events, slot_id }
    }

    fn state_of(records: &[SeatRecord], seat: SeatId) -> SeatState {
        records.iter().find(|r| r.seat == seat).map(|r| r.state).unwrap()
    }

    #[test]
    fn test_seat_map_layout() {
        let sedan = seat_map(VehicleType::Sedan);
        assert_eq!(sedan.len(), 4);
        let bus = seat_map(VehicleType::LuxuryBus);
        assert_eq!(bus.len(), 20);
        assert_eq!(seat_map(VehicleType::Minivan).len(), 9);

        let class = |seat: SeatId| bus.iter().find(|(s, _)| *s == seat).map(|(_, c)| *c).unwrap();
        assert_eq!(class(SeatId::new(1, 2)), SeatClass::Front);
        assert_eq!(class(SeatId::new(3, 1)), SeatClass::Window);
        assert_eq!(class(SeatId::new(3, 4)), SeatClass::Window);
        assert_eq!(class(SeatId::new(3, 2)), SeatClass::Standard);
    }

    #[tokio::test]
    async fn test_two_users_contend_for_same_seats() {
        let f = fixture(VehicleType::Minivan).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let seats = [SeatId::new(1, 1), SeatId::new(1, 2)];

        f.inventory.hold(f.slot_id, &seats, a).await.unwrap();

        let err = f.inventory.hold(f.slot_id, &[SeatId::new(1, 2)], b).await.unwrap_err();
        match err {
            CoreError::SeatConflict { seats, .. } => assert_eq!(seats, vec![SeatId::new(1, 2)]),
            other => panic!("expected conflict, got {:?}", other),
        }

        f.inventory.commit(f.slot_id, &seats, a).await.unwrap();
        let err = f.inventory.hold(f.slot_id, &seats, b).await.unwrap_err();
        assert!(matches!(err, CoreError::SeatConflict { .. }));
    }

    #[tokio::test]
    async fn test_hold_is_all_or_nothing() {
        let f = fixture(VehicleType::Minivan).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        f.inventory.hold(f.slot_id, &[SeatId::new(2, 2)], a).await.unwrap();

        let err = f
            .inventory
            .hold(f.slot_id, &[SeatId::new(2, 1), SeatId::new(2, 2), SeatId::new(2, 3)], b)
            .await
            .unwrap_err();
        match err {
            CoreError::SeatConflict { seats, .. } => assert_eq!(seats, vec![SeatId::new(2, 2)]),
            other => panic!("expected conflict, got {:?}", other),
        }

        let records = f.inventory.availability(f.slot_id).await.unwrap();
        assert_eq!(state_of(&records, SeatId::new(2, 1)), SeatState::Available);
        assert_eq!(state_of(&records, SeatId::new(2, 3)), SeatState::Available);
    }

    #[tokio::test]
    async fn test_expired_hold_is_reholdable_without_purge() {
        let f = fixture(VehicleType::Sedan).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let seat = [SeatId::new(1, 1)];

        f.inventory.hold(f.slot_id, &seat, a).await.unwrap();
        f.clock.advance(Duration::minutes(11));

        let records = f.inventory.availability(f.slot_id).await.unwrap();
        assert_eq!(state_of(&records, seat[0]), SeatState::Available);

        f.inventory.hold(f.slot_id, &seat, b).await.unwrap();
        let err = f.inventory.commit(f.slot_id, &seat, a).await.unwrap_err();
        assert!(matches!(err, CoreError::SeatConflict { .. }));
    }

    #[tokio::test]
    async fn test_rehold_by_same_session_refreshes_ttl() {
        let f = fixture(VehicleType::Sedan).await;
        let a = Uuid::new_v4();
        let seat = [SeatId::new(2, 1)];

        f.inventory.hold(f.slot_id, &seat, a).await.unwrap();
        f.clock.advance(Duration::minutes(8));
        let held = f.inventory.hold(f.slot_id, &seat, a).await.unwrap();
        assert_eq!(held.held_until, f.clock.now() + Duration::minutes(10));

        f.clock.advance(Duration::minutes(8));
        f.inventory.commit(f.slot_id, &seat, a).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_replay_is_noop_and_other_session_conflicts() {
        let f = fixture(VehicleType::Sedan).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let seats = [SeatId::new(1, 1), SeatId::new(1, 2)];

        f.inventory.hold(f.slot_id, &seats, a).await.unwrap();
        f.inventory.commit(f.slot_id, &seats, a).await.unwrap();
        f.inventory.commit(f.slot_id, &seats, a).await.unwrap();

        let err = f.inventory.commit(f.slot_id, &seats, b).await.unwrap_err();
        match err {
            CoreError::SeatConflict { seats: conflicted, .. } => assert_eq!(conflicted, seats.to_vec()),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commit_without_hold_changes_nothing() {
        let f = fixture(VehicleType::Sedan).await;
        let a = Uuid::new_v4();
        f.inventory.hold(f.slot_id, &[SeatId::new(1, 1)], a).await.unwrap();

        let err = f
            .inventory
            .commit(f.slot_id, &[SeatId::new(1, 1), SeatId::new(1, 2)], a)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SeatConflict { .. }));

        let records = f.inventory.availability(f.slot_id).await.unwrap();
        assert_eq!(state_of(&records, SeatId::new(1, 1)), SeatState::Held);
    }

    #[tokio::test]
    async fn test_release_only_touches_own_holds() {
        let f = fixture(VehicleType::Sedan).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        f.inventory.hold(f.slot_id, &[SeatId::new(1, 1)], a).await.unwrap();
        f.inventory.hold(f.slot_id, &[SeatId::new(1, 2)], b).await.unwrap();

        let released = f
            .inventory
            .release(f.slot_id, &[SeatId::new(1, 1), SeatId::new(1, 2)], a)
            .await
            .unwrap();
        assert_eq!(released, 1);
        assert_eq!(f.inventory.release(f.slot_id, &[SeatId::new(1, 1)], a).await.unwrap(), 0);

        assert_eq!(f.inventory.release_session(f.slot_id, b).await.unwrap(), 1);
        let records = f.inventory.availability(f.slot_id).await.unwrap();
        assert!(records.iter().all(|r| r.state == SeatState::Available));
    }

    #[tokio::test]
    async fn test_revert_commit_returns_seats_to_hold() {
        let f = fixture(VehicleType::Sedan).await;
        let a = Uuid::new_v4();
        let seats = [SeatId::new(2, 2)];
        f.inventory.hold(f.slot_id, &seats, a).await.unwrap();
        f.inventory.commit(f.slot_id, &seats, a).await.unwrap();

        f.inventory.revert_commit(f.slot_id, &seats, a).await.unwrap();
        let records = f.inventory.availability(f.slot_id).await.unwrap();
        assert_eq!(state_of(&records, seats[0]), SeatState::Held);

        f.clock.advance(Duration::minutes(3));
        let records = f.inventory.availability(f.slot_id).await.unwrap();
        assert_eq!(state_of(&records, seats[0]), SeatState::Available);
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_seats() {
        let f = fixture(VehicleType::Sedan).await;
        let a = Uuid::new_v4();

        let err = f.inventory.hold(f.slot_id, &[SeatId::new(9, 9)], a).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let held = f
            .inventory
            .hold(f.slot_id, &[SeatId::new(1, 1), SeatId::new(1, 1)], a)
            .await
            .unwrap();
        assert_eq!(held.seats, vec![SeatId::new(1, 1)]);
    }

    #[tokio::test]
    async fn test_purge_resets_lapsed_holds_and_events_are_published() {
        let f = fixture(VehicleType::Sedan).await;
        f.inventory.hold(f.slot_id, &[SeatId::new(1, 1)], Uuid::new_v4()).await.unwrap();
        f.clock.advance(Duration::minutes(11));

        assert_eq!(f.inventory.purge_expired().await.unwrap(), 1);
        assert_eq!(f.inventory.purge_expired().await.unwrap(), 0);
        assert_eq!(f.events.topics(), vec!["seats.changed"]);
    }
}
