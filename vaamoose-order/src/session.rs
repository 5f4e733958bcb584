use async_trait::async_trait;
use chrono::Duration;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vaamoose_catalog::{HeldSeats, PricingEngine, PricingQuote, SeatInventory};
use vaamoose_core::booking::BookingDraft;
use vaamoose_core::clock::Clock;
use vaamoose_core::directory::Directory;
use vaamoose_core::model::{DepartureSlot, SeatId};
use vaamoose_core::repository::SessionStore;
use vaamoose_core::session::ReservationSession;
use vaamoose_core::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Inactivity window after which a session is expired.
    pub idle_ttl: Duration,
    /// Extra time the backing store keeps an expired session so its holds can still be released.
    pub retention_grace: Duration,
    pub max_luggage_photos: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::minutes(15),
            retention_grace: Duration::minutes(30),
            max_luggage_photos: 5,
        }
    }
}

/// Drives a reservation session through route, vehicle, seats and luggage to checkout.
pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    directory: Arc<dyn Directory>,
    inventory: Arc<SeatInventory>,
    pricing: Arc<PricingEngine>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn Directory>,
        inventory: Arc<SeatInventory>,
        pricing: Arc<PricingEngine>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            sessions,
            directory,
            inventory,
            pricing,
            clock,
            policy,
        }
    }

    pub fn inventory(&self) -> &Arc<SeatInventory> {
        &self.inventory
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn create(&self, user_id: &str, slot_id: Uuid) -> CoreResult<ReservationSession> {
        let slot = self.slot(slot_id).await?;
        let now = self.clock.now();
        if slot.departs_at() <= now {
            return Err(CoreError::ValidationError(format!("slot {} has already departed", slot_id)));
        }

        let session = ReservationSession::new(user_id, slot.id, &slot.company_id, now, self.policy.idle_ttl);
        self.store(&session).await?;
        tracing::info!(session_id = %session.id, %slot_id, user_id, "Reservation session created");
        Ok(session)
    }

    pub async fn get(&self, session_id: Uuid, user_id: &str) -> CoreResult<ReservationSession> {
        let mut session = self.load(session_id, user_id).await?;
        self.touch_and_store(&mut session).await?;
        Ok(session)
    }

    /// Loads an owned, unexpired session. An expired one is cleaned up on the way out.
    async fn load(&self, session_id: Uuid, user_id: &str) -> CoreResult<ReservationSession> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("session {}", session_id)))?;

        if session.user_id != user_id {
            return Err(CoreError::Forbidden(format!("session {} belongs to another user", session_id)));
        }

        if session.is_expired(self.clock.now()) {
            self.expire(&session).await;
            return Err(CoreError::SessionExpired(session_id));
        }
        Ok(session)
    }

    async fn expire(&self, session: &ReservationSession) {
        if let Err(e) = self.inventory.release_session(session.slot_id, session.id).await {
            tracing::warn!(session_id = %session.id, error = %e, "Failed to release holds of expired session");
        }
        if let Err(e) = self.sessions.delete(session.id).await {
            tracing::warn!(session_id = %session.id, error = %e, "Failed to delete expired session");
        }
        tracing::info!(session_id = %session.id, "Reservation session expired");
    }

    /// Replaces the selection. On conflict the previous selection and its holds are kept.
    pub async fn select_seats(
        &self,
        session_id: Uuid,
        user_id: &str,
        seats: &[SeatId],
    ) -> CoreResult<(ReservationSession, HeldSeats)> {
        let mut session = self.load(session_id, user_id).await?;
        let requested: BTreeSet<SeatId> = seats.iter().copied().collect();
        if requested.is_empty() {
            return Err(CoreError::ValidationError("select at least one seat".to_string()));
        }

        let requested_seats: Vec<SeatId> = requested.iter().copied().collect();
        let held = self.inventory.hold(session.slot_id, &requested_seats, session.id).await?;

        let dropped: Vec<SeatId> = session.selected_seats.difference(&requested).copied().collect();
        if !dropped.is_empty() {
            self.inventory.release(session.slot_id, &dropped, session.id).await?;
        }

        session.selected_seats = requested;
        session.computed_total = None;
        self.touch_and_store(&mut session).await?;
        Ok((session, held))
    }

    /// Records the luggage photo URLs returned by photo storage. An empty list means no luggage.
    pub async fn set_luggage(
        &self,
        session_id: Uuid,
        user_id: &str,
        photo_refs: Vec<String>,
    ) -> CoreResult<ReservationSession> {
        if photo_refs.len() > self.policy.max_luggage_photos {
            return Err(CoreError::ValidationError(format!(
                "at most {} luggage photos are allowed",
                self.policy.max_luggage_photos
            )));
        }
        for photo in &photo_refs {
            let valid = reqwest::Url::parse(photo)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
                .unwrap_or(false);
            if !valid {
                return Err(CoreError::ValidationError(format!("luggage photo '{}' is not an http(s) URL", photo)));
            }
        }

        let mut session = self.load(session_id, user_id).await?;
        session.luggage_photo_refs = Some(photo_refs);
        self.touch_and_store(&mut session).await?;
        Ok(session)
    }

    pub async fn set_route(&self, session_id: Uuid, user_id: &str, route_id: &str) -> CoreResult<ReservationSession> {
        let mut session = self.load(session_id, user_id).await?;
        let slot = self.slot(session.slot_id).await?;
        if slot.route_id != route_id {
            return Err(CoreError::ValidationError(format!("route {} does not serve slot {}", route_id, slot.id)));
        }
        self.directory
            .route(route_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("route {}", route_id)))?;

        session.route_id = Some(route_id.to_string());
        session.computed_total = None;
        self.touch_and_store(&mut session).await?;
        Ok(session)
    }

    pub async fn set_vehicle(&self, session_id: Uuid, user_id: &str, vehicle_id: &str) -> CoreResult<ReservationSession> {
        let mut session = self.load(session_id, user_id).await?;
        let slot = self.slot(session.slot_id).await?;
        if slot.vehicle_id != vehicle_id {
            return Err(CoreError::ValidationError(format!("vehicle {} does not run slot {}", vehicle_id, slot.id)));
        }
        self.directory
            .vehicle(vehicle_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("vehicle {}", vehicle_id)))?;

        session.vehicle_id = Some(vehicle_id.to_string());
        session.computed_total = None;
        self.touch_and_store(&mut session).await?;
        Ok(session)
    }

    pub async fn checkout(&self, session_id: Uuid, user_id: &str) -> CoreResult<PricingQuote> {
        let mut session = self.load(session_id, user_id).await?;
        let quote = self.quote(&session).await?;
        session.computed_total = Some(quote.total);
        self.touch_and_store(&mut session).await?;
        Ok(quote)
    }

    /// Checkout plus the booking snapshot the payment intent carries.
    pub async fn prepare_payment(
        &self,
        session_id: Uuid,
        user_id: &str,
    ) -> CoreResult<(ReservationSession, BookingDraft)> {
        let mut session = self.load(session_id, user_id).await?;
        let quote = self.quote(&session).await?;
        let slot = self.slot(session.slot_id).await?;

        session.computed_total = Some(quote.total);
        self.touch_and_store(&mut session).await?;

        let draft = BookingDraft {
            slot_id: slot.id,
            company_id: slot.company_id.clone(),
            vehicle_id: slot.vehicle_id.clone(),
            route_id: slot.route_id.clone(),
            departure_date: slot.date,
            departure_time: slot.time,
            seats: quote.seats,
            luggage_photo_refs: session.luggage_photo_refs.clone().unwrap_or_default(),
            total_price: quote.total,
        };
        Ok((session, draft))
    }

    /// Re-holds the session's seats for `ttl` (the payment window) and keeps the
    /// session alive at least as long as the holds.
    pub async fn extend_holds(&self, session: &mut ReservationSession, ttl: Duration) -> CoreResult<HeldSeats> {
        let held = self.inventory.hold_for(session.slot_id, &session.seats(), session.id, ttl).await?;
        session.payment_hold_until = Some(held.held_until);
        self.touch_and_store(session).await?;
        Ok(held)
    }

    pub async fn cancel(&self, session_id: Uuid, user_id: &str) -> CoreResult<()> {
        let session = self.load(session_id, user_id).await?;
        let released = self.inventory.release_session(session.slot_id, session.id).await?;
        self.sessions.delete(session.id).await?;
        tracing::info!(%session_id, released, "Reservation session cancelled");
        Ok(())
    }

    /// Drops a session whose seats now belong to a booking.
    pub async fn complete(&self, session_id: Uuid) {
        if let Err(e) = self.sessions.delete(session_id).await {
            tracing::warn!(%session_id, error = %e, "Failed to discard completed session");
        }
    }

    async fn quote(&self, session: &ReservationSession) -> CoreResult<PricingQuote> {
        let missing = session.missing_fields();
        if !missing.is_empty() {
            return Err(CoreError::IncompleteSession { missing });
        }

        let now = self.clock.now();
        let seats = session.seats();
        let records = self.inventory.availability(session.slot_id).await?;
        let lost: Vec<SeatId> = seats
            .iter()
            .filter(|seat| {
                !records
                    .iter()
                    .any(|r| r.seat == **seat && r.is_held_by(session.id, now))
            })
            .copied()
            .collect();
        if !lost.is_empty() {
            return Err(CoreError::SeatConflict { slot_id: session.slot_id, seats: lost });
        }

        let route_id = session.route_id.as_deref().unwrap_or_default();
        let vehicle_id = session.vehicle_id.as_deref().unwrap_or_default();
        let route = self
            .directory
            .route(route_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("route {}", route_id)))?;
        let vehicle = self
            .directory
            .vehicle(vehicle_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("vehicle {}", vehicle_id)))?;

        let classes = self.inventory.seat_classes(session.slot_id, &seats).await?;
        self.pricing.quote(&route, &vehicle, &classes)
    }

    async fn slot(&self, slot_id: Uuid) -> CoreResult<DepartureSlot> {
        self.directory
            .slot(slot_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("slot {}", slot_id)))
    }

    async fn touch_and_store(&self, session: &mut ReservationSession) -> CoreResult<()> {
        session.touch(self.clock.now(), self.policy.idle_ttl);
        self.store(session).await
    }

    async fn store(&self, session: &ReservationSession) -> CoreResult<()> {
        let live = (session.expires_at - self.clock.now()).max(self.policy.idle_ttl);
        self.sessions.save(session, live + self.policy.retention_grace).await
    }
}

/// Session store for tests and single-node runs. Retention is not enforced;
/// expiry is decided by `ReservationSession::expires_at`.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, ReservationSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &ReservationSession, _ttl: Duration) -> CoreResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<ReservationSession>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sessions.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use vaamoose_core::model::SeatState;

    #[tokio::test]
    async fn test_full_flow_reaches_checkout() {
        let h = Harness::new().await;
        let session = h.sessions.create("user-1", h.slot_id).await.unwrap();

        let err = h.sessions.checkout(session.id, "user-1").await.unwrap_err();
        match err {
            CoreError::IncompleteSession { missing } => {
                assert_eq!(missing, vec!["route", "vehicle", "seats", "luggage"])
            }
            other => panic!("expected incomplete session, got {:?}", other),
        }

        h.fill(session.id, "user-1", &[SeatId::new(1, 1), SeatId::new(2, 1)]).await;
        let quote = h.sessions.checkout(session.id, "user-1").await.unwrap();
        // round(3500 * 1.3) + front 500 + window 200
        assert_eq!(quote.total, 5250);

        let session = h.sessions.get(session.id, "user-1").await.unwrap();
        assert_eq!(session.computed_total, Some(5250));
    }

    #[tokio::test]
    async fn test_conflicting_selection_keeps_previous_holds() {
        let h = Harness::new().await;
        let a = h.sessions.create("user-a", h.slot_id).await.unwrap();
        let b = h.sessions.create("user-b", h.slot_id).await.unwrap();

        h.sessions.select_seats(a.id, "user-a", &[SeatId::new(1, 1), SeatId::new(1, 2)]).await.unwrap();
        h.sessions.select_seats(b.id, "user-b", &[SeatId::new(2, 2)]).await.unwrap();

        let err = h
            .sessions
            .select_seats(b.id, "user-b", &[SeatId::new(1, 2), SeatId::new(2, 3)])
            .await
            .unwrap_err();
        match err {
            CoreError::SeatConflict { seats, .. } => assert_eq!(seats, vec![SeatId::new(1, 2)]),
            other => panic!("expected conflict, got {:?}", other),
        }

        let b = h.sessions.get(b.id, "user-b").await.unwrap();
        assert_eq!(b.seats(), vec![SeatId::new(2, 2)]);
        let records = h.inventory.availability(h.slot_id).await.unwrap();
        let state = |seat: SeatId| records.iter().find(|r| r.seat == seat).map(|r| r.state).unwrap();
        assert_eq!(state(SeatId::new(2, 2)), SeatState::Held);
        assert_eq!(state(SeatId::new(2, 3)), SeatState::Available);
    }

    #[tokio::test]
    async fn test_reselection_releases_dropped_seats() {
        let h = Harness::new().await;
        let a = h.sessions.create("user-a", h.slot_id).await.unwrap();
        h.sessions.select_seats(a.id, "user-a", &[SeatId::new(1, 1), SeatId::new(1, 2)]).await.unwrap();
        h.sessions.select_seats(a.id, "user-a", &[SeatId::new(1, 2)]).await.unwrap();

        let b = h.sessions.create("user-b", h.slot_id).await.unwrap();
        h.sessions.select_seats(b.id, "user-b", &[SeatId::new(1, 1)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_releases_holds() {
        let h = Harness::new().await;
        let a = h.sessions.create("user-a", h.slot_id).await.unwrap();
        h.sessions.select_seats(a.id, "user-a", &[SeatId::new(3, 3)]).await.unwrap();

        h.clock.advance(Duration::minutes(16));
        let err = h.sessions.get(a.id, "user-a").await.unwrap_err();
        assert!(matches!(err, CoreError::SessionExpired(_)));

        let err = h.sessions.get(a.id, "user-a").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_frees_seats_for_others() {
        let h = Harness::new().await;
        let a = h.sessions.create("user-a", h.slot_id).await.unwrap();
        h.sessions.select_seats(a.id, "user-a", &[SeatId::new(2, 2)]).await.unwrap();
        h.sessions.cancel(a.id, "user-a").await.unwrap();

        let b = h.sessions.create("user-b", h.slot_id).await.unwrap();
        h.sessions.select_seats(b.id, "user-b", &[SeatId::new(2, 2)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_ownership_and_validation() {
        let h = Harness::new().await;
        let a = h.sessions.create("user-a", h.slot_id).await.unwrap();

        let err = h.sessions.get(a.id, "user-b").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = h.sessions.set_route(a.id, "user-a", "rte-other").await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let err = h
            .sessions
            .set_luggage(a.id, "user-a", vec!["file:///etc/passwd".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let err = h.sessions.select_seats(a.id, "user-a", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let s = h.sessions.set_luggage(a.id, "user-a", vec![]).await.unwrap();
        assert_eq!(s.luggage_photo_refs, Some(vec![]));
    }

    #[tokio::test]
    async fn test_luggage_photo_limit() {
        let h = Harness::new().await;
        let a = h.sessions.create("user-a", h.slot_id).await.unwrap();
        let photos = |n: usize| -> Vec<String> {
            (1..=n).map(|i| format!("https://photos.vaamoose.ng/bag-{}.jpg", i)).collect()
        };

        let err = h.sessions.set_luggage(a.id, "user-a", photos(6)).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        let s = h.sessions.get(a.id, "user-a").await.unwrap();
        assert!(s.luggage_photo_refs.is_none());

        let s = h.sessions.set_luggage(a.id, "user-a", photos(5)).await.unwrap();
        assert_eq!(s.luggage_photo_refs.map(|p| p.len()), Some(5));
    }

    #[tokio::test]
    async fn test_checkout_detects_lost_holds() {
        let h = Harness::new().await;
        let a = h.sessions.create("user-a", h.slot_id).await.unwrap();
        h.fill(a.id, "user-a", &[SeatId::new(1, 1)]).await;

        // hold TTL is shorter than the idle window
        h.clock.advance(Duration::minutes(11));
        let _ = h.sessions.get(a.id, "user-a").await.unwrap();
        let b = h.sessions.create("user-b", h.slot_id).await.unwrap();
        h.sessions.select_seats(b.id, "user-b", &[SeatId::new(1, 1)]).await.unwrap();

        let err = h.sessions.checkout(a.id, "user-a").await.unwrap_err();
        assert!(matches!(err, CoreError::SeatConflict { .. }));
    }
}
