use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::model::SeatId;

/// A user's booking draft before payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSession {
    pub id: Uuid,
    pub user_id: String,
    pub slot_id: Uuid,
    pub company_id: String,
    pub route_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub selected_seats: BTreeSet<SeatId>,
    /// `None` until the luggage step is completed; an empty list is a valid answer.
    pub luggage_photo_refs: Option<Vec<String>>,
    pub computed_total: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// End of the payment window once the customer has been sent to the gateway.
    /// The session does not expire before it, however idle.
    #[serde(default)]
    pub payment_hold_until: Option<DateTime<Utc>>,
}

impl ReservationSession {
    pub fn new(
        user_id: &str,
        slot_id: Uuid,
        company_id: &str,
        now: DateTime<Utc>,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            slot_id,
            company_id: company_id.to_string(),
            route_id: None,
            vehicle_id: None,
            selected_seats: BTreeSet::new(),
            luggage_photo_refs: None,
            computed_total: None,
            created_at: now,
            last_activity_at: now,
            expires_at: now + idle_ttl,
            payment_hold_until: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn touch(&mut self, now: DateTime<Utc>, idle_ttl: Duration) {
        self.last_activity_at = now;
        self.expires_at = match self.payment_hold_until {
            Some(until) => (now + idle_ttl).max(until),
            None => now + idle_ttl,
        };
    }

    pub fn seats(&self) -> Vec<SeatId> {
        self.selected_seats.iter().copied().collect()
    }

    /// Names of the draft fields still unset, in booking-flow order.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.route_id.is_none() {
            missing.push("route".to_string());
        }
        if self.vehicle_id.is_none() {
            missing.push("vehicle".to_string());
        }
        if self.selected_seats.is_empty() {
            missing.push("seats".to_string());
        }
        if self.luggage_photo_refs.is_none() {
            missing.push("luggage".to_string());
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_in_flow_order() {
        let now = Utc::now();
        let mut session =
            ReservationSession::new("user-1", Uuid::new_v4(), "cmp-1", now, Duration::minutes(15));
        assert_eq!(session.missing_fields(), vec!["route", "vehicle", "seats", "luggage"]);

        session.route_id = Some("rte-1".to_string());
        session.luggage_photo_refs = Some(vec![]);
        assert_eq!(session.missing_fields(), vec!["vehicle", "seats"]);
    }

    #[test]
    fn test_touch_extends_expiry() {
        let now = Utc::now();
        let mut session =
            ReservationSession::new("user-1", Uuid::new_v4(), "cmp-1", now, Duration::minutes(15));
        assert!(session.is_expired(now + Duration::minutes(15)));

        session.touch(now + Duration::minutes(10), Duration::minutes(15));
        assert!(!session.is_expired(now + Duration::minutes(20)));
    }

    #[test]
    fn test_payment_window_outlives_idle_ttl() {
        let now = Utc::now();
        let mut session =
            ReservationSession::new("user-1", Uuid::new_v4(), "cmp-1", now, Duration::minutes(15));
        session.payment_hold_until = Some(now + Duration::minutes(20));
        session.touch(now, Duration::minutes(15));

        assert!(!session.is_expired(now + Duration::minutes(16)));
        assert!(session.is_expired(now + Duration::minutes(20)));
    }
}
