use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Seat position inside a vehicle, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatId {
    pub row: u16,
    pub column: u16,
}

impl SeatId {
    pub fn new(row: u16, column: u16) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.column)
    }
}

impl FromStr for SeatId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::ValidationError(format!("invalid seat id '{}'", s));
        let (row, column) = s.split_once('-').ok_or_else(invalid)?;
        let row: u16 = row.trim().parse().map_err(|_| invalid())?;
        let column: u16 = column.trim().parse().map_err(|_| invalid())?;
        if row == 0 || column == 0 {
            return Err(invalid());
        }
        Ok(Self { row, column })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatClass {
    Standard,
    Window,
    Front,
}

impl SeatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatClass::Standard => "standard",
            SeatClass::Window => "window",
            SeatClass::Front => "front",
        }
    }
}

impl FromStr for SeatClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" | "aisle" => Ok(SeatClass::Standard),
            "window" => Ok(SeatClass::Window),
            "front" => Ok(SeatClass::Front),
            other => Err(CoreError::ValidationError(format!("unknown seat class '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    Available,
    Held,
    Occupied,
}

impl SeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatState::Available => "available",
            SeatState::Held => "held",
            SeatState::Occupied => "occupied",
        }
    }
}

impl FromStr for SeatState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatState::Available),
            "held" => Ok(SeatState::Held),
            "occupied" => Ok(SeatState::Occupied),
            other => Err(CoreError::InternalError(format!("unknown seat state '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatRecord {
    pub slot_id: Uuid,
    pub seat: SeatId,
    pub seat_class: SeatClass,
    pub state: SeatState,
    pub holder_session_id: Option<Uuid>,
    pub held_until: Option<DateTime<Utc>>,
}

impl SeatRecord {
    pub fn available(slot_id: Uuid, seat: SeatId, seat_class: SeatClass) -> Self {
        Self {
            slot_id,
            seat,
            seat_class,
            state: SeatState::Available,
            holder_session_id: None,
            held_until: None,
        }
    }

    /// State as seen by readers: a lapsed hold counts as available.
    pub fn effective_state(&self, now: DateTime<Utc>) -> SeatState {
        match self.state {
            SeatState::Held if self.held_until.map_or(true, |until| until <= now) => {
                SeatState::Available
            }
            state => state,
        }
    }

    pub fn is_held_by(&self, session_id: Uuid, now: DateTime<Utc>) -> bool {
        self.effective_state(now) == SeatState::Held && self.holder_session_id == Some(session_id)
    }

    pub fn is_occupied_by(&self, session_id: Uuid) -> bool {
        self.state == SeatState::Occupied && self.holder_session_id == Some(session_id)
    }

    /// Reset to available, as the lazy expiry check and `release` both do.
    pub fn clear(&mut self) {
        self.state = SeatState::Available;
        self.holder_session_id = None;
        self.held_until = None;
    }

    /// Record as returned to callers, with lazy expiry folded in.
    pub fn normalized(mut self, now: DateTime<Utc>) -> Self {
        if self.state == SeatState::Held && self.effective_state(now) == SeatState::Available {
            self.clear();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Sedan,
    Minivan,
    LuxuryBus,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Sedan => "sedan",
            VehicleType::Minivan => "minivan",
            VehicleType::LuxuryBus => "luxury_bus",
        }
    }

    /// Seat grid as (rows, columns).
    pub fn grid(&self) -> (u16, u16) {
        match self {
            VehicleType::Sedan => (2, 2),
            VehicleType::Minivan => (3, 3),
            VehicleType::LuxuryBus => (5, 4),
        }
    }
}

impl FromStr for VehicleType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sedan" => Ok(VehicleType::Sedan),
            "minivan" => Ok(VehicleType::Minivan),
            "luxury_bus" | "luxury-bus" => Ok(VehicleType::LuxuryBus),
            other => Err(CoreError::ValidationError(format!("unknown vehicle type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub company_id: String,
    pub origin: String,
    pub destination: String,
    /// Naira.
    pub base_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub vehicle_type: VehicleType,
    pub capacity: u32,
    pub price_multiplier: f64,
}

/// A scheduled bus run: company + vehicle + route + date/time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartureSlot {
    pub id: Uuid,
    pub company_id: String,
    pub vehicle_id: String,
    pub route_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub total_seats: u32,
    pub created_at: DateTime<Utc>,
}

impl DepartureSlot {
    pub fn departs_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_seat_id_parse_and_display() {
        let seat: SeatId = "3-2".parse().unwrap();
        assert_eq!(seat, SeatId::new(3, 2));
        assert_eq!(seat.to_string(), "3-2");
        assert!("0-1".parse::<SeatId>().is_err());
        assert!("12".parse::<SeatId>().is_err());
    }

    #[test]
    fn test_lapsed_hold_reads_as_available() {
        let now = Utc::now();
        let session = Uuid::new_v4();
        let mut record = SeatRecord::available(Uuid::new_v4(), SeatId::new(1, 1), SeatClass::Front);
        record.state = SeatState::Held;
        record.holder_session_id = Some(session);
        record.held_until = Some(now + Duration::seconds(30));

        assert!(record.is_held_by(session, now));
        assert_eq!(record.effective_state(now + Duration::seconds(31)), SeatState::Available);

        let normalized = record.normalized(now + Duration::seconds(31));
        assert_eq!(normalized.state, SeatState::Available);
        assert!(normalized.holder_session_id.is_none());
    }

    #[test]
    fn test_seat_class_accepts_legacy_aisle() {
        assert_eq!("aisle".parse::<SeatClass>().unwrap(), SeatClass::Standard);
    }
}
