pub mod booking;
pub mod clock;
pub mod directory;
pub mod model;
pub mod notify;
pub mod payment;
pub mod repository;
pub mod review;
pub mod session;

use model::SeatId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Seats unavailable: {}", join_seats(.seats))]
    SeatConflict { slot_id: uuid::Uuid, seats: Vec<SeatId> },
    #[error("Reservation incomplete, missing: {}", .missing.join(", "))]
    IncompleteSession { missing: Vec<String> },
    #[error("Payment failed: {0}")]
    PaymentError(String),
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Payment still processing: {0}")]
    PaymentPending(String),
    #[error("Reconciliation failure for {reference}: {detail}")]
    ReconciliationFailure { reference: String, detail: String },
    #[error("Reservation session expired: {0}")]
    SessionExpired(uuid::Uuid),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Duplicate payment reference: {0}")]
    DuplicateReference(String),
    #[error("Booking {0} has already been reviewed")]
    AlreadyReviewed(uuid::Uuid),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

fn join_seats(seats: &[SeatId]) -> String {
    seats
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        CoreError::InternalError(err.to_string())
    }

    /// Errors a user can act on (reselect seats, retry payment) as opposed to faults.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::SeatConflict { .. }
                | CoreError::IncompleteSession { .. }
                | CoreError::PaymentError(_)
                | CoreError::PaymentPending(_)
                | CoreError::ValidationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_conflict_message_lists_seats() {
        let err = CoreError::SeatConflict {
            slot_id: uuid::Uuid::new_v4(),
            seats: vec![SeatId::new(1, 1), SeatId::new(2, 3)],
        };
        assert_eq!(err.to_string(), "Seats unavailable: 1-1, 2-3");
        assert!(err.is_recoverable());
        assert!(!CoreError::SessionExpired(uuid::Uuid::new_v4()).is_recoverable());
    }

    #[test]
    fn test_gateway_outage_is_not_recoverable() {
        assert!(CoreError::PaymentError("declined".into()).is_recoverable());
        assert!(!CoreError::GatewayUnavailable("timeout".into()).is_recoverable());
    }
}
