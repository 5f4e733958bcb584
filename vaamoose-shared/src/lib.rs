pub mod models;
pub mod pii;

pub use models::events::{
    BookingConfirmedEvent, DomainEvent, PaymentFailedEvent, SeatsChangedEvent,
};
pub use pii::Masked;
