pub mod directory;
pub mod inventory;
pub mod pricing;

pub use directory::InMemoryDirectory;
pub use inventory::{seat_map, HeldSeats, InMemorySeatStore, SeatInventory};
pub use pricing::{price, PricingConfig, PricingEngine, PricingQuote, SurchargeTable};
