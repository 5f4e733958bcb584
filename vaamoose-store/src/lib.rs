pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod directory_repo;
pub mod events;
pub mod intent_repo;
pub mod reconciliation_repo;
pub mod redis_repo;
pub mod review_repo;
pub mod seat_repo;

pub use booking_repo::PgBookingStore;
pub use database::DbClient;
pub use directory_repo::PgDirectory;
pub use events::EventProducer;
pub use intent_repo::PgIntentStore;
pub use reconciliation_repo::PgReconciliationStore;
pub use redis_repo::RedisClient;
pub use review_repo::PgReviewStore;
pub use seat_repo::PgSeatStore;
