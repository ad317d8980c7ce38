pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod session_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use events::EventProducer;
pub use session_repo::RedisClient;
