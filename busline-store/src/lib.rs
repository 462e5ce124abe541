pub mod app_config;
pub mod booking_repo;
pub mod bus_repo;
pub mod database;
pub mod events;
pub mod memory;
pub mod paystack;
pub mod redis_repo;
pub mod trip_repo;
pub mod user_repo;

pub use booking_repo::PgBookingRepository;
pub use bus_repo::PgBusRepository;
pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use events::LogEventPublisher;
pub use memory::InMemoryStore;
pub use paystack::PaystackClient;
pub use redis_repo::RedisClient;
pub use trip_repo::PgTripRepository;
pub use user_repo::PgUserRepository;
