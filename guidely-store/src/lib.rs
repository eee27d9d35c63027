pub mod account_repo;
pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod memory;
pub mod message_repo;
pub mod notification_repo;
pub mod redis_repo;

pub use account_repo::PgAccountDirectory;
pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use events::EventProducer;
pub use memory::MemoryStore;
pub use message_repo::PgMessageRepository;
pub use notification_repo::PgNotificationRepository;
pub use redis_repo::RedisClient;
