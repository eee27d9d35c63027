pub mod chat;
pub mod manager;
pub mod notices;

pub use chat::ChatService;
pub use manager::BookingManager;
pub use notices::NotificationService;
