use guidely_booking::{BookingManager, ChatService, NotificationService};
use guidely_core::events::EventPublisher;
use guidely_core::repository::{
    AccountDirectory, BookingRepository, MessageRepository, NotificationRepository,
};
use guidely_relay::Relay;
use guidely_store::{
    DbClient, MemoryStore, PgAccountDirectory, PgBookingRepository, PgMessageRepository,
    PgNotificationRepository, RedisClient,
};
use std::sync::Arc;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone, Copy)]
pub struct Limits {
    pub rate_limit_requests: i64,
    pub rate_limit_window_seconds: i64,
    pub max_relay_connections: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            max_relay_connections: 1000,
        }
    }
}

/// The storage and broker handles the services are built from.
pub struct Backends {
    pub bookings: Arc<dyn BookingRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub events: Arc<dyn EventPublisher>,
}

impl Backends {
    pub fn postgres(db: &DbClient, events: Arc<dyn EventPublisher>) -> Self {
        let pool = db.pool.clone();
        Self {
            bookings: Arc::new(PgBookingRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            accounts: Arc::new(PgAccountDirectory::new(pool)),
            events,
        }
    }

    pub fn memory(store: Arc<MemoryStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            bookings: store.clone(),
            notifications: store.clone(),
            messages: store.clone(),
            accounts: store,
            events,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingManager>,
    pub chat: Arc<ChatService>,
    pub notifications: Arc<NotificationService>,
    pub relay: Arc<Relay>,
    /// Absent disables rate limiting.
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub limits: Limits,
}

impl AppState {
    pub fn new(
        backends: Backends,
        redis: Option<Arc<RedisClient>>,
        auth: AuthConfig,
        limits: Limits,
    ) -> prometheus::Result<Self> {
        let Backends { bookings, notifications, messages, accounts, events } = backends;

        Ok(Self {
            bookings: Arc::new(BookingManager::new(bookings.clone(), accounts, events.clone())),
            chat: Arc::new(ChatService::new(bookings.clone(), messages, events)),
            notifications: Arc::new(NotificationService::new(notifications)),
            relay: Arc::new(Relay::new(bookings, limits.max_relay_connections)),
            redis,
            metrics: Arc::new(Metrics::new()?),
            auth,
            limits,
        })
    }
}
