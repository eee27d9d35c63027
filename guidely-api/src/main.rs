use anyhow::Context;
use guidely_api::{app, AppState, AuthConfig, Backends, Limits};
use guidely_core::events::{EventPublisher, NoopPublisher};
use guidely_store::app_config::{Config, StorageBackend};
use guidely_store::{DbClient, EventProducer, MemoryStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guidely_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Guidely API on port {}", config.server.port);

    // Kafka Connection
    let events: Arc<dyn EventPublisher> = match &config.kafka {
        Some(kafka) => Arc::new(
            EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?,
        ),
        None => {
            tracing::warn!("No Kafka brokers configured; domain events are not published");
            Arc::new(NoopPublisher)
        }
    };

    let backends = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Backends::postgres(&db, events)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Backends::memory(Arc::new(MemoryStore::new()), events)
        }
    };

    // Redis Connection
    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    let app_state = AppState::new(
        backends,
        redis,
        AuthConfig { secret: config.auth.jwt_secret.clone() },
        Limits {
            rate_limit_requests: config.rate_limit.requests,
            rate_limit_window_seconds: config.rate_limit.window_seconds,
            max_relay_connections: config.relay.max_connections,
        },
    )
    .context("Failed to register metrics")?;

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
