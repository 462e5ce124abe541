use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use busline_api::{app, AppState, AuthConfig, Backends};
use busline_core::events::EventPublisher;
use busline_store::app_config::Config;
use busline_store::{
    DbClient, LogEventPublisher, PaystackClient, PgBookingRepository, PgBusRepository, PgTripRepository,
    PgUserRepository, RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis: seat holds and rate limiting
    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?,
    );

    let buses = Arc::new(PgBusRepository::new(db.pool.clone()));
    let paystack = PaystackClient::new(&config.paystack.base_url, &config.paystack.secret_key);

    let backends = Backends {
        bus_types: buses.clone(),
        buses,
        trips: Arc::new(PgTripRepository::new(db.pool.clone())),
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        users: Arc::new(PgUserRepository::new(db.pool.clone())),
        holds: redis.clone(),
        rate_limiter: redis,
        events: event_publisher(&config)?,
        gateway: Arc::new(paystack),
    };

    let state = AppState::new(
        backends,
        AuthConfig { secret: config.auth.jwt_secret.clone() },
        config.business_rules.clone(),
        // Paystack signs webhooks with the account secret key.
        config.paystack.secret_key.clone(),
        config.paystack.callback_url.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = busline_store::EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(LogEventPublisher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka configured but the binary was built without the `kafka` feature; logging events instead");
    }
    Ok(Arc::new(LogEventPublisher))
}
