use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vaamoose_api::{app, worker, AppBuilder, AuthConfig, Stores};
use vaamoose_core::payment::PaymentGateway;
use vaamoose_core::repository::SessionStore;
use vaamoose_order::{
    CircuitBreaker, CircuitBreakerGateway, InMemorySessionStore, MockPaymentGateway, PaystackConfig,
    PaystackGateway,
};
use vaamoose_store::app_config::Config;
use vaamoose_store::{
    DbClient, EventProducer, PgBookingStore, PgDirectory, PgIntentStore, PgReconciliationStore,
    PgReviewStore, PgSeatStore, RedisClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaamoose_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Vaamoose API on port {}", config.server.port);

    // Redis Connection
    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    let mut rules = config.business_rules.clone();
    let stores = match config.database.url.as_deref() {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            rules = db
                .fetch_business_rules(rules)
                .await
                .context("Failed to load business rules")?;

            let sessions: Arc<dyn SessionStore> = match redis.clone() {
                Some(redis) => redis as Arc<dyn SessionStore>,
                None => Arc::new(InMemorySessionStore::new()),
            };
            Stores {
                seats: Arc::new(PgSeatStore::new(db.pool.clone())),
                sessions,
                bookings: Arc::new(PgBookingStore::new(db.pool.clone())),
                intents: Arc::new(PgIntentStore::new(db.pool.clone())),
                reconciliation: Arc::new(PgReconciliationStore::new(db.pool.clone())),
                reviews: Arc::new(PgReviewStore::new(db.pool.clone())),
                directory: Arc::new(PgDirectory::new(db.pool.clone())),
            }
        }
        None => {
            tracing::warn!("No database configured, running on in-memory stores");
            Stores::in_memory()
        }
    };

    let paystack = &config.paystack;
    let gateway: Arc<dyn PaymentGateway> = if paystack.secret_key.is_empty() {
        tracing::warn!("No Paystack secret key configured, using the mock payment gateway");
        Arc::new(MockPaymentGateway::new())
    } else {
        let client = PaystackGateway::new(PaystackConfig {
            secret_key: paystack.secret_key.clone(),
            base_url: paystack.base_url.clone(),
            timeout_seconds: paystack.timeout_seconds,
        })
        .context("Failed to build Paystack client")?;
        let breaker = CircuitBreaker::new(
            "paystack",
            paystack.circuit_failure_threshold,
            Duration::from_secs(paystack.circuit_reset_seconds),
        );
        Arc::new(CircuitBreakerGateway::new(client, breaker))
    };

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };
    let mut builder = AppBuilder::new(stores, gateway, auth, rules)
        .callback_url(paystack.callback_url.clone())
        .webhook_secret(Some(paystack.secret_key.clone()))
        .rate_limit(redis, config.server.rate_limit_per_minute);

    // Kafka Connection
    if let Some(brokers) = config.kafka.brokers.as_deref() {
        let producer = Arc::new(EventProducer::new(brokers).context("Failed to create Kafka producer")?);
        builder = builder.events(producer.clone()).notifier(producer);
    }

    let state = builder.build().context("Failed to register metrics")?;

    tokio::spawn(worker::start_maintenance_worker(
        state.sweeper.clone(),
        state.inventory.clone(),
        Duration::from_secs(config.reconciliation.sweep_interval_seconds.max(1)),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
